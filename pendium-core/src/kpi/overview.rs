//! User-directory overview: the aggregate payload behind the admin user list.
//!
//! Combines a paginated, filtered user listing with the cross-cutting
//! summaries the dashboard shows alongside it: totals, daily active users,
//! a churn summary over a preset activity range, and per-user weekly query
//! counts with week-over-week deltas.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cohort::CohortFilter;
use crate::db::UserFilter;
use crate::error::Result;
use crate::types::User;
use crate::window::RangePreset;

use super::churn;
use super::KpiEngine;

/// Query parameters for the user directory.
#[derive(Debug, Clone)]
pub struct OverviewParams {
    /// 1-based page number
    pub page: usize,
    pub per_page: usize,
    /// Case-insensitive substring search over email/name/status
    pub search: Option<String>,
    /// Exact status filter
    pub status: Option<String>,
    /// Cohort selector ("all", "beta", "A".."D", "none")
    pub cohort: String,
    /// Activity range for the churn and weekly-query summaries
    pub activity_preset: RangePreset,
}

impl Default for OverviewParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
            search: None,
            status: None,
            cohort: "all".to_string(),
            activity_preset: RangePreset::LastWeek,
        }
    }
}

/// One row of the user listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRow {
    pub email: String,
    pub name: Option<String>,
    pub status: String,
    pub signup_date: Option<DateTime<Utc>>,
    pub usage: i64,
    pub follow_up_usage: i64,
    pub feedback_count: i64,
    pub source_click_count: i64,
    pub num_logins: i64,
    pub clicked_sources_count: usize,
    pub saved_sources_count: usize,
}

impl From<&User> for UserRow {
    fn from(user: &User) -> Self {
        Self {
            email: user.email.clone(),
            name: user.name.clone(),
            status: user.status.clone(),
            signup_date: user.signup_date,
            usage: user.usage,
            follow_up_usage: user.follow_up_usage,
            feedback_count: user.feedback_count,
            source_click_count: user.source_click_count,
            num_logins: user.num_logins,
            clicked_sources_count: user.clicked_sources.len(),
            saved_sources_count: user.saved_sources.len(),
        }
    }
}

/// Distinct active users for one calendar day.
#[derive(Debug, Clone, Serialize)]
pub struct DailyActiveEntry {
    pub count: usize,
    pub users: Vec<String>,
}

/// Churn summary formatted the way the dashboard renders it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChurnSummary {
    pub total_churn_rate: String,
    pub churn_per_week: String,
}

/// The full user-directory payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDirectory {
    pub users: Vec<UserRow>,
    pub total_users: i64,
    pub total_usage_count: i64,
    pub total_feedback_count: i64,
    /// Day (YYYY-MM-DD) -> distinct active users, across all history
    pub daily_active_users: BTreeMap<String, DailyActiveEntry>,
    pub churn_data: ChurnSummary,
    /// Week start (YYYY-MM-DD) -> email -> query count inside the activity range
    pub queries_by_user_and_week: BTreeMap<String, BTreeMap<String, i64>>,
    /// Week start -> email -> change vs the previous week (first week omitted)
    pub week_over_week_changes: BTreeMap<String, BTreeMap<String, i64>>,
}

impl KpiEngine {
    /// Build the user-directory overview.
    pub fn user_directory(
        &self,
        params: &OverviewParams,
        now: DateTime<Utc>,
    ) -> Result<UserDirectory> {
        let cohort = self.resolve_cohort(&params.cohort)?;
        let emails = match &cohort {
            CohortFilter::Unfiltered => None,
            CohortFilter::Members(set) => {
                let mut list: Vec<String> = set.iter().cloned().collect();
                list.sort();
                Some(list)
            }
        };

        let filter = UserFilter {
            search: params.search.clone(),
            status: params.status.clone(),
            emails,
        };

        let page_users = self.db.list_users(&filter, params.page, params.per_page)?;
        let total_users = self.db.count_users(&filter)?;
        let totals = self.db.user_totals(&filter)?;

        let window = self
            .windows
            .resolve_preset(params.activity_preset, now);
        let events = self.db.user_activity_events()?;

        // Distinct active users per calendar day, across all history
        let mut daily: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (email, ts) in &events {
            daily
                .entry(window.day_key(*ts).to_string())
                .or_default()
                .insert(email.clone());
        }
        let daily_active_users = daily
            .into_iter()
            .map(|(day, users)| {
                (
                    day,
                    DailyActiveEntry {
                        count: users.len(),
                        users: users.into_iter().collect(),
                    },
                )
            })
            .collect();

        // Churn over the activity range: cohort-scoped active accounts
        // without a qualifying event inside the window
        let roster: Vec<String> = self
            .db
            .all_users()?
            .into_iter()
            .filter(|u| u.is_active() && cohort.matches(&u.email))
            .map(|u| u.email)
            .collect();
        let active: HashSet<String> = events
            .iter()
            .filter(|(email, ts)| window.contains(*ts) && cohort.matches(email))
            .map(|(email, _)| email.clone())
            .collect();
        let last_activity = self.db.last_activity_by_user()?;
        let churn_data = churn::inactive_users(&roster, &active, &last_activity, &window);

        // Per-user query counts by window-anchored week
        let mut by_week: BTreeMap<i64, BTreeMap<String, i64>> = BTreeMap::new();
        for (email, ts) in &events {
            if !window.contains(*ts) || !cohort.matches(email) {
                continue;
            }
            *by_week
                .entry(window.week_index(*ts))
                .or_default()
                .entry(email.clone())
                .or_default() += 1;
        }

        let mut queries_by_user_and_week = BTreeMap::new();
        let mut week_over_week_changes = BTreeMap::new();
        let mut prev_counts: Option<&BTreeMap<String, i64>> = None;
        for (index, counts) in &by_week {
            let key = window.week_start(*index).to_string();
            queries_by_user_and_week.insert(key.clone(), counts.clone());

            if let Some(prev) = prev_counts {
                let changes: BTreeMap<String, i64> = counts
                    .iter()
                    .map(|(email, count)| {
                        (email.clone(), count - prev.get(email).copied().unwrap_or(0))
                    })
                    .collect();
                week_over_week_changes.insert(key, changes);
            }
            prev_counts = Some(counts);
        }

        Ok(UserDirectory {
            users: page_users.iter().map(UserRow::from).collect(),
            total_users,
            total_usage_count: totals.usage,
            total_feedback_count: totals.feedback,
            daily_active_users,
            churn_data: ChurnSummary {
                total_churn_rate: format!("{:.2}%", churn_data.churn_rate),
                churn_per_week: format!("{:.2}%", churn_data.churn_per_week),
            },
            queries_by_user_and_week,
            week_over_week_changes,
        })
    }
}
