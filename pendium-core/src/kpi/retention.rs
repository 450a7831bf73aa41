//! Retention cohorts grouped by signup month.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::db::ActivityEvent;
use crate::types::User;
use crate::window::TimeWindow;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionCohortRow {
    /// Signup month, "YYYY-MM"
    pub cohort: String,
    pub year: i32,
    pub month: u32,
    pub total_users: usize,
    /// Users whose most recent event falls inside the trailing window
    pub active_users: usize,
    pub retention_rate: f64,
    /// Mean distinct active days per user (users without events count as 0)
    pub avg_active_days: f64,
    /// Mean first-to-last event span in days (users without events count as 0)
    pub avg_lifespan_days: f64,
}

/// Per-user activity digest: first event, last event, distinct active days.
struct ActivityDigest {
    first: DateTime<Utc>,
    last: DateTime<Utc>,
    days: HashSet<NaiveDate>,
}

/// Group users by signup month and report retention against a trailing
/// activity window ending at `now`.
///
/// Users without a signup date cannot be assigned a cohort and are skipped.
pub fn retention_cohorts(
    users: &[User],
    events: &[ActivityEvent],
    window: &TimeWindow,
    now: DateTime<Utc>,
    retention_window_days: i64,
) -> Vec<RetentionCohortRow> {
    let mut digests: HashMap<&str, ActivityDigest> = HashMap::new();
    for (email, ts) in events {
        let day = window.day_key(*ts);
        digests
            .entry(email.as_str())
            .and_modify(|d| {
                d.first = d.first.min(*ts);
                d.last = d.last.max(*ts);
                d.days.insert(day);
            })
            .or_insert_with(|| ActivityDigest {
                first: *ts,
                last: *ts,
                days: HashSet::from([day]),
            });
    }

    let active_since = now - Duration::days(retention_window_days);

    let mut cohorts: BTreeMap<(i32, u32), Vec<&User>> = BTreeMap::new();
    for user in users {
        let Some(signup) = user.signup_date else { continue };
        cohorts.entry(window.month_key(signup)).or_default().push(user);
    }

    cohorts
        .into_iter()
        .map(|((year, month), members)| {
            let total_users = members.len();
            let mut active_users = 0;
            let mut total_active_days = 0usize;
            let mut total_lifespan_days = 0.0;

            for user in &members {
                if let Some(digest) = digests.get(user.email.as_str()) {
                    if digest.last >= active_since && digest.last <= now {
                        active_users += 1;
                    }
                    total_active_days += digest.days.len();
                    total_lifespan_days += digest
                        .last
                        .signed_duration_since(digest.first)
                        .num_seconds() as f64
                        / 86_400.0;
                }
            }

            let retention_rate = if total_users == 0 {
                0.0
            } else {
                active_users as f64 / total_users as f64 * 100.0
            };
            let avg_active_days = if total_users == 0 {
                0.0
            } else {
                total_active_days as f64 / total_users as f64
            };
            let avg_lifespan_days = if total_users == 0 {
                0.0
            } else {
                total_lifespan_days / total_users as f64
            };

            RetentionCohortRow {
                cohort: format!("{:04}-{:02}", year, month),
                year,
                month,
                total_users,
                active_users,
                retention_rate,
                avg_active_days,
                avg_lifespan_days,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::WindowResolver;
    use chrono::TimeZone;

    fn window() -> TimeWindow {
        WindowResolver::new("UTC")
            .resolve_range(
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
            )
            .unwrap()
    }

    fn user(email: &str, signup_month: u32) -> User {
        User {
            email: email.to_string(),
            name: None,
            signup_date: Utc.with_ymd_and_hms(2025, signup_month, 10, 9, 0, 0).single(),
            role: "user".to_string(),
            status: "active".to_string(),
            usage: 0,
            follow_up_usage: 0,
            feedback_count: 0,
            source_click_count: 0,
            num_logins: 0,
            clicked_sources: vec![],
            saved_sources: vec![],
            stripe_customer_id: None,
        }
    }

    fn event(email: &str, month: u32, day: u32) -> ActivityEvent {
        (
            email.to_string(),
            Utc.with_ymd_and_hms(2025, month, day, 12, 0, 0).single().unwrap(),
        )
    }

    #[test]
    fn test_retention_by_signup_month() {
        let users = vec![
            user("a@x.com", 1),
            user("b@x.com", 1),
            user("c@x.com", 2),
        ];
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 0, 0, 0).single().unwrap();

        // a: active three distinct days, last seen within 30 days of now
        // b: one event months ago
        // c: never active
        let events = vec![
            event("a@x.com", 1, 11),
            event("a@x.com", 1, 12),
            event("a@x.com", 6, 1),
            event("b@x.com", 1, 15),
        ];

        let rows = retention_cohorts(&users, &events, &window(), now, 30);
        assert_eq!(rows.len(), 2);

        let jan = &rows[0];
        assert_eq!(jan.cohort, "2025-01");
        assert_eq!(jan.total_users, 2);
        assert_eq!(jan.active_users, 1);
        assert_eq!(jan.retention_rate, 50.0);
        // a has 3 active days, b has 1 -> mean 2.0
        assert_eq!(jan.avg_active_days, 2.0);
        assert!(jan.avg_lifespan_days > 0.0);

        let feb = &rows[1];
        assert_eq!(feb.cohort, "2025-02");
        assert_eq!(feb.total_users, 1);
        assert_eq!(feb.active_users, 0);
        assert_eq!(feb.retention_rate, 0.0);
        assert_eq!(feb.avg_active_days, 0.0);
        assert_eq!(feb.avg_lifespan_days, 0.0);
    }

    #[test]
    fn test_users_without_signup_date_are_skipped() {
        let mut orphan = user("x@x.com", 1);
        orphan.signup_date = None;

        let rows = retention_cohorts(
            &[orphan],
            &[],
            &window(),
            Utc.with_ymd_and_hms(2025, 6, 15, 0, 0, 0).single().unwrap(),
            30,
        );
        assert!(rows.is_empty());
    }
}
