//! Churn KPIs: monthly net-movement churn and cohort-scoped inactivity.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::ChatLog;
use crate::window::TimeWindow;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyChurnRow {
    pub year: i32,
    pub month: u32,
    pub churn_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InactiveUserRow {
    pub email: String,
    /// Fractional days between the window end and the user's most recent
    /// event anywhere in history; `None` when the user never produced one.
    pub days_since_last_active: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InactiveUsersData {
    pub cohort_size: usize,
    pub inactive_count: usize,
    pub churn_rate: f64,
    pub churn_per_week: f64,
    pub inactive: Vec<InactiveUserRow>,
}

/// Month-over-month churn over distinct-active-email sets.
///
/// For each consecutive month pair the rate is
/// `(|prev \ cur| - |cur \ prev|) / |prev|`: users lost minus users gained,
/// normalized by the prior month's pool. This is a net-movement ratio - it
/// goes negative when the pool grows faster than it shrinks. The first month
/// in the range has no predecessor and is not reported.
pub fn monthly_churn(logs: &[ChatLog], window: &TimeWindow) -> Vec<MonthlyChurnRow> {
    let mut months: BTreeMap<(i32, u32), HashSet<&str>> = BTreeMap::new();
    for log in logs {
        let Some(ts) = log.created_at else { continue };
        months
            .entry(window.month_key(ts))
            .or_default()
            .insert(log.email.as_str());
    }

    let buckets: Vec<_> = months.into_iter().collect();
    buckets
        .windows(2)
        .map(|pair| {
            let (_, prev_users) = &pair[0];
            let ((year, month), cur_users) = &pair[1];

            let lost = prev_users.difference(cur_users).count() as i64;
            let gained = cur_users.difference(prev_users).count() as i64;
            let churn_rate = if prev_users.is_empty() {
                0.0
            } else {
                (lost - gained) as f64 / prev_users.len() as f64
            };

            MonthlyChurnRow {
                year: *year,
                month: *month,
                churn_rate,
            }
        })
        .collect()
}

/// Cohort-scoped inactivity over a window.
///
/// `roster` is the cohort's active account set; `active` the emails with at
/// least one qualifying event inside the window; `last_activity` the most
/// recent event per email across all time.
pub fn inactive_users(
    roster: &[String],
    active: &HashSet<String>,
    last_activity: &HashMap<String, DateTime<Utc>>,
    window: &TimeWindow,
) -> InactiveUsersData {
    let mut inactive: Vec<InactiveUserRow> = roster
        .iter()
        .filter(|email| !active.contains(*email))
        .map(|email| InactiveUserRow {
            email: email.clone(),
            days_since_last_active: last_activity.get(email).map(|last| {
                window.end.signed_duration_since(*last).num_seconds() as f64 / 86_400.0
            }),
        })
        .collect();
    inactive.sort_by(|a, b| a.email.cmp(&b.email));

    let cohort_size = roster.len();
    let inactive_count = inactive.len();
    let churn_rate = if cohort_size == 0 {
        0.0
    } else {
        inactive_count as f64 / cohort_size as f64 * 100.0
    };
    let weeks = window.days() / 7.0;
    let churn_per_week = if weeks > 0.0 { churn_rate / weeks } else { 0.0 };

    InactiveUsersData {
        cohort_size,
        inactive_count,
        churn_rate,
        churn_per_week,
        inactive,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatTurn;
    use crate::window::WindowResolver;
    use chrono::{NaiveDate, TimeZone};

    fn window() -> TimeWindow {
        WindowResolver::new("UTC")
            .resolve_range(
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
            )
            .unwrap()
    }

    fn log(email: &str, month: u32, day: u32) -> ChatLog {
        ChatLog {
            id: format!("{}-{}-{}", email, month, day),
            email: email.to_string(),
            thread_uuid: format!("t-{}", email),
            role: "user".to_string(),
            created_at: Utc.with_ymd_and_hms(2025, month, day, 12, 0, 0).single(),
            turns: vec![ChatTurn::default()],
            is_deleted: false,
        }
    }

    #[test]
    fn test_monthly_churn_net_movement() {
        // Jan: {a, b, c}; Feb: {a, d} -> lost 2 (b, c), gained 1 (d):
        // churn = (2 - 1) / 3
        let logs = vec![
            log("a@x.com", 1, 5),
            log("b@x.com", 1, 6),
            log("c@x.com", 1, 7),
            log("a@x.com", 2, 5),
            log("d@x.com", 2, 6),
        ];

        let rows = monthly_churn(&logs, &window());
        assert_eq!(rows.len(), 1, "first month has no predecessor");
        assert_eq!(rows[0].month, 2);
        assert!((rows[0].churn_rate - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_monthly_churn_goes_negative_when_pool_grows() {
        // Jan: {a}; Feb: {a, b, c} -> lost 0, gained 2: churn = -2/1
        let logs = vec![
            log("a@x.com", 1, 5),
            log("a@x.com", 2, 5),
            log("b@x.com", 2, 6),
            log("c@x.com", 2, 7),
        ];

        let rows = monthly_churn(&logs, &window());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].churn_rate, -2.0);
    }

    #[test]
    fn test_inactive_users_forty_percent_scenario() {
        // 5 roster users, 2 with no events in the window -> 40% churn
        let roster: Vec<String> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|u| format!("{}@x.com", u))
            .collect();
        let active: HashSet<String> = ["a", "b", "c"]
            .iter()
            .map(|u| format!("{}@x.com", u))
            .collect();

        let window = window();
        let mut last_activity = HashMap::new();
        // d was last seen 9 days before the window end, e never
        last_activity.insert(
            "d@x.com".to_string(),
            window.end - chrono::Duration::days(9),
        );

        let data = inactive_users(&roster, &active, &last_activity, &window);
        assert_eq!(data.cohort_size, 5);
        assert_eq!(data.inactive_count, 2);
        assert_eq!(data.churn_rate, 40.0);

        let weeks = window.days() / 7.0;
        assert!((data.churn_per_week - 40.0 / weeks).abs() < 1e-9);

        assert_eq!(data.inactive[0].email, "d@x.com");
        assert_eq!(data.inactive[0].days_since_last_active, Some(9.0));
        assert_eq!(data.inactive[1].email, "e@x.com");
        assert_eq!(data.inactive[1].days_since_last_active, None);
    }

    #[test]
    fn test_inactive_users_empty_roster_is_zero_not_nan() {
        let data = inactive_users(&[], &HashSet::new(), &HashMap::new(), &window());
        assert_eq!(data.churn_rate, 0.0);
        assert_eq!(data.churn_per_week, 0.0);
        assert!(data.inactive.is_empty());
    }
}
