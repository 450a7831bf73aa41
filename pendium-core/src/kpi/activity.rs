//! Activity time-series KPIs
//!
//! Daily and weekly rollups over qualifying chat events: active users, query
//! totals, per-user engagement and week-over-week turnover. All reducers are
//! pure functions over an already-qualified event slice; the engine decides
//! what qualifies (role, window, cohort) before calling in.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::types::ChatLog;
use crate::window::TimeWindow;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyActiveUsersRow {
    pub date: NaiveDate,
    pub active_users: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AverageDailyQueriesRow {
    pub date: NaiveDate,
    pub unique_users: usize,
    pub total_queries: i64,
    pub average_queries: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalQueriesRow {
    pub date: NaiveDate,
    pub total_queries: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyActiveUsersRow {
    pub week: i64,
    pub week_start: NaiveDate,
    pub active_users: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyEngagementRow {
    pub week: i64,
    pub week_start: NaiveDate,
    pub queries_per_user: f64,
    pub change_in_queries_per_user: f64,
    pub percentage_change: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyTurnoverRow {
    pub week: i64,
    pub week_start: NaiveDate,
    pub active_users: usize,
    pub new_users: usize,
    pub churned_users: usize,
    pub change_percentage: f64,
    pub turnover_rate: f64,
}

/// Per-day accumulation: distinct users and turn totals.
fn daily_rollup<'a>(
    logs: &'a [ChatLog],
    window: &TimeWindow,
) -> BTreeMap<NaiveDate, (HashSet<&'a str>, i64)> {
    let mut days: BTreeMap<NaiveDate, (HashSet<&str>, i64)> = BTreeMap::new();
    for log in logs {
        let Some(ts) = log.created_at else { continue };
        let entry = days.entry(window.day_key(ts)).or_default();
        entry.0.insert(log.email.as_str());
        entry.1 += log.turn_count() as i64;
    }
    days
}

/// Per-week accumulation, buckets anchored at the window start.
fn weekly_rollup<'a>(
    logs: &'a [ChatLog],
    window: &TimeWindow,
) -> BTreeMap<i64, (HashSet<&'a str>, i64)> {
    let mut weeks: BTreeMap<i64, (HashSet<&str>, i64)> = BTreeMap::new();
    for log in logs {
        let Some(ts) = log.created_at else { continue };
        let entry = weeks.entry(window.week_index(ts)).or_default();
        entry.0.insert(log.email.as_str());
        entry.1 += log.turn_count() as i64;
    }
    weeks
}

/// Distinct active users per calendar day.
pub fn daily_active_users(logs: &[ChatLog], window: &TimeWindow) -> Vec<DailyActiveUsersRow> {
    daily_rollup(logs, window)
        .into_iter()
        .map(|(date, (users, _))| DailyActiveUsersRow {
            date,
            active_users: users.len(),
        })
        .collect()
}

/// Per day: turn totals, distinct users, and queries per user (0 when no users).
pub fn average_daily_queries(logs: &[ChatLog], window: &TimeWindow) -> Vec<AverageDailyQueriesRow> {
    daily_rollup(logs, window)
        .into_iter()
        .map(|(date, (users, total_queries))| {
            let unique_users = users.len();
            let average_queries = if unique_users == 0 {
                0.0
            } else {
                total_queries as f64 / unique_users as f64
            };
            AverageDailyQueriesRow {
                date,
                unique_users,
                total_queries,
                average_queries,
            }
        })
        .collect()
}

/// Turn totals per calendar day.
pub fn total_queries(logs: &[ChatLog], window: &TimeWindow) -> Vec<TotalQueriesRow> {
    daily_rollup(logs, window)
        .into_iter()
        .map(|(date, (_, total_queries))| TotalQueriesRow {
            date,
            total_queries,
        })
        .collect()
}

/// Distinct active users per window-anchored week.
pub fn weekly_active_users(logs: &[ChatLog], window: &TimeWindow) -> Vec<WeeklyActiveUsersRow> {
    weekly_rollup(logs, window)
        .into_iter()
        .map(|(week, (users, _))| WeeklyActiveUsersRow {
            week,
            week_start: window.week_start(week),
            active_users: users.len(),
        })
        .collect()
}

/// Queries-per-user per week with week-over-week deltas.
///
/// The first week in the series always reports zero deltas.
pub fn weekly_user_engagement(logs: &[ChatLog], window: &TimeWindow) -> Vec<WeeklyEngagementRow> {
    let weeks = weekly_rollup(logs, window);

    let mut rows = Vec::with_capacity(weeks.len());
    let mut prev_rate: Option<f64> = None;
    for (week, (users, total_queries)) in weeks {
        let queries_per_user = if users.is_empty() {
            0.0
        } else {
            total_queries as f64 / users.len() as f64
        };

        let (change, percentage) = match prev_rate {
            Some(prev) => {
                let change = queries_per_user - prev;
                let percentage = if prev != 0.0 { change / prev * 100.0 } else { 0.0 };
                (change, percentage)
            }
            None => (0.0, 0.0),
        };

        rows.push(WeeklyEngagementRow {
            week,
            week_start: window.week_start(week),
            queries_per_user,
            change_in_queries_per_user: change,
            percentage_change: percentage,
        });
        prev_rate = Some(queries_per_user);
    }
    rows
}

/// Active-user counts per week with new/churned breakdown.
///
/// The first week reports all of its users as new and zero churn.
pub fn weekly_turnover(logs: &[ChatLog], window: &TimeWindow) -> Vec<WeeklyTurnoverRow> {
    let weeks = weekly_rollup(logs, window);

    let mut rows = Vec::with_capacity(weeks.len());
    let mut prev_count: Option<usize> = None;
    for (week, (users, _)) in weeks {
        let active_users = users.len();
        let week_start = window.week_start(week);

        let row = match prev_count {
            None => WeeklyTurnoverRow {
                week,
                week_start,
                active_users,
                new_users: active_users,
                churned_users: 0,
                change_percentage: 0.0,
                turnover_rate: 0.0,
            },
            Some(prev) => {
                let new_users = active_users.saturating_sub(prev);
                let churned_users = (prev as i64 - active_users as i64 + new_users as i64).max(0) as usize;
                let change_percentage = if prev != 0 {
                    (active_users as f64 - prev as f64) / prev as f64 * 100.0
                } else {
                    0.0
                };
                let turnover_rate = if prev != 0 {
                    churned_users as f64 / prev as f64 * 100.0
                } else {
                    0.0
                };
                WeeklyTurnoverRow {
                    week,
                    week_start,
                    active_users,
                    new_users,
                    churned_users,
                    change_percentage,
                    turnover_rate,
                }
            }
        };
        rows.push(row);
        prev_count = Some(active_users);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatTurn;
    use crate::window::WindowResolver;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn window() -> TimeWindow {
        WindowResolver::new("UTC")
            .resolve_range(
                NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 28).unwrap(),
            )
            .unwrap()
    }

    fn log(email: &str, at: DateTime<Utc>, turn_count: usize) -> ChatLog {
        ChatLog {
            id: format!("{}-{}", email, at.timestamp()),
            email: email.to_string(),
            thread_uuid: format!("t-{}-{}", email, at.timestamp()),
            role: "user".to_string(),
            created_at: Some(at),
            turns: (0..turn_count)
                .map(|i| ChatTurn {
                    uuid: format!("u-{}", i),
                    ..Default::default()
                })
                .collect(),
            is_deleted: false,
        }
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).single().unwrap()
    }

    #[test]
    fn test_two_day_activity_scenario() {
        // 3 users on day 1 with 2 turns each; 1 returning + 1 new user on
        // day 2 with 1 turn each.
        let logs = vec![
            log("a@x.com", at(1, 9), 2),
            log("b@x.com", at(1, 10), 2),
            log("c@x.com", at(1, 11), 2),
            log("a@x.com", at(2, 9), 1),
            log("d@x.com", at(2, 10), 1),
        ];
        let window = window();

        let dau = daily_active_users(&logs, &window);
        assert_eq!(dau.len(), 2);
        assert_eq!(dau[0].active_users, 3);
        assert_eq!(dau[1].active_users, 2);

        let avg = average_daily_queries(&logs, &window);
        assert_eq!(avg[0].total_queries, 6);
        assert_eq!(avg[0].average_queries, 2.0);
        assert_eq!(avg[1].total_queries, 2);
        assert_eq!(avg[1].average_queries, 1.0);

        let totals = total_queries(&logs, &window);
        assert_eq!(totals[0].total_queries, 6);
        assert_eq!(totals[1].total_queries, 2);
    }

    #[test]
    fn test_daily_active_users_is_order_invariant() {
        let mut logs = vec![
            log("a@x.com", at(1, 9), 1),
            log("b@x.com", at(1, 12), 1),
            log("a@x.com", at(1, 18), 1),
        ];
        let window = window();

        let forward = daily_active_users(&logs, &window);
        logs.reverse();
        let reversed = daily_active_users(&logs, &window);

        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].active_users, 2);
        assert_eq!(reversed[0].active_users, forward[0].active_users);
    }

    #[test]
    fn test_empty_input_yields_empty_series() {
        let window = window();
        assert!(daily_active_users(&[], &window).is_empty());
        assert!(weekly_user_engagement(&[], &window).is_empty());
        assert!(weekly_turnover(&[], &window).is_empty());
    }

    #[test]
    fn test_engagement_first_week_has_zero_deltas() {
        let window = window();
        let logs = vec![
            // Week 0: one user, 4 turns
            log("a@x.com", at(2, 9), 4),
            // Week 1: one user, 6 turns
            log("a@x.com", at(9, 9), 6),
        ];

        let rows = weekly_user_engagement(&logs, &window);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].change_in_queries_per_user, 0.0);
        assert_eq!(rows[0].percentage_change, 0.0);
        assert_eq!(rows[1].change_in_queries_per_user, 2.0);
        assert_eq!(rows[1].percentage_change, 50.0);
    }

    #[test]
    fn test_turnover_shrinking_week_counts_churn() {
        let window = window();
        let logs = vec![
            // Week 0: 3 users
            log("a@x.com", at(2, 9), 1),
            log("b@x.com", at(3, 9), 1),
            log("c@x.com", at(4, 9), 1),
            // Week 1: 1 user
            log("a@x.com", at(9, 9), 1),
        ];

        let rows = weekly_turnover(&logs, &window);
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].active_users, 3);
        assert_eq!(rows[0].new_users, 3);
        assert_eq!(rows[0].churned_users, 0);
        assert_eq!(rows[0].turnover_rate, 0.0);

        assert_eq!(rows[1].active_users, 1);
        assert_eq!(rows[1].new_users, 0);
        assert_eq!(rows[1].churned_users, 2);
        assert!((rows[1].turnover_rate - 66.666).abs() < 0.01);
        assert!((rows[1].change_percentage - -66.666).abs() < 0.01);
    }

    #[test]
    fn test_weeks_are_anchored_to_window_start() {
        // Events 6 and 8 days after the window opens land in weeks 0 and 1,
        // whatever weekday the window opened on.
        let window = window();
        let logs = vec![
            log("a@x.com", window.start + Duration::days(6), 1),
            log("a@x.com", window.start + Duration::days(8), 1),
        ];

        let rows = weekly_active_users(&logs, &window);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].week, 0);
        assert_eq!(rows[1].week, 1);
        assert_eq!(rows[0].week_start, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(rows[1].week_start, NaiveDate::from_ymd_opt(2025, 3, 8).unwrap());
    }
}
