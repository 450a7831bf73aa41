//! Feature-usage KPIs: saved-source frequency, thread-correlated interaction
//! rate, and raw interaction counts.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::cohort::CohortFilter;
use crate::types::{ChatLog, FeatureInteraction, User};
use crate::window::TimeWindow;

/// Interaction kinds that count as engaging with a cited source.
pub const SOURCE_ENGAGEMENT_KINDS: &[&str] = &["opened_source", "clicked_intext_link"];

/// Interaction kind emitted when the clinical calculator is submitted.
pub const CALCULATOR_KIND: &str = "calculator_submitted";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSourcesRow {
    pub date: NaiveDate,
    pub total_sources_saved: i64,
    pub unique_users: usize,
    /// Rounded to two decimals
    pub average_sources_saved: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRateRow {
    pub date: NaiveDate,
    pub total_chat_logs: i64,
    pub chat_logs_with_interaction: i64,
    pub percentage_with_interaction: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionCountRow {
    pub date: NaiveDate,
    pub interaction_count: i64,
}

/// Per-day saved-source totals over the users' saved-source lists.
pub fn save_sources_frequency(
    users: &[User],
    cohort: &CohortFilter,
    window: &TimeWindow,
) -> Vec<SaveSourcesRow> {
    let mut days: BTreeMap<NaiveDate, (i64, HashSet<&str>)> = BTreeMap::new();

    for user in users {
        if !cohort.matches(&user.email) {
            continue;
        }
        for saved in &user.saved_sources {
            let Some(ts) = saved.created_at else { continue };
            if !window.contains(ts) {
                continue;
            }
            let entry = days.entry(window.day_key(ts)).or_default();
            entry.0 += 1;
            entry.1.insert(user.email.as_str());
        }
    }

    days.into_iter()
        .map(|(date, (total, users))| {
            let unique_users = users.len();
            let average = if unique_users == 0 {
                0.0
            } else {
                total as f64 / unique_users as f64
            };
            SaveSourcesRow {
                date,
                total_sources_saved: total,
                unique_users,
                average_sources_saved: (average * 100.0).round() / 100.0,
            }
        })
        .collect()
}

/// Per-day fraction of qualifying chat events whose thread saw at least one
/// interaction of the given kinds.
///
/// Interactions are correlated by thread, not by timestamp: an interaction
/// recorded after the window still marks its thread as engaged, matching how
/// the product attributes source engagement to the originating conversation.
pub fn interaction_rate(
    logs: &[ChatLog],
    interactions: &[FeatureInteraction],
    kinds: &[&str],
    window: &TimeWindow,
) -> Vec<InteractionRateRow> {
    let engaged_threads: HashSet<&str> = interactions
        .iter()
        .filter(|fi| fi.kind().is_some_and(|k| kinds.contains(&k)))
        .map(|fi| fi.thread_uuid.as_str())
        .collect();

    let mut days: BTreeMap<NaiveDate, (i64, i64)> = BTreeMap::new();
    for log in logs {
        let Some(ts) = log.created_at else { continue };
        let entry = days.entry(window.day_key(ts)).or_default();
        entry.0 += 1;
        if engaged_threads.contains(log.thread_uuid.as_str()) {
            entry.1 += 1;
        }
    }

    days.into_iter()
        .map(|(date, (total, with))| InteractionRateRow {
            date,
            total_chat_logs: total,
            chat_logs_with_interaction: with,
            percentage_with_interaction: if total == 0 {
                0.0
            } else {
                with as f64 / total as f64 * 100.0
            },
        })
        .collect()
}

/// Per-day count of interactions of one kind.
pub fn interaction_count(
    interactions: &[FeatureInteraction],
    kind: &str,
    cohort: &CohortFilter,
    window: &TimeWindow,
) -> Vec<InteractionCountRow> {
    let mut days: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for fi in interactions {
        let Some(ts) = fi.timestamp else { continue };
        if !window.contains(ts) || fi.kind() != Some(kind) || !cohort.matches(&fi.email) {
            continue;
        }
        *days.entry(window.day_key(ts)).or_default() += 1;
    }

    days.into_iter()
        .map(|(date, interaction_count)| InteractionCountRow {
            date,
            interaction_count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatTurn, SavedSource};
    use crate::window::WindowResolver;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;

    fn window() -> TimeWindow {
        WindowResolver::new("UTC")
            .resolve_range(
                NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
            )
            .unwrap()
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).single().unwrap()
    }

    fn log(email: &str, thread: &str, day: u32) -> ChatLog {
        ChatLog {
            id: format!("{}-{}", thread, day),
            email: email.to_string(),
            thread_uuid: thread.to_string(),
            role: "user".to_string(),
            created_at: Some(at(day, 10)),
            turns: vec![ChatTurn::default()],
            is_deleted: false,
        }
    }

    fn interaction(thread: &str, kind: &str, day: u32) -> FeatureInteraction {
        FeatureInteraction {
            thread_uuid: thread.to_string(),
            email: "a@x.com".to_string(),
            timestamp: Some(at(day, 11)),
            interaction: json!({ "interaction": kind }),
        }
    }

    #[test]
    fn test_interaction_rate_by_thread() {
        let logs = vec![
            log("a@x.com", "t-1", 5),
            log("b@x.com", "t-2", 5),
            log("c@x.com", "t-3", 6),
        ];
        let interactions = vec![
            interaction("t-1", "opened_source", 5),
            interaction("t-2", "calculator_submitted", 5),
            interaction("t-3", "clicked_intext_link", 20),
        ];

        let rows = interaction_rate(&logs, &interactions, SOURCE_ENGAGEMENT_KINDS, &window());
        assert_eq!(rows.len(), 2);

        // Day 5: t-1 engaged, t-2's calculator event does not count
        assert_eq!(rows[0].total_chat_logs, 2);
        assert_eq!(rows[0].chat_logs_with_interaction, 1);
        assert_eq!(rows[0].percentage_with_interaction, 50.0);

        // Day 6: t-3 engaged via a later interaction on the same thread
        assert_eq!(rows[1].chat_logs_with_interaction, 1);
        assert_eq!(rows[1].percentage_with_interaction, 100.0);
    }

    #[test]
    fn test_interaction_count_filters_kind_and_window() {
        let interactions = vec![
            interaction("t-1", CALCULATOR_KIND, 5),
            interaction("t-2", CALCULATOR_KIND, 5),
            interaction("t-3", "opened_source", 5),
        ];

        let rows = interaction_count(
            &interactions,
            CALCULATOR_KIND,
            &CohortFilter::Unfiltered,
            &window(),
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].interaction_count, 2);
    }

    #[test]
    fn test_save_sources_frequency_rounds_average() {
        let users = vec![User {
            email: "a@x.com".to_string(),
            name: None,
            signup_date: None,
            role: "user".to_string(),
            status: "active".to_string(),
            usage: 0,
            follow_up_usage: 0,
            feedback_count: 0,
            source_click_count: 0,
            num_logins: 0,
            clicked_sources: vec![],
            saved_sources: vec![
                SavedSource {
                    title: Some("alpha".to_string()),
                    created_at: Some(at(5, 9)),
                },
                SavedSource {
                    title: Some("beta".to_string()),
                    created_at: Some(at(5, 10)),
                },
                SavedSource {
                    title: None,
                    // Outside the window
                    created_at: Utc.with_ymd_and_hms(2025, 4, 2, 9, 0, 0).single(),
                },
            ],
            stripe_customer_id: None,
        }];

        let rows = save_sources_frequency(&users, &CohortFilter::Unfiltered, &window());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_sources_saved, 2);
        assert_eq!(rows[0].unique_users, 1);
        assert_eq!(rows[0].average_sources_saved, 2.0);
    }
}
