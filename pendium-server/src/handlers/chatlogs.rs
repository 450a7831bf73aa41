//! Chat log listing endpoint
//!
//! `GET /api/chatlogs?page&perPage&dateRange&search&user`
//!
//! Returns a page of logs (newest first) plus per-day counts with a running
//! cumulative total and the distinct email list for the filtered set.

use std::collections::{BTreeMap, BTreeSet};

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use pendium_core::db::ChatLogFilter;
use pendium_core::window::RangePreset;
use pendium_core::ChatLog;
use serde::{Deserialize, Serialize};

use crate::http::{error_response, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatLogsQuery {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
    pub date_range: Option<String>,
    pub search: Option<String>,
    pub user: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DateCount {
    count: i64,
    accumulative_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatLogsResponse {
    chat_logs: Vec<ChatLog>,
    total_count: i64,
    current_page: usize,
    date_count_obj: BTreeMap<String, DateCount>,
    users: Vec<String>,
}

pub async fn index(State(state): State<AppState>, Query(query): Query<ChatLogsQuery>) -> Response {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(10).clamp(1, 500);

    let resolver = state.engine.window_resolver();
    let now = Utc::now();

    // The preset bounds the listing from below; day bucketing always uses
    // the reporting timezone
    let bucketing = resolver.resolve_preset(RangePreset::AllTime, now);
    let since = query
        .date_range
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|range| resolver.resolve_preset(RangePreset::parse(range), now).start);

    let filter = ChatLogFilter {
        search: query.search.filter(|s| !s.is_empty()),
        email: query.user.filter(|s| !s.is_empty()),
        since,
        until: None,
    };

    let result = (|| -> pendium_core::Result<ChatLogsResponse> {
        let total_count = state.db.count_chat_logs(&filter)?;
        let chat_logs = state.db.list_chat_logs(&filter, page, per_page)?;
        let events = state.db.chat_log_events(&filter)?;

        let mut day_counts: BTreeMap<String, i64> = BTreeMap::new();
        let mut users: BTreeSet<String> = BTreeSet::new();
        for (email, ts) in &events {
            *day_counts.entry(bucketing.day_key(*ts).to_string()).or_default() += 1;
            users.insert(email.clone());
        }

        let mut accumulative = 0;
        let date_count_obj = day_counts
            .into_iter()
            .map(|(day, count)| {
                accumulative += count;
                (
                    day,
                    DateCount {
                        count,
                        accumulative_count: accumulative,
                    },
                )
            })
            .collect();

        Ok(ChatLogsResponse {
            chat_logs,
            total_count,
            current_page: page,
            date_count_obj,
            users: users.into_iter().collect(),
        })
    })();

    match result {
        Ok(response) => Json(response).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Chat log listing failed");
            error_response(err)
        }
    }
}
