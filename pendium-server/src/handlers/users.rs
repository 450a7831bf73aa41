//! User directory endpoint
//!
//! `GET /api/users?page&perPage&search&userGroupFilter&statusFilter&presetRangeFilter`

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use pendium_core::kpi::OverviewParams;
use pendium_core::window::RangePreset;
use serde::Deserialize;

use crate::http::{error_response, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsersQuery {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
    pub search: Option<String>,
    pub user_group_filter: Option<String>,
    pub status_filter: Option<String>,
    pub preset_range_filter: Option<String>,
}

pub async fn index(State(state): State<AppState>, Query(query): Query<UsersQuery>) -> Response {
    let params = OverviewParams {
        page: query.page.unwrap_or(1).max(1),
        per_page: query.per_page.unwrap_or(10).clamp(1, 500),
        search: query.search.filter(|s| !s.is_empty()),
        status: query.status_filter.filter(|s| !s.is_empty()),
        cohort: query
            .user_group_filter
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "all".to_string()),
        activity_preset: RangePreset::parse(
            query.preset_range_filter.as_deref().unwrap_or("last-week"),
        ),
    };

    match state.engine.user_directory(&params, Utc::now()) {
        Ok(directory) => Json(directory).into_response(),
        Err(err) => {
            tracing::error!(error = %err, cohort = %params.cohort, "User directory query failed");
            error_response(err)
        }
    }
}
