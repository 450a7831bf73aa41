//! KPI dispatch endpoint
//!
//! `GET /api/kpi?kpi=<name>&startDate=..&endDate=..&preset=..&cohort=..&bins=..`
//!
//! Window and cohort are resolved once here, before dispatch; every KPI
//! evaluated from this request sees the same resolved values. Bad input is
//! rejected before any store query.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use pendium_core::kpi::{list_kpis, KpiParams};
use pendium_core::window::RangePreset;
use pendium_core::{Error, KpiKind};
use serde::Deserialize;

use crate::http::{error_response, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiQuery {
    pub kpi: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub preset: Option<String>,
    pub cohort: Option<String>,
    /// Comma-separated bin boundaries for histogram KPIs
    pub bins: Option<String>,
}

pub async fn index(State(state): State<AppState>, Query(query): Query<KpiQuery>) -> Response {
    match evaluate(&state, &query).await {
        Ok(response) => response,
        Err(err) => {
            if err.is_client_error() {
                tracing::warn!(error = %err, kpi = query.kpi.as_deref().unwrap_or(""), "Rejected KPI request");
            } else {
                tracing::error!(
                    error = %err,
                    kpi = query.kpi.as_deref().unwrap_or(""),
                    start = query.start_date.as_deref().unwrap_or(""),
                    end = query.end_date.as_deref().unwrap_or(""),
                    cohort = query.cohort.as_deref().unwrap_or("all"),
                    "KPI evaluation failed"
                );
            }
            error_response(err)
        }
    }
}

async fn evaluate(state: &AppState, query: &KpiQuery) -> Result<Response, Error> {
    let name = query
        .kpi
        .as_deref()
        .ok_or_else(|| Error::UnknownKpi(String::new()))?;
    let kind: KpiKind = name.parse()?;

    let resolver = state.engine.window_resolver();
    let now = Utc::now();

    let window = match (&query.start_date, &query.end_date) {
        (Some(start), Some(end)) => {
            resolver.resolve_range(resolver.parse_date(start)?, resolver.parse_date(end)?)?
        }
        (None, None) => {
            let preset = RangePreset::parse(query.preset.as_deref().unwrap_or("last-week"));
            resolver.resolve_preset(preset, now)
        }
        _ => {
            return Err(Error::InvalidParameter(
                "startDate and endDate must be supplied together".to_string(),
            ))
        }
    };

    let cohort = state
        .engine
        .resolve_cohort(query.cohort.as_deref().unwrap_or("all"))?;

    let bins = query.bins.as_deref().map(parse_bins).transpose()?;

    let params = KpiParams {
        window,
        cohort,
        bins,
        now,
    };

    let report = state.engine.evaluate(kind, &params).await?;
    Ok(Json(report).into_response())
}

pub async fn catalog() -> Response {
    Json(list_kpis()).into_response()
}

fn parse_bins(csv: &str) -> Result<Vec<f64>, Error> {
    csv.split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .map_err(|_| Error::InvalidParameter(format!("malformed bin boundary: {}", part)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bins() {
        assert_eq!(parse_bins("0,1,5,10").unwrap(), vec![0.0, 1.0, 5.0, 10.0]);
        assert_eq!(parse_bins("0, 2.5, 7").unwrap(), vec![0.0, 2.5, 7.0]);
        assert!(parse_bins("0,abc").is_err());
        assert!(parse_bins("").is_err());
    }
}
