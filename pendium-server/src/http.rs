//! HTTP router and error mapping

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use pendium_core::{Database, Error, KpiEngine};
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::handlers;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<KpiEngine>,
    pub db: Arc<Database>,
}

/// Create the HTTP router with all API routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/kpi", get(handlers::kpi::index))
        .route("/api/kpi/catalog", get(handlers::kpi::catalog))
        .route("/api/users", get(handlers::users::index))
        .route("/api/chatlogs", get(handlers::chatlogs::index))
        // The dashboard is a browser SPA on another origin
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Map a core error to an HTTP response.
///
/// Client input errors carry their message; store failures return a generic
/// body (details go to the log at the call site); billing failures are
/// distinguished so callers can tell Stripe outages from store outages.
pub fn error_response(err: Error) -> Response {
    let (status, message) = match &err {
        Error::UnknownKpi(_) => (StatusCode::BAD_REQUEST, "Invalid KPI specified".to_string()),
        Error::InvalidParameter(message) => (StatusCode::BAD_REQUEST, message.clone()),
        Error::Billing(_) => (
            StatusCode::BAD_GATEWAY,
            "billing provider unavailable".to_string(),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        ),
    };

    (status, Json(ErrorBody { error: message })).into_response()
}
