//! Error types for pendium-core

use thiserror::Error;

/// Main error type for the pendium-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid request parameter (bad date, bad bins, bad cohort payload)
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Unrecognized KPI name
    #[error("invalid KPI specified: {0}")]
    UnknownKpi(String),

    /// Billing provider (Stripe) error
    #[error("billing error: {0}")]
    Billing(String),
}

impl Error {
    /// Whether this error was caused by bad client input.
    ///
    /// The HTTP layer maps these to 4xx responses without touching the store.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidParameter(_) | Error::UnknownKpi(_))
    }
}

/// Result type alias for pendium-core
pub type Result<T> = std::result::Result<T, Error>;
