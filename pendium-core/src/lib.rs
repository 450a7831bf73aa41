//! # pendium-core
//!
//! Core library for the Pendium admin backend - KPI analytics over the
//! product's event collections.
//!
//! This library provides:
//! - Domain types for chat events, feature interactions, users and the beta roster
//! - Database storage layer with SQLite
//! - Time-window and cohort resolution
//! - The KPI aggregation engine and dispatcher
//! - A read-only Stripe billing client
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! ```text
//! HTTP request -> KPI dispatcher -> window + cohort resolved once
//!              -> aggregation engine reads typed event slices from the store
//!              -> pure in-memory reduction -> { kpi, data } report
//! ```
//!
//! The event collections are populated by an external ingestion pipeline;
//! this library only reads them.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pendium_core::{Config, Database, KpiEngine};
//!
//! let config = Config::load().expect("failed to load config");
//! let db = Arc::new(Database::open(&config.database_path()).expect("failed to open database"));
//! db.migrate().expect("failed to run migrations");
//! let engine = KpiEngine::from_config(db, &config).expect("failed to build engine");
//! ```

// Re-export commonly used items at the crate root
pub use cohort::{resolve_cohort, CohortFilter};
pub use config::Config;
pub use db::{ChatLogFilter, Database, UserFilter};
pub use error::{Error, Result};
pub use kpi::{KpiEngine, KpiKind, KpiParams, KpiReport};
pub use types::*;
pub use window::{RangePreset, TimeWindow, WindowResolver};

// Public modules
pub mod billing;
pub mod cohort;
pub mod config;
pub mod db;
pub mod error;
pub mod kpi;
pub mod logging;
pub mod types;
pub mod window;
