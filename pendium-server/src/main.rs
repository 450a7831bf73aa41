//! pendium-server - admin analytics API
//!
//! Serves the KPI dispatcher and admin listing endpoints over HTTP.

mod handlers;
mod http;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pendium_core::{Config, Database, KpiEngine};

#[derive(Parser, Debug)]
#[command(name = "pendium-server")]
#[command(about = "Pendium admin analytics backend")]
#[command(version)]
struct Args {
    /// Path to the config file (default: ~/.config/pendium/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address override, e.g. 0.0.0.0:8080
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path).context("failed to load configuration")?,
        None => Config::load().context("failed to load configuration")?,
    };
    let _log_guard = pendium_core::logging::init(&config.logging).ok();

    let db_path = config.database_path();
    let db = Arc::new(Database::open(&db_path).context("failed to open database")?);
    db.migrate().context("failed to run migrations")?;

    let engine = Arc::new(
        KpiEngine::from_config(db.clone(), &config).context("failed to build KPI engine")?,
    );

    let addr = args
        .listen
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    let state = http::AppState { engine, db };
    let router = http::create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!(addr = %addr, db = %db_path.display(), "Server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to install shutdown handler");
        return;
    }
    tracing::info!("Shutdown signal received");
}
