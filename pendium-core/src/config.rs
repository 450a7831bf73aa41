//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/pendium/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/pendium/` (~/.config/pendium/)
//! - Data: `$XDG_DATA_HOME/pendium/` (~/.local/share/pendium/)
//! - State/Logs: `$XDG_STATE_HOME/pendium/` (~/.local/state/pendium/)
//!
//! Everything the aggregation engine needs (timezone, bin defaults, billing
//! credentials) is resolved here once and passed in by value; computation
//! functions never read environment state.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database location override
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Analytics configuration
    #[serde(default)]
    pub analytics: AnalyticsConfig,

    /// Stripe billing configuration (optional; revenue KPIs need it)
    #[serde(default)]
    pub billing: BillingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

/// Database location override
#[derive(Debug, Deserialize, Default, Clone)]
pub struct DatabaseConfig {
    /// Path to the SQLite file; defaults to the XDG data directory
    pub path: Option<PathBuf>,
}

/// Analytics configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AnalyticsConfig {
    /// Canonical reporting timezone. All day/week/month bucketing happens
    /// in this zone so grouped counts match the business reporting day.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Default bin boundaries for the queries-per-user distribution
    #[serde(default = "default_query_count_bins")]
    pub query_count_bins: Vec<f64>,

    /// Default bin boundaries for the token-usage distribution
    #[serde(default = "default_token_usage_bins")]
    pub token_usage_bins: Vec<f64>,

    /// Trailing window (days) that counts a user as retained
    #[serde(default = "default_retention_window_days")]
    pub retention_window_days: i64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            query_count_bins: default_query_count_bins(),
            token_usage_bins: default_token_usage_bins(),
            retention_window_days: default_retention_window_days(),
        }
    }
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

fn default_query_count_bins() -> Vec<f64> {
    vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0]
}

fn default_token_usage_bins() -> Vec<f64> {
    vec![0.0, 1_000.0, 5_000.0, 10_000.0, 50_000.0, 100_000.0]
}

fn default_retention_window_days() -> i64 {
    30
}

/// Stripe billing configuration
///
/// The backend only lists customers and subscriptions; it never mutates
/// billing state, so a restricted read-only key is sufficient.
#[derive(Debug, Deserialize, Clone)]
pub struct BillingConfig {
    /// Enable/disable the Stripe-backed revenue KPI
    #[serde(default)]
    pub enabled: bool,

    /// API base URL (overridable for tests)
    #[serde(default = "default_billing_base_url")]
    pub base_url: String,

    /// Secret API key ("sk_live_..." or a restricted "rk_...")
    pub api_key: Option<String>,

    /// Page size for list endpoints (Stripe caps at 100)
    #[serde(default = "default_billing_page_size")]
    pub page_size: usize,

    /// HTTP request timeout in seconds
    #[serde(default = "default_billing_timeout")]
    pub timeout_secs: u64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_billing_base_url(),
            api_key: None,
            page_size: default_billing_page_size(),
            timeout_secs: default_billing_timeout(),
        }
    }
}

impl BillingConfig {
    /// Check if billing is properly configured and enabled
    pub fn is_ready(&self) -> bool {
        self.enabled && self.api_key.is_some()
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.api_key.is_none() {
            return Err(Error::Config(
                "billing.api_key is required when billing is enabled".to_string(),
            ));
        }
        if self.page_size == 0 || self.page_size > 100 {
            return Err(Error::Config(
                "billing.page_size must be between 1 and 100".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_billing_base_url() -> String {
    "https://api.stripe.com".to_string()
}

fn default_billing_page_size() -> usize {
    100
}

fn default_billing_timeout() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.billing.validate()?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/pendium/config.toml` (~/.config/pendium/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("pendium").join("config.toml")
    }

    /// Returns the data directory path (for the SQLite database)
    ///
    /// `$XDG_DATA_HOME/pendium/` (~/.local/share/pendium/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("pendium")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/pendium/` (~/.local/state/pendium/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("pendium")
    }

    /// Returns the database file path, honoring the config override
    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("admin.db"))
    }
}
