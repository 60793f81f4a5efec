//! Configuration loader for the `plantmon-pubsub-sink` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller), so no other module calls `env::var` directly.
//!
use std::{env, time::Duration};

use anyhow::{anyhow, Result};

/// Parse an optional numeric environment variable with a default value.
macro_rules! parse_env {
    ($var_name:expr, $ty:ty, $default:expr) => {
        env::var($var_name)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Read an optional string environment variable, treating blank as unset.
fn optional_env(var_name: &str) -> Option<String> {
    env::var(var_name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub const DEFAULT_WEATHER_API_URL: &str = "https://api.openweathermap.org";
pub const DEFAULT_BIGQUERY_API_URL: &str = "https://bigquery.googleapis.com";

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// HTTP listen port.
    pub port: u16,

    /// Fully-qualified destination table.
    pub table_id: String,

    /// OpenWeatherMap API key; enrichment is disabled when unset.
    pub weather_api_key: Option<String>,

    /// Weather API base URL.
    pub weather_api_url: String,

    /// Fixed location the weather is looked up for.
    pub weather_lat: f64,
    pub weather_lon: f64,

    /// Timeout for one weather request.
    pub weather_timeout: Duration,

    /// BigQuery REST base URL.
    pub bigquery_api_url: String,

    /// Timeout for one BigQuery or metadata-server request.
    pub bigquery_timeout: Duration,

    /// Static BigQuery bearer token; the metadata server is used when unset.
    pub bigquery_access_token: Option<String>,

    /// PostgreSQL connection string; selects the PostgreSQL writer when set.
    pub db_url: Option<String>,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `TABLE_ID` – destination table (`project.dataset.table`, or
///   `[schema.]table` with `DATABASE_URL`)
///
/// Optional:
/// - `PORT` – listen port (default: 8080)
/// - `WEATHER_API_KEY` – enables weather enrichment
/// - `WEATHER_API_URL` – weather base URL (default: OpenWeatherMap)
/// - `WEATHER_LAT` / `WEATHER_LON` – location (default: 51.5072 / -0.1276)
/// - `WEATHER_TIMEOUT_SECS` – weather request timeout (default: 5)
/// - `BIGQUERY_API_URL` – BigQuery base URL
/// - `BIGQUERY_TIMEOUT_SECS` – BigQuery request timeout (default: 10)
/// - `BIGQUERY_ACCESS_TOKEN` – static bearer token
/// - `DATABASE_URL` – write to PostgreSQL instead of BigQuery
/// - `DB_POOL_MAX` – max DB connections (default: 5)
///
/// `LOG_LEVEL` is read by the tracing setup in `main.rs`, not here.
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let table_id = require_env!("TABLE_ID");
    let port = parse_env!("PORT", u16, 8080);
    let weather_lat = parse_env!("WEATHER_LAT", f64, 51.5072);
    let weather_lon = parse_env!("WEATHER_LON", f64, -0.1276);
    let weather_timeout_secs = parse_env!("WEATHER_TIMEOUT_SECS", u64, 5);
    let bigquery_timeout_secs = parse_env!("BIGQUERY_TIMEOUT_SECS", u64, 10);
    let db_pool_max = parse_env!("DB_POOL_MAX", u32, 5);

    Ok(Config {
        port,
        table_id,
        weather_api_key: optional_env("WEATHER_API_KEY"),
        weather_api_url: optional_env("WEATHER_API_URL")
            .unwrap_or_else(|| DEFAULT_WEATHER_API_URL.to_string()),
        weather_lat,
        weather_lon,
        weather_timeout: Duration::from_secs(weather_timeout_secs),
        bigquery_api_url: optional_env("BIGQUERY_API_URL")
            .unwrap_or_else(|| DEFAULT_BIGQUERY_API_URL.to_string()),
        bigquery_timeout: Duration::from_secs(bigquery_timeout_secs),
        bigquery_access_token: optional_env("BIGQUERY_ACCESS_TOKEN"),
        db_url: optional_env("DATABASE_URL"),
        db_pool_max,
    })
}

/// Mask the password in a connection string (`user:****@host`).
fn mask_db_url(db_url: &str) -> String {
    // ---
    if let Some(at_pos) = db_url.rfind('@') {
        if let Some(colon_pos) = db_url[..at_pos].rfind(':') {
            return format!("{}:****{}", &db_url[..colon_pos], &db_url[at_pos..]);
        }
    }
    db_url.to_string()
}

fn mask_secret(secret: &Option<String>) -> &'static str {
    if secret.is_some() {
        "****"
    } else {
        "(unset)"
    }
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Secrets are masked; everything else is shown as loaded.
    pub fn log_config(&self) {
        // ---
        let backend = match &self.db_url {
            Some(url) => format!("postgres ({})", mask_db_url(url)),
            None => format!("bigquery ({})", self.bigquery_api_url),
        };

        tracing::info!("Configuration loaded:");
        tracing::info!("  PORT                  : {}", self.port);
        tracing::info!("  TABLE_ID              : {}", self.table_id);
        tracing::info!("  WAREHOUSE             : {}", backend);
        tracing::info!("  BIGQUERY_TIMEOUT      : {:?}", self.bigquery_timeout);
        tracing::info!("  BIGQUERY_ACCESS_TOKEN : {}", mask_secret(&self.bigquery_access_token));
        tracing::info!("  WEATHER_API_KEY       : {}", mask_secret(&self.weather_api_key));
        tracing::info!("  WEATHER_API_URL       : {}", self.weather_api_url);
        tracing::info!("  WEATHER_LOCATION      : {}, {}", self.weather_lat, self.weather_lon);
        tracing::info!("  WEATHER_TIMEOUT       : {:?}", self.weather_timeout);
        tracing::info!("  DB_POOL_MAX           : {}", self.db_pool_max);
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_mask_db_url() {
        // ---
        assert_eq!(
            mask_db_url("postgres://plant:hunter2@db:5432/plantmon"),
            "postgres://plant:****@db:5432/plantmon"
        );
        assert_eq!(mask_db_url("postgres://db/plantmon"), "postgres://db/plantmon");
    }

    // Env vars are process-wide, so everything that mutates them lives in
    // this one test.
    #[test]
    fn test_load_from_env() {
        // ---
        env::remove_var("TABLE_ID");
        assert!(load_from_env().is_err());

        env::set_var("TABLE_ID", "proj.plantmon.telemetry");
        env::set_var("PORT", "9090");
        env::set_var("WEATHER_API_KEY", "  ");
        env::remove_var("DATABASE_URL");
        let cfg = load_from_env().unwrap();
        assert_eq!(cfg.table_id, "proj.plantmon.telemetry");
        assert_eq!(cfg.port, 9090);
        assert_eq!(cfg.weather_api_key, None);
        assert_eq!(cfg.weather_timeout, Duration::from_secs(5));
        assert_eq!(cfg.bigquery_timeout, Duration::from_secs(10));
        assert_eq!(cfg.weather_api_url, DEFAULT_WEATHER_API_URL);
        assert!(cfg.db_url.is_none());

        env::set_var("PORT", "eighty");
        assert!(load_from_env().is_err());

        env::remove_var("PORT");
        env::remove_var("WEATHER_API_KEY");
        env::remove_var("TABLE_ID");
    }
}
