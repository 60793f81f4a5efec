//! Application entry point for the `plantmon-pubsub-sink` service.
//!
//! This binary orchestrates the startup sequence for the Pub/Sub push
//! endpoint, including:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Constructing the weather client and the warehouse writer once
//! - Mounting the routes via the `routes` gateway (EMBP pattern)
//! - Binding the Axum HTTP server and serving requests
//!
//! # Environment Variables
//! - `TABLE_ID` (**required**) – destination table
//! - `PORT` (optional) – listen port (default: 8080)
//! - `LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AXUM_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! See `config.rs` for the weather and warehouse settings.
use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Result;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use plantmon_pubsub_sink::{
    config::{self, Config},
    routes::{self, AppState},
    warehouse::{check_table_id, BigQueryWarehouse, PostgresWarehouse, TokenSource, METADATA_TOKEN_URL},
    weather::{DisabledWeather, OpenWeatherClient},
    Warehouse, WeatherSource,
};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let weather = build_weather(&cfg)?;
    let warehouse = build_warehouse(&cfg).await?;

    // Build app from routes gateway (EMBP)
    let app = routes::router(AppState::new(weather, warehouse, &cfg.table_id));

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---

fn build_weather(cfg: &Config) -> Result<Arc<dyn WeatherSource>> {
    // ---
    match &cfg.weather_api_key {
        Some(api_key) => {
            let client = OpenWeatherClient::new(
                &cfg.weather_api_url,
                api_key,
                cfg.weather_lat,
                cfg.weather_lon,
                cfg.weather_timeout,
            )?;
            Ok(Arc::new(client))
        }
        None => {
            tracing::warn!("WEATHER_API_KEY not set, rows will carry sentinel weather values");
            Ok(Arc::new(DisabledWeather))
        }
    }
}

async fn build_warehouse(cfg: &Config) -> Result<Arc<dyn Warehouse>> {
    // ---
    // Fail at startup rather than on every request.
    check_table_id(&cfg.table_id, cfg.db_url.is_some())?;

    if let Some(db_url) = &cfg.db_url {
        tracing::info!("Attempting to connect to database");

        let pool = PgPoolOptions::new()
            .max_connections(cfg.db_pool_max)
            .connect(db_url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

        tracing::info!("Successfully connected to database");
        return Ok(Arc::new(PostgresWarehouse::new(pool)));
    }

    let tokens = match &cfg.bigquery_access_token {
        Some(token) => TokenSource::Static(token.clone()),
        None => TokenSource::Metadata {
            url: METADATA_TOKEN_URL.to_string(),
        },
    };
    let warehouse =
        BigQueryWarehouse::with_timeout(&cfg.bigquery_api_url, tokens, cfg.bigquery_timeout)?;
    Ok(Arc::new(warehouse))
}

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `AXUM_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level from `RUST_LOG` if set, otherwise `LOG_LEVEL` (case-insensitive,
///   `WARNING`/`CRITICAL` accepted as aliases)
///
/// Called once at startup, after `.env` is loaded, before any logging.
fn init_tracing() {
    // ---
    let span_events = match env::var("AXUM_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = env::var("LOG_LEVEL")
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_default();
        let level = match level.as_str() {
            "trace" => "trace",
            "info" => "info",
            "warn" | "warning" => "warn",
            "error" | "critical" => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn,hyper=info,reqwest=info"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
