//! Pub/Sub push sink for plant-monitor telemetry.
//!
//! Receives push deliveries on `POST /`, decodes the device telemetry in each
//! message, adds best-effort weather data and appends one row per message to
//! the warehouse table. `main.rs` wires the concrete clients; tests wire fakes
//! through the same [`AppState`].
//!
//! Module boundaries follow EMBP: each stage is a sibling module and this
//! file is the only gateway other crates (and the binary) import from.

pub mod config;
pub mod decode;
pub mod envelope;
pub mod error;
pub mod models;
pub mod routes;
pub mod warehouse;
pub mod weather;

pub use config::Config;
pub use error::PipelineError;
pub use models::{DeviceTelemetry, PubSubMessage, TelemetryRow, WeatherSnapshot};
pub use routes::{router, AppState};
pub use warehouse::{RowError, Warehouse, WarehouseError};
pub use weather::WeatherSource;
