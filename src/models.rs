//! Data models for the push pipeline.

use serde::{Deserialize, Serialize};

// ---

/// A validated Pub/Sub message pulled out of the push envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PubSubMessage {
    // ---
    /// Base64-encoded telemetry blob.
    pub data: String,
    /// Value of `attributes.deviceId`.
    pub device_id: String,
    /// RFC 3339 publish time, kept verbatim.
    pub publish_time: String,
    /// Pub/Sub message id, only used for log correlation.
    pub message_id: Option<String>,
}

/// Telemetry decoded from the message `data` field, using canonical names.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceTelemetry {
    pub moisture_pct: f64,
    pub moisture_value: f64,
}

/// Current weather at the configured location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub wind_speed: f64,
    pub weather_description: String,
}

impl WeatherSnapshot {
    /// Numeric sentinel written when weather data is unavailable.
    pub const SENTINEL: f64 = -1.0;

    /// Placeholder snapshot used when enrichment is disabled or fails.
    pub fn unavailable() -> Self {
        // ---
        Self {
            temperature: Self::SENTINEL,
            humidity: Self::SENTINEL,
            pressure: Self::SENTINEL,
            wind_speed: Self::SENTINEL,
            weather_description: String::new(),
        }
    }
}

/// Row appended to the warehouse table. Field names are the column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRow {
    // ---
    pub device_id: String,
    pub moisture_pct: f64,
    pub moisture_value: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub wind_speed: f64,
    pub weather_description: String,
    pub timestamp: String,
}

impl TelemetryRow {
    // ---
    pub fn normalize(
        device_id: &str,
        publish_time: &str,
        telemetry: &DeviceTelemetry,
        weather: &WeatherSnapshot,
    ) -> Self {
        // ---
        TelemetryRow {
            device_id: device_id.to_string(),
            moisture_pct: telemetry.moisture_pct,
            moisture_value: telemetry.moisture_value,
            temperature: weather.temperature,
            humidity: weather.humidity,
            pressure: weather.pressure,
            wind_speed: weather.wind_speed,
            weather_description: weather.weather_description.clone(),
            timestamp: publish_time.to_string(),
        }
    }
}
