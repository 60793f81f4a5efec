//! Best-effort weather enrichment.
//!
//! Telemetry rows carry the ambient weather at a fixed location. Looking it
//! up is optional: when the API key is unset, or the lookup fails for any
//! reason, [`enrich`] substitutes [`WeatherSnapshot::unavailable`] and the
//! row is still written.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::models::WeatherSnapshot;

// ---

/// Source of the current weather for the configured location.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn current(&self) -> Result<WeatherSnapshot>;
}

/// Fetch the current weather, falling back to sentinel values on failure.
pub async fn enrich(source: &dyn WeatherSource) -> WeatherSnapshot {
    // ---
    match source.current().await {
        Ok(snapshot) => {
            debug!(
                temperature = snapshot.temperature,
                description = %snapshot.weather_description,
                "Weather enrichment succeeded"
            );
            snapshot
        }
        Err(e) => {
            warn!(error = %e, "Weather enrichment failed, writing sentinel values");
            WeatherSnapshot::unavailable()
        }
    }
}

/// Used when no weather API key is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledWeather;

#[async_trait]
impl WeatherSource for DisabledWeather {
    async fn current(&self) -> Result<WeatherSnapshot> {
        Err(PipelineError::EnrichmentUnavailable(
            "weather enrichment disabled".to_string(),
        ))
    }
}

/// OpenWeatherMap current-weather client for one fixed coordinate.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    // ---
    client: Client,
    base_url: String,
    api_key: String,
    lat: f64,
    lon: f64,
}

impl OpenWeatherClient {
    // ---
    pub fn new(
        base_url: &str,
        api_key: &str,
        lat: f64,
        lon: f64,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        // ---
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            lat,
            lon,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    main: MainReadings,
    wind: Wind,
    weather: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
struct MainReadings {
    temp: f64,
    humidity: f64,
    pressure: f64,
}

#[derive(Debug, Deserialize)]
struct Wind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct Condition {
    description: String,
}

#[async_trait]
impl WeatherSource for OpenWeatherClient {
    async fn current(&self) -> Result<WeatherSnapshot> {
        // ---
        let url = format!("{}/data/2.5/weather", self.base_url);
        let lat = self.lat.to_string();
        let lon = self.lon.to_string();

        debug!("Fetching weather for lat={} lon={}", lat, lon);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
            ])
            .send()
            .await
            .map_err(|e| unavailable(format!("request failed: {e}")))?;

        if response.status() != StatusCode::OK {
            return Err(unavailable(format!(
                "weather API returned HTTP {}",
                response.status()
            )));
        }

        let body: CurrentWeather = response
            .json()
            .await
            .map_err(|e| unavailable(format!("unexpected response body: {e}")))?;

        let description = body
            .weather
            .into_iter()
            .next()
            .map(|c| c.description)
            .ok_or_else(|| unavailable("response has no weather conditions".to_string()))?;

        Ok(WeatherSnapshot {
            temperature: body.main.temp,
            humidity: body.main.humidity,
            pressure: body.main.pressure,
            wind_speed: body.wind.speed,
            weather_description: description,
        })
    }
}

fn unavailable(reason: String) -> PipelineError {
    PipelineError::EnrichmentUnavailable(reason)
}
