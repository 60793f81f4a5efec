//! PostgreSQL backend, selected when `DATABASE_URL` is set.
//!
//! The destination table must already exist with the telemetry columns
//! (`timestamp` as `TIMESTAMPTZ`); this service never creates or alters it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

use super::{RowError, Warehouse, WarehouseError};
use crate::models::TelemetryRow;

// ---

#[derive(Debug, Clone)]
pub struct PostgresWarehouse {
    pool: PgPool,
}

impl PostgresWarehouse {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Quote `table` or `schema.table` as a SQL identifier.
///
/// Only ASCII letters, digits and underscores are accepted in each part.
pub fn quote_table(table_id: &str) -> Result<String, WarehouseError> {
    // ---
    let parts: Vec<&str> = table_id.split('.').collect();
    let valid = parts.len() <= 2
        && parts.iter().all(|part| {
            !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        });

    if !valid {
        return Err(WarehouseError::InvalidTable(table_id.to_string()));
    }

    Ok(parts
        .iter()
        .map(|part| format!("\"{part}\""))
        .collect::<Vec<_>>()
        .join("."))
}

/// Convert a row's RFC 3339 `timestamp` into the `TIMESTAMPTZ` bind value.
pub fn row_timestamp(row: &TelemetryRow) -> Result<DateTime<Utc>, WarehouseError> {
    // ---
    DateTime::parse_from_rfc3339(&row.timestamp)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| WarehouseError::InvalidTimestamp(format!("{}: {e}", row.timestamp)))
}

#[async_trait]
impl Warehouse for PostgresWarehouse {
    async fn insert_rows(
        &self,
        table_id: &str,
        rows: &[TelemetryRow],
    ) -> Result<Vec<RowError>, WarehouseError> {
        // ---
        let table = quote_table(table_id)?;
        let statement = format!(
            r#"
            INSERT INTO {table} (
                device_id, moisture_pct, moisture_value,
                temperature, humidity, pressure, wind_speed,
                weather_description, timestamp
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#
        );

        // Convert every row before opening a transaction.
        let timestamps = rows
            .iter()
            .map(row_timestamp)
            .collect::<Result<Vec<_>, _>>()?;

        let mut tx = self.pool.begin().await?;
        for (row, timestamp) in rows.iter().zip(timestamps) {
            sqlx::query(&statement)
                .bind(&row.device_id)
                .bind(row.moisture_pct)
                .bind(row.moisture_value)
                .bind(row.temperature)
                .bind(row.humidity)
                .bind(row.pressure)
                .bind(row.wind_speed)
                .bind(&row.weather_description)
                .bind(timestamp)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!(table_id, rows = rows.len(), "Inserted rows into PostgreSQL");
        Ok(Vec::new())
    }
}
