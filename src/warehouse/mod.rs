//! Warehouse writers.
//!
//! The pipeline appends exactly one [`TelemetryRow`] per acknowledged message
//! through the [`Warehouse`] trait, which mirrors the shape of a streaming
//! insert API: `insert_rows(table, rows) -> per-row errors`.
//!
//! Writes are NOT idempotent. Pub/Sub delivers at least once, so a message
//! redelivered after a timeout or a 500 can produce a duplicate row. No
//! insert id is sent; consumers of the table are expected to deduplicate
//! (e.g. on `device_id` + `timestamp`) when they need exactly-once counts.

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::models::TelemetryRow;

mod bigquery;
mod postgres;

pub use bigquery::{BigQueryWarehouse, TableRef, TokenSource, METADATA_TOKEN_URL};
pub use postgres::{quote_table, row_timestamp, PostgresWarehouse};

// ---

/// A row-level failure reported by the warehouse for a single row of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    /// Position of the rejected row in the submitted batch.
    pub index: usize,
    pub reason: String,
}

/// Failures that prevent the warehouse from answering at all.
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("invalid table id '{0}'")]
    InvalidTable(String),

    #[error("invalid row timestamp {0}")]
    InvalidTimestamp(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("warehouse API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Append `rows` to `table_id`, returning one entry per rejected row.
    async fn insert_rows(
        &self,
        table_id: &str,
        rows: &[TelemetryRow],
    ) -> std::result::Result<Vec<RowError>, WarehouseError>;
}

/// Check `table_id` against the backend that will write it.
///
/// Called at startup so a bad id stops the process instead of turning every
/// delivery into a 500 that Pub/Sub redelivers forever.
pub fn check_table_id(table_id: &str, postgres: bool) -> std::result::Result<(), WarehouseError> {
    // ---
    if postgres {
        quote_table(table_id).map(|_| ())
    } else {
        TableRef::parse(table_id).map(|_| ())
    }
}

/// Append a single row, mapping any failure to `WriteRejected`.
pub async fn write_row(warehouse: &dyn Warehouse, table_id: &str, row: &TelemetryRow) -> Result<()> {
    // ---
    let errors = warehouse
        .insert_rows(table_id, std::slice::from_ref(row))
        .await
        .map_err(|e| PipelineError::WriteRejected(e.to_string()))?;

    if !errors.is_empty() {
        let detail = errors
            .iter()
            .map(|e| format!("row {}: {}", e.index, e.reason))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(PipelineError::WriteRejected(detail));
    }

    debug!(table_id, "New row has been added");
    Ok(())
}
