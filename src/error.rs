//! Error taxonomy for the push pipeline.
//!
//! Every stage of the pipeline reports failures through [`PipelineError`].
//! The handler never lets one of these escape unconverted: each variant maps
//! to an explicit HTTP status via [`PipelineError::status_code`], which is
//! what tells Pub/Sub whether to redeliver (5xx) or drop (4xx/2xx).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Result type alias for pipeline stages.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    // ---
    /// Request body was empty or only whitespace.
    #[error("request body is empty")]
    EmptyBody,

    /// Body is not a JSON object, or `message` is absent or not an object.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// A required message field is absent.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// `data` is not valid base64, UTF-8 or JSON.
    #[error("undecodable payload: {0}")]
    DecodeError(String),

    /// Heartbeat message with no telemetry in it.
    #[error("payload carries no telemetry")]
    EmptyPayload,

    /// Telemetry JSON parsed but required numeric fields are missing or bad.
    #[error("telemetry schema error: {0}")]
    SchemaError(String),

    /// Weather lookup failed. Absorbed by the enricher, never sent to a client.
    #[error("weather enrichment unavailable: {0}")]
    EnrichmentUnavailable(String),

    /// The warehouse refused the row or could not be reached.
    #[error("warehouse write rejected: {0}")]
    WriteRejected(String),
}

impl PipelineError {
    /// HTTP status that acknowledges, rejects or asks for redelivery.
    pub fn status_code(&self) -> StatusCode {
        // ---
        match self {
            Self::EmptyBody
            | Self::MalformedEnvelope(_)
            | Self::MissingField(_)
            | Self::DecodeError(_)
            | Self::SchemaError(_) => StatusCode::BAD_REQUEST,
            Self::EmptyPayload | Self::EnrichmentUnavailable(_) => StatusCode::OK,
            Self::WriteRejected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON body returned for every push request.
#[derive(Debug, Serialize)]
pub struct PushResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        // ---
        let status = self.status_code();
        let label = if status.is_success() { "ignored" } else { "rejected" };
        let body = PushResponse {
            status: label,
            reason: Some(self.to_string()),
        };
        (status, Json(body)).into_response()
    }
}
