//! `POST /` – Pub/Sub push endpoint.
//!
//! Runs one message through validate → decode → enrich → normalize → write
//! and answers with the status Pub/Sub acts on:
//! - 200: row written, or heartbeat acknowledged without a write
//! - 400: the message can never succeed; Pub/Sub must not redeliver it forever
//! - 500: the warehouse write failed; Pub/Sub redelivers

use axum::{
    body::Bytes, extract::State, http::StatusCode, response::IntoResponse, response::Response,
    routing::post, Json, Router,
};
use tracing::{debug, error, info_span, Instrument};
use uuid::Uuid;

use super::AppState;
use crate::error::{PipelineError, PushResponse, Result};
use crate::models::TelemetryRow;
use crate::{decode, envelope, warehouse, weather};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/", post(handler))
}

/// How a successfully handled message was acknowledged.
#[derive(Debug)]
enum Outcome {
    Written,
    Ignored,
}

async fn handler(State(state): State<AppState>, body: Bytes) -> Response {
    // ---
    let span = info_span!("push", request_id = %Uuid::new_v4());

    async move {
        debug!(bytes = body.len(), "POST / - Received request");

        match process(&state, &body).await {
            Ok(Outcome::Written) => {
                debug!("POST / - Acknowledged");
                ack("written")
            }
            Ok(Outcome::Ignored) => {
                debug!("POST / - Heartbeat message acknowledged without a write");
                ack("ignored")
            }
            Err(e) => {
                error!(status = e.status_code().as_u16(), "POST / - Rejected: {}", e);
                e.into_response()
            }
        }
    }
    .instrument(span)
    .await
}

async fn process(state: &AppState, body: &[u8]) -> Result<Outcome> {
    // ---
    let message = envelope::validate(body)?;
    debug!(
        device_id = %message.device_id,
        publish_time = %message.publish_time,
        message_id = message.message_id.as_deref().unwrap_or("-"),
        "Validated"
    );

    let telemetry = match decode::decode_payload(&message.data) {
        Ok(telemetry) => telemetry,
        Err(PipelineError::EmptyPayload) => return Ok(Outcome::Ignored),
        Err(e) => return Err(e),
    };
    debug!(
        moisture_pct = telemetry.moisture_pct,
        moisture_value = telemetry.moisture_value,
        "Decoded"
    );

    let weather = weather::enrich(state.weather.as_ref()).await;
    debug!("Enriched");

    let row = TelemetryRow::normalize(
        &message.device_id,
        &message.publish_time,
        &telemetry,
        &weather,
    );

    warehouse::write_row(state.warehouse.as_ref(), &state.table_id, &row).await?;
    debug!(table_id = %state.table_id, "Written");

    Ok(Outcome::Written)
}

fn ack(status: &'static str) -> Response {
    // ---
    (
        StatusCode::OK,
        Json(PushResponse {
            status,
            reason: None,
        }),
    )
        .into_response()
}
