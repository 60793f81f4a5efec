// src/routes/health.rs
//! Liveness endpoint for the push sink.
//!
//! Cloud Run and local compose setups poll `/health` to check the process is
//! serving HTTP. Sibling of `push.rs` under the `routes` gateway (EMBP):
//! - Internal to this file: the handler and its response type
//! - Exports to the gateway (`mod.rs`): a subrouter with the `/health` route

use axum::{routing::get, Json, Router};
use serde::Serialize;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Handle `GET /health`.
///
/// Does not touch the weather API or the warehouse.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Create a subrouter containing the `/health` route.
///
/// Generic over the application state so it merges into the gateway router
/// whatever the state type is.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(health))
}
