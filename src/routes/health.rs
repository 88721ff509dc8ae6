// src/routes/health.rs
//! Liveness endpoint for the telemetry service.
//!
//! `/health` is polled by container orchestrators and CI to check that the
//! process is up and serving HTTP. It is a sibling module in the `routes`
//! directory and follows the Explicit Module Boundary Pattern (EMBP): the
//! handler stays private and only the subrouter is exported to the gateway.

use axum::{routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

/// Handle `GET /health`.
///
/// Does not touch storage or the ingestion queue.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Subrouter with the `/health` route, generic over the gateway state.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(health))
}
