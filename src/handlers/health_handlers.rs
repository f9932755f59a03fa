//! Health & liveness handlers.
//!
//! - GET /healthz -> liveness, never touches the object store
//! - GET /health  -> lists the bucket to prove the object store answers

use crate::{models::envelope::Envelope, services::gateway::StorageGateway};
use axum::{extract::State, http::StatusCode};
use tracing::warn;

/// `GET /healthz`
///
/// Very small liveness probe — always returns 200 OK.
pub async fn healthz() -> Envelope<()> {
    Envelope::ok_empty(StatusCode::OK, "ok")
}

/// `GET /health`
///
/// Runs an unprefixed listing against the bucket. An empty bucket is healthy;
/// any backend error yields 503 with the error text.
pub async fn health(State(gateway): State<StorageGateway>) -> Envelope<()> {
    match gateway.list_objects("").await {
        Ok(_) => Envelope::ok_empty(StatusCode::OK, "Service is healthy"),
        Err(err) => {
            warn!("health check failed: {}", err);
            Envelope::failure(
                StatusCode::SERVICE_UNAVAILABLE,
                format!("object store is not healthy: {}", err),
            )
        }
    }
}
