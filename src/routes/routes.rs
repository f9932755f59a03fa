//! Defines the gateway's HTTP surface.
//!
//! ## Structure
//! - `POST   /upload`       — multipart upload (field `file`)
//! - `GET    /files`        — list files (optional `prefix`, default `uploads/`)
//! - `GET    /files/{*key}` — redirect to a share link, or `?download=true`
//! - `DELETE /files/{*key}` — delete a file
//! - `GET    /health`       — object store probe
//! - `GET    /healthz`      — liveness
//!
//! The wildcard `*key` allows nested keys like `uploads/1700000000-a.txt`.
//! Unsupported methods on these routes answer 405 with the JSON envelope.

use crate::{
    handlers::{
        file_handlers::{delete_file, get_file, list_files, missing_key, upload_file},
        health_handlers::{health, healthz},
        method_not_allowed,
    },
    services::gateway::StorageGateway,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build the router for all gateway routes.
///
/// The router carries shared state (`StorageGateway`) to all handlers.
/// Upload bodies are capped at `max_upload_bytes`.
pub fn routes(max_upload_bytes: usize) -> Router<StorageGateway> {
    Router::new()
        .route("/healthz", get(healthz).fallback(method_not_allowed))
        .route("/health", get(health).fallback(method_not_allowed))
        .route(
            "/upload",
            post(upload_file)
                .fallback(method_not_allowed)
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/files", get(list_files).fallback(method_not_allowed))
        .route("/files/", get(missing_key).fallback(method_not_allowed))
        .route(
            "/files/{*key}",
            get(get_file)
                .delete(delete_file)
                .fallback(method_not_allowed),
        )
}

/// Router with state attached, ready to serve.
pub fn app(gateway: StorageGateway, max_upload_bytes: usize) -> Router {
    routes(max_upload_bytes).with_state(gateway)
}
