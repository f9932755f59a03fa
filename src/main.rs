use anyhow::{Context, Result};
use axum::Router;
use std::{io::ErrorKind, sync::Arc};
use storage_gateway::{
    backend::{InMemoryBackend, ObjectStoreClient, S3Backend},
    config::{AppConfig, BackendKind},
    routes::routes::app,
    services::gateway::StorageGateway,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args()?;

    tracing::info!("Starting storage-gateway with config: {:?}", cfg);

    // --- Initialize object store client ---
    let client: Arc<dyn ObjectStoreClient> = match cfg.backend {
        BackendKind::S3 => Arc::new(S3Backend::new(&cfg.s3_settings())),
        BackendKind::Memory => {
            tracing::warn!("Using the in-memory backend; stored files are lost on exit");
            Arc::new(InMemoryBackend::new())
        }
    };

    // --- Initialize core service ---
    let gateway = StorageGateway::new(
        client,
        cfg.bucket.clone(),
        cfg.region.clone(),
        cfg.gateway_policy(),
    );
    gateway
        .ensure_bucket()
        .await
        .with_context(|| format!("failed to ensure bucket `{}` exists", cfg.bucket))?;

    if cfg.key_policy.may_collide() {
        tracing::warn!(
            "Key policy `{}`: uploads of the same file name within one second overwrite each other",
            cfg.key_policy
        );
    }

    tracing::info!(
        "Storage gateway ready (endpoint: {}, bucket: {}, region: {})",
        cfg.endpoint_url(),
        gateway.bucket(),
        gateway.region()
    );

    // --- Build router ---
    let router: Router = app(gateway, cfg.max_upload_bytes).layer(TraceLayer::new_for_http());

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve when Ctrl-C is received.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
