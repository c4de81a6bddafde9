// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::info;

use super::detect::detect_handler;
use crate::vision::DetectionPipeline;

/// Liveness text for GET /
pub const HEALTH_MESSAGE: &str = "✅ Waste Detection Backend is Running!";

/// Default cap on request bodies (16 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Shared, read-only request state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<DetectionPipeline>,
    /// Request body cap, also quoted in 413 responses
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(pipeline: DetectionPipeline, max_upload_bytes: usize) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            max_upload_bytes,
        }
    }
}

/// Build the router: `/`, `/detect` and the `/results` file service
pub fn create_app(state: AppState) -> Router {
    let max_upload_bytes = state.max_upload_bytes;
    let results = ServeDir::new(state.pipeline.store().dir());

    Router::new()
        // Health check
        .route("/", get(health_handler))
        // Detection endpoint
        .route("/detect", post(detect_handler))
        // Annotated images
        .nest_service("/results", results)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until Ctrl-C / SIGTERM, then drain in-flight requests
pub async fn start_server(addr: SocketAddr, app: Router) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("API server stopped");
    Ok(())
}

async fn health_handler() -> &'static str {
    HEALTH_MESSAGE
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
