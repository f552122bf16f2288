// SPDX-FileCopyrightText: 2026 Promptq Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, CORS, and shared state, and serves until the engine's
//! cancellation token trips.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use promptq_core::error::BrokerError;
use promptq_engine::Engine;

use crate::handlers;
use crate::sse;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// The broker engine all routes operate on.
    pub engine: Arc<Engine>,
    /// Interval between SSE keepalive comments.
    pub keepalive_interval: Duration,
}

/// Gateway server configuration (mirrors the server section of
/// `promptq-config` to avoid a dependency on the config crate).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
}

/// Builds the full route table.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/messages", post(handlers::submit_message))
        .route("/messages/{id}/status", get(handlers::message_status))
        .route("/messages/{id}/stream", get(sse::stream_message))
        .route("/messages/{id}", delete(handlers::cancel_message))
        .route("/queue", get(handlers::queue_summary))
        .route("/threads", get(handlers::list_threads))
        .route("/threads/{thread_id}", get(handlers::thread_metadata))
        .route(
            "/threads/{thread_id}/messages",
            get(handlers::thread_messages),
        )
        .route("/health", get(handlers::health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the gateway HTTP server.
///
/// Binds to the configured host:port and serves until `cancel` trips, at
/// which point in-flight connections are allowed to finish.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), BrokerError> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| BrokerError::Channel {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| BrokerError::Channel {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })?;

    Ok(())
}
