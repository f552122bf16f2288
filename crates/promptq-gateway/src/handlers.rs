// SPDX-FileCopyrightText: 2026 Promptq Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the broker REST API.
//!
//! Handles submission, status, cancellation, queue summary, and the thread
//! query surface. SSE streaming lives in [`crate::sse`].

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use promptq_core::error::BrokerError;
use promptq_core::types::Priority;

use crate::server::GatewayState;

/// Request body for POST /messages.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    /// The prompt text.
    pub message: String,
    /// Scheduling priority; defaults to normal.
    #[serde(default)]
    pub priority: Priority,
    /// Optional thread grouping.
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// Response body for DELETE /messages/{id}.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub message: String,
    pub message_id: Uuid,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub queue_initialized: bool,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Maps an engine error onto its HTTP status code.
pub fn error_response(err: BrokerError) -> Response {
    let status = match &err {
        BrokerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        BrokerError::QueueFull { .. } => StatusCode::SERVICE_UNAVAILABLE,
        BrokerError::NotFound { .. } => StatusCode::NOT_FOUND,
        BrokerError::InvalidTransition { .. } | BrokerError::NotCancellable { .. } => {
            StatusCode::CONFLICT
        }
        BrokerError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        BrokerError::Responder { .. }
        | BrokerError::Channel { .. }
        | BrokerError::Config(_)
        | BrokerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

/// POST /messages
///
/// Admits a prompt into the queue. Returns 202 with the submit receipt,
/// 400 on invalid input, 503 when the queue is full.
pub async fn submit_message(
    State(state): State<GatewayState>,
    Json(body): Json<SubmitRequest>,
) -> Response {
    match state
        .engine
        .submit(&body.message, body.priority, body.thread_id)
        .await
    {
        Ok(receipt) => (StatusCode::ACCEPTED, Json(receipt)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /messages/{id}/status
pub async fn message_status(
    State(state): State<GatewayState>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.engine.status(id).await {
        Ok(status) => Json(status).into_response(),
        Err(e) => error_response(e),
    }
}

/// DELETE /messages/{id}
///
/// Cancels a queued message. 404 for unknown ids, 409 once the message has
/// left the queued state.
pub async fn cancel_message(
    State(state): State<GatewayState>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.engine.cancel(id).await {
        Ok(()) => Json(CancelResponse {
            message: "Message cancelled successfully".to_string(),
            message_id: id,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /queue
pub async fn queue_summary(State(state): State<GatewayState>) -> Response {
    Json(state.engine.summary().await).into_response()
}

/// GET /threads
pub async fn list_threads(State(state): State<GatewayState>) -> Response {
    Json(state.engine.threads().await).into_response()
}

/// GET /threads/{thread_id}
pub async fn thread_metadata(
    State(state): State<GatewayState>,
    Path(thread_id): Path<String>,
) -> Response {
    match state.engine.thread_metadata(&thread_id).await {
        Ok(meta) => Json(meta).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /threads/{thread_id}/messages
pub async fn thread_messages(
    State(state): State<GatewayState>,
    Path(thread_id): Path<String>,
) -> Response {
    match state.engine.thread_messages(&thread_id).await {
        Ok(history) => Json(history).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        queue_initialized: true,
    })
}
