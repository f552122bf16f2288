// SPDX-FileCopyrightText: 2026 Promptq Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-Sent Events streaming for GET /messages/{id}/stream.
//!
//! A subscriber receives, in order: a `waiting` event if the message is
//! still queued at attach time, the replay snapshot of everything durable
//! published so far, and the live tail ending with exactly one terminal
//! event. The connection then closes. Keepalive comment lines are emitted
//! at the configured interval while the stream is open.
//!
//! Wire format (event names and JSON fields are load-bearing for clients):
//! ```text
//! event: chunk
//! data: {"type":"content","chunk":"partial text","index":0}
//!
//! event: done
//! data: {"state":"completed","result":"full text","completed_at":"..."}
//! ```

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::{StreamExt, stream};
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use promptq_core::types::{MessageState, StreamEvent};

use crate::handlers::error_response;
use crate::server::GatewayState;

/// GET /messages/{id}/stream
pub async fn stream_message(
    State(state): State<GatewayState>,
    Path(id): Path<Uuid>,
) -> Response {
    let subscription = match state.engine.subscribe(id).await {
        Ok(sub) => sub,
        Err(e) => return error_response(e),
    };

    // Synthesized once per subscriber: the durable sequence never contains
    // queue positions because they are only meaningful at attach time.
    let mut lead = Vec::new();
    if let Some(message) = state.engine.message(id).await
        && message.state == MessageState::Queued
    {
        let position = state.engine.queue_position(id).await;
        lead.push(StreamEvent::Waiting { position });
    }

    tracing::info!(id = %id, replayed = subscription.snapshot.len(), "SSE subscriber attached");

    let events = stream::iter(lead.into_iter().chain(subscription.snapshot))
        .chain(ReceiverStream::new(subscription.receiver))
        .map(|ev| Ok::<Event, Infallible>(to_sse_event(&ev)));

    Sse::new(events)
        .keep_alive(
            KeepAlive::new()
                .interval(state.keepalive_interval)
                .text("keepalive"),
        )
        .into_response()
}

/// Serializes one broker event into its wire representation.
fn to_sse_event(event: &StreamEvent) -> Event {
    Event::default()
        .event(event.event_name())
        .data(event_payload(event).to_string())
}

/// JSON payload for one broker event. Field names are load-bearing.
fn event_payload(event: &StreamEvent) -> serde_json::Value {
    match event {
        StreamEvent::Waiting { position } => json!({
            "state": "queued",
            "position": position,
            "message": "Waiting in queue",
        }),
        StreamEvent::Started => json!({
            "state": "processing",
        }),
        StreamEvent::Chunk { index, text } => json!({
            "type": "content",
            "chunk": text,
            "index": index,
        }),
        StreamEvent::Done {
            result,
            completed_at,
        } => json!({
            "state": "completed",
            "result": result,
            "completed_at": completed_at,
        }),
        StreamEvent::Failed {
            message,
            completed_at,
        } => json!({
            "state": "failed",
            "error": message,
            "completed_at": completed_at,
        }),
        StreamEvent::Cancelled { completed_at } => json!({
            "state": "cancelled",
            "completed_at": completed_at,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn chunk_payload_has_normative_fields() {
        let data = event_payload(&StreamEvent::Chunk {
            index: 2,
            text: "is 42.".to_string(),
        });
        assert_eq!(data["type"], "content");
        assert_eq!(data["chunk"], "is 42.");
        assert_eq!(data["index"], 2);
    }

    #[test]
    fn waiting_payload_carries_queue_position() {
        let data = event_payload(&StreamEvent::Waiting { position: Some(3) });
        assert_eq!(data["state"], "queued");
        assert_eq!(data["position"], 3);
        assert_eq!(data["message"], "Waiting in queue");
    }

    #[test]
    fn done_payload_carries_result() {
        let data = event_payload(&StreamEvent::Done {
            result: "The answer is 42.".to_string(),
            completed_at: Utc::now(),
        });
        assert_eq!(data["state"], "completed");
        assert_eq!(data["result"], "The answer is 42.");
        assert!(data["completed_at"].is_string());
    }

    #[test]
    fn failed_payload_carries_error_string() {
        let data = event_payload(&StreamEvent::Failed {
            message: "processing timeout".to_string(),
            completed_at: Some(Utc::now()),
        });
        assert_eq!(data["state"], "failed");
        assert_eq!(data["error"], "processing timeout");
    }

    #[test]
    fn event_names_match_catalogue() {
        let now = Utc::now();
        let cases = [
            (StreamEvent::Waiting { position: Some(1) }, "waiting"),
            (StreamEvent::Started, "started"),
            (
                StreamEvent::Chunk {
                    index: 0,
                    text: "x".into(),
                },
                "chunk",
            ),
            (
                StreamEvent::Done {
                    result: "x".into(),
                    completed_at: now,
                },
                "done",
            ),
            (
                StreamEvent::Failed {
                    message: "boom".into(),
                    completed_at: Some(now),
                },
                "error",
            ),
            (StreamEvent::Cancelled { completed_at: now }, "cancelled"),
        ];
        for (event, expected) in cases {
            assert_eq!(event.event_name(), expected);
        }
    }

    #[test]
    fn completed_at_serializes_as_rfc3339() {
        let now = Utc::now();
        let value = json!({ "completed_at": now });
        let rendered = value["completed_at"].as_str().unwrap();
        assert!(rendered.contains('T'));
        assert!(rendered.ends_with('Z') || rendered.contains('+'));
    }
}
