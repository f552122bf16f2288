// SPDX-FileCopyrightText: 2026 Promptq Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSE stream parser for Anthropic Messages API streaming responses.
//!
//! Converts a reqwest response byte stream into [`ResponderEvent`]s using
//! the `eventsource-stream` crate for SSE protocol compliance. Only text
//! deltas and the stream terminator are surfaced; bookkeeping events
//! (`message_start`, `content_block_start`, pings) and unknown event types
//! are skipped per Anthropic's API versioning policy.

use promptq_core::error::BrokerError;
use promptq_core::traits::ResponderStream;
use promptq_core::types::ResponderEvent;

use eventsource_stream::Eventsource;
use futures::StreamExt;

use crate::types::{ApiErrorResponse, SseContentBlockDelta, SseDelta};

/// Parses a streaming response body into responder events.
pub fn parse_sse_stream(response: reqwest::Response) -> ResponderStream {
    let event_stream = response.bytes_stream().eventsource();

    let mapped = event_stream.filter_map(|result| async move {
        match result {
            Ok(event) => match event.event.as_str() {
                "content_block_delta" => {
                    match serde_json::from_str::<SseContentBlockDelta>(&event.data) {
                        Ok(delta) => match delta.delta {
                            SseDelta::TextDelta { text } => Some(Ok(ResponderEvent::Delta(text))),
                            SseDelta::Other => None,
                        },
                        Err(e) => Some(Err(BrokerError::Responder {
                            message: format!("failed to parse content_block_delta: {e}"),
                            source: Some(Box::new(e)),
                        })),
                    }
                }
                "message_stop" => Some(Ok(ResponderEvent::Stop { result: None })),
                "error" => match serde_json::from_str::<ApiErrorResponse>(&event.data) {
                    Ok(err) => Some(Err(BrokerError::responder(format!(
                        "Anthropic API error ({}): {}",
                        err.error.type_, err.error.message
                    )))),
                    Err(e) => Some(Err(BrokerError::Responder {
                        message: format!("failed to parse error event: {e}"),
                        source: Some(Box::new(e)),
                    })),
                },
                // message_start, content_block_start/stop, message_delta,
                // ping, and future event types carry nothing the broker
                // records.
                _ => None,
            },
            Err(e) => Some(Err(BrokerError::Responder {
                message: format!("SSE stream error: {e}"),
                source: None,
            })),
        }
    });

    Box::pin(mapped)
}
