// SPDX-FileCopyrightText: 2026 Promptq Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request/response types for the Anthropic Messages API.

use serde::{Deserialize, Serialize};

/// A single chat message in a request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Request body for POST /v1/messages.
#[derive(Debug, Clone, Serialize)]
pub struct MessageRequest {
    pub model: String,
    pub max_tokens: u32,
    pub stream: bool,
    pub messages: Vec<ChatMessage>,
}

impl MessageRequest {
    /// A single-turn streaming request for one user prompt.
    pub fn for_prompt(model: &str, max_tokens: u32, prompt: &str) -> Self {
        Self {
            model: model.to_string(),
            max_tokens,
            stream: true,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        }
    }
}

/// Error body returned by the API on non-2xx responses and in-stream
/// `error` events.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    #[serde(rename = "type")]
    pub type_: String,
    pub message: String,
}

/// `content_block_delta` event payload.
#[derive(Debug, Clone, Deserialize)]
pub struct SseContentBlockDelta {
    pub index: u64,
    pub delta: SseDelta,
}

/// Delta variants inside a content block event. Only text deltas matter to
/// the broker; other variants are carried for completeness and skipped.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SseDelta {
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_expected_shape() {
        let req = MessageRequest::for_prompt("claude-sonnet-4-20250514", 1024, "hi");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "claude-sonnet-4-20250514");
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hi");
    }

    #[test]
    fn text_delta_parses() {
        let json = r#"{"index":0,"delta":{"type":"text_delta","text":"Hello"}}"#;
        let delta: SseContentBlockDelta = serde_json::from_str(json).unwrap();
        assert!(matches!(delta.delta, SseDelta::TextDelta { ref text } if text == "Hello"));
    }

    #[test]
    fn unknown_delta_types_fall_through() {
        let json = r#"{"index":0,"delta":{"type":"input_json_delta","partial_json":"{"}}"#;
        let delta: SseContentBlockDelta = serde_json::from_str(json).unwrap();
        assert!(matches!(delta.delta, SseDelta::Other));
    }

    #[test]
    fn api_error_parses() {
        let json = r#"{"error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        let err: ApiErrorResponse = serde_json::from_str(json).unwrap();
        assert_eq!(err.error.type_, "overloaded_error");
        assert_eq!(err.error.message, "Overloaded");
    }
}
