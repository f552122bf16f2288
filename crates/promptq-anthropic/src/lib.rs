// SPDX-FileCopyrightText: 2026 Promptq Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic Messages API responder for the promptq broker.
//!
//! Implements the [`Responder`] trait against the streaming Messages API.
//! Each dispatched prompt becomes a single-turn streaming request; text
//! deltas are surfaced as chunks and the broker assembles the final result
//! from them.

pub mod client;
pub mod sse;
pub mod types;

use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use promptq_core::error::BrokerError;
use promptq_core::traits::{Responder, ResponderStream};

pub use client::AnthropicClient;
use types::MessageRequest;

/// Configuration for the Anthropic responder.
#[derive(Debug, Clone)]
pub struct AnthropicResponderConfig {
    pub api_key: String,
    pub api_version: String,
    pub model: String,
    pub max_tokens: u32,
}

/// A [`Responder`] backed by the Anthropic Messages API.
pub struct AnthropicResponder {
    client: AnthropicClient,
    model: String,
    max_tokens: u32,
}

impl AnthropicResponder {
    pub fn new(config: &AnthropicResponderConfig) -> Result<Self, BrokerError> {
        let client = AnthropicClient::new(&config.api_key, &config.api_version)?;
        Ok(Self {
            client,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl Responder for AnthropicResponder {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn stream(
        &self,
        prompt: &str,
        cancel: CancellationToken,
    ) -> Result<ResponderStream, BrokerError> {
        let request = MessageRequest::for_prompt(&self.model, self.max_tokens, prompt);
        let events = self.client.stream_message(&request).await?;

        // Cooperative cancellation: stop yielding once the broker abandons
        // this message; the underlying connection drops with the stream.
        Ok(Box::pin(events.take_until(cancel.cancelled_owned())))
    }
}
