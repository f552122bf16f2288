// SPDX-FileCopyrightText: 2026 Promptq Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Responder trait for pluggable text-generating backends.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use tokio_util::sync::CancellationToken;

use crate::error::BrokerError;
use crate::types::ResponderEvent;

/// A lazy sequence of responder events.
pub type ResponderStream =
    Pin<Box<dyn Stream<Item = Result<ResponderEvent, BrokerError>> + Send>>;

/// The external text-generating capability the worker dispatches to.
///
/// The broker knows nothing about what produces the text; implementations
/// range from LLM API clients to scripted test doubles. At most one call
/// is in flight at a time (the worker is the single consumer).
#[async_trait]
pub trait Responder: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Starts generating a reply to `prompt`.
    ///
    /// The returned stream yields zero or more [`ResponderEvent::Delta`]
    /// fragments and may end with a [`ResponderEvent::Stop`]. Implementations
    /// must observe `cancel` and stop producing output promptly once it
    /// trips; the broker also reserves the right to drop the stream.
    async fn stream(
        &self,
        prompt: &str,
        cancel: CancellationToken,
    ) -> Result<ResponderStream, BrokerError>;
}
