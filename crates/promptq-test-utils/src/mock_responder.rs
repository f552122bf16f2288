// SPDX-FileCopyrightText: 2026 Promptq Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock responder for deterministic testing.
//!
//! [`MockResponder`] implements [`Responder`] with pre-scripted outputs,
//! enabling fast, CI-runnable tests without external API calls. Scripts
//! are popped from a FIFO queue, one per dispatched message; when the
//! queue is empty a default single-chunk response is produced.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use promptq_core::error::BrokerError;
use promptq_core::traits::{Responder, ResponderStream};
use promptq_core::types::ResponderEvent;

/// One scripted responder run.
#[derive(Debug, Clone, Default)]
pub struct MockScript {
    chunks: Vec<String>,
    final_result: Option<String>,
    /// Fail with this message after emitting all chunks.
    error: Option<String>,
    /// Delay before each chunk, for timeout and slow-stream tests.
    chunk_delay: Option<Duration>,
}

impl MockScript {
    /// A script emitting the given chunks then stopping normally.
    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// A script emitting one chunk.
    pub fn text(text: impl Into<String>) -> Self {
        Self::chunks([text.into()])
    }

    /// A script that errors with `message` after its chunks.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Attach an explicit final result that wins over chunk concatenation.
    pub fn with_final_result(mut self, result: impl Into<String>) -> Self {
        self.final_result = Some(result.into());
        self
    }

    /// Sleep this long before each chunk (and before the stop event).
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }
}

/// A responder that replays pre-configured scripts.
pub struct MockResponder {
    scripts: Arc<Mutex<VecDeque<MockScript>>>,
}

impl MockResponder {
    /// Creates a mock with an empty script queue.
    pub fn new() -> Self {
        Self {
            scripts: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Creates a mock pre-loaded with the given scripts.
    pub fn with_scripts(scripts: Vec<MockScript>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(VecDeque::from(scripts))),
        }
    }

    /// Appends a script to the queue.
    pub async fn push_script(&self, script: MockScript) {
        self.scripts.lock().await.push_back(script);
    }

    async fn next_script(&self) -> MockScript {
        self.scripts
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| MockScript::text("mock response"))
    }
}

impl Default for MockResponder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Responder for MockResponder {
    fn name(&self) -> &str {
        "mock-responder"
    }

    async fn stream(
        &self,
        _prompt: &str,
        cancel: CancellationToken,
    ) -> Result<ResponderStream, BrokerError> {
        let script = self.next_script().await;

        // Items are produced lazily so per-chunk delays and cancellation
        // behave like a real streaming backend.
        let mut items: VecDeque<Result<ResponderEvent, BrokerError>> = script
            .chunks
            .into_iter()
            .map(|c| Ok(ResponderEvent::Delta(c)))
            .collect();
        match script.error {
            Some(message) => items.push_back(Err(BrokerError::responder(message))),
            None => items.push_back(Ok(ResponderEvent::Stop {
                result: script.final_result,
            })),
        }

        let delay = script.chunk_delay;
        let events = stream::unfold(items, move |mut items| {
            let cancel = cancel.clone();
            async move {
                let next = items.pop_front()?;
                if let Some(delay) = delay {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return None,
                    }
                } else if cancel.is_cancelled() {
                    return None;
                }
                Some((next, items))
            }
        });

        Ok(Box::pin(events))
    }
}
