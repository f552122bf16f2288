// SPDX-FileCopyrightText: 2026 Promptq Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The single dispatch worker.
//!
//! One long-running task consumes the scheduler, drives each message
//! through its lifecycle via the external responder, and publishes stream
//! events. Because there is exactly one worker, at most one message is
//! ever in the Processing state and dispatch order equals scheduler order
//! (modulo skipped cancelled entries).
//!
//! A worker iteration never propagates an error: responder failures and
//! the per-message timeout become Failed transitions, which are regular
//! events.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use promptq_core::error::BrokerError;
use promptq_core::traits::Responder;
use promptq_core::types::{MessageState, QueuedMessage, ResponderEvent, StreamEvent};

use crate::broadcast::StreamHub;
use crate::store::{Dequeue, MessageStore, TransitionUpdate};

/// Fixed error string recorded when a message exceeds its processing budget.
const TIMEOUT_ERROR: &str = "processing timeout";

pub(crate) struct DispatchWorker {
    store: Arc<MessageStore>,
    hub: Arc<StreamHub>,
    responder: Arc<dyn Responder>,
    processing_timeout: Duration,
}

impl DispatchWorker {
    pub(crate) fn new(
        store: Arc<MessageStore>,
        hub: Arc<StreamHub>,
        responder: Arc<dyn Responder>,
        processing_timeout: Duration,
    ) -> Self {
        Self {
            store,
            hub,
            responder,
            processing_timeout,
        }
    }

    /// Runs until the cancellation token trips. The message in flight when
    /// shutdown arrives is allowed to finish; queued messages stay queued.
    pub(crate) async fn run(self, cancel: CancellationToken) {
        info!(responder = self.responder.name(), "dispatch worker running");

        loop {
            // Drain everything runnable before sleeping.
            while !cancel.is_cancelled() {
                match self.store.dequeue().await {
                    Dequeue::Dispatch(message) => self.process(message).await,
                    Dequeue::Skipped => continue,
                    Dequeue::Empty => break,
                }
            }

            if cancel.is_cancelled() {
                break;
            }

            tokio::select! {
                _ = self.store.wait_for_messages() => {}
                _ = cancel.cancelled() => break,
            }
        }

        info!("dispatch worker stopped");
    }

    /// Drives one message from Processing to a terminal state.
    async fn process(&self, message: QueuedMessage) {
        let id = message.id;
        info!(id = %id, priority = %message.priority, "processing message");

        self.hub.publish(id, StreamEvent::Started).await;

        // The responder gets its own token so the timeout can abandon it
        // without touching the worker's shutdown signal.
        let responder_cancel = CancellationToken::new();
        let outcome = tokio::time::timeout(
            self.processing_timeout,
            self.drive(&message, responder_cancel.clone()),
        )
        .await;

        match outcome {
            Ok(Ok(explicit_result)) => self.complete(id, explicit_result).await,
            Ok(Err(e)) => {
                warn!(id = %id, error = %e, "responder failed");
                self.fail(id, e.to_string()).await;
            }
            Err(_) => {
                responder_cancel.cancel();
                warn!(
                    id = %id,
                    budget = ?self.processing_timeout,
                    "message exceeded processing budget, abandoning responder"
                );
                self.fail(id, TIMEOUT_ERROR.to_string()).await;
            }
        }
    }

    /// Consumes the responder stream, recording and publishing each chunk.
    /// Returns the responder's explicit final text, if it produced one.
    async fn drive(
        &self,
        message: &QueuedMessage,
        cancel: CancellationToken,
    ) -> Result<Option<String>, BrokerError> {
        let mut stream = self
            .responder
            .stream(&message.user_message, cancel)
            .await?;

        let mut explicit_result = None;
        while let Some(event) = stream.next().await {
            match event? {
                ResponderEvent::Delta(text) => {
                    let index = self.store.append_chunk(message.id, &text).await?;
                    self.hub
                        .publish(message.id, StreamEvent::Chunk { index, text })
                        .await;
                }
                ResponderEvent::Stop { result } => {
                    explicit_result = result;
                    break;
                }
            }
        }
        Ok(explicit_result)
    }

    async fn complete(&self, id: Uuid, explicit_result: Option<String>) {
        match self
            .store
            .transition(
                id,
                MessageState::Completed,
                TransitionUpdate {
                    result: explicit_result,
                    error: None,
                },
            )
            .await
        {
            Ok(done) => {
                let result = done.result.clone().unwrap_or_default();
                info!(id = %id, result_len = result.len(), "message completed");
                self.hub
                    .publish(
                        id,
                        StreamEvent::Done {
                            result,
                            completed_at: done.completed_at.unwrap_or_else(Utc::now),
                        },
                    )
                    .await;
            }
            Err(e) => error!(id = %id, error = %e, "failed to record completion"),
        }
    }

    async fn fail(&self, id: Uuid, message: String) {
        match self
            .store
            .transition(
                id,
                MessageState::Failed,
                TransitionUpdate {
                    result: None,
                    error: Some(message.clone()),
                },
            )
            .await
        {
            Ok(failed) => {
                self.hub
                    .publish(
                        id,
                        StreamEvent::Failed {
                            message,
                            completed_at: failed.completed_at,
                        },
                    )
                    .await;
            }
            Err(e) => error!(id = %id, error = %e, "failed to record failure"),
        }
    }
}
