// SPDX-FileCopyrightText: 2026 Promptq Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue, dispatch, and streaming core of the promptq broker.
//!
//! The [`Engine`] ties the pieces together:
//! - the [`store::MessageStore`] (authoritative message table, thread
//!   index, priority scheduler, admission cap),
//! - the [`broadcast::StreamHub`] (per-message event streams with replay),
//! - the dispatch worker (single consumer of the scheduler, driving the
//!   external [`Responder`]).
//!
//! Lifecycle: `Engine::new` -> `start` (spawns the worker) -> operations
//! -> `shutdown` (drains the in-flight message). Engines are plain values;
//! tests spin up as many independent instances as they like.

pub mod broadcast;
pub mod scheduler;
pub mod shutdown;
pub mod store;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use promptq_core::error::BrokerError;
use promptq_core::traits::Responder;
use promptq_core::types::{
    MessageStatus, Priority, QueueSummary, QueuedMessage, QueuedPreview, StreamEvent,
    SubmitReceipt, ThreadMetadata, ThreadMessages, ThreadSummary,
};

pub use broadcast::{StreamHub, StreamSubscription};
pub use store::{MessageStore, TransitionUpdate};

/// Engine tunables, mirroring the queue/stream sections of the config
/// crate without depending on it.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of messages admitted in the queued state.
    pub max_queue_size: usize,
    /// Wall-clock budget for processing one message.
    pub processing_timeout: Duration,
    /// Bounded per-subscriber event buffer.
    pub subscriber_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            processing_timeout: Duration::from_secs(60),
            subscriber_buffer: 64,
        }
    }
}

/// The broker core: one store, one stream hub, one dispatch worker.
pub struct Engine {
    store: Arc<MessageStore>,
    hub: Arc<StreamHub>,
    responder: Arc<dyn Responder>,
    processing_timeout: Duration,
    cancel: CancellationToken,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Creates an engine. The worker does not run until [`Engine::start`].
    pub fn new(config: EngineConfig, responder: Arc<dyn Responder>) -> Self {
        Self {
            store: Arc::new(MessageStore::new(config.max_queue_size)),
            hub: Arc::new(StreamHub::new(config.subscriber_buffer)),
            responder,
            processing_timeout: config.processing_timeout,
            cancel: CancellationToken::new(),
            worker_handle: Mutex::new(None),
        }
    }

    /// Spawns the dispatch worker. Idempotent.
    pub async fn start(&self) {
        let mut handle = self.worker_handle.lock().await;
        if handle.is_some() {
            warn!("dispatch worker already running");
            return;
        }
        let worker = worker::DispatchWorker::new(
            self.store.clone(),
            self.hub.clone(),
            self.responder.clone(),
            self.processing_timeout,
        );
        let cancel = self.cancel.clone();
        *handle = Some(tokio::spawn(worker.run(cancel)));
    }

    /// Admits a new message and creates its broadcast stream.
    pub async fn submit(
        &self,
        user_message: &str,
        priority: Priority,
        thread_id: Option<String>,
    ) -> Result<SubmitReceipt, BrokerError> {
        let receipt = self.store.submit(user_message, priority, thread_id).await?;
        self.hub.create(receipt.message_id);
        Ok(receipt)
    }

    /// Raw message snapshot.
    pub async fn message(&self, id: Uuid) -> Option<QueuedMessage> {
        self.store.get(id).await
    }

    /// Status projection with live queue position.
    pub async fn status(&self, id: Uuid) -> Result<MessageStatus, BrokerError> {
        self.store.status(id).await
    }

    /// Cancels a queued message and publishes the terminal `cancelled`
    /// event to its subscribers.
    pub async fn cancel(&self, id: Uuid) -> Result<(), BrokerError> {
        let cancelled = self.store.cancel(id).await?;
        self.hub
            .publish(
                id,
                StreamEvent::Cancelled {
                    completed_at: cancelled.completed_at.unwrap_or_else(Utc::now),
                },
            )
            .await;
        Ok(())
    }

    /// Subscribes to a message's event stream: replay snapshot plus live
    /// tail. Fails with `NotFound` for unknown message ids.
    pub async fn subscribe(&self, id: Uuid) -> Result<StreamSubscription, BrokerError> {
        if self.store.get(id).await.is_none() {
            return Err(BrokerError::not_found(id));
        }
        // Streams outlive terminal states. submit registers the stream
        // after the store insert, so a subscriber racing a submit may see
        // the message before the stream; create here closes that window.
        self.hub.create(id);
        self.hub
            .subscribe(id)
            .await
            .ok_or_else(|| BrokerError::Internal(format!("stream missing for message {id}")))
    }

    /// 0-indexed queue position, `None` unless queued.
    pub async fn queue_position(&self, id: Uuid) -> Option<usize> {
        self.store.queue_position(id).await
    }

    /// Queued messages in dispatch order.
    pub async fn list_queued(&self) -> Vec<QueuedPreview> {
        self.store.list_queued().await
    }

    /// Aggregate queue view.
    pub async fn summary(&self) -> QueueSummary {
        self.store.summary().await
    }

    /// Thread summaries, most recently active first.
    pub async fn threads(&self) -> Vec<ThreadSummary> {
        self.store.threads().await
    }

    /// Metadata for one thread.
    pub async fn thread_metadata(&self, thread_id: &str) -> Result<ThreadMetadata, BrokerError> {
        self.store.thread_metadata(thread_id).await
    }

    /// Thread history ordered by creation time.
    pub async fn thread_messages(&self, thread_id: &str) -> Result<ThreadMessages, BrokerError> {
        self.store.thread_messages(thread_id).await
    }

    /// Token observed by the worker and usable by adapters for their own
    /// graceful shutdown.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Signals shutdown and waits up to `drain_timeout` for the worker to
    /// finish its in-flight message.
    pub async fn shutdown(&self, drain_timeout: Duration) {
        self.cancel.cancel();
        let handle = self.worker_handle.lock().await.take();
        if let Some(handle) = handle
            && tokio::time::timeout(drain_timeout, handle).await.is_err()
        {
            warn!("worker did not drain within {drain_timeout:?}, abandoning");
        }
    }
}
