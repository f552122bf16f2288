// SPDX-FileCopyrightText: 2026 Promptq Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end broker testing.
//!
//! `TestHarness` assembles an [`Engine`] backed by a [`MockResponder`] and
//! provides helpers to submit prompts, await terminal states, and collect
//! full event streams. Each harness is fully independent; tests may build
//! as many as they need.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use promptq_core::error::BrokerError;
use promptq_core::types::{MessageStatus, Priority, StreamEvent, SubmitReceipt};
use promptq_engine::{Engine, EngineConfig};

use crate::mock_responder::{MockResponder, MockScript};

/// Builder for creating broker test environments with configurable options.
pub struct TestHarnessBuilder {
    scripts: Vec<MockScript>,
    config: EngineConfig,
    paused: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            scripts: Vec::new(),
            config: EngineConfig::default(),
            paused: false,
        }
    }

    /// Queue a responder script; scripts are consumed in dispatch order.
    pub fn with_script(mut self, script: MockScript) -> Self {
        self.scripts.push(script);
        self
    }

    /// Queue a single-chunk response.
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.with_script(MockScript::text(text))
    }

    /// Cap the number of queued messages.
    pub fn with_queue_cap(mut self, cap: usize) -> Self {
        self.config.max_queue_size = cap;
        self
    }

    /// Override the per-message processing budget.
    pub fn with_processing_timeout(mut self, timeout: Duration) -> Self {
        self.config.processing_timeout = timeout;
        self
    }

    /// Override the per-subscriber event buffer.
    pub fn with_subscriber_buffer(mut self, buffer: usize) -> Self {
        self.config.subscriber_buffer = buffer;
        self
    }

    /// Build with the dispatch worker paused; call
    /// [`TestHarness::start_worker`] to resume. Used by ordering tests
    /// that need several messages queued before dispatch begins.
    pub fn paused(mut self) -> Self {
        self.paused = true;
        self
    }

    /// Build the harness.
    pub async fn build(self) -> TestHarness {
        let responder = Arc::new(MockResponder::with_scripts(self.scripts));
        let engine = Arc::new(Engine::new(self.config, responder.clone()));
        if !self.paused {
            engine.start().await;
        }
        TestHarness { engine, responder }
    }
}

/// A complete broker test environment with a scripted responder.
pub struct TestHarness {
    /// The engine under test.
    pub engine: Arc<Engine>,
    /// The scripted responder backing it.
    pub responder: Arc<MockResponder>,
}

impl TestHarness {
    /// Create a new builder.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Starts the dispatch worker (for harnesses built paused).
    pub async fn start_worker(&self) {
        self.engine.start().await;
    }

    /// Submits a normal-priority prompt.
    pub async fn submit(&self, prompt: &str) -> Result<SubmitReceipt, BrokerError> {
        self.engine.submit(prompt, Priority::Normal, None).await
    }

    /// Submits with explicit priority and thread.
    pub async fn submit_with(
        &self,
        prompt: &str,
        priority: Priority,
        thread_id: Option<&str>,
    ) -> Result<SubmitReceipt, BrokerError> {
        self.engine
            .submit(prompt, priority, thread_id.map(str::to_string))
            .await
    }

    /// Polls until the message reaches a terminal state.
    ///
    /// Panics after `timeout`; harness tests treat a stuck message as a
    /// failure, not a condition to handle.
    pub async fn wait_terminal(&self, id: Uuid, timeout: Duration) -> MessageStatus {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let status = self
                .engine
                .status(id)
                .await
                .unwrap_or_else(|e| panic!("status of {id} failed: {e}"));
            if status.state.is_terminal() {
                return status;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "message {id} still {} after {timeout:?}",
                    status.state
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Subscribes and collects the complete event stream: replay snapshot
    /// plus live tail, until the stream closes after its terminal event.
    pub async fn collect_events(&self, id: Uuid, timeout: Duration) -> Vec<StreamEvent> {
        let mut subscription = self
            .engine
            .subscribe(id)
            .await
            .unwrap_or_else(|e| panic!("subscribe to {id} failed: {e}"));

        let mut events = subscription.snapshot;
        let drain = async {
            while let Some(event) = subscription.receiver.recv().await {
                events.push(event);
            }
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            panic!("stream for {id} did not close within {timeout:?}");
        }
        events
    }

    /// Shuts the engine down, draining the in-flight message.
    pub async fn shutdown(&self) {
        self.engine.shutdown(Duration::from_secs(5)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptq_core::types::MessageState;

    #[tokio::test]
    async fn builder_creates_working_environment() {
        let harness = TestHarness::builder()
            .with_response("hello back")
            .build()
            .await;

        let receipt = harness.submit("hello").await.unwrap();
        let status = harness
            .wait_terminal(receipt.message_id, Duration::from_secs(2))
            .await;
        assert_eq!(status.state, MessageState::Completed);
        assert_eq!(status.result.as_deref(), Some("hello back"));
    }

    #[tokio::test]
    async fn paused_harness_keeps_messages_queued() {
        let harness = TestHarness::builder().paused().build().await;
        let receipt = harness.submit("waiting").await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        let status = harness.engine.status(receipt.message_id).await.unwrap();
        assert_eq!(status.state, MessageState::Queued);

        harness.start_worker().await;
        let status = harness
            .wait_terminal(receipt.message_id, Duration::from_secs(2))
            .await;
        assert_eq!(status.state, MessageState::Completed);
    }

    #[tokio::test]
    async fn collect_events_returns_chunks_and_terminal() {
        let harness = TestHarness::builder()
            .with_script(MockScript::chunks(["a", "b"]))
            .build()
            .await;

        let receipt = harness.submit("go").await.unwrap();
        harness
            .wait_terminal(receipt.message_id, Duration::from_secs(2))
            .await;

        let events = harness
            .collect_events(receipt.message_id, Duration::from_secs(2))
            .await;
        assert_eq!(events.len(), 3);
        assert!(events[2].is_terminal());
    }

    #[tokio::test]
    async fn harnesses_are_independent() {
        let h1 = TestHarness::builder().with_response("one").build().await;
        let h2 = TestHarness::builder().with_response("two").build().await;

        let r1 = h1.submit("a").await.unwrap();
        let s1 = h1.wait_terminal(r1.message_id, Duration::from_secs(2)).await;
        assert_eq!(s1.result.as_deref(), Some("one"));

        let summary = h2.engine.summary().await;
        assert_eq!(summary.total_completed, 0);
    }
}
