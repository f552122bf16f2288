// SPDX-FileCopyrightText: 2026 Promptq Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-message broadcast streams with replay for late subscribers.
//!
//! Each message owns one stream: a replay buffer of durable events, a
//! terminal latch, and the set of live subscriber channels. Subscribing
//! atomically snapshots the replay buffer and registers the channel, so
//! every subscriber observes the same durable event sequence regardless of
//! when it attaches. Transient status events (`waiting`, `started`) are
//! forwarded to live subscribers but never replayed.
//!
//! Delivery to a subscriber uses a bounded channel with `try_send`; a
//! subscriber that falls behind is disconnected without stalling the
//! publisher or its peers. Once a terminal event is published the latch is
//! set, all senders are dropped (receivers drain buffered events and then
//! see end-of-stream), and later publishes are discarded.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use promptq_core::types::StreamEvent;

/// A new subscriber's view of a stream: everything durable published so
/// far, plus a channel for the live tail. The receiver closes after the
/// terminal event has been delivered (immediately, for a stream that was
/// already terminal at subscribe time).
#[derive(Debug)]
pub struct StreamSubscription {
    pub snapshot: Vec<StreamEvent>,
    pub receiver: mpsc::Receiver<StreamEvent>,
}

struct StreamState {
    replay: Vec<StreamEvent>,
    terminal: bool,
    subscribers: Vec<mpsc::Sender<StreamEvent>>,
}

impl StreamState {
    fn new() -> Self {
        Self {
            replay: Vec::new(),
            terminal: false,
            subscribers: Vec::new(),
        }
    }
}

/// Registry of per-message broadcast streams.
pub struct StreamHub {
    streams: DashMap<Uuid, Arc<Mutex<StreamState>>>,
    subscriber_buffer: usize,
}

impl StreamHub {
    /// Creates a hub whose subscribers each get a buffer of
    /// `subscriber_buffer` undelivered events before being disconnected.
    pub fn new(subscriber_buffer: usize) -> Self {
        Self {
            streams: DashMap::new(),
            subscriber_buffer: subscriber_buffer.max(1),
        }
    }

    /// Ensures a stream exists for `id`. Idempotent.
    pub fn create(&self, id: Uuid) {
        self.streams
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(StreamState::new())));
    }

    /// Whether a stream exists for `id`.
    pub fn contains(&self, id: Uuid) -> bool {
        self.streams.contains_key(&id)
    }

    fn stream(&self, id: Uuid) -> Arc<Mutex<StreamState>> {
        // Clone the Arc out so the dashmap shard is not held across await.
        self.streams
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(StreamState::new())))
            .clone()
    }

    /// Publishes `event` on the stream for `id`.
    ///
    /// Durable events are appended to the replay buffer before fan-out.
    /// Events arriving after the terminal latch has been set are dropped.
    pub async fn publish(&self, id: Uuid, event: StreamEvent) {
        let stream = self.stream(id);
        let mut state = stream.lock().await;

        if state.terminal {
            warn!(id = %id, event = event.event_name(), "event published after terminal, dropping");
            return;
        }

        if event.is_replayable() {
            state.replay.push(event.clone());
        }

        let terminal = event.is_terminal();

        // Fan out without blocking: a subscriber whose buffer is full is
        // disconnected; closed subscribers are pruned.
        state.subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(id = %id, "slow subscriber overran its buffer, disconnecting");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        if terminal {
            state.terminal = true;
            // Dropping the senders closes every receiver once it drains.
            state.subscribers.clear();
        }
    }

    /// Atomically snapshots the replay buffer and registers a new
    /// subscriber channel. Returns `None` when no stream exists for `id`.
    ///
    /// If the stream is already terminal the snapshot includes the terminal
    /// event and the returned receiver is closed.
    pub async fn subscribe(&self, id: Uuid) -> Option<StreamSubscription> {
        let stream = self.streams.get(&id).map(|s| Arc::clone(&s))?;
        let mut state = stream.lock().await;

        let snapshot = state.replay.clone();
        let (tx, rx) = mpsc::channel(self.subscriber_buffer);
        if !state.terminal {
            state.subscribers.push(tx);
        }
        // When terminal, tx drops here and rx reads as closed.

        Some(StreamSubscription {
            snapshot,
            receiver: rx,
        })
    }

    /// Number of live subscriber channels on the stream, for tests and
    /// diagnostics.
    pub async fn subscriber_count(&self, id: Uuid) -> usize {
        // Clone the Arc out before locking so no dashmap shard guard is
        // held across the await.
        let Some(stream) = self.streams.get(&id).map(|s| Arc::clone(&s)) else {
            return 0;
        };
        let state = stream.lock().await;
        state.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn chunk(index: usize, text: &str) -> StreamEvent {
        StreamEvent::Chunk {
            index,
            text: text.to_string(),
        }
    }

    fn done(result: &str) -> StreamEvent {
        StreamEvent::Done {
            result: result.to_string(),
            completed_at: Utc::now(),
        }
    }

    async fn drain(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        events
    }

    #[tokio::test]
    async fn live_subscriber_sees_events_in_publish_order() {
        let hub = StreamHub::new(16);
        let id = Uuid::new_v4();
        hub.create(id);

        let sub = hub.subscribe(id).await.unwrap();
        assert!(sub.snapshot.is_empty());

        hub.publish(id, chunk(0, "a")).await;
        hub.publish(id, chunk(1, "b")).await;
        hub.publish(id, done("ab")).await;

        let events = drain(sub.receiver).await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], chunk(0, "a"));
        assert_eq!(events[1], chunk(1, "b"));
        assert!(events[2].is_terminal());
    }

    #[tokio::test]
    async fn late_subscriber_replays_full_durable_prefix() {
        let hub = StreamHub::new(16);
        let id = Uuid::new_v4();
        hub.create(id);

        hub.publish(id, StreamEvent::Started).await;
        hub.publish(id, chunk(0, "a")).await;
        hub.publish(id, chunk(1, "b")).await;

        let sub = hub.subscribe(id).await.unwrap();
        // Transient `started` is not replayed; the chunks are.
        assert_eq!(sub.snapshot, vec![chunk(0, "a"), chunk(1, "b")]);

        hub.publish(id, done("ab")).await;
        let tail = drain(sub.receiver).await;
        assert_eq!(tail.len(), 1);
        assert!(tail[0].is_terminal());
    }

    #[tokio::test]
    async fn post_terminal_subscriber_gets_snapshot_and_closed_channel() {
        let hub = StreamHub::new(16);
        let id = Uuid::new_v4();
        hub.create(id);

        hub.publish(id, chunk(0, "x")).await;
        hub.publish(id, done("x")).await;

        let sub = hub.subscribe(id).await.unwrap();
        assert_eq!(sub.snapshot.len(), 2);
        assert!(sub.snapshot[1].is_terminal());

        let tail = drain(sub.receiver).await;
        assert!(tail.is_empty(), "channel must be closed with no live tail");
    }

    #[tokio::test]
    async fn events_after_terminal_are_dropped() {
        let hub = StreamHub::new(16);
        let id = Uuid::new_v4();
        hub.create(id);

        hub.publish(id, done("final")).await;
        hub.publish(id, chunk(99, "late")).await;

        let sub = hub.subscribe(id).await.unwrap();
        assert_eq!(sub.snapshot.len(), 1);
        assert!(sub.snapshot[0].is_terminal());
    }

    #[tokio::test]
    async fn slow_subscriber_is_disconnected_without_stalling_others() {
        let hub = StreamHub::new(1);
        let id = Uuid::new_v4();
        hub.create(id);

        let slow = hub.subscribe(id).await.unwrap();
        let mut fast = hub.subscribe(id).await.unwrap();
        assert_eq!(hub.subscriber_count(id).await, 2);

        // The fast subscriber keeps its 1-slot buffer drained; the slow one
        // never reads, so the second publish finds it full and drops it.
        hub.publish(id, chunk(0, "a")).await;
        assert_eq!(fast.receiver.recv().await, Some(chunk(0, "a")));
        hub.publish(id, chunk(1, "b")).await;
        assert_eq!(fast.receiver.recv().await, Some(chunk(1, "b")));
        assert_eq!(hub.subscriber_count(id).await, 1);

        drop(slow);
    }

    #[tokio::test]
    async fn dropped_subscriber_is_pruned_on_next_publish() {
        let hub = StreamHub::new(16);
        let id = Uuid::new_v4();
        hub.create(id);

        let sub = hub.subscribe(id).await.unwrap();
        drop(sub);

        hub.publish(id, chunk(0, "a")).await;
        assert_eq!(hub.subscriber_count(id).await, 0);
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let hub = StreamHub::new(16);
        let id = Uuid::new_v4();
        hub.create(id);
        hub.publish(id, chunk(0, "a")).await;
        hub.create(id);

        let sub = hub.subscribe(id).await.unwrap();
        assert_eq!(sub.snapshot, vec![chunk(0, "a")]);
    }

    #[tokio::test]
    async fn unknown_stream_yields_no_subscription() {
        let hub = StreamHub::new(16);
        assert!(hub.subscribe(Uuid::new_v4()).await.is_none());
    }
}
