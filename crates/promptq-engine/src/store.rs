// SPDX-FileCopyrightText: 2026 Promptq Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory message store, thread index, and admission control.
//!
//! The store is the single writer surface for message state: every
//! mutation (submit, transition, chunk append, cancel, dequeue) happens
//! under one write lock that also guards the scheduler heap and the thread
//! indices, so readers always observe a consistent view. No lock is held
//! across an await point.
//!
//! The scheduler does not support in-place removal; cancellation flips the
//! message state and [`MessageStore::dequeue`] discards heads that are no
//! longer queued. That re-check is the authoritative withdrawal mechanism.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::{Notify, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

use promptq_core::error::BrokerError;
use promptq_core::types::{
    MAX_PROMPT_LEN, MAX_THREAD_ID_LEN, MessageState, MessageStatus, Priority, ProcessingPreview,
    QueueSummary, QueuedMessage, QueuedPreview, SubmitReceipt, ThreadMetadata, ThreadMessages,
    ThreadSummary, truncate_preview,
};

use crate::scheduler::PriorityScheduler;

/// Outcome of a dequeue attempt.
#[derive(Debug)]
pub(crate) enum Dequeue {
    /// The head message was atomically moved to Processing; dispatch it.
    Dispatch(QueuedMessage),
    /// The head had been withdrawn (cancelled) and was discarded silently.
    Skipped,
    /// The scheduler is empty.
    Empty,
}

/// Extra data applied together with a state transition.
#[derive(Debug, Default)]
pub struct TransitionUpdate {
    /// Explicit final text for the Completed transition. When absent the
    /// concatenation of the recorded chunks is used.
    pub result: Option<String>,
    /// Error text for the Failed transition.
    pub error: Option<String>,
}

struct StoreState {
    messages: HashMap<Uuid, QueuedMessage>,
    scheduler: PriorityScheduler,
    /// thread id -> message ids in creation order.
    thread_index: HashMap<String, Vec<Uuid>>,
    thread_meta: HashMap<String, ThreadMetadata>,
    sequence: u64,
    queued: usize,
}

/// The authoritative table of all messages plus its derived indices.
pub struct MessageStore {
    state: RwLock<StoreState>,
    notify: Notify,
    max_queued: usize,
}

impl MessageStore {
    pub fn new(max_queued: usize) -> Self {
        Self {
            state: RwLock::new(StoreState {
                messages: HashMap::new(),
                scheduler: PriorityScheduler::new(),
                thread_index: HashMap::new(),
                thread_meta: HashMap::new(),
                sequence: 0,
                queued: 0,
            }),
            notify: Notify::new(),
            max_queued,
        }
    }

    /// Validates and admits a new message, enqueues it, and updates the
    /// thread indices. Wakes the dispatch worker.
    pub async fn submit(
        &self,
        user_message: &str,
        priority: Priority,
        thread_id: Option<String>,
    ) -> Result<SubmitReceipt, BrokerError> {
        if user_message.trim().is_empty() {
            return Err(BrokerError::InvalidInput(
                "message must not be empty".to_string(),
            ));
        }
        if user_message.chars().count() > MAX_PROMPT_LEN {
            return Err(BrokerError::InvalidInput(format!(
                "message exceeds {MAX_PROMPT_LEN} characters"
            )));
        }
        if let Some(tid) = &thread_id
            && tid.chars().count() > MAX_THREAD_ID_LEN
        {
            return Err(BrokerError::InvalidInput(format!(
                "thread_id exceeds {MAX_THREAD_ID_LEN} characters"
            )));
        }

        let mut state = self.state.write().await;

        if state.queued >= self.max_queued {
            return Err(BrokerError::QueueFull {
                capacity: self.max_queued,
            });
        }

        let sequence = state.sequence;
        state.sequence += 1;

        let message = QueuedMessage::new(
            user_message.to_string(),
            priority,
            thread_id.clone(),
            sequence,
        );
        let id = message.id;
        let created_at = message.created_at;

        state.scheduler.push(id, priority.rank(), sequence);
        state.queued += 1;

        if let Some(tid) = &thread_id {
            state.thread_index.entry(tid.clone()).or_default().push(id);
            let meta = state
                .thread_meta
                .entry(tid.clone())
                .or_insert_with(|| ThreadMetadata::new(tid.clone(), created_at));
            meta.message_count += 1;
            meta.last_activity = created_at;
            *meta.states.entry(MessageState::Queued).or_insert(0) += 1;
        }

        state.messages.insert(id, message);

        if let Some(tid) = &thread_id {
            enforce_thread_invariants(&state, tid);
        }

        let queue_position = queued_position(&state, id);

        info!(
            id = %id,
            priority = %priority,
            queue_size = state.queued,
            thread_id = thread_id.as_deref().unwrap_or("-"),
            "message enqueued"
        );

        self.notify.notify_one();

        Ok(SubmitReceipt {
            message_id: id,
            state: MessageState::Queued,
            queue_position,
            created_at,
            thread_id,
        })
    }

    /// Returns a snapshot of the message, if known.
    pub async fn get(&self, id: Uuid) -> Option<QueuedMessage> {
        self.state.read().await.messages.get(&id).cloned()
    }

    /// Full status projection with live queue position.
    pub async fn status(&self, id: Uuid) -> Result<MessageStatus, BrokerError> {
        let state = self.state.read().await;
        let message = state
            .messages
            .get(&id)
            .ok_or_else(|| BrokerError::not_found(id))?;
        Ok(projection(&state, message))
    }

    /// 0-indexed position among queued messages, `None` unless queued.
    pub async fn queue_position(&self, id: Uuid) -> Option<usize> {
        queued_position(&*self.state.read().await, id)
    }

    /// Applies a validated state transition, the only writer API for
    /// lifecycle changes. Updates timestamps and thread state counters.
    pub async fn transition(
        &self,
        id: Uuid,
        new_state: MessageState,
        update: TransitionUpdate,
    ) -> Result<QueuedMessage, BrokerError> {
        let mut state = self.state.write().await;
        apply_transition(&mut state, id, new_state, update)
    }

    /// Cancels a queued message. Fails with `NotCancellable` from any other
    /// state; the scheduler entry is withdrawn lazily at dequeue.
    pub async fn cancel(&self, id: Uuid) -> Result<QueuedMessage, BrokerError> {
        let mut state = self.state.write().await;
        let current = state
            .messages
            .get(&id)
            .ok_or_else(|| BrokerError::not_found(id))?
            .state;
        if current != MessageState::Queued {
            return Err(BrokerError::NotCancellable { state: current });
        }
        let cancelled = apply_transition(
            &mut state,
            id,
            MessageState::Cancelled,
            TransitionUpdate::default(),
        )?;
        info!(id = %id, "message cancelled");
        Ok(cancelled)
    }

    /// Appends a responder chunk, returning its index.
    pub async fn append_chunk(&self, id: Uuid, text: &str) -> Result<usize, BrokerError> {
        let mut state = self.state.write().await;
        let message = state
            .messages
            .get_mut(&id)
            .ok_or_else(|| BrokerError::not_found(id))?;
        message.chunks.push(text.to_string());
        Ok(message.chunks.len() - 1)
    }

    /// Pops the scheduler head and, if it is still queued, atomically moves
    /// it to Processing. Cancelled heads are discarded.
    pub(crate) async fn dequeue(&self) -> Dequeue {
        let mut state = self.state.write().await;
        let Some(id) = state.scheduler.pop() else {
            return Dequeue::Empty;
        };

        match state.messages.get(&id).map(|m| m.state) {
            Some(MessageState::Queued) => {
                match apply_transition(
                    &mut state,
                    id,
                    MessageState::Processing,
                    TransitionUpdate::default(),
                ) {
                    Ok(message) => Dequeue::Dispatch(message),
                    Err(e) => {
                        // Unreachable given the state check above.
                        error!(id = %id, error = %e, "dequeue transition refused");
                        Dequeue::Skipped
                    }
                }
            }
            Some(other) => {
                info!(id = %id, state = %other, "skipping withdrawn scheduler entry");
                Dequeue::Skipped
            }
            None => {
                warn!(id = %id, "scheduler entry without message record");
                Dequeue::Skipped
            }
        }
    }

    /// Suspends until a submit since the last wakeup.
    pub(crate) async fn wait_for_messages(&self) {
        self.notify.notified().await;
    }

    /// Queued messages in dispatch order.
    pub async fn list_queued(&self) -> Vec<QueuedPreview> {
        let state = self.state.read().await;
        queued_in_dispatch_order(&state)
            .into_iter()
            .map(|m| QueuedPreview {
                id: m.id,
                priority: m.priority,
                created_at: m.created_at,
                user_message: m.user_message.chars().take(100).collect(),
            })
            .collect()
    }

    /// Aggregate counts plus previews of the queue head and the in-flight
    /// message.
    pub async fn summary(&self) -> QueueSummary {
        let state = self.state.read().await;

        let mut counts: HashMap<MessageState, usize> = HashMap::new();
        for message in state.messages.values() {
            *counts.entry(message.state).or_insert(0) += 1;
        }

        let queued_messages = queued_in_dispatch_order(&state)
            .into_iter()
            .map(|m| QueuedPreview {
                id: m.id,
                priority: m.priority,
                created_at: m.created_at,
                user_message: m.user_message.chars().take(100).collect(),
            })
            .collect();

        let current_processing = state
            .messages
            .values()
            .find(|m| m.state == MessageState::Processing)
            .map(|m| ProcessingPreview {
                id: m.id,
                priority: m.priority,
                started_at: m.started_at,
                user_message: m.user_message.chars().take(100).collect(),
            });

        QueueSummary {
            total_queued: counts.get(&MessageState::Queued).copied().unwrap_or(0),
            total_processing: counts.get(&MessageState::Processing).copied().unwrap_or(0),
            total_completed: counts.get(&MessageState::Completed).copied().unwrap_or(0),
            total_failed: counts.get(&MessageState::Failed).copied().unwrap_or(0),
            total_cancelled: counts.get(&MessageState::Cancelled).copied().unwrap_or(0),
            queued_messages,
            current_processing,
        }
    }

    /// All thread summaries, most recently active first.
    pub async fn threads(&self) -> Vec<ThreadSummary> {
        let state = self.state.read().await;
        let mut summaries: Vec<ThreadSummary> = state
            .thread_meta
            .values()
            .map(|meta| {
                let preview = state
                    .thread_index
                    .get(&meta.thread_id)
                    .and_then(|ids| ids.last())
                    .and_then(|id| state.messages.get(id))
                    .map(|m| truncate_preview(&m.user_message));
                ThreadSummary {
                    thread_id: meta.thread_id.clone(),
                    message_count: meta.message_count,
                    created_at: meta.created_at,
                    last_activity: meta.last_activity,
                    last_message_preview: preview,
                }
            })
            .collect();
        summaries.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        summaries
    }

    /// Metadata for one thread.
    pub async fn thread_metadata(&self, thread_id: &str) -> Result<ThreadMetadata, BrokerError> {
        self.state
            .read()
            .await
            .thread_meta
            .get(thread_id)
            .cloned()
            .ok_or_else(|| BrokerError::not_found(thread_id))
    }

    /// Thread history, ordered by creation time ascending.
    pub async fn thread_messages(&self, thread_id: &str) -> Result<ThreadMessages, BrokerError> {
        let state = self.state.read().await;
        let ids = state
            .thread_index
            .get(thread_id)
            .ok_or_else(|| BrokerError::not_found(thread_id))?;
        let messages: Vec<MessageStatus> = ids
            .iter()
            .filter_map(|id| state.messages.get(id))
            .map(|m| projection(&state, m))
            .collect();
        Ok(ThreadMessages {
            thread_id: thread_id.to_string(),
            total_messages: messages.len(),
            messages,
        })
    }
}

/// Performs one lifecycle transition under the write lock.
fn apply_transition(
    state: &mut StoreState,
    id: Uuid,
    new_state: MessageState,
    update: TransitionUpdate,
) -> Result<QueuedMessage, BrokerError> {
    let message = state
        .messages
        .get_mut(&id)
        .ok_or_else(|| BrokerError::not_found(id))?;

    let old_state = message.state;
    if !old_state.can_transition_to(new_state) {
        return Err(BrokerError::InvalidTransition {
            from: old_state,
            to: new_state,
        });
    }

    let now = Utc::now();
    message.state = new_state;
    match new_state {
        MessageState::Processing => message.started_at = Some(now),
        MessageState::Completed => {
            message.completed_at = Some(now);
            message.result = Some(update.result.unwrap_or_else(|| message.chunks.concat()));
        }
        MessageState::Failed => {
            message.completed_at = Some(now);
            message.error = update.error.or_else(|| Some("unknown error".to_string()));
        }
        MessageState::Cancelled => message.completed_at = Some(now),
        MessageState::Queued => {}
    }

    let thread_id = message.thread_id.clone();
    let updated = message.clone();

    if old_state == MessageState::Queued {
        state.queued -= 1;
    }

    if let Some(tid) = &thread_id {
        if let Some(meta) = state.thread_meta.get_mut(tid) {
            let old = meta.states.entry(old_state).or_insert(0);
            *old = old.saturating_sub(1);
            *meta.states.entry(new_state).or_insert(0) += 1;
            meta.last_activity = now;
        }
        enforce_thread_invariants(state, tid);
    }

    info!(id = %id, from = %old_state, to = %new_state, "message state updated");
    Ok(updated)
}

/// Builds the read projection for one message.
fn projection(state: &StoreState, message: &QueuedMessage) -> MessageStatus {
    let queue_position = if message.state == MessageState::Queued {
        queued_position(state, message.id)
    } else {
        None
    };
    MessageStatus {
        message_id: message.id,
        state: message.state,
        user_message: message.user_message.clone(),
        priority: message.priority,
        created_at: message.created_at,
        started_at: message.started_at,
        completed_at: message.completed_at,
        result: message.result.clone(),
        error: message.error.clone(),
        queue_position,
        thread_id: message.thread_id.clone(),
    }
}

/// 0-indexed dispatch position of a queued message: the number of queued
/// messages with a smaller `(rank, sequence)` key.
fn queued_position(state: &StoreState, id: Uuid) -> Option<usize> {
    let message = state.messages.get(&id)?;
    if message.state != MessageState::Queued {
        return None;
    }
    let key = (message.priority.rank(), message.sequence);
    let ahead = state
        .messages
        .values()
        .filter(|m| m.state == MessageState::Queued && (m.priority.rank(), m.sequence) < key)
        .count();
    Some(ahead)
}

/// All queued messages sorted by `(rank, sequence)`.
fn queued_in_dispatch_order(state: &StoreState) -> Vec<&QueuedMessage> {
    let mut queued: Vec<&QueuedMessage> = state
        .messages
        .values()
        .filter(|m| m.state == MessageState::Queued)
        .collect();
    queued.sort_by_key(|m| (m.priority.rank(), m.sequence));
    queued
}

/// Store/index desync is a bug, not a runtime failure: log and exit.
fn enforce_thread_invariants(state: &StoreState, thread_id: &str) {
    let Some(meta) = state.thread_meta.get(thread_id) else {
        error!(thread_id, "thread metadata missing for indexed thread, aborting");
        std::process::abort();
    };
    let indexed = state
        .thread_index
        .get(thread_id)
        .map(Vec::len)
        .unwrap_or(0);
    let state_total: usize = meta.states.values().sum();
    if meta.message_count != indexed || state_total != meta.message_count {
        error!(
            thread_id,
            message_count = meta.message_count,
            indexed,
            state_total,
            "thread index desync detected, aborting"
        );
        std::process::abort();
    }
}
