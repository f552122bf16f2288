// SPDX-FileCopyrightText: 2026 Promptq Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across the broker engine and its adapters.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Maximum prompt length (in characters) accepted at submit time.
pub const MAX_PROMPT_LEN: usize = 10_000;

/// Maximum thread id length accepted at submit time.
pub const MAX_THREAD_ID_LEN: usize = 255;

/// Character budget for thread previews, including the `...` suffix.
pub const PREVIEW_LEN: usize = 100;

/// Lifecycle state of a queued message.
///
/// Allowed transitions: `Queued -> Processing`, `Queued -> Cancelled`,
/// `Processing -> Completed`, `Processing -> Failed`. Terminal states are
/// sinks.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageState {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl MessageState {
    /// All states, in declaration order. Used to pre-seed per-thread counters.
    pub const ALL: [MessageState; 5] = [
        MessageState::Queued,
        MessageState::Processing,
        MessageState::Completed,
        MessageState::Failed,
        MessageState::Cancelled,
    ];

    /// Whether this state is a sink in the transition graph.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MessageState::Completed | MessageState::Failed | MessageState::Cancelled
        )
    }

    /// Whether `self -> next` is an edge of the lifecycle graph.
    pub fn can_transition_to(self, next: MessageState) -> bool {
        matches!(
            (self, next),
            (MessageState::Queued, MessageState::Processing)
                | (MessageState::Queued, MessageState::Cancelled)
                | (MessageState::Processing, MessageState::Completed)
                | (MessageState::Processing, MessageState::Failed)
        )
    }
}

/// Scheduling priority of a message. High dispatches before Normal, which
/// dispatches before Low; FIFO within a priority.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Numeric rank used for heap ordering. Lower dispatches first.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }
}

/// A single unit of work: one user prompt and its processing record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMessage {
    /// Unique message identifier, assigned at submit.
    pub id: Uuid,
    /// The prompt text. Immutable after creation.
    pub user_message: String,
    /// Scheduling priority. Immutable.
    pub priority: Priority,
    /// Optional client-chosen thread grouping. Immutable.
    pub thread_id: Option<String>,
    /// Current lifecycle state.
    pub state: MessageState,
    /// Submit timestamp.
    pub created_at: DateTime<Utc>,
    /// Set on the transition to Processing.
    pub started_at: Option<DateTime<Utc>>,
    /// Set on any terminal transition.
    pub completed_at: Option<DateTime<Utc>>,
    /// The canonical final text on Completed.
    pub result: Option<String>,
    /// Human-readable error on Failed.
    pub error: Option<String>,
    /// Text fragments appended while Processing.
    pub chunks: Vec<String>,
    /// Submit counter, the FIFO tiebreaker within a priority.
    pub sequence: u64,
}

impl QueuedMessage {
    /// Creates a freshly-queued message with a random id.
    pub fn new(
        user_message: String,
        priority: Priority,
        thread_id: Option<String>,
        sequence: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_message,
            priority,
            thread_id,
            state: MessageState::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            chunks: Vec::new(),
            sequence,
        }
    }
}

/// One event on a message's broadcast stream.
///
/// `Chunk` and the terminal events form the durable, replayed sequence.
/// `Waiting` and `Started` are transient status notifications forwarded
/// only to subscribers connected at publish time.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The message is still queued; carries its queue position.
    Waiting { position: Option<usize> },
    /// The worker picked the message up.
    Started,
    /// One fragment of responder output.
    Chunk { index: usize, text: String },
    /// Terminal: processing completed with the given result.
    Done {
        result: String,
        completed_at: DateTime<Utc>,
    },
    /// Terminal: processing failed.
    Failed {
        message: String,
        completed_at: Option<DateTime<Utc>>,
    },
    /// Terminal: the message was cancelled while queued.
    Cancelled { completed_at: DateTime<Utc> },
}

impl StreamEvent {
    /// The wire-level event name.
    pub fn event_name(&self) -> &'static str {
        match self {
            StreamEvent::Waiting { .. } => "waiting",
            StreamEvent::Started => "started",
            StreamEvent::Chunk { .. } => "chunk",
            StreamEvent::Done { .. } => "done",
            StreamEvent::Failed { .. } => "error",
            StreamEvent::Cancelled { .. } => "cancelled",
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::Done { .. } | StreamEvent::Failed { .. } | StreamEvent::Cancelled { .. }
        )
    }

    /// Whether this event is recorded for replay to late subscribers.
    pub fn is_replayable(&self) -> bool {
        matches!(
            self,
            StreamEvent::Chunk { .. }
                | StreamEvent::Done { .. }
                | StreamEvent::Failed { .. }
                | StreamEvent::Cancelled { .. }
        )
    }
}

/// One event from a responder's output stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponderEvent {
    /// An incremental text fragment.
    Delta(String),
    /// Generation finished. When `result` is set it wins over the
    /// concatenation of the deltas as the canonical final text.
    Stop { result: Option<String> },
}

// --- Read-model projections ---

/// Response to a successful submit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub message_id: Uuid,
    pub state: MessageState,
    pub queue_position: Option<usize>,
    pub created_at: DateTime<Utc>,
    pub thread_id: Option<String>,
}

/// Full status projection of a message. `queue_position` is only set while
/// the message is queued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageStatus {
    pub message_id: Uuid,
    pub state: MessageState,
    pub user_message: String,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub queue_position: Option<usize>,
    pub thread_id: Option<String>,
}

/// One queued message in the queue summary, prompt truncated for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedPreview {
    pub id: Uuid,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub user_message: String,
}

/// The currently-processing message in the queue summary, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingPreview {
    pub id: Uuid,
    pub priority: Priority,
    pub started_at: Option<DateTime<Utc>>,
    pub user_message: String,
}

/// Aggregate view of the whole queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSummary {
    pub total_queued: usize,
    pub total_processing: usize,
    pub total_completed: usize,
    pub total_failed: usize,
    pub total_cancelled: usize,
    pub queued_messages: Vec<QueuedPreview>,
    pub current_processing: Option<ProcessingPreview>,
}

/// Per-thread aggregate metadata, maintained in lockstep with message
/// mutations. `states` counts always sum to `message_count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMetadata {
    pub thread_id: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub states: BTreeMap<MessageState, usize>,
}

impl ThreadMetadata {
    /// Creates empty metadata for a new thread with all state counters at zero.
    pub fn new(thread_id: String, created_at: DateTime<Utc>) -> Self {
        Self {
            thread_id,
            message_count: 0,
            created_at,
            last_activity: created_at,
            states: MessageState::ALL.iter().map(|s| (*s, 0)).collect(),
        }
    }
}

/// Thread listing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub last_message_preview: Option<String>,
}

/// Ordered history of a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessages {
    pub thread_id: String,
    pub total_messages: usize,
    pub messages: Vec<MessageStatus>,
}

/// Truncates `text` to the preview budget, appending `...` when cut.
pub fn truncate_preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_LEN {
        text.to_string()
    } else {
        let head: String = text.chars().take(PREVIEW_LEN - 3).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_sinks() {
        for terminal in [
            MessageState::Completed,
            MessageState::Failed,
            MessageState::Cancelled,
        ] {
            assert!(terminal.is_terminal());
            for next in MessageState::ALL {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn allowed_edges_match_lifecycle_graph() {
        let allowed = [
            (MessageState::Queued, MessageState::Processing),
            (MessageState::Queued, MessageState::Cancelled),
            (MessageState::Processing, MessageState::Completed),
            (MessageState::Processing, MessageState::Failed),
        ];
        for from in MessageState::ALL {
            for to in MessageState::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn priority_ranks_order_high_before_low() {
        assert!(Priority::High.rank() < Priority::Normal.rank());
        assert!(Priority::Normal.rank() < Priority::Low.rank());
    }

    #[test]
    fn priority_defaults_to_normal() {
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn state_serializes_lowercase() {
        let json = serde_json::to_string(&MessageState::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
        let parsed: MessageState = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(parsed, MessageState::Cancelled);
    }

    #[test]
    fn priority_round_trips_through_strings() {
        use std::str::FromStr;
        for p in [Priority::High, Priority::Normal, Priority::Low] {
            let s = p.to_string();
            assert_eq!(Priority::from_str(&s).unwrap(), p);
        }
    }

    #[test]
    fn new_message_starts_queued() {
        let msg = QueuedMessage::new("hello".into(), Priority::Normal, None, 7);
        assert_eq!(msg.state, MessageState::Queued);
        assert_eq!(msg.sequence, 7);
        assert!(msg.started_at.is_none());
        assert!(msg.completed_at.is_none());
        assert!(msg.chunks.is_empty());
    }

    #[test]
    fn thread_metadata_seeds_all_state_counters() {
        let meta = ThreadMetadata::new("t".into(), Utc::now());
        assert_eq!(meta.states.len(), 5);
        assert!(meta.states.values().all(|&n| n == 0));
        assert_eq!(meta.message_count, 0);
    }

    #[test]
    fn thread_metadata_state_keys_serialize_as_strings() {
        let meta = ThreadMetadata::new("t".into(), Utc::now());
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["states"]["queued"], 0);
        assert_eq!(json["states"]["completed"], 0);
    }

    #[test]
    fn transient_events_are_not_replayable() {
        assert!(!StreamEvent::Started.is_replayable());
        assert!(!StreamEvent::Waiting { position: Some(0) }.is_replayable());
        assert!(
            StreamEvent::Chunk {
                index: 0,
                text: "x".into()
            }
            .is_replayable()
        );
    }

    #[test]
    fn exactly_three_events_are_terminal() {
        let now = Utc::now();
        let terminal = [
            StreamEvent::Done {
                result: String::new(),
                completed_at: now,
            },
            StreamEvent::Failed {
                message: String::new(),
                completed_at: Some(now),
            },
            StreamEvent::Cancelled { completed_at: now },
        ];
        assert!(terminal.iter().all(StreamEvent::is_terminal));
        assert!(!StreamEvent::Started.is_terminal());
        assert!(
            !StreamEvent::Chunk {
                index: 0,
                text: String::new()
            }
            .is_terminal()
        );
    }

    #[test]
    fn failed_event_uses_error_wire_name() {
        let ev = StreamEvent::Failed {
            message: "boom".into(),
            completed_at: None,
        };
        assert_eq!(ev.event_name(), "error");
    }

    #[test]
    fn preview_truncation_is_char_safe() {
        let short = "short prompt";
        assert_eq!(truncate_preview(short), short);

        let long = "x".repeat(150);
        let preview = truncate_preview(&long);
        assert_eq!(preview.chars().count(), PREVIEW_LEN);
        assert!(preview.ends_with("..."));

        // Multi-byte characters must not be split.
        let unicode = "é".repeat(150);
        let preview = truncate_preview(&unicode);
        assert_eq!(preview.chars().count(), PREVIEW_LEN);
    }
}
