// SPDX-FileCopyrightText: 2026 Promptq Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the promptq broker.

use thiserror::Error;

use crate::types::MessageState;

/// The primary error type used across the broker core and its adapters.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Submission rejected before admission (empty prompt, oversize prompt
    /// or thread id, unparseable priority).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Admission rejected because the queued-message cap was reached.
    /// Safe to retry after a delay.
    #[error("queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// Unknown message or thread identifier.
    #[error("not found: {id}")]
    NotFound { id: String },

    /// The requested state transition is not an edge of the lifecycle graph.
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: MessageState,
        to: MessageState,
    },

    /// Cancellation attempted on a message that is no longer queued.
    #[error("cannot cancel message in state: {state}")]
    NotCancellable { state: MessageState },

    /// Operation exceeded its wall-clock budget.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Responder backend errors (API failure, malformed stream, cancellation).
    #[error("responder error: {message}")]
    Responder {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Transport-level errors in the HTTP adapter (bind failure, closed stream).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration errors (invalid TOML, missing required values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BrokerError {
    /// Convenience constructor for [`BrokerError::NotFound`].
    pub fn not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound { id: id.to_string() }
    }

    /// Convenience constructor for a sourceless [`BrokerError::Responder`].
    pub fn responder(message: impl Into<String>) -> Self {
        Self::Responder {
            message: message.into(),
            source: None,
        }
    }
}
