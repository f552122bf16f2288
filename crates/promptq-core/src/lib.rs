// SPDX-FileCopyrightText: 2026 Promptq Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the promptq request broker.
//!
//! This crate provides the shared data model (message, thread metadata,
//! stream events, read projections), the error type, and the [`Responder`]
//! trait that the dispatch worker calls through. The engine and the HTTP
//! adapter both build on these definitions.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::BrokerError;
pub use traits::{Responder, ResponderStream};
pub use types::{MessageState, Priority, QueuedMessage, ResponderEvent, StreamEvent};
