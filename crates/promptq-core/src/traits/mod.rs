// SPDX-FileCopyrightText: 2026 Promptq Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait definitions at the broker's external seams.

pub mod responder;

pub use responder::{Responder, ResponderStream};
