// SPDX-FileCopyrightText: 2026 Promptq Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for the promptq broker: a scripted mock responder and a
//! full-engine test harness.

pub mod harness;
pub mod mock_responder;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_responder::{MockResponder, MockScript};
