// SPDX-FileCopyrightText: 2026 Promptq Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP adapter exposing the broker engine over REST and SSE.
//!
//! The gateway is deliberately thin: each route maps 1:1 onto an engine
//! operation and each engine error maps onto one status code. All queueing,
//! streaming, and thread bookkeeping lives in `promptq-engine`.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{GatewayState, ServerConfig, start_server};
