// SPDX-FileCopyrightText: 2026 Promptq Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports the XDG hierarchy: `./promptq.toml` > `~/.config/promptq/promptq.toml`
//! > `/etc/promptq/promptq.toml` with environment variable overrides via the
//! `PROMPTQ_` prefix. A handful of bare environment names (`MAX_QUEUE_SIZE`,
//! `PROCESSING_TIMEOUT`, `KEEPALIVE_INTERVAL`, `HOST`, `PORT`, `LOG_LEVEL`)
//! are also honored for compatibility with existing deployments.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::PromptqConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/promptq/promptq.toml` (system-wide)
/// 3. `~/.config/promptq/promptq.toml` (user XDG config)
/// 4. `./promptq.toml` (local directory)
/// 5. Bare legacy environment names
/// 6. `PROMPTQ_*` environment variables
pub fn load_config() -> Result<PromptqConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no file lookup, no env).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<PromptqConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(PromptqConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<PromptqConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(PromptqConfig::default()))
        .merge(Toml::file(path))
        .merge(legacy_env_provider())
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(PromptqConfig::default()))
        .merge(Toml::file("/etc/promptq/promptq.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("promptq/promptq.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("promptq.toml"))
        .merge(legacy_env_provider())
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names. For example, `PROMPTQ_QUEUE_MAX_SIZE`
/// must map to `queue.max_size`, not `queue.max.size`.
fn env_provider() -> Env {
    Env::prefixed("PROMPTQ_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: PROMPTQ_QUEUE_MAX_SIZE -> "queue_max_size"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("agent_", "agent.", 1)
            .replacen("server_", "server.", 1)
            .replacen("queue_", "queue.", 1)
            .replacen("stream_", "stream.", 1)
            .replacen("anthropic_", "anthropic.", 1);
        mapped.into()
    })
}

/// Bare environment names recognized for compatibility, mapped onto their
/// config keys.
fn legacy_env_provider() -> Env {
    Env::raw()
        .only(&[
            "max_queue_size",
            "processing_timeout",
            "keepalive_interval",
            "host",
            "port",
            "log_level",
        ])
        .map(|key| {
            // Env keys arrive uppercased on most platforms; normalize first.
            let lower = key.as_str().to_ascii_lowercase();
            match lower.as_str() {
                "max_queue_size" => "queue.max_size".into(),
                "processing_timeout" => "queue.processing_timeout_secs".into(),
                "keepalive_interval" => "stream.keepalive_interval_secs".into(),
                "host" => "server.host".into(),
                "port" => "server.port".into(),
                "log_level" => "agent.log_level".into(),
                _ => lower.into(),
            }
        })
}
