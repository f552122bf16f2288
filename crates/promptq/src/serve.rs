// SPDX-FileCopyrightText: 2026 Promptq Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `promptq serve` command implementation.
//!
//! Wires the engine to the Anthropic responder and the HTTP gateway, then
//! runs until SIGINT/SIGTERM. Shutdown order: stop accepting connections,
//! drain the in-flight message, exit.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use promptq_anthropic::{AnthropicResponder, AnthropicResponderConfig};
use promptq_config::PromptqConfig;
use promptq_core::error::BrokerError;
use promptq_engine::{Engine, EngineConfig, shutdown};
use promptq_gateway::{GatewayState, ServerConfig, start_server};

/// How long shutdown waits for the in-flight message before abandoning it.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs the `promptq serve` command.
pub async fn run_serve(config: PromptqConfig) -> Result<(), BrokerError> {
    init_tracing(&config.agent.log_level);

    info!(name = config.agent.name.as_str(), "starting promptq serve");

    let api_key = config
        .anthropic
        .api_key
        .clone()
        .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
        .ok_or_else(|| {
            BrokerError::Config(
                "Anthropic API key required. Set anthropic.api_key or the \
                 ANTHROPIC_API_KEY environment variable."
                    .to_string(),
            )
        })?;

    let responder = Arc::new(AnthropicResponder::new(&AnthropicResponderConfig {
        api_key,
        api_version: config.anthropic.api_version.clone(),
        model: config.anthropic.default_model.clone(),
        max_tokens: config.anthropic.max_tokens,
    })?);

    let engine = Arc::new(Engine::new(
        EngineConfig {
            max_queue_size: config.queue.max_size,
            processing_timeout: Duration::from_secs(config.queue.processing_timeout_secs),
            subscriber_buffer: config.stream.subscriber_buffer,
        },
        responder,
    ));
    engine.start().await;
    info!(
        max_queue_size = config.queue.max_size,
        processing_timeout_secs = config.queue.processing_timeout_secs,
        model = config.anthropic.default_model.as_str(),
        "engine started"
    );

    let cancel = shutdown::install_signal_handler();

    let state = GatewayState {
        engine: engine.clone(),
        keepalive_interval: Duration::from_secs(config.stream.keepalive_interval_secs),
    };
    let server_config = ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
    };

    start_server(&server_config, state, cancel.clone()).await?;

    // The server returned: the signal handler fired. Drain the worker.
    engine.shutdown(DRAIN_TIMEOUT).await;

    info!("promptq serve shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "promptq={log_level},promptq_engine={log_level},promptq_gateway={log_level},promptq_anthropic={log_level},warn"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
