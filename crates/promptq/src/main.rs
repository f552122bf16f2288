// SPDX-FileCopyrightText: 2026 Promptq Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! promptq - an asynchronous priority request broker in front of a single
//! AI worker.
//!
//! This is the binary entry point for the broker.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod serve;

/// promptq - queue prompts for a single AI worker, stream results back.
#[derive(Parser, Debug)]
#[command(name = "promptq", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the broker server.
    Serve {
        /// Path to a config file (overrides the XDG hierarchy).
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the resolved configuration and exit.
    Config {
        /// Path to a config file (overrides the XDG hierarchy).
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load(
    config: Option<&PathBuf>,
) -> Result<promptq_config::PromptqConfig, promptq_config::ConfigError> {
    match config {
        Some(path) => promptq_config::load_config_from_path(path),
        None => promptq_config::load_config(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            let config = match load(config.as_ref()) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("error: failed to load configuration: {e}");
                    return ExitCode::FAILURE;
                }
            };
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Commands::Config { config } => match load(config.as_ref()) {
            Ok(mut c) => {
                if c.anthropic.api_key.is_some() {
                    c.anthropic.api_key = Some("[redacted]".to_string());
                }
                println!("{c:#?}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: failed to load configuration: {e}");
                ExitCode::FAILURE
            }
        },
    }
}
