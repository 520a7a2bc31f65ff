//! cli
//!
//! Command-line interface layer for cspr.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Load configuration and the process-wide default credential once
//! - Delegate to command handlers
//!
//! Results go to stdout; logs always go to stderr so `--json` output stays
//! parseable.

pub mod args;
pub mod commands;

pub use args::Cli;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::auth::DefaultCredential;
use crate::core::config::Config;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "CSPR_LOG";

/// Shared state for command handlers.
#[derive(Debug)]
pub struct Context {
    pub config: Config,
    pub default_credential: DefaultCredential,
    pub json: bool,
    pub quiet: bool,
}

/// Install the global tracing subscriber.
///
/// `--debug` wins over `CSPR_LOG`; without either the level is `info`
/// (`warn` when quiet).
pub fn init_tracing(debug: bool, log_json: bool, quiet: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new(if quiet { "warn" } else { "info" }))
    };

    let registry = tracing_subscriber::registry().with(filter);
    // Ignore the error if a subscriber is already installed (tests).
    let _ = if log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Config::load().context("Failed to load config"),
    }
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`. Workflow failures
/// are reported by the command and turned into a failing exit code;
/// everything else is returned as an error.
pub fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(cli.config.as_ref())?;
    let default_credential = DefaultCredential::from_env(config.token_env());

    let ctx = Context {
        config,
        default_credential,
        json: cli.json,
        quiet: cli.quiet,
    };

    commands::dispatch(cli.command, &ctx)
}
