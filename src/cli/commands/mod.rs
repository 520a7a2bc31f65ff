//! cli::commands
//!
//! Command dispatch, handlers and result reporting.
//!
//! # Async Commands
//!
//! Publishing talks to the hosting API, so handlers that publish build a
//! tokio runtime and `block_on` the workflow from the sync context.
//!
//! # Exit codes
//!
//! A workflow failure is reported (human text on stderr, or the
//! `{errorKind, step, message}` object on stdout with `--json`) and yields
//! a failing exit code. Local problems such as unreadable files surface as
//! `anyhow` errors printed by `main`.

mod config_cmd;
mod consent;
mod publish;

pub use config_cmd::show as config_show;
pub use consent::{approve, list, register, remove, show, RegisterRequest};
pub use publish::{publish, Manifest};

use std::future::Future;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde_json::json;

use super::args::{Command, ConfigCommand, ConsentCommand};
use super::Context;
use crate::forge::github::GitHubConnector;
use crate::workflow::{Deadline, PublishOptions, PublishOutcome, WorkflowFailure};

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<ExitCode> {
    match command {
        Command::Publish(args) => publish(ctx, args),
        Command::Consent { action } => match action {
            ConsentCommand::Register {
                url,
                files,
                originals,
                title,
                message,
                body,
                branch,
            } => register(
                ctx,
                RegisterRequest {
                    url,
                    files,
                    originals,
                    title,
                    message,
                    body,
                    branch,
                },
            ),
            ConsentCommand::Show { id } => show(ctx, &id),
            ConsentCommand::List => list(ctx),
            ConsentCommand::Approve { id, timeout } => approve(ctx, &id, timeout),
            ConsentCommand::Remove { id } => remove(ctx, &id),
        },
        Command::Config { action } => match action {
            ConfigCommand::Show => config_show(ctx),
        },
    }
}

/// Run `fut` to completion on a fresh runtime.
fn block_on<F: Future>(fut: F) -> Result<F::Output> {
    let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
    Ok(rt.block_on(fut))
}

/// GitHub connector for the configured API base.
fn connector(ctx: &Context) -> Result<GitHubConnector> {
    GitHubConnector::new(ctx.config.api_base(), ctx.config.user_agent())
        .with_context(|| format!("Failed to set up client for {}", ctx.config.api_base()))
}

/// Workflow options from config; `timeout_secs` overrides the configured
/// deadline. Must be called inside the runtime so the deadline is measured
/// on its clock.
fn publish_options(ctx: &Context, timeout_secs: Option<u64>) -> PublishOptions {
    let timeout = timeout_secs
        .map(Duration::from_secs)
        .or_else(|| ctx.config.timeout());
    PublishOptions {
        fork_poll: ctx.config.fork_poll(),
        deadline: Deadline::from_timeout(timeout),
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", text);
    Ok(())
}

/// Print a successful outcome.
fn report_outcome(ctx: &Context, outcome: &PublishOutcome) -> Result<ExitCode> {
    if ctx.json {
        let value = match outcome {
            PublishOutcome::Created { url, number } => json!({ "prUrl": url, "number": number }),
            PublishOutcome::AlreadyUpToDate { .. } => {
                serde_json::to_value(outcome).context("Failed to serialize outcome")?
            }
        };
        print_json(&value)?;
        return Ok(ExitCode::SUCCESS);
    }

    match outcome {
        PublishOutcome::Created { url, number } => {
            if ctx.quiet {
                println!("{}", url);
            } else {
                println!("Opened pull request #{}: {}", number, url);
            }
        }
        PublishOutcome::AlreadyUpToDate { url, message } => {
            if let Some(url) = url {
                println!("{}", url);
            }
            if !ctx.quiet {
                println!("Already up to date: {}", message);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Print a workflow failure and return the failing exit code.
fn report_failure(ctx: &Context, failure: &WorkflowFailure) -> Result<ExitCode> {
    if ctx.json {
        let value = serde_json::to_value(failure).context("Failed to serialize failure")?;
        print_json(&value)?;
    } else {
        eprintln!("error: {} [{}]", failure, failure.error_kind());
        if failure.error.is_retryable() && !ctx.quiet {
            eprintln!("hint: this error is usually temporary; try again later");
        }
    }
    Ok(ExitCode::FAILURE)
}
