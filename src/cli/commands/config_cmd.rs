//! config command - Show the effective configuration

use std::process::ExitCode;

use anyhow::Result;
use serde_json::json;

use super::print_json;
use crate::cli::Context;

/// Print every setting with defaults applied.
///
/// The token itself is never shown, only whether its variable is set.
pub fn show(ctx: &Context) -> Result<ExitCode> {
    let config = &ctx.config;
    let poll = config.fork_poll();
    let consent_path = config
        .consent_path()
        .map(|p| p.display().to_string())
        .ok();
    let source = config.path().map(|p| p.display().to_string());
    let token_set = ctx.default_credential.is_configured();

    if ctx.json {
        print_json(&json!({
            "source": source,
            "forge": {
                "apiBase": config.api_base(),
                "tokenEnv": config.token_env(),
                "tokenSet": token_set,
                "userAgent": config.user_agent(),
            },
            "fork": {
                "pollAttempts": poll.attempts,
                "pollIntervalSecs": poll.interval.as_secs(),
            },
            "publish": {
                "branchName": config.branch_name(),
                "prTitle": config.pr_title(),
                "prBody": config.pr_body(),
                "commitMessage": config.commit_message(),
                "timeoutSecs": config.timeout().map(|t| t.as_secs()),
            },
            "consent": {
                "path": consent_path,
            },
        }))?;
        return Ok(ExitCode::SUCCESS);
    }

    match &source {
        Some(path) => println!("# loaded from {}", path),
        None => println!("# no config file, built-in defaults"),
    }
    println!("forge.api_base = {}", config.api_base());
    println!(
        "forge.token_env = {} ({})",
        config.token_env(),
        if token_set { "set" } else { "not set" }
    );
    if let Some(agent) = config.user_agent() {
        println!("forge.user_agent = {}", agent);
    }
    println!("fork.poll_attempts = {}", poll.attempts);
    println!("fork.poll_interval_secs = {}", poll.interval.as_secs());
    println!("publish.branch_name = {}", config.branch_name());
    println!("publish.pr_title = {}", config.pr_title());
    println!("publish.commit_message = {}", config.commit_message());
    match config.timeout() {
        Some(t) => println!("publish.timeout_secs = {}", t.as_secs()),
        None => println!("publish.timeout_secs = (none)"),
    }
    println!(
        "consent.path = {}",
        consent_path.as_deref().unwrap_or("(no home directory)")
    );
    Ok(ExitCode::SUCCESS)
}
