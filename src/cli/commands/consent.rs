//! consent command - Register, inspect and approve stored publication requests

use std::process::ExitCode;

use anyhow::{bail, Context as _, Result};
use serde_json::json;
use uuid::Uuid;

use super::publish::read_files;
use super::{block_on, connector, print_json, publish_options, report_failure, report_outcome};
use crate::cli::args::FileMapping;
use crate::cli::Context;
use crate::consent::{self, ConsentError, ConsentFile, ConsentRecord, ConsentStore, FileConsentStore};
use crate::workflow::{WorkflowFailure, WorkflowStep};

/// Arguments of `cspr consent register`.
#[derive(Debug, Clone, Default)]
pub struct RegisterRequest {
    pub url: String,
    pub files: Vec<FileMapping>,
    pub originals: Vec<FileMapping>,
    pub title: Option<String>,
    pub message: Option<String>,
    pub body: Option<String>,
    pub branch: Option<String>,
}

fn open_store(ctx: &Context) -> Result<FileConsentStore> {
    let path = ctx
        .config
        .consent_path()
        .context("Failed to locate consent store")?;
    Ok(FileConsentStore::new(path))
}

fn load(store: &FileConsentStore, id: &Uuid) -> Result<ConsentRecord> {
    store
        .load(id)
        .context("Failed to read consent store")?
        .ok_or_else(|| anyhow::anyhow!("No consent record {}", id))
}

/// Store a new request after checking that it would form a valid change set.
pub fn register(ctx: &Context, request: RegisterRequest) -> Result<ExitCode> {
    let proposed = read_files(&request.files)?;
    let originals = read_files(&request.originals)?;

    let mut files: Vec<ConsentFile> = proposed
        .into_iter()
        .map(|change| ConsentFile::new(change.path, change.content))
        .collect();
    for original in originals {
        let Some(file) = files.iter_mut().find(|f| f.path == original.path) else {
            bail!("--original {} has no matching --file", original.path);
        };
        file.original_content = Some(original.content);
    }

    let present = |value: Option<String>| value.filter(|s| !s.trim().is_empty());
    let mut record = ConsentRecord::new(request.url, files);
    if let Some(title) = present(request.title) {
        record.pr_title = title;
    }
    if let Some(message) = present(request.message) {
        record.commit_message = message;
    }
    record.pr_body = present(request.body);
    record.branch_name = present(request.branch);
    if let Err(e) = record.to_changeset() {
        return report_failure(ctx, &WorkflowFailure::new(WorkflowStep::Validate, e));
    }

    let store = open_store(ctx)?;
    store.save(&record).context("Failed to save consent record")?;

    if ctx.json {
        print_json(&json!({ "id": record.id }))?;
    } else if ctx.quiet {
        println!("{}", record.id);
    } else {
        println!("Registered {} for {}", record.id, record.url);
    }
    Ok(ExitCode::SUCCESS)
}

/// Print one stored request.
pub fn show(ctx: &Context, id: &Uuid) -> Result<ExitCode> {
    let record = load(&open_store(ctx)?, id)?;

    if ctx.json {
        print_json(&serde_json::to_value(&record).context("Failed to serialize record")?)?;
        return Ok(ExitCode::SUCCESS);
    }

    println!("id:       {}", record.id);
    println!("url:      {}", record.url);
    println!("created:  {}", record.created_at.to_rfc3339());
    println!("title:    {}", record.pr_title);
    println!("message:  {}", record.commit_message);
    if let Some(branch) = &record.branch_name {
        println!("branch:   {}", branch);
    }
    println!("files:");
    for file in &record.files {
        let original = match &file.original_content {
            Some(content) => format!(", was {} bytes", content.len()),
            None => String::new(),
        };
        println!("  {} ({} bytes{})", file.path, file.optimized_content.len(), original);
    }
    Ok(ExitCode::SUCCESS)
}

/// List stored requests, oldest first.
pub fn list(ctx: &Context) -> Result<ExitCode> {
    let records = open_store(ctx)?
        .list()
        .context("Failed to read consent store")?;

    if ctx.json {
        let summaries: Vec<_> = records
            .iter()
            .map(|r| {
                json!({
                    "id": r.id,
                    "url": r.url,
                    "files": r.files.iter().map(|f| f.path.as_str()).collect::<Vec<_>>(),
                    "createdAt": r.created_at,
                })
            })
            .collect();
        print_json(&serde_json::Value::Array(summaries))?;
        return Ok(ExitCode::SUCCESS);
    }

    if records.is_empty() {
        if !ctx.quiet {
            println!("No consent records.");
        }
        return Ok(ExitCode::SUCCESS);
    }
    for r in &records {
        println!(
            "{}  {}  {}  ({} file{})",
            r.id,
            r.created_at.format("%Y-%m-%d %H:%M"),
            r.url,
            r.files.len(),
            if r.files.len() == 1 { "" } else { "s" }
        );
    }
    Ok(ExitCode::SUCCESS)
}

/// Publish a stored request with the service credential.
pub fn approve(ctx: &Context, id: &Uuid, timeout: Option<u64>) -> Result<ExitCode> {
    let store = open_store(ctx)?;
    let connector = connector(ctx)?;

    let result = block_on(async {
        let options = publish_options(ctx, timeout);
        consent::approve(&store, id, &connector, &ctx.default_credential, options).await
    })?;

    match result {
        Ok(outcome) => report_outcome(ctx, &outcome),
        Err(ConsentError::Publish(failure)) => report_failure(ctx, &failure),
        Err(ConsentError::Invalid(e)) => {
            report_failure(ctx, &WorkflowFailure::new(WorkflowStep::Validate, e))
        }
        Err(ConsentError::NotFound(id)) => bail!("No consent record {}", id),
        Err(e) => Err(e).context("Failed to approve consent record"),
    }
}

/// Delete a stored request.
pub fn remove(ctx: &Context, id: &Uuid) -> Result<ExitCode> {
    let removed = open_store(ctx)?
        .remove(id)
        .context("Failed to update consent store")?;
    if !removed {
        bail!("No consent record {}", id);
    }
    if !ctx.quiet && !ctx.json {
        println!("Removed {}", id);
    }
    Ok(ExitCode::SUCCESS)
}
