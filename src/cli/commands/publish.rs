//! publish command - Publish file changes as one commit and one pull request

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use serde::Deserialize;

use super::{block_on, connector, publish_options, report_failure, report_outcome};
use crate::cli::args::{FileMapping, PublishArgs, PublishOverrides};
use crate::cli::Context;
use crate::core::locator::parse_repository_url;
use crate::core::types::{ChangeSet, FileChange, RepositoryRef, ValidationError};
use crate::workflow::{self, WorkflowFailure, WorkflowStep};

/// Contents of a `--manifest` file.
///
/// ```json
/// {
///   "repo": "https://github.com/acme/widgets",
///   "changes": [{ "path": "Dockerfile", "content": "FROM alpine:3.19\n" }],
///   "pr_title": "Optimize images"
/// }
/// ```
///
/// Omitted fields fall back to the config file, then built-in defaults.
/// Command-line flags override the manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub repo: String,
    pub changes: Vec<FileChange>,
    #[serde(default)]
    pub branch_name: Option<String>,
    #[serde(default)]
    pub base_branch: Option<String>,
    #[serde(default)]
    pub pr_title: Option<String>,
    #[serde(default)]
    pub pr_body: Option<String>,
    #[serde(default)]
    pub commit_message: Option<String>,
}

impl Manifest {
    fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse manifest {}", path.display()))
    }

    fn from_args(repo: &str, files: &[FileMapping]) -> Result<Self> {
        Ok(Self {
            repo: repo.to_string(),
            changes: read_files(files)?,
            branch_name: None,
            base_branch: None,
            pr_title: None,
            pr_body: None,
            commit_message: None,
        })
    }
}

/// Publish the changes named on the command line or in a manifest.
pub fn publish(ctx: &Context, args: PublishArgs) -> Result<ExitCode> {
    let manifest = match (&args.manifest, &args.repo) {
        (Some(path), _) => Manifest::read(path)?,
        (None, Some(repo)) => Manifest::from_args(repo, &args.files)?,
        (None, None) => anyhow::bail!("Either --repo or --manifest is required"),
    };
    let changeset = match build_changeset(ctx, manifest, &args.overrides) {
        Ok(changeset) => changeset,
        Err(e) => return report_failure(ctx, &WorkflowFailure::new(WorkflowStep::Validate, e)),
    };
    let connector = connector(ctx)?;

    let result = block_on(async {
        let options = publish_options(ctx, args.timeout);
        workflow::publish(&connector, &ctx.default_credential, changeset, options).await
    })?;

    match result {
        Ok(outcome) => report_outcome(ctx, &outcome),
        Err(failure) => report_failure(ctx, &failure),
    }
}

/// Accepts repository URLs in any form the locator knows, or `owner/name`.
/// Returns the repository and the branch named by the URL, if any.
///
/// When neither form matches, the URL parse error is returned.
pub(crate) fn locate_repository(
    repo: &str,
) -> Result<(RepositoryRef, Option<String>), ValidationError> {
    parse_repository_url(repo)
        .map(|loc| (loc.repo, loc.branch))
        .or_else(|err| RepositoryRef::parse(repo).map(|r| (r, None)).map_err(|_| err))
}

/// Empty strings count as absent so defaults apply.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Read each local file as the content for its repository path.
pub(crate) fn read_files(files: &[FileMapping]) -> Result<Vec<FileChange>> {
    files
        .iter()
        .map(|m| {
            let content = fs::read_to_string(&m.local)
                .with_context(|| format!("Failed to read {}", m.local.display()))?;
            Ok(FileChange::new(m.path.as_str(), content))
        })
        .collect()
}

/// Layer flags over manifest values over config defaults.
fn build_changeset(
    ctx: &Context,
    manifest: Manifest,
    overrides: &PublishOverrides,
) -> Result<ChangeSet, ValidationError> {
    let (repo, url_branch) = locate_repository(&manifest.repo)?;
    let config = &ctx.config;

    let pick = |flag: &Option<String>, from_manifest: Option<String>, default: &str| {
        non_empty(flag.clone())
            .or_else(|| non_empty(from_manifest))
            .unwrap_or_else(|| default.to_string())
    };

    Ok(ChangeSet::builder(repo)
        .changes(manifest.changes)
        .branch_name(pick(&overrides.branch, manifest.branch_name, config.branch_name()))
        .base_branch(
            non_empty(overrides.base.clone())
                .or_else(|| non_empty(manifest.base_branch))
                .or(url_branch),
        )
        .pr_title(pick(&overrides.title, manifest.pr_title, config.pr_title()))
        .pr_body(pick(&overrides.body, manifest.pr_body, config.pr_body()))
        .commit_message(pick(
            &overrides.message,
            manifest.commit_message,
            config.commit_message(),
        ))
        .build())
}
