//! workflow::pull_request
//!
//! Opens the pull request against the upstream repository.

use serde::Serialize;
use tracing::{info, warn};

use super::deadline::Deadline;
use super::errors::PublishError;
use crate::core::types::RepositoryRef;
use crate::forge::{CreatePrRequest, Forge, ForgeError};

/// Successful result of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PublishOutcome {
    /// A new pull request was opened.
    #[serde(rename_all = "camelCase")]
    Created { url: String, number: u64 },
    /// An open pull request for the same head already existed.
    #[serde(rename_all = "camelCase")]
    AlreadyUpToDate {
        /// URL of the existing PR, when it could be looked up.
        url: Option<String>,
        /// The service's explanation.
        message: String,
    },
}

impl PublishOutcome {
    pub fn url(&self) -> Option<&str> {
        match self {
            PublishOutcome::Created { url, .. } => Some(url),
            PublishOutcome::AlreadyUpToDate { url, .. } => url.as_deref(),
        }
    }
}

/// Parameters of the pull request.
#[derive(Debug, Clone)]
pub struct PrSpec<'a> {
    /// `branch` or `owner:branch`
    pub head: String,
    pub base: &'a str,
    pub title: &'a str,
    pub body: &'a str,
}

/// Open a PR on `upstream`, reusing an existing open one for the same head.
///
/// Any other refusal is surfaced as `Remote` with the service's first
/// detail message.
pub async fn open_pull_request(
    forge: &dyn Forge,
    upstream: &RepositoryRef,
    spec: PrSpec<'_>,
    deadline: Deadline,
) -> Result<PublishOutcome, PublishError> {
    let request = CreatePrRequest {
        head: spec.head.clone(),
        base: spec.base.to_string(),
        title: spec.title.to_string(),
        body: Some(spec.body.to_string()).filter(|b| !b.is_empty()),
        draft: false,
    };

    match deadline.within(forge.create_pr(upstream, request)).await? {
        Ok(pr) => {
            info!(repo = %upstream, number = pr.number, url = %pr.url, "opened pull request");
            Ok(PublishOutcome::Created {
                url: pr.url,
                number: pr.number,
            })
        }
        Err(ForgeError::ApiError {
            status: 422,
            message,
        }) if message.to_ascii_lowercase().contains("already exists") => {
            let existing = match deadline.within(forge.find_pr_by_head(upstream, &spec.head)).await? {
                Ok(found) => found,
                Err(e) => {
                    warn!(repo = %upstream, head = %spec.head, error = %e, "could not look up existing pull request");
                    None
                }
            };
            info!(repo = %upstream, head = %spec.head, "pull request already exists");
            Ok(PublishOutcome::AlreadyUpToDate {
                url: existing.map(|pr| pr.url),
                message,
            })
        }
        Err(e) => Err(e.into()),
    }
}
