//! consent
//!
//! Stored publication requests awaiting approval.
//!
//! A consent record captures everything needed to publish one change set
//! later: the repository URL, the files with their original and proposed
//! content, and the PR title and commit message. Approving a record turns
//! it into a [`ChangeSet`] and runs the workflow with the process-wide
//! default credential. Records are kept after approval.
//!
//! # Example
//!
//! ```no_run
//! use changeset_pr::consent::{ConsentFile, ConsentRecord, ConsentStore, FileConsentStore};
//!
//! let store = FileConsentStore::new("/var/lib/cspr/consent.json");
//! let record = ConsentRecord::new(
//!     "https://github.com/acme/widgets/blob/main/Dockerfile",
//!     vec![ConsentFile::new("Dockerfile", "FROM alpine:3.19\n").with_original("FROM ubuntu\n")],
//! );
//! store.save(&record).unwrap();
//! println!("registered {}", record.id);
//! ```

mod file_store;

pub use file_store::FileConsentStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::auth::DefaultCredential;
use crate::core::locator::parse_repository_url;
use crate::core::types::{ChangeSet, FileChange, ValidationError, DEFAULT_BRANCH_NAME};
use crate::forge::ForgeConnector;
use crate::workflow::{publish, PublishOptions, PublishOutcome, WorkflowFailure};

/// PR title for records registered without one.
pub const DEFAULT_CONSENT_PR_TITLE: &str = "✨ [Optimizer] Better Dockerfile";

/// Commit message for records registered without one.
pub const DEFAULT_CONSENT_COMMIT_MESSAGE: &str = "chore: optimize Dockerfile via Optimizer";

/// Errors from consent operations.
#[derive(Debug, Error)]
pub enum ConsentError {
    #[error("consent record not found: {0}")]
    NotFound(Uuid),

    #[error("failed to read consent store: {0}")]
    ReadError(String),

    #[error("failed to write consent store: {0}")]
    WriteError(String),

    #[error("consent record is not publishable: {0}")]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Publish(#[from] WorkflowFailure),
}

/// One file of a consent record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentFile {
    pub path: String,
    /// Content before the proposed change, kept for review.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_content: Option<String>,
    pub optimized_content: String,
}

impl ConsentFile {
    pub fn new(path: impl Into<String>, optimized_content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            original_content: None,
            optimized_content: optimized_content.into(),
        }
    }

    pub fn with_original(mut self, original: impl Into<String>) -> Self {
        self.original_content = Some(original.into());
        self
    }
}

/// A stored publication request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub id: Uuid,
    /// Repository URL as given by the requester; may name a branch.
    pub url: String,
    pub files: Vec<ConsentFile>,
    pub pr_title: String,
    pub commit_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ConsentRecord {
    /// New record with a fresh id and default title and message.
    pub fn new(url: impl Into<String>, files: Vec<ConsentFile>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            files,
            pr_title: DEFAULT_CONSENT_PR_TITLE.to_string(),
            commit_message: DEFAULT_CONSENT_COMMIT_MESSAGE.to_string(),
            pr_body: None,
            branch_name: None,
            created_at: Utc::now(),
        }
    }

    /// Build the change set this record asks to publish.
    ///
    /// A branch named in the URL becomes the base branch. The change set
    /// carries no credential.
    pub fn to_changeset(&self) -> Result<ChangeSet, ValidationError> {
        let location = parse_repository_url(&self.url)?;
        let mut builder = ChangeSet::builder(location.repo)
            .changes(
                self.files
                    .iter()
                    .map(|f| FileChange::new(f.path.as_str(), f.optimized_content.as_str())),
            )
            .branch_name(self.branch_name.as_deref().unwrap_or(DEFAULT_BRANCH_NAME))
            .base_branch(location.branch)
            .pr_title(self.pr_title.as_str())
            .commit_message(self.commit_message.as_str());
        if let Some(body) = &self.pr_body {
            builder = builder.pr_body(body.as_str());
        }
        let changeset = builder.build();
        changeset.validate()?;
        Ok(changeset)
    }
}

/// Persistence for consent records, keyed by id.
pub trait ConsentStore: Send + Sync {
    fn load(&self, id: &Uuid) -> Result<Option<ConsentRecord>, ConsentError>;

    /// Insert or replace the record with the same id.
    fn save(&self, record: &ConsentRecord) -> Result<(), ConsentError>;

    /// All records, oldest first.
    fn list(&self) -> Result<Vec<ConsentRecord>, ConsentError>;

    /// Returns whether a record was removed.
    fn remove(&self, id: &Uuid) -> Result<bool, ConsentError>;
}

/// Publish the change set stored under `id` with the service credential.
///
/// # Errors
///
/// - `NotFound` if no record has that id
/// - `Invalid` if the record does not form a valid change set
/// - `Publish` with the workflow's failure
pub async fn approve(
    store: &dyn ConsentStore,
    id: &Uuid,
    connector: &dyn ForgeConnector,
    default_credential: &DefaultCredential,
    options: PublishOptions,
) -> Result<PublishOutcome, ConsentError> {
    let record = store.load(id)?.ok_or(ConsentError::NotFound(*id))?;
    let changeset = record.to_changeset()?;
    info!(consent = %id, repo = %changeset.target_repo, "approving consent record");
    Ok(publish(connector, default_credential, changeset, options).await?)
}
