//! core::types
//!
//! Strong types for the change set domain.
//!
//! # Types
//!
//! - [`BranchName`] - Validated Git branch name
//! - [`Oid`] - Git object identifier (SHA) as returned by the hosting API
//! - [`RepositoryRef`] - `owner/name` pair identifying a hosted repository
//! - [`FileChange`] - Full replacement content for one path
//! - [`ChangeSet`] - The unit of work handed to the orchestrator
//!
//! # Validation
//!
//! `BranchName` and `Oid` enforce validity at construction time. A
//! `ChangeSet` is plain data (it arrives from manifests and consent
//! records) and is checked as a whole by [`ChangeSet::validate`] before
//! any remote call is made.
//!
//! # Examples
//!
//! ```
//! use changeset_pr::core::types::{BranchName, ChangeSet, FileChange, RepositoryRef};
//!
//! let changes = ChangeSet::builder(RepositoryRef::new("acme", "widgets"))
//!     .change(FileChange::new("Dockerfile", "FROM alpine:3.19\n"))
//!     .branch_name("optimize-all-services")
//!     .build();
//! assert!(changes.validate().is_ok());
//!
//! assert!(BranchName::new("invalid..name").is_err());
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::Credential;

/// Default branch the changes are published on.
pub const DEFAULT_BRANCH_NAME: &str = "optimize-all-services";

/// Default pull request title.
pub const DEFAULT_PR_TITLE: &str = "✨ Bulk Service Optimization";

/// Default pull request body.
pub const DEFAULT_PR_BODY: &str = "This Pull Request introduces security and performance \
optimizations across multiple services in the repository.";

/// Default commit message.
pub const DEFAULT_COMMIT_MESSAGE: &str = "Bulk optimization of multiple services";

/// Errors from type validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("invalid object id: {0}")]
    InvalidOid(String),
}

/// A change set that cannot be published as given.
///
/// These are caller errors. They are detected locally and are never
/// sent to the hosting service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid repository URL: {0}")]
    InvalidRepositoryUrl(String),

    #[error("duplicate path in change set: {0}")]
    DuplicatePath(String),

    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("change set contains no file changes")]
    EmptyChangeSet,

    #[error("{0}")]
    InvalidBranch(#[from] TypeError),

    #[error("invalid repository reference '{0}'")]
    InvalidRepository(String),
}

/// A validated Git branch name.
///
/// Branch names must conform to Git's refname rules (see `git check-ref-format`):
/// - Cannot be empty
/// - Cannot start with `.` or `-`
/// - Cannot end with `.lock` or `/`
/// - Cannot contain `..`, `@{`, `//`, or ASCII control characters
/// - Cannot contain spaces, `~`, `^`, `:`, `\`, `?`, `*`, `[`
/// - Cannot be exactly `@`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBranchName` if the name violates Git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        let invalid = |reason: &str| Err(TypeError::InvalidBranchName(reason.to_string()));

        if name.is_empty() {
            return invalid("branch name cannot be empty");
        }
        if name == "@" {
            return invalid("branch name cannot be '@' (reserved)");
        }
        if name.starts_with('.') || name.starts_with('-') || name.starts_with('/') {
            return invalid("branch name cannot start with '.', '-' or '/'");
        }
        if name.ends_with(".lock") || name.ends_with('/') {
            return invalid("branch name cannot end with '.lock' or '/'");
        }
        for pattern in ["..", "@{", "//"] {
            if name.contains(pattern) {
                return Err(TypeError::InvalidBranchName(format!(
                    "branch name cannot contain '{pattern}'"
                )));
            }
        }

        const INVALID_CHARS: [char; 8] = [' ', '~', '^', ':', '\\', '?', '*', '['];
        if let Some(c) = name.chars().find(|c| INVALID_CHARS.contains(c)) {
            return Err(TypeError::InvalidBranchName(format!(
                "branch name cannot contain '{c}'"
            )));
        }
        if name.chars().any(|c| c.is_ascii_control()) {
            return invalid("branch name cannot contain control characters");
        }

        for component in name.split('/') {
            if component.starts_with('.') {
                return invalid("path component cannot start with '.'");
            }
            if component.ends_with(".lock") {
                return invalid("path component cannot end with '.lock'");
            }
        }

        Ok(())
    }

    /// Get the branch name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The fully qualified ref for this branch (`refs/heads/<name>`).
    pub fn ref_path(&self) -> String {
        format!("refs/heads/{}", self.0)
    }
}

impl TryFrom<String> for BranchName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A Git object identifier (SHA-1 or SHA-256).
///
/// OIDs are normalized to lowercase for consistency.
///
/// ```
/// use changeset_pr::core::types::Oid;
///
/// let oid = Oid::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
/// assert_eq!(oid.as_str(), "abc123def4567890abc123def4567890abc12345");
/// assert_eq!(oid.short(7), "abc123d");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(String);

impl Oid {
    /// Create a new validated object id.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidOid` if the string is not a 40 or 64
    /// character hex string.
    pub fn new(oid: impl Into<String>) -> Result<Self, TypeError> {
        let oid = oid.into().to_ascii_lowercase();
        if oid.len() != 40 && oid.len() != 64 {
            return Err(TypeError::InvalidOid(format!(
                "expected 40 or 64 hex characters, got {}",
                oid.len()
            )));
        }
        if !oid.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidOid(
                "object id must be hexadecimal".into(),
            ));
        }
        Ok(Self(oid))
    }

    /// Wrap a digest computed in-process.
    pub(crate) fn from_digest(digest: &[u8]) -> Self {
        Self(hex::encode(digest))
    }

    /// Get an abbreviated form of the OID.
    pub fn short(&self, len: usize) -> &str {
        let end = len.min(self.0.len());
        &self.0[..end]
    }

    /// Get the object id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Oid {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self {
        oid.0
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A hosted repository, identified by owner and name.
///
/// Equality is case-sensitive. Refs obtained from the hosting API carry
/// the canonical spelling; refs typed by a user may not, which is why the
/// orchestrator re-reads the canonical pair before using it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub owner: String,
    pub name: String,
}

impl RepositoryRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse `owner/name`.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s.split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(owner, name))
            }
            _ => Err(ValidationError::InvalidRepository(s.to_string())),
        }
    }

    /// `owner/name` form.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl std::fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Full replacement content for one file.
///
/// `path` is relative to the repository root and forward-slash separated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub content: String,
}

impl FileChange {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    fn validate_path(&self) -> Result<(), ValidationError> {
        let invalid = |reason: &str| {
            Err(ValidationError::InvalidPath {
                path: self.path.clone(),
                reason: reason.to_string(),
            })
        };

        if self.path.is_empty() {
            return invalid("path cannot be empty");
        }
        if self.path.starts_with('/') {
            return invalid("path must be relative");
        }
        if self.path.contains('\\') {
            return invalid("path must use forward slashes");
        }
        if self.path.chars().any(|c| c.is_control()) {
            return invalid("path cannot contain control characters");
        }
        for segment in self.path.split('/') {
            match segment {
                "" => return invalid("path cannot contain empty segments"),
                "." | ".." => return invalid("path cannot contain '.' or '..' segments"),
                ".git" => return invalid("path cannot address the .git directory"),
                _ => {}
            }
        }
        Ok(())
    }
}

/// The unit of work submitted to the orchestrator.
///
/// A change set is consumed by exactly one workflow run. The optional
/// credential overrides the process-wide default for that run only and is
/// never serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSet {
    pub target_repo: RepositoryRef,
    pub changes: Vec<FileChange>,
    pub branch_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_branch_override: Option<String>,
    pub pr_title: String,
    #[serde(default = "default_pr_body")]
    pub pr_body: String,
    pub commit_message: String,
    #[serde(skip)]
    pub credential: Option<Credential>,
}

fn default_pr_body() -> String {
    DEFAULT_PR_BODY.to_string()
}

impl ChangeSet {
    /// Start building a change set for `target_repo` with default title,
    /// body, commit message and branch name.
    pub fn builder(target_repo: RepositoryRef) -> ChangeSetBuilder {
        ChangeSetBuilder {
            inner: ChangeSet {
                target_repo,
                changes: Vec::new(),
                branch_name: DEFAULT_BRANCH_NAME.to_string(),
                base_branch_override: None,
                pr_title: DEFAULT_PR_TITLE.to_string(),
                pr_body: DEFAULT_PR_BODY.to_string(),
                commit_message: DEFAULT_COMMIT_MESSAGE.to_string(),
                credential: None,
            },
        }
    }

    /// Check every local invariant of the change set.
    ///
    /// Returns the validated branch names (publish branch, optional base
    /// override) so callers do not re-parse them.
    pub fn validate(&self) -> Result<ValidatedBranches, ValidationError> {
        if self.target_repo.owner.is_empty() || self.target_repo.name.is_empty() {
            return Err(ValidationError::InvalidRepository(
                self.target_repo.full_name(),
            ));
        }
        if self.changes.is_empty() {
            return Err(ValidationError::EmptyChangeSet);
        }

        let mut seen = HashSet::with_capacity(self.changes.len());
        for change in &self.changes {
            change.validate_path()?;
            if !seen.insert(change.path.as_str()) {
                return Err(ValidationError::DuplicatePath(change.path.clone()));
            }
        }

        let branch = BranchName::new(self.branch_name.as_str())?;
        let base_override = self
            .base_branch_override
            .as_deref()
            .map(BranchName::new)
            .transpose()?;

        Ok(ValidatedBranches {
            branch,
            base_override,
        })
    }
}

/// Branch names extracted from a validated [`ChangeSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedBranches {
    pub branch: BranchName,
    pub base_override: Option<BranchName>,
}

/// Builder for [`ChangeSet`].
#[derive(Debug, Clone)]
pub struct ChangeSetBuilder {
    inner: ChangeSet,
}

impl ChangeSetBuilder {
    pub fn change(mut self, change: FileChange) -> Self {
        self.inner.changes.push(change);
        self
    }

    pub fn changes(mut self, changes: impl IntoIterator<Item = FileChange>) -> Self {
        self.inner.changes.extend(changes);
        self
    }

    pub fn branch_name(mut self, name: impl Into<String>) -> Self {
        self.inner.branch_name = name.into();
        self
    }

    pub fn base_branch(mut self, base: Option<String>) -> Self {
        self.inner.base_branch_override = base;
        self
    }

    pub fn pr_title(mut self, title: impl Into<String>) -> Self {
        self.inner.pr_title = title.into();
        self
    }

    pub fn pr_body(mut self, body: impl Into<String>) -> Self {
        self.inner.pr_body = body.into();
        self
    }

    pub fn commit_message(mut self, message: impl Into<String>) -> Self {
        self.inner.commit_message = message.into();
        self
    }

    pub fn credential(mut self, credential: Option<Credential>) -> Self {
        self.inner.credential = credential;
        self
    }

    pub fn build(self) -> ChangeSet {
        self.inner
    }
}
