//! forge::traits
//!
//! Forge trait definition for interacting with remote hosting services.
//!
//! # Design
//!
//! The `Forge` trait is async because forge operations involve network I/O.
//! Every method addresses a repository explicitly, because one workflow
//! run talks to both the upstream repository and (possibly) a fork.
//! A forge instance is bound to one credential; [`ForgeConnector`] turns a
//! resolved credential into a forge while sharing the connection pool.
//!
//! # Example
//!
//! ```ignore
//! use changeset_pr::forge::{Forge, CreatePrRequest};
//!
//! async fn open(forge: &dyn Forge, repo: &RepositoryRef) -> Result<(), ForgeError> {
//!     let pr = forge.create_pr(repo, CreatePrRequest {
//!         head: "optimize-all-services".to_string(),
//!         base: "main".to_string(),
//!         title: "Optimize".to_string(),
//!         body: None,
//!         draft: false,
//!     }).await?;
//!     println!("Created PR #{}: {}", pr.number, pr.url);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use thiserror::Error;

use crate::auth::Credential;
use crate::core::types::{BranchName, Oid, RepositoryRef};

/// Errors from forge operations.
///
/// These map HTTP-level failure modes. The workflow layer decides what
/// each one means for the step that hit it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ForgeError {
    /// Authentication failed (invalid or expired token).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The credential is valid but not allowed to perform the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request conflicts with the current state of the resource.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Rate limit exceeded.
    #[error("rate limited")]
    RateLimited,

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API (first detail message when present)
        message: String,
    },

    /// Network or connection error.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl ForgeError {
    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ForgeError::NetworkError(_) | ForgeError::RateLimited => true,
            ForgeError::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Repository metadata relevant to publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    /// Owner and name as spelled by the hosting service.
    pub repo: RepositoryRef,
    pub default_branch: String,
    /// Whether the active credential may push to this repository.
    pub can_write: bool,
}

/// Result of a create-fork request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkInfo {
    /// Where the fork lives. Its name can differ from the upstream name.
    pub repo: RepositoryRef,
}

/// A commit and the root tree it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: Oid,
    pub tree_sha: Oid,
}

/// One regular-file blob, given by full content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub content: String,
}

impl TreeEntry {
    /// Git file mode for a regular, non-executable file.
    pub const MODE_REGULAR_FILE: &'static str = "100644";
}

/// Request to create a tree layered on an existing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTreeRequest {
    /// Entries not named in `entries` are inherited from this tree.
    pub base_tree: Oid,
    pub entries: Vec<TreeEntry>,
}

/// Request to create a commit object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCommitRequest {
    pub message: String,
    pub tree: Oid,
    pub parents: Vec<Oid>,
}

/// Request to create a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePrRequest {
    /// Head branch, `owner:branch` when it lives in a fork
    pub head: String,
    /// Base branch name (the branch to merge into)
    pub base: String,
    /// PR title
    pub title: String,
    /// PR body/description
    pub body: Option<String>,
    /// Create as draft
    pub draft: bool,
}

/// Pull request information returned from the forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    /// PR number
    pub number: u64,
    /// PR URL (web URL for viewing)
    pub url: String,
    /// Head branch name
    pub head: String,
    /// Base branch name
    pub base: String,
    /// PR title
    pub title: String,
}

/// The Forge trait for interacting with remote hosting services.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to allow use across async tasks.
///
/// # Error Handling
///
/// Reads of objects that may legitimately be absent (`get_branch`,
/// `find_pr_by_head`) return `Ok(None)` for "absent" and reserve
/// `NotFound` for an inaccessible repository.
#[async_trait]
pub trait Forge: Send + Sync {
    /// Get the forge name (e.g., "github").
    fn name(&self) -> &'static str;

    /// Login of the identity behind the credential.
    async fn authenticated_user(&self) -> Result<String, ForgeError>;

    /// Fetch repository metadata, including push permission.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the repository does not exist or is invisible
    /// - `AuthFailed` if the credential is rejected
    async fn get_repository(&self, repo: &RepositoryRef) -> Result<RepositoryInfo, ForgeError>;

    /// Request a fork of `repo` under the credential's identity.
    ///
    /// Forking completes asynchronously on the server. Requesting a fork
    /// that already exists returns the existing fork.
    async fn create_fork(&self, repo: &RepositoryRef) -> Result<ForkInfo, ForgeError>;

    /// Commit a branch points at, or `None` if the branch does not exist.
    async fn get_branch(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
    ) -> Result<Option<Oid>, ForgeError>;

    /// Fetch a commit and its root tree.
    async fn get_commit(&self, repo: &RepositoryRef, sha: &Oid) -> Result<CommitInfo, ForgeError>;

    /// Create a tree and return its sha.
    async fn create_tree(
        &self,
        repo: &RepositoryRef,
        request: CreateTreeRequest,
    ) -> Result<Oid, ForgeError>;

    /// Create a commit and return its sha.
    async fn create_commit(
        &self,
        repo: &RepositoryRef,
        request: CreateCommitRequest,
    ) -> Result<Oid, ForgeError>;

    /// Create `refs/heads/<branch>` pointing at `sha`.
    async fn create_branch(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
        sha: &Oid,
    ) -> Result<(), ForgeError>;

    /// Move an existing branch to `sha`.
    ///
    /// With `force`, the new commit need not descend from the old one.
    async fn update_branch(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
        sha: &Oid,
        force: bool,
    ) -> Result<(), ForgeError>;

    /// Open a pull request against `repo`.
    ///
    /// # Errors
    ///
    /// - `ApiError` with status 422 if validation fails (e.g. a PR for the
    ///   head already exists); the message is the provider's first detail
    async fn create_pr(
        &self,
        repo: &RepositoryRef,
        request: CreatePrRequest,
    ) -> Result<PullRequest, ForgeError>;

    /// Find an open pull request on `repo` by head (`owner:branch`).
    async fn find_pr_by_head(
        &self,
        repo: &RepositoryRef,
        head: &str,
    ) -> Result<Option<PullRequest>, ForgeError>;
}

/// Builds a forge bound to one credential.
///
/// Implementations share whatever is expensive (HTTP connection pool)
/// between the forges they hand out.
pub trait ForgeConnector: Send + Sync {
    fn connect(&self, credential: Credential) -> Box<dyn Forge>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forge_error_display() {
        assert_eq!(
            format!("{}", ForgeError::AuthFailed("expired token".into())),
            "authentication failed: expired token"
        );
        assert_eq!(
            format!("{}", ForgeError::NotFound("acme/widgets".into())),
            "not found: acme/widgets"
        );
        assert_eq!(format!("{}", ForgeError::RateLimited), "rate limited");
        assert_eq!(
            format!(
                "{}",
                ForgeError::ApiError {
                    status: 422,
                    message: "Validation failed".into()
                }
            ),
            "API error: 422 - Validation failed"
        );
        assert_eq!(
            format!("{}", ForgeError::NetworkError("connection refused".into())),
            "network error: connection refused"
        );
    }

    #[test]
    fn transient_errors() {
        assert!(ForgeError::NetworkError("reset".into()).is_transient());
        assert!(ForgeError::RateLimited.is_transient());
        assert!(ForgeError::ApiError {
            status: 502,
            message: "bad gateway".into()
        }
        .is_transient());
        assert!(!ForgeError::ApiError {
            status: 422,
            message: "invalid".into()
        }
        .is_transient());
        assert!(!ForgeError::NotFound("x".into()).is_transient());
        assert!(!ForgeError::AuthFailed("x".into()).is_transient());
    }
}
