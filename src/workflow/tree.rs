//! workflow::tree
//!
//! Base resolution, tree construction and commit creation.
//!
//! # Base resolution
//!
//! The base commit is read from the branch ref of the effective repository.
//! When writing through a fork whose ref is not visible yet, the same
//! branch is read from upstream instead. A fork that exists but is still
//! empty answers with a conflict rather than a missing ref, so any failure
//! other than a rejected credential moves on to the next repository while
//! one remains. Only the ref lookup falls back:
//! the commit is then read from whichever repository answered, and the new
//! tree is always layered on that commit's tree.

use tracing::{debug, info};

use super::deadline::Deadline;
use super::errors::PublishError;
use crate::core::types::{BranchName, FileChange, Oid, RepositoryRef};
use crate::forge::{CreateCommitRequest, CreateTreeRequest, Forge, ForgeError, TreeEntry};

/// The commit a run builds on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseCommit {
    pub sha: Oid,
    pub tree: Oid,
    /// Repository whose ref supplied the commit.
    pub source: RepositoryRef,
}

/// Resolve the head of `branch`, trying each repository in turn.
///
/// `candidates` is the effective repository followed by the upstream when
/// they differ.
pub async fn resolve_base(
    forge: &dyn Forge,
    candidates: &[&RepositoryRef],
    branch: &BranchName,
    deadline: Deadline,
) -> Result<BaseCommit, PublishError> {
    for (i, repo) in candidates.iter().enumerate() {
        let has_fallback = i + 1 < candidates.len();
        let head = match deadline.within(forge.get_branch(repo, branch)).await? {
            Ok(Some(sha)) => sha,
            Ok(None) if has_fallback => {
                debug!(repo = %repo, branch = %branch, "base ref not visible, trying next repository");
                continue;
            }
            Err(e) if has_fallback && !matches!(e, ForgeError::AuthFailed(_)) => {
                debug!(repo = %repo, branch = %branch, error = %e, "base ref unreadable, trying next repository");
                continue;
            }
            Ok(None) => break,
            Err(e) => return Err(e.into()),
        };

        let commit = deadline.within(forge.get_commit(repo, &head)).await??;
        debug!(repo = %repo, branch = %branch, commit = %commit.sha.short(7), "resolved base");
        return Ok(BaseCommit {
            sha: commit.sha,
            tree: commit.tree_sha,
            source: (*repo).clone(),
        });
    }

    let searched: Vec<String> = candidates.iter().map(|r| r.full_name()).collect();
    Err(PublishError::NotFound(format!(
        "base branch '{}' not found in {}",
        branch,
        searched.join(" or ")
    )))
}

/// Create a tree that replaces `changes` on top of `base_tree`.
///
/// Paths not named in `changes` are inherited from the base tree.
pub async fn build_tree(
    forge: &dyn Forge,
    repo: &RepositoryRef,
    base_tree: &Oid,
    changes: &[FileChange],
    deadline: Deadline,
) -> Result<Oid, PublishError> {
    let request = CreateTreeRequest {
        base_tree: base_tree.clone(),
        entries: changes
            .iter()
            .map(|c| TreeEntry {
                path: c.path.clone(),
                content: c.content.clone(),
            })
            .collect(),
    };
    let tree = deadline.within(forge.create_tree(repo, request)).await??;
    info!(repo = %repo, tree = %tree.short(7), files = changes.len(), "created tree");
    Ok(tree)
}

/// Create a commit of `tree` whose sole parent is `parent`.
pub async fn publish_commit(
    forge: &dyn Forge,
    repo: &RepositoryRef,
    tree: &Oid,
    parent: &Oid,
    message: &str,
    deadline: Deadline,
) -> Result<Oid, PublishError> {
    let request = CreateCommitRequest {
        message: message.to_string(),
        tree: tree.clone(),
        parents: vec![parent.clone()],
    };
    let commit = deadline.within(forge.create_commit(repo, request)).await??;
    info!(repo = %repo, commit = %commit.short(7), parent = %parent.short(7), "created commit");
    Ok(commit)
}
