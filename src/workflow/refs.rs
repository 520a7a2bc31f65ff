//! workflow::refs
//!
//! Create-or-force-update of the publishing branch.
//!
//! Two branches, no loop: an absent ref is created, a present one is moved
//! with `force`. A branch already pointing at the new commit is left alone.
//! Concurrent runs on the same branch race and the last update wins.

use tracing::info;

use super::deadline::Deadline;
use super::errors::PublishError;
use crate::core::types::{BranchName, Oid, RepositoryRef};
use crate::forge::{Forge, ForgeError};

/// What the upsert did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefUpsert {
    Created,
    Updated { previous: Oid },
    /// The branch already pointed at the commit.
    Unchanged,
}

/// Point `branch` on `repo` at `commit`.
///
/// # Errors
///
/// `Conflict` if the service refuses the write (e.g. protected branch).
pub async fn upsert_ref(
    forge: &dyn Forge,
    repo: &RepositoryRef,
    branch: &BranchName,
    commit: &Oid,
    deadline: Deadline,
) -> Result<RefUpsert, PublishError> {
    let current = deadline.within(forge.get_branch(repo, branch)).await??;

    let (outcome, result) = match current {
        Some(previous) if &previous == commit => return Ok(RefUpsert::Unchanged),
        Some(previous) => (
            RefUpsert::Updated { previous },
            deadline
                .within(forge.update_branch(repo, branch, commit, true))
                .await?,
        ),
        None => (
            RefUpsert::Created,
            deadline
                .within(forge.create_branch(repo, branch, commit))
                .await?,
        ),
    };

    result.map_err(|e| match e {
        ForgeError::ApiError { status: 422, message } | ForgeError::Conflict(message) => {
            PublishError::Conflict(message)
        }
        other => other.into(),
    })?;

    info!(repo = %repo, branch = %branch, commit = %commit.short(7), ?outcome, "branch updated");
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::mock::{Method, MockForge, MockOperation};

    fn repo() -> RepositoryRef {
        RepositoryRef::new("acme", "widgets")
    }

    fn topic() -> BranchName {
        BranchName::new("optimize-all-services").unwrap()
    }

    #[tokio::test]
    async fn creates_absent_branch() {
        let forge = MockForge::new();
        let head = forge.add_repository(&repo(), true);
        let outcome = upsert_ref(&forge, &repo(), &topic(), &head, Deadline::none())
            .await
            .unwrap();
        assert_eq!(outcome, RefUpsert::Created);
        assert_eq!(forge.branch_head(&repo(), "optimize-all-services"), Some(head));
    }

    #[tokio::test]
    async fn force_updates_diverged_branch() {
        let forge = MockForge::new();
        let root = forge.add_repository(&repo(), true);
        let stale = forge.seed_commit(&repo(), "optimize-all-services", &[("x", "old")]);

        let outcome = upsert_ref(&forge, &repo(), &topic(), &root, Deadline::none())
            .await
            .unwrap();
        assert_eq!(outcome, RefUpsert::Updated { previous: stale });
        assert!(forge.operations().iter().any(|op| matches!(
            op,
            MockOperation::UpdateBranch { force: true, .. }
        )));
        assert_eq!(forge.branch_head(&repo(), "optimize-all-services"), Some(root));
    }

    #[tokio::test]
    async fn same_target_is_noop() {
        let forge = MockForge::new();
        forge.add_repository(&repo(), true);
        let head = forge.seed_commit(&repo(), "optimize-all-services", &[("x", "1")]);
        forge.clear_operations();

        let outcome = upsert_ref(&forge, &repo(), &topic(), &head, Deadline::none())
            .await
            .unwrap();
        assert_eq!(outcome, RefUpsert::Unchanged);
        assert!(forge.operations().iter().all(|op| !op.is_write()));
    }

    #[tokio::test]
    async fn rejected_update_is_conflict() {
        let forge = MockForge::new();
        let root = forge.add_repository(&repo(), true);
        forge.seed_commit(&repo(), "optimize-all-services", &[("x", "1")]);
        forge.fail_on(
            Method::UpdateBranch,
            ForgeError::ApiError {
                status: 422,
                message: "Protected branch update failed".into(),
            },
        );
        let err = upsert_ref(&forge, &repo(), &topic(), &root, Deadline::none())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PublishError::Conflict("Protected branch update failed".into())
        );
    }
}
