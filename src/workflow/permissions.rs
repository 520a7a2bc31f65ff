//! workflow::permissions
//!
//! Write-access and default-branch discovery for the target repository.

use tracing::debug;

use super::deadline::Deadline;
use super::errors::PublishError;
use crate::core::types::{BranchName, RepositoryRef};
use crate::forge::{Forge, RepositoryInfo};

/// What the run needs to know about the upstream repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permissions {
    /// Canonical owner/name as reported by the service.
    pub repo: RepositoryRef,
    pub can_write: bool,
    pub default_branch: String,
}

impl From<RepositoryInfo> for Permissions {
    fn from(info: RepositoryInfo) -> Self {
        Self {
            repo: info.repo,
            can_write: info.can_write,
            default_branch: info.default_branch,
        }
    }
}

impl Permissions {
    /// Branch the PR merges into: the override if given, else the default.
    pub fn base_branch(&self, base_override: Option<&BranchName>) -> Result<BranchName, PublishError> {
        match base_override {
            Some(branch) => Ok(branch.clone()),
            None => BranchName::new(self.default_branch.as_str()).map_err(|e| {
                PublishError::Remote(format!(
                    "repository reports an unusable default branch: {}",
                    e
                ))
            }),
        }
    }
}

/// Fetch repository metadata with the active credential.
pub async fn resolve_permissions(
    forge: &dyn Forge,
    repo: &RepositoryRef,
    deadline: Deadline,
) -> Result<Permissions, PublishError> {
    let info = deadline.within(forge.get_repository(repo)).await??;
    debug!(
        repo = %info.repo,
        can_write = info.can_write,
        default_branch = %info.default_branch,
        "resolved permissions"
    );
    Ok(info.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::mock::{Method, MockForge};
    use crate::forge::ForgeError;

    #[tokio::test]
    async fn returns_canonical_repo() {
        let forge = MockForge::new();
        forge.add_repository(&RepositoryRef::new("Acme", "Widgets"), true);
        let perms = resolve_permissions(
            &forge,
            &RepositoryRef::new("acme", "widgets"),
            Deadline::none(),
        )
        .await
        .unwrap();
        assert_eq!(perms.repo, RepositoryRef::new("Acme", "Widgets"));
        assert!(perms.can_write);
        assert_eq!(perms.default_branch, "main");
    }

    #[tokio::test]
    async fn missing_repository_is_not_found() {
        let forge = MockForge::new();
        let err = resolve_permissions(&forge, &RepositoryRef::new("a", "b"), Deadline::none())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "NotFoundError");
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let forge = MockForge::new();
        forge.fail_on(
            Method::GetRepository,
            ForgeError::ApiError {
                status: 502,
                message: "bad gateway".into(),
            },
        );
        let err = resolve_permissions(&forge, &RepositoryRef::new("a", "b"), Deadline::none())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "TransientNetworkError");
    }

    #[test]
    fn base_branch_override_wins() {
        let perms = Permissions {
            repo: RepositoryRef::new("a", "b"),
            can_write: true,
            default_branch: "main".into(),
        };
        let dev = BranchName::new("develop").unwrap();
        assert_eq!(perms.base_branch(Some(&dev)).unwrap(), dev);
        assert_eq!(perms.base_branch(None).unwrap().as_str(), "main");
    }
}
