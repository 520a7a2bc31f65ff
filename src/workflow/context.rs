//! workflow::context
//!
//! Per-run state accumulated by the orchestrator.

use crate::core::types::{BranchName, Oid, RepositoryRef};

/// Where the run writes: the upstream itself or a fork of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveRepo {
    pub repo: RepositoryRef,
    pub forked: bool,
}

impl EffectiveRepo {
    /// PR head for `branch`: bare when same-repo, `owner:branch` from a fork.
    pub fn pr_head(&self, branch: &BranchName) -> String {
        if self.forked {
            format!("{}:{}", self.repo.owner, branch)
        } else {
            branch.to_string()
        }
    }
}

/// State owned by exactly one run. Never shared.
///
/// The effective repository is set once, at the fork decision; later
/// attempts to change it are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowContext {
    upstream: Option<RepositoryRef>,
    effective: Option<EffectiveRepo>,
    pub base_branch: Option<BranchName>,
    pub base_commit: Option<Oid>,
    pub base_tree: Option<Oid>,
    pub new_tree: Option<Oid>,
    pub new_commit: Option<Oid>,
}

impl WorkflowContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical upstream repository, as reported by the hosting service.
    pub fn upstream(&self) -> Option<&RepositoryRef> {
        self.upstream.as_ref()
    }

    pub fn set_upstream(&mut self, repo: RepositoryRef) {
        self.upstream.get_or_insert(repo);
    }

    pub fn effective(&self) -> Option<&EffectiveRepo> {
        self.effective.as_ref()
    }

    /// Fix the effective repository. Returns `false` if it was already set.
    pub fn fix_effective(&mut self, effective: EffectiveRepo) -> bool {
        if self.effective.is_some() {
            return false;
        }
        self.effective = Some(effective);
        true
    }
}
