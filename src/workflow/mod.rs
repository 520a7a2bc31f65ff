//! workflow
//!
//! Publishes a change set as one pull request.
//!
//! # State machine
//!
//! ```text
//! Start -> ResolvePermissions -> (Fork -> PollFork)? -> BuildTree
//!       -> PublishCommit -> UpsertRef -> OpenPr -> Done
//! ```
//!
//! Local validation and credential resolution run first and make no
//! remote calls. Any step can move the run to `Failed(step)`, which is
//! terminal: later steps are not attempted, nothing is retried (other than
//! the bounded fork poll) and objects already created are left in place.
//!
//! # Concurrency
//!
//! Each run owns its [`WorkflowContext`]; runs share only the connector's
//! HTTP pool. Two runs publishing the same branch race, and the last ref
//! update wins.
//!
//! # Example
//!
//! ```
//! use changeset_pr::auth::{Credential, DefaultCredential};
//! use changeset_pr::core::types::{ChangeSet, FileChange, RepositoryRef};
//! use changeset_pr::forge::mock::MockForge;
//! use changeset_pr::workflow::{publish, PublishOptions, PublishOutcome};
//!
//! # tokio_test::block_on(async {
//! let forge = MockForge::new();
//! let repo = RepositoryRef::new("acme", "widgets");
//! forge.add_repository(&repo, true);
//!
//! let changeset = ChangeSet::builder(repo)
//!     .change(FileChange::new("Dockerfile", "FROM alpine:3.19\n"))
//!     .build();
//! let default = DefaultCredential::new(Some(Credential::new("ghs_service")));
//!
//! let outcome = publish(&forge, &default, changeset, PublishOptions::default())
//!     .await
//!     .unwrap();
//! assert!(matches!(outcome, PublishOutcome::Created { number: 1, .. }));
//! # });
//! ```

mod context;
mod deadline;
mod errors;
mod fork;
mod permissions;
mod pull_request;
mod refs;
mod tree;

pub use context::{EffectiveRepo, WorkflowContext};
pub use deadline::Deadline;
pub use errors::{PublishError, TimeoutError, WorkflowFailure, WorkflowStep};
pub use fork::{request_fork, wait_until_ready, ForkPollPolicy};
pub use permissions::{resolve_permissions, Permissions};
pub use pull_request::{open_pull_request, PrSpec, PublishOutcome};
pub use refs::{upsert_ref, RefUpsert};
pub use tree::{build_tree, publish_commit, resolve_base, BaseCommit};

use std::future::Future;

use tracing::{info, instrument, warn};

use crate::auth::{resolve_credential, DefaultCredential};
use crate::core::types::{ChangeSet, ValidatedBranches};
use crate::forge::{Forge, ForgeConnector};

/// Where a run is in the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Start,
    Running(WorkflowStep),
    Done,
    Failed(WorkflowStep),
}

/// Knobs for one run.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishOptions {
    pub fork_poll: ForkPollPolicy,
    pub deadline: Deadline,
}

/// Drives one change set through the state machine.
pub struct Orchestrator<'a> {
    connector: &'a dyn ForgeConnector,
    default_credential: &'a DefaultCredential,
    options: PublishOptions,
    transitions: Vec<WorkflowState>,
    context: WorkflowContext,
}

impl<'a> Orchestrator<'a> {
    pub fn new(connector: &'a dyn ForgeConnector, default_credential: &'a DefaultCredential) -> Self {
        Self {
            connector,
            default_credential,
            options: PublishOptions::default(),
            transitions: vec![WorkflowState::Start],
            context: WorkflowContext::new(),
        }
    }

    pub fn with_options(mut self, options: PublishOptions) -> Self {
        self.options = options;
        self
    }

    /// States visited so far, starting with `Start`.
    pub fn transitions(&self) -> &[WorkflowState] {
        &self.transitions
    }

    /// Whether any state of the run was `step`.
    pub fn visited(&self, step: WorkflowStep) -> bool {
        self.transitions.contains(&WorkflowState::Running(step))
    }

    pub fn context(&self) -> &WorkflowContext {
        &self.context
    }

    fn enter(&mut self, step: WorkflowStep) {
        info!(step = %step, "workflow step");
        self.transitions.push(WorkflowState::Running(step));
    }

    fn fail(&mut self, step: WorkflowStep, error: impl Into<PublishError>) -> WorkflowFailure {
        let failure = WorkflowFailure::new(step, error);
        warn!(
            step = %step,
            error_kind = failure.error_kind(),
            error = %failure.error,
            "workflow failed"
        );
        self.transitions.push(WorkflowState::Failed(step));
        failure
    }

    async fn step<T, F>(&mut self, step: WorkflowStep, fut: F) -> Result<T, WorkflowFailure>
    where
        F: Future<Output = Result<T, PublishError>>,
    {
        self.enter(step);
        fut.await.map_err(|e| self.fail(step, e))
    }

    /// Run the whole workflow for `changeset`, consuming it.
    #[instrument(
        name = "publish",
        skip_all,
        fields(repo = %changeset.target_repo, branch = %changeset.branch_name)
    )]
    pub async fn publish(&mut self, changeset: ChangeSet) -> Result<PublishOutcome, WorkflowFailure> {
        self.enter(WorkflowStep::Validate);
        let branches = changeset
            .validate()
            .map_err(|e| self.fail(WorkflowStep::Validate, e))?;

        self.enter(WorkflowStep::ResolveCredential);
        let credential = resolve_credential(changeset.credential.as_ref(), self.default_credential)
            .map_err(|e| self.fail(WorkflowStep::ResolveCredential, e))?;

        let forge = self.connector.connect(credential);
        let outcome = self.run_remote(forge.as_ref(), &changeset, branches).await?;

        info!(url = outcome.url().unwrap_or("-"), "workflow done");
        self.transitions.push(WorkflowState::Done);
        Ok(outcome)
    }

    async fn run_remote(
        &mut self,
        forge: &dyn Forge,
        changeset: &ChangeSet,
        branches: ValidatedBranches,
    ) -> Result<PublishOutcome, WorkflowFailure> {
        let deadline = self.options.deadline;
        let policy = self.options.fork_poll;

        let perms = self
            .step(
                WorkflowStep::ResolvePermissions,
                resolve_permissions(forge, &changeset.target_repo, deadline),
            )
            .await?;
        let base_branch = perms
            .base_branch(branches.base_override.as_ref())
            .map_err(|e| self.fail(WorkflowStep::ResolvePermissions, e))?;
        let upstream = perms.repo.clone();
        self.context.set_upstream(upstream.clone());
        self.context.base_branch = Some(base_branch.clone());

        let effective = if perms.can_write {
            EffectiveRepo {
                repo: upstream.clone(),
                forked: false,
            }
        } else {
            let requested = self
                .step(WorkflowStep::Fork, request_fork(forge, &upstream, deadline))
                .await?;
            let ready = self
                .step(
                    WorkflowStep::PollFork,
                    wait_until_ready(forge, &requested, policy, deadline),
                )
                .await?;
            EffectiveRepo {
                repo: ready.repo,
                forked: true,
            }
        };
        self.context.fix_effective(effective.clone());
        info!(effective = %effective.repo, forked = effective.forked, "write target fixed");

        let mut candidates = vec![&effective.repo];
        if effective.forked {
            candidates.push(&upstream);
        }
        let (base, new_tree) = self
            .step(WorkflowStep::BuildTree, async {
                let base = resolve_base(forge, &candidates, &base_branch, deadline).await?;
                let tree =
                    build_tree(forge, &effective.repo, &base.tree, &changeset.changes, deadline)
                        .await?;
                Ok((base, tree))
            })
            .await?;
        self.context.base_commit = Some(base.sha.clone());
        self.context.base_tree = Some(base.tree.clone());
        self.context.new_tree = Some(new_tree.clone());

        let new_commit = self
            .step(
                WorkflowStep::PublishCommit,
                publish_commit(
                    forge,
                    &effective.repo,
                    &new_tree,
                    &base.sha,
                    &changeset.commit_message,
                    deadline,
                ),
            )
            .await?;
        self.context.new_commit = Some(new_commit.clone());

        self.step(
            WorkflowStep::UpsertRef,
            upsert_ref(forge, &effective.repo, &branches.branch, &new_commit, deadline),
        )
        .await?;

        let spec = PrSpec {
            head: effective.pr_head(&branches.branch),
            base: base_branch.as_str(),
            title: &changeset.pr_title,
            body: &changeset.pr_body,
        };
        self.step(
            WorkflowStep::OpenPr,
            open_pull_request(forge, &upstream, spec, deadline),
        )
        .await
    }
}

/// Publish `changeset` with a fresh [`Orchestrator`].
///
/// The change set's own credential is used when present, otherwise
/// `default_credential`.
pub async fn publish(
    connector: &dyn ForgeConnector,
    default_credential: &DefaultCredential,
    changeset: ChangeSet,
    options: PublishOptions,
) -> Result<PublishOutcome, WorkflowFailure> {
    Orchestrator::new(connector, default_credential)
        .with_options(options)
        .publish(changeset)
        .await
}
