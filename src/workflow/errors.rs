//! workflow::errors
//!
//! Failure taxonomy for publishing runs.
//!
//! Every step returns a [`PublishError`]; the orchestrator tags it with the
//! [`WorkflowStep`] that produced it and hands the caller a
//! [`WorkflowFailure`]. Nothing is reinterpreted on the way out.

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::auth::AuthError;
use crate::core::types::ValidationError;
use crate::forge::ForgeError;

/// Steps of a publishing run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    Validate,
    ResolveCredential,
    ResolvePermissions,
    Fork,
    PollFork,
    BuildTree,
    PublishCommit,
    UpsertRef,
    OpenPr,
}

impl WorkflowStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStep::Validate => "validate",
            WorkflowStep::ResolveCredential => "resolve_credential",
            WorkflowStep::ResolvePermissions => "resolve_permissions",
            WorkflowStep::Fork => "fork",
            WorkflowStep::PollFork => "poll_fork",
            WorkflowStep::BuildTree => "build_tree",
            WorkflowStep::PublishCommit => "publish_commit",
            WorkflowStep::UpsertRef => "upsert_ref",
            WorkflowStep::OpenPr => "open_pr",
        }
    }
}

impl std::fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounded waits that ran out.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TimeoutError {
    #[error("fork not ready after {attempts} attempts")]
    ForkNotReady { attempts: u32 },
}

/// Why a step failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PublishError {
    /// Malformed input; never sent remotely.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Write access denied and the fork was denied too.
    #[error("permission denied: {0}")]
    Permission(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The provider refused a ref update outright.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    /// The caller's deadline passed.
    #[error("cancelled: deadline exceeded")]
    Cancelled,

    /// Structured provider failure, message passed through verbatim.
    #[error("{0}")]
    Remote(String),

    /// Connectivity, rate limit or server error. Retrying the run may help.
    #[error("transient network error: {0}")]
    TransientNetwork(String),
}

impl PublishError {
    /// Stable error kind name for callers.
    pub fn kind(&self) -> &'static str {
        match self {
            PublishError::Validation(_) => "ValidationError",
            PublishError::Auth(_) => "AuthError",
            PublishError::Permission(_) => "PermissionError",
            PublishError::NotFound(_) => "NotFoundError",
            PublishError::Conflict(_) => "ConflictError",
            PublishError::Timeout(_) => "TimeoutError",
            PublishError::Cancelled => "CancelledError",
            PublishError::Remote(_) => "RemoteError",
            PublishError::TransientNetwork(_) => "TransientNetworkError",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, PublishError::TransientNetwork(_))
    }
}

impl From<ForgeError> for PublishError {
    fn from(err: ForgeError) -> Self {
        if err.is_transient() {
            return PublishError::TransientNetwork(err.to_string());
        }
        match err {
            ForgeError::AuthFailed(msg) => PublishError::Auth(AuthError::Rejected(msg)),
            ForgeError::PermissionDenied(msg) => PublishError::Permission(msg),
            ForgeError::NotFound(msg) => PublishError::NotFound(msg),
            ForgeError::Conflict(msg) => PublishError::Conflict(msg),
            ForgeError::ApiError { message, .. } => PublishError::Remote(message),
            // Transient variants handled above
            ForgeError::RateLimited => PublishError::TransientNetwork("rate limited".into()),
            ForgeError::NetworkError(msg) => PublishError::TransientNetwork(msg),
        }
    }
}

/// The single failure result of a run.
///
/// Serializes as `{"errorKind": ..., "step": ..., "message": ...}`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{step} failed: {error}")]
pub struct WorkflowFailure {
    pub step: WorkflowStep,
    pub error: PublishError,
}

impl WorkflowFailure {
    pub fn new(step: WorkflowStep, error: impl Into<PublishError>) -> Self {
        Self {
            step,
            error: error.into(),
        }
    }

    pub fn error_kind(&self) -> &'static str {
        self.error.kind()
    }
}

impl Serialize for WorkflowFailure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Body<'a> {
            error_kind: &'static str,
            step: WorkflowStep,
            message: &'a str,
        }

        let message = self.error.to_string();
        Body {
            error_kind: self.error_kind(),
            step: self.step,
            message: &message,
        }
        .serialize(serializer)
    }
}
