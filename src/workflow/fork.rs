//! workflow::fork
//!
//! Fork creation and readiness polling.
//!
//! # Polling
//!
//! Forking completes asynchronously on the server. After requesting the
//! fork, the coordinator looks the fork up at most `attempts` times with
//! `interval` between lookups: the first lookup is immediate, so a fork
//! that already exists costs no waiting. "Not found" and transient
//! failures count as "not ready yet"; anything else aborts the poll.
//! Total waiting is bounded by `(attempts - 1) * interval`, and the run's
//! deadline cuts it short.

use std::time::Duration;

use tracing::{debug, info};

use super::deadline::Deadline;
use super::errors::{PublishError, TimeoutError};
use crate::core::types::RepositoryRef;
use crate::forge::{Forge, ForgeError, RepositoryInfo};

/// Bounded fixed-interval retry policy for fork readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForkPollPolicy {
    /// Maximum number of readiness lookups.
    pub attempts: u32,
    /// Spacing between lookups.
    pub interval: Duration,
}

impl Default for ForkPollPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            interval: Duration::from_secs(2),
        }
    }
}

impl ForkPollPolicy {
    /// Longest the poll can wait between lookups in total.
    pub fn max_wait(&self) -> Duration {
        self.interval * self.attempts.saturating_sub(1)
    }
}

/// Request a fork of `upstream` and return where it lives.
///
/// The fork's owner and name come from the service's answer, so renamed
/// forks are addressed correctly. If the service refuses with a validation
/// error (typically because the fork already exists), the fork is assumed
/// to be `<authenticated user>/<upstream name>`; the readiness poll then
/// confirms it.
pub async fn request_fork(
    forge: &dyn Forge,
    upstream: &RepositoryRef,
    deadline: Deadline,
) -> Result<RepositoryRef, PublishError> {
    match deadline.within(forge.create_fork(upstream)).await? {
        Ok(fork) => {
            info!(upstream = %upstream, fork = %fork.repo, "fork requested");
            Ok(fork.repo)
        }
        Err(ForgeError::ApiError {
            status: 422,
            message,
        }) => {
            let login = deadline.within(forge.authenticated_user()).await??;
            let fork = RepositoryRef::new(login, upstream.name.clone());
            info!(upstream = %upstream, fork = %fork, reason = %message, "assuming existing fork");
            Ok(fork)
        }
        Err(ForgeError::PermissionDenied(message)) => Err(PublishError::Permission(format!(
            "no write access to {} and fork was denied: {}",
            upstream, message
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Poll until `fork` is queryable.
///
/// # Errors
///
/// - `Timeout(ForkNotReady)` after `policy.attempts` unsuccessful lookups
/// - `Cancelled` if the deadline passes first
/// - the lookup's own error for anything other than "not ready"
pub async fn wait_until_ready(
    forge: &dyn Forge,
    fork: &RepositoryRef,
    policy: ForkPollPolicy,
    deadline: Deadline,
) -> Result<RepositoryInfo, PublishError> {
    for attempt in 1..=policy.attempts {
        if attempt > 1 {
            deadline.sleep(policy.interval).await?;
        }
        match deadline.within(forge.get_repository(fork)).await? {
            Ok(info) => {
                debug!(fork = %info.repo, attempt, "fork ready");
                return Ok(info);
            }
            Err(ForgeError::NotFound(_)) => {
                debug!(fork = %fork, attempt, "fork not ready yet");
            }
            Err(e) if e.is_transient() => {
                debug!(fork = %fork, attempt, error = %e, "fork lookup failed, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(TimeoutError::ForkNotReady {
        attempts: policy.attempts,
    }
    .into())
}
