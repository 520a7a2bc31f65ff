//! workflow::deadline
//!
//! Caller-imposed deadline for a whole run.
//!
//! Every remote call goes through [`Deadline::within`] and every wait
//! through [`Deadline::sleep`], so an expired deadline aborts the run at
//! the next call boundary, including between poll attempts. Time comes from
//! `tokio::time`, so tests can run against a paused clock.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use super::errors::PublishError;

/// Optional point in time after which a run is cancelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No deadline.
    pub fn none() -> Self {
        Self(None)
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    /// Deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self(Some(Instant::now() + timeout))
    }

    /// `after(timeout)` when a timeout is given, otherwise no deadline.
    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        timeout.map(Self::after).unwrap_or_default()
    }

    pub fn instant(&self) -> Option<Instant> {
        self.0
    }

    pub fn is_expired(&self) -> bool {
        self.0.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail with `Cancelled` if the deadline already passed.
    pub fn check(&self) -> Result<(), PublishError> {
        if self.is_expired() {
            Err(PublishError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run `fut` unless the deadline passes first.
    ///
    /// The outer result carries cancellation; the inner one is the call's
    /// own result, so callers can still match on the forge error.
    pub async fn within<F: Future>(&self, fut: F) -> Result<F::Output, PublishError> {
        self.check()?;
        match self.0 {
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| PublishError::Cancelled),
            None => Ok(fut.await),
        }
    }

    /// Sleep for `duration`, or until the deadline if that comes first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), PublishError> {
        self.check()?;
        let wake = Instant::now() + duration;
        match self.0 {
            Some(deadline) if deadline <= wake => {
                tokio::time::sleep_until(deadline).await;
                Err(PublishError::Cancelled)
            }
            _ => {
                tokio::time::sleep_until(wake).await;
                Ok(())
            }
        }
    }
}
