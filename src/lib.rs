//! changeset-pr - publish a set of file changes as one commit and one pull request
//!
//! Given a target repository and a set of `(path, content)` pairs, cspr
//! writes all files in a single commit on a dedicated branch, forking the
//! repository first when the caller cannot push to it, and opens one pull
//! request against the upstream base branch.
//!
//! # Architecture
//!
//! - [`core`] - Domain types, repository URL locator, configuration
//! - [`auth`] - Credential type and per-run credential resolution
//! - [`forge`] - Hosting service abstraction, GitHub REST adapter, in-memory mock
//! - [`workflow`] - The publish state machine and its steps
//! - [`consent`] - Stored publication requests and their approval
//! - [`cli`] - Command-line interface layer
//!
//! # Guarantees
//!
//! 1. Invalid change sets are rejected before any remote call
//! 2. All files land in exactly one commit whose parent is the base head
//! 3. A run never retries beyond the bounded fork poll
//! 4. Every failure names the step it happened in

pub mod auth;
pub mod cli;
pub mod consent;
pub mod core;
pub mod forge;
pub mod workflow;
