//! forge
//!
//! Abstraction for the remote hosting service.
//!
//! # Architecture
//!
//! The `Forge` trait defines every remote operation the publishing
//! workflow needs. The workflow only sees `dyn Forge`, obtained from a
//! [`ForgeConnector`] once the run's credential is known.
//!
//! - Remote calls happen only after the change set passed local validation
//! - A forge never retries; the workflow decides what a failure means
//!
//! # Modules
//!
//! - `traits`: Core `Forge` trait and request/response types
//! - [`github`]: GitHub implementation using the REST and Git Data APIs
//! - [`mock`]: In-memory hosting service for deterministic testing
//!
//! # Example
//!
//! ```ignore
//! use changeset_pr::forge::github::GitHubConnector;
//! use changeset_pr::forge::{ForgeConnector, CreatePrRequest};
//!
//! let connector = GitHubConnector::new("https://api.github.com", None)?;
//! let forge = connector.connect(credential);
//!
//! let pr = forge.create_pr(&upstream, CreatePrRequest {
//!     head: "octocat:optimize-all-services".to_string(),
//!     base: "main".to_string(),
//!     title: "Optimize".to_string(),
//!     body: None,
//!     draft: false,
//! }).await?;
//!
//! println!("Created PR #{}: {}", pr.number, pr.url);
//! ```

pub mod github;
pub mod mock;
mod traits;

pub use traits::*;
