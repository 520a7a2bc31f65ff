//! core
//!
//! Domain types, repository URL parsing, and configuration.
//!
//! # Modules
//!
//! - [`types`] - Strong types: ChangeSet, FileChange, RepositoryRef, BranchName, Oid
//! - [`locator`] - Repository URL parsing
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Everything here is pure; no module in `core` performs network I/O

pub mod config;
pub mod locator;
pub mod types;
