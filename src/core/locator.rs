//! core::locator
//!
//! Parse hosted repository URLs into owner, name and optional branch.
//!
//! # Accepted forms
//!
//! - `host/owner/repo`
//! - `host/owner/repo/tree/<branch>[/<path...>]`
//! - `host/owner/repo/blob/<branch>[/<path...>]`
//!
//! Each may carry an `https://` or `http://` scheme, a `www.` host prefix,
//! a trailing slash, a query string or fragment, and a `.git` suffix on the
//! repository name. The SSH form `git@host:owner/repo.git` is accepted too.
//! The host itself is not checked against a provider list, so Enterprise
//! installations parse the same way.
//!
//! # Example
//!
//! ```
//! use changeset_pr::core::locator::parse_repository_url;
//!
//! let loc = parse_repository_url("https://github.com/acme/widgets/tree/develop").unwrap();
//! assert_eq!(loc.repo.full_name(), "acme/widgets");
//! assert_eq!(loc.branch.as_deref(), Some("develop"));
//! ```

use super::types::{RepositoryRef, ValidationError};

/// A parsed repository URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryLocation {
    /// Host as written, without scheme or `www.` prefix.
    pub host: String,
    pub repo: RepositoryRef,
    /// Branch named by a `/tree/` or `/blob/` URL.
    pub branch: Option<String>,
}

/// Parse a repository URL.
///
/// # Errors
///
/// Returns `ValidationError::InvalidRepositoryUrl` if the URL matches none
/// of the accepted forms.
pub fn parse_repository_url(url: &str) -> Result<RepositoryLocation, ValidationError> {
    let invalid = || ValidationError::InvalidRepositoryUrl(url.to_string());

    let trimmed = url.trim();
    let trimmed = trimmed
        .split(['?', '#'])
        .next()
        .unwrap_or_default();

    let (host, path) = if let Some(rest) = trimmed.strip_prefix("git@") {
        rest.split_once(':').ok_or_else(invalid)?
    } else {
        let rest = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"))
            .unwrap_or(trimmed);
        rest.split_once('/').ok_or_else(invalid)?
    };

    let host = host.strip_prefix("www.").unwrap_or(host);
    if host.is_empty() || (!host.contains('.') && !host.contains(':') && host != "localhost") {
        return Err(invalid());
    }

    let segments: Vec<&str> = path.trim_end_matches('/').split('/').collect();
    if segments.len() < 2 {
        return Err(invalid());
    }

    let owner = segments[0];
    let name = segments[1].strip_suffix(".git").unwrap_or(segments[1]);
    if owner.is_empty() || name.is_empty() {
        return Err(invalid());
    }

    let branch = match &segments[2..] {
        [] => None,
        ["tree" | "blob", branch, ..] if !branch.is_empty() => Some(branch.to_string()),
        _ => return Err(invalid()),
    };

    Ok(RepositoryLocation {
        host: host.to_string(),
        repo: RepositoryRef::new(owner, name),
        branch,
    })
}
