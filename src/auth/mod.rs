//! auth
//!
//! Access credentials for the hosting API.
//!
//! # Resolution
//!
//! A run uses the credential attached to its change set when one is
//! present, and otherwise the process-wide default. The default is read
//! once at startup ([`DefaultCredential::from_env`]) and passed down
//! explicitly; nothing below the entry point reads the environment.
//!
//! # Security
//!
//! Tokens never appear in logs, error messages, or debug output.
//! [`Credential`] has a redacting `Debug` and no `Display`.
//!
//! # Example
//!
//! ```
//! use changeset_pr::auth::{resolve_credential, Credential, DefaultCredential};
//!
//! let default = DefaultCredential::new(Some(Credential::new("ghs_service")));
//! let explicit = Credential::new("ghu_user");
//!
//! let chosen = resolve_credential(Some(&explicit), &default).unwrap();
//! assert_eq!(chosen.expose(), "ghu_user");
//! assert!(!format!("{:?}", chosen).contains("ghu_user"));
//! ```

use thiserror::Error;

/// Errors from credential resolution and use.
///
/// Messages never include token values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Neither the request nor the process supplied a credential.
    #[error("no credential available: supply one with the request or configure a default token")]
    MissingCredential,

    /// The hosting service rejected the credential.
    #[error("credential rejected: {0}")]
    Rejected(String),
}

/// A bearer token for the hosting API.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for building an `Authorization` header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// The process-wide fallback credential, constructed once at startup.
#[derive(Debug, Clone, Default)]
pub struct DefaultCredential(Option<Credential>);

impl DefaultCredential {
    pub fn new(credential: Option<Credential>) -> Self {
        Self(credential)
    }

    /// No process-wide credential; every request must bring its own.
    pub fn none() -> Self {
        Self(None)
    }

    /// Read the default token from the named environment variable.
    ///
    /// Empty or whitespace-only values count as absent.
    pub fn from_env(var: &str) -> Self {
        let token = std::env::var(var)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        Self(token.map(Credential::new))
    }

    pub fn is_configured(&self) -> bool {
        self.0.is_some()
    }

    pub fn get(&self) -> Option<&Credential> {
        self.0.as_ref()
    }
}

/// Choose the credential for one run.
///
/// # Errors
///
/// Returns `AuthError::MissingCredential` if neither an explicit nor a
/// default credential is available.
pub fn resolve_credential(
    explicit: Option<&Credential>,
    default: &DefaultCredential,
) -> Result<Credential, AuthError> {
    explicit
        .or(default.get())
        .cloned()
        .ok_or(AuthError::MissingCredential)
}
