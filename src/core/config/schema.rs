//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Example
//!
//! ```toml
//! [forge]
//! api_base = "https://github.example.com/api/v3"
//! token_env = "GITHUB_TOKEN"
//!
//! [fork]
//! poll_attempts = 5
//! poll_interval_secs = 2
//!
//! [publish]
//! branch_name = "optimize-all-services"
//! timeout_secs = 300
//!
//! [consent]
//! path = "/var/lib/cspr/consent.json"
//! ```
//!
//! # Validation
//!
//! Values are validated after parsing; every field is optional and falls
//! back to a default through the accessors on [`super::Config`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::BranchName;

/// Root of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub forge: Option<ForgeConfig>,
    pub fork: Option<ForkConfig>,
    pub publish: Option<PublishConfig>,
    pub consent: Option<ConsentConfig>,
}

impl FileConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(forge) = &self.forge {
            forge.validate()?;
        }
        if let Some(fork) = &self.fork {
            fork.validate()?;
        }
        if let Some(publish) = &self.publish {
            publish.validate()?;
        }
        Ok(())
    }
}

/// Hosting service connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ForgeConfig {
    /// REST API base URL (GitHub Enterprise: `https://host/api/v3`)
    pub api_base: Option<String>,

    /// Environment variable holding the service-wide default token
    pub token_env: Option<String>,

    /// User-Agent sent with every request
    pub user_agent: Option<String>,
}

impl ForgeConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(api_base) = &self.api_base {
            if !(api_base.starts_with("https://") || api_base.starts_with("http://")) {
                return Err(ConfigError::InvalidValue(format!(
                    "forge.api_base must be an http(s) URL, got '{}'",
                    api_base
                )));
            }
        }
        if let Some(token_env) = &self.token_env {
            if token_env.is_empty() || token_env.contains('=') {
                return Err(ConfigError::InvalidValue(
                    "forge.token_env must be a non-empty variable name".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Fork readiness polling.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ForkConfig {
    /// Number of readiness checks before giving up
    pub poll_attempts: Option<u32>,

    /// Seconds between readiness checks
    pub poll_interval_secs: Option<u64>,
}

impl ForkConfig {
    /// Upper bound on the interval; anything longer is almost certainly a typo.
    pub const MAX_INTERVAL_SECS: u64 = 300;

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_attempts == Some(0) {
            return Err(ConfigError::InvalidValue(
                "fork.poll_attempts must be at least 1".to_string(),
            ));
        }
        if let Some(secs) = self.poll_interval_secs {
            if secs > Self::MAX_INTERVAL_SECS {
                return Err(ConfigError::InvalidValue(format!(
                    "fork.poll_interval_secs must be at most {}",
                    Self::MAX_INTERVAL_SECS
                )));
            }
        }
        Ok(())
    }
}

/// Defaults applied to change sets that do not set their own values.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PublishConfig {
    pub branch_name: Option<String>,
    pub pr_title: Option<String>,
    pub pr_body: Option<String>,
    pub commit_message: Option<String>,

    /// Deadline for a whole run, in seconds
    pub timeout_secs: Option<u64>,
}

impl PublishConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(branch) = &self.branch_name {
            BranchName::new(branch.as_str()).map_err(|e| {
                ConfigError::InvalidValue(format!("invalid publish.branch_name: {}", e))
            })?;
        }
        if self.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue(
                "publish.timeout_secs must be greater than zero".to_string(),
            ));
        }
        for (key, value) in [
            ("pr_title", &self.pr_title),
            ("commit_message", &self.commit_message),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(ConfigError::InvalidValue(format!(
                    "publish.{} cannot be empty",
                    key
                )));
            }
        }
        Ok(())
    }
}

/// Consent store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConsentConfig {
    /// Location of the consent record file
    pub path: Option<PathBuf>,
}
