//! core::config
//!
//! Configuration schema and loading.
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Config file
//! 3. CLI flags (not handled here)
//!
//! # Config Locations
//!
//! Searched in order:
//! 1. `$CSPR_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/cspr/config.toml`
//! 3. `~/.cspr/config.toml`
//!
//! # Example
//!
//! ```no_run
//! use changeset_pr::core::config::Config;
//!
//! let config = Config::load().unwrap();
//! println!("API base: {}", config.api_base());
//! println!("Fork poll attempts: {}", config.fork_poll().attempts);
//! ```

pub mod schema;

pub use schema::{ConsentConfig, FileConfig, ForgeConfig, ForkConfig, PublishConfig};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::core::types::{
    DEFAULT_BRANCH_NAME, DEFAULT_COMMIT_MESSAGE, DEFAULT_PR_BODY, DEFAULT_PR_TITLE,
};
use crate::forge::github::DEFAULT_API_BASE;
use crate::workflow::ForkPollPolicy;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "CSPR_CONFIG";

/// Default environment variable holding the service token.
pub const DEFAULT_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("home directory not found")]
    NoHomeDir,
}

/// Loaded configuration with defaults applied through accessors.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub file: FileConfig,
    path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default locations.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed or
    /// holds invalid values. A missing file is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_file() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file: FileConfig = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        file.validate()?;
        Ok(Self {
            file,
            path: Some(path.to_path_buf()),
        })
    }

    /// Configuration built in memory rather than read from disk.
    pub fn from_file(file: FileConfig) -> Self {
        Self { file, path: None }
    }

    fn find_config_file() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("cspr/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        let path = dirs::home_dir()?.join(".cspr/config.toml");
        path.exists().then_some(path)
    }

    /// Path of the file this config was loaded from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn forge(&self) -> Option<&ForgeConfig> {
        self.file.forge.as_ref()
    }

    fn publish(&self) -> Option<&PublishConfig> {
        self.file.publish.as_ref()
    }

    /// REST API base URL.
    pub fn api_base(&self) -> &str {
        self.forge()
            .and_then(|f| f.api_base.as_deref())
            .unwrap_or(DEFAULT_API_BASE)
    }

    /// Environment variable holding the service-wide default token.
    pub fn token_env(&self) -> &str {
        self.forge()
            .and_then(|f| f.token_env.as_deref())
            .unwrap_or(DEFAULT_TOKEN_ENV)
    }

    /// Configured User-Agent override.
    pub fn user_agent(&self) -> Option<&str> {
        self.forge().and_then(|f| f.user_agent.as_deref())
    }

    /// Fork readiness polling policy.
    pub fn fork_poll(&self) -> ForkPollPolicy {
        let defaults = ForkPollPolicy::default();
        let fork = self.file.fork.as_ref();
        ForkPollPolicy {
            attempts: fork
                .and_then(|f| f.poll_attempts)
                .unwrap_or(defaults.attempts),
            interval: fork
                .and_then(|f| f.poll_interval_secs)
                .map(Duration::from_secs)
                .unwrap_or(defaults.interval),
        }
    }

    pub fn branch_name(&self) -> &str {
        self.publish()
            .and_then(|p| p.branch_name.as_deref())
            .unwrap_or(DEFAULT_BRANCH_NAME)
    }

    pub fn pr_title(&self) -> &str {
        self.publish()
            .and_then(|p| p.pr_title.as_deref())
            .unwrap_or(DEFAULT_PR_TITLE)
    }

    pub fn pr_body(&self) -> &str {
        self.publish()
            .and_then(|p| p.pr_body.as_deref())
            .unwrap_or(DEFAULT_PR_BODY)
    }

    pub fn commit_message(&self) -> &str {
        self.publish()
            .and_then(|p| p.commit_message.as_deref())
            .unwrap_or(DEFAULT_COMMIT_MESSAGE)
    }

    /// Whole-run deadline, if configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.publish()
            .and_then(|p| p.timeout_secs)
            .map(Duration::from_secs)
    }

    /// Location of the consent record file.
    ///
    /// Defaults to `~/.cspr/consent.json`.
    pub fn consent_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = self.file.consent.as_ref().and_then(|c| c.path.clone()) {
            return Ok(path);
        }
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".cspr/consent.json"))
    }
}
