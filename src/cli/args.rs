//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--config <path>`: Use this config file
//! - `--debug`: Enable debug logging
//! - `--log-json`: Emit logs as JSON lines on stderr
//! - `--json`: Machine-readable output on stdout
//! - `--quiet` / `-q`: Minimal output

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

/// cspr - publish a set of file changes as one commit and one pull request
#[derive(Parser, Debug)]
#[command(name = "cspr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Use this config file instead of the default locations
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Publish file changes as a single commit and pull request
    #[command(
        long_about = "Publish file changes as a single commit and pull request.\n\n\
            All files land in one commit on a dedicated branch of the target repository, \
            or of your fork when you cannot push to it. The branch is created or \
            force-updated, then a pull request is opened against the upstream base branch. \
            Re-running with the same content reports the existing pull request.",
        after_help = "\
EXAMPLES:
    # Publish one file with the defaults
    cspr publish --repo https://github.com/acme/widgets --file Dockerfile=./Dockerfile.new

    # Several files, custom branch, against a specific base
    cspr publish --repo acme/widgets --base develop --branch optimize \\
        --file api/Dockerfile=out/api --file web/Dockerfile=out/web

    # Everything from a manifest, result as JSON
    cspr publish --manifest changes.json --json"
    )]
    Publish(PublishArgs),

    /// Manage stored publication requests
    Consent {
        #[command(subcommand)]
        action: ConsentCommand,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

/// Arguments of `cspr publish`.
#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Target repository URL or owner/name
    #[arg(
        long,
        value_name = "URL",
        required_unless_present = "manifest",
        conflicts_with = "manifest"
    )]
    pub repo: Option<String>,

    /// File to publish: repository path and local source file
    #[arg(
        long = "file",
        value_name = "PATH=LOCAL",
        value_parser = parse_file_mapping,
        required_unless_present = "manifest",
        conflicts_with = "manifest"
    )]
    pub files: Vec<FileMapping>,

    /// JSON manifest with the repository and changes
    #[arg(long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: PublishOverrides,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

/// Flags that override config and manifest values.
#[derive(Args, Debug, Default, Clone)]
pub struct PublishOverrides {
    /// Branch to publish to
    #[arg(long)]
    pub branch: Option<String>,

    /// Base branch for the pull request [default: repository default]
    #[arg(long)]
    pub base: Option<String>,

    /// Pull request title
    #[arg(long)]
    pub title: Option<String>,

    /// Commit message
    #[arg(long)]
    pub message: Option<String>,

    /// Pull request body
    #[arg(long)]
    pub body: Option<String>,
}

/// One `--file PATH=LOCAL` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMapping {
    /// Path inside the repository.
    pub path: String,
    /// Local file holding the new content.
    pub local: PathBuf,
}

fn parse_file_mapping(s: &str) -> Result<FileMapping, String> {
    match s.split_once('=') {
        Some((path, local)) if !path.is_empty() && !local.is_empty() => Ok(FileMapping {
            path: path.to_string(),
            local: PathBuf::from(local),
        }),
        _ => Err(format!("expected PATH=LOCAL, got '{}'", s)),
    }
}

/// Consent subcommands.
#[derive(Subcommand, Debug)]
pub enum ConsentCommand {
    /// Store a publication request for later approval
    Register {
        /// Repository URL; a /tree/ or /blob/ branch becomes the base
        #[arg(long)]
        url: String,

        /// Proposed file content: repository path and local file
        #[arg(long = "file", value_name = "PATH=LOCAL", value_parser = parse_file_mapping, required = true)]
        files: Vec<FileMapping>,

        /// Current file content, kept for review
        #[arg(long = "original", value_name = "PATH=LOCAL", value_parser = parse_file_mapping)]
        originals: Vec<FileMapping>,

        /// Pull request title
        #[arg(long)]
        title: Option<String>,

        /// Commit message
        #[arg(long)]
        message: Option<String>,

        /// Pull request body
        #[arg(long)]
        body: Option<String>,

        /// Branch to publish to
        #[arg(long)]
        branch: Option<String>,
    },

    /// Show one stored request
    Show { id: Uuid },

    /// List stored requests, oldest first
    List,

    /// Publish a stored request with the service credential
    Approve {
        id: Uuid,

        /// Give up after this many seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Delete a stored request
    Remove { id: Uuid },
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_publish_with_files() {
        let cli = Cli::try_parse_from([
            "cspr",
            "publish",
            "--repo",
            "acme/widgets",
            "--file",
            "Dockerfile=./out/Dockerfile",
            "--file",
            "api/Dockerfile=./out/api",
            "--base",
            "develop",
        ])
        .unwrap();
        match cli.command {
            Command::Publish(args) => {
                assert_eq!(args.repo.as_deref(), Some("acme/widgets"));
                assert_eq!(args.files.len(), 2);
                assert_eq!(args.files[1].path, "api/Dockerfile");
                assert_eq!(args.files[1].local, PathBuf::from("./out/api"));
                assert_eq!(args.overrides.base.as_deref(), Some("develop"));
            }
            other => panic!("expected publish, got {:?}", other),
        }
    }

    #[test]
    fn publish_requires_repo_or_manifest() {
        assert!(Cli::try_parse_from(["cspr", "publish"]).is_err());
        assert!(Cli::try_parse_from(["cspr", "publish", "--manifest", "m.json"]).is_ok());
    }

    #[test]
    fn manifest_conflicts_with_repo() {
        let result = Cli::try_parse_from([
            "cspr",
            "publish",
            "--manifest",
            "m.json",
            "--repo",
            "acme/widgets",
            "--file",
            "a=b",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn file_mapping_needs_both_sides() {
        assert!(parse_file_mapping("Dockerfile").is_err());
        assert!(parse_file_mapping("=local").is_err());
        assert!(parse_file_mapping("path=").is_err());
        assert_eq!(
            parse_file_mapping("a/b=c=d").unwrap(),
            FileMapping {
                path: "a/b".into(),
                local: PathBuf::from("c=d"),
            }
        );
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["cspr", "config", "show", "--json", "--debug"]).unwrap();
        assert!(cli.json);
        assert!(cli.debug);
    }
}
