//! forge::github
//!
//! GitHub forge implementation using the REST API.
//!
//! # Design
//!
//! This module implements the `Forge` trait for GitHub. Repository
//! metadata, forks and pull requests use the repos/pulls endpoints;
//! trees, commits and branch refs use the Git Data API, so publishing
//! never needs a local clone.
//!
//! # Authentication
//!
//! A `GitHubForge` is bound to one [`Credential`] for its whole life. The
//! underlying `reqwest::Client` is cheap to clone and shares its
//! connection pool, so [`GitHubConnector`] hands out one forge per run.
//!
//! # Rate Limiting
//!
//! GitHub has rate limits. This implementation:
//! - Returns `ForgeError::RateLimited` when limits are hit
//! - Does not implement automatic retry (caller's responsibility)
//!
//! # Example
//!
//! ```ignore
//! use changeset_pr::forge::github::GitHubConnector;
//! use changeset_pr::forge::ForgeConnector;
//!
//! let connector = GitHubConnector::new("https://api.github.com", None)?;
//! let forge = connector.connect(credential);
//! let info = forge.get_repository(&RepositoryRef::new("acme", "widgets")).await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::traits::{
    CommitInfo, CreateCommitRequest, CreatePrRequest, CreateTreeRequest, Forge, ForgeConnector,
    ForgeError, ForkInfo, PullRequest, RepositoryInfo, TreeEntry,
};
use crate::auth::Credential;
use crate::core::types::{BranchName, Oid, RepositoryRef};

/// Default GitHub API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// User-Agent header value for API requests.
pub const USER_AGENT_VALUE: &str = concat!("cspr/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// GitHub forge implementation bound to one credential.
pub struct GitHubForge {
    /// HTTP client (shared connection pool)
    client: Client,
    /// Bearer credential for every request
    credential: Credential,
    /// API base URL (configurable for GitHub Enterprise)
    api_base: String,
}

// Custom Debug so the credential never leaks through `{:?}`
impl std::fmt::Debug for GitHubForge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubForge")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl GitHubForge {
    /// Create a forge against `api.github.com` with a fresh client.
    pub fn new(credential: Credential) -> Self {
        Self::with_client(Client::new(), credential, DEFAULT_API_BASE)
    }

    /// Create a forge reusing an existing client.
    ///
    /// Use this for GitHub Enterprise (`https://github.example.com/api/v3`)
    /// or to share a connection pool between runs.
    pub fn with_client(client: Client, credential: Credential, api_base: impl Into<String>) -> Self {
        Self {
            client,
            credential,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Build common headers for API requests.
    fn headers(&self) -> Result<HeaderMap, ForgeError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", self.credential.expose()))
            .map_err(|_| {
                ForgeError::AuthFailed("credential contains invalid header characters".into())
            })?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        Ok(headers)
    }

    /// Build an endpoint URL from path segments.
    ///
    /// Segments are percent-encoded individually, so branch names with
    /// reserved characters stay intact.
    fn endpoint<'a>(
        &self,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> Result<Url, ForgeError> {
        let mut url = Url::parse(&self.api_base).map_err(|e| {
            ForgeError::NetworkError(format!("invalid API base '{}': {}", self.api_base, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                ForgeError::NetworkError(format!("API base '{}' cannot be a base", self.api_base))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Build an endpoint under `/repos/{owner}/{name}/`.
    fn repo_endpoint<'a>(
        &self,
        repo: &'a RepositoryRef,
        rest: impl IntoIterator<Item = &'a str>,
    ) -> Result<Url, ForgeError> {
        self.endpoint(
            ["repos", repo.owner.as_str(), repo.name.as_str()]
                .into_iter()
                .chain(rest),
        )
    }

    /// Attach headers, send, and decode.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ForgeError> {
        let response = request
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|e| ForgeError::NetworkError(e.to_string()))?;
        self.handle_response(response).await
    }

    /// Handle API response, mapping errors appropriately.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Response,
    ) -> Result<T, ForgeError> {
        let status = response.status();
        debug!(status = status.as_u16(), url = %response.url().path(), "github response");

        if status.is_success() {
            response.json().await.map_err(|e| ForgeError::ApiError {
                status: status.as_u16(),
                message: format!("Failed to parse response: {}", e),
            })
        } else {
            Err(self.error_from_response(response, status).await)
        }
    }

    /// Map an error response from the API.
    async fn error_from_response(&self, response: Response, status: StatusCode) -> ForgeError {
        // Extract headers before consuming the body.
        let headers = response.headers();
        let rate_limit_exhausted = headers
            .get("X-RateLimit-Remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "0");
        let required_permissions = headers
            .get("X-Accepted-GitHub-Permissions")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let message = match response.json::<GitHubErrorResponse>().await {
            Ok(err) => err.first_message(),
            Err(_) => "Unknown error".to_string(),
        };

        match status {
            StatusCode::UNAUTHORIZED => ForgeError::AuthFailed("Invalid or expired token".into()),
            StatusCode::FORBIDDEN if rate_limit_exhausted => ForgeError::RateLimited,
            StatusCode::FORBIDDEN => {
                let mut err_msg = message;
                if let Some(perms) = required_permissions.filter(|p| !p.is_empty()) {
                    err_msg.push_str(&format!(" [required: {}]", perms));
                }
                ForgeError::PermissionDenied(err_msg)
            }
            StatusCode::NOT_FOUND => ForgeError::NotFound(message),
            StatusCode::CONFLICT => ForgeError::Conflict(message),
            StatusCode::TOO_MANY_REQUESTS => ForgeError::RateLimited,
            _ if status.is_server_error() => ForgeError::ApiError {
                status: status.as_u16(),
                message: format!("GitHub server error: {}", message),
            },
            _ => ForgeError::ApiError {
                status: status.as_u16(),
                message,
            },
        }
    }
}

#[async_trait]
impl Forge for GitHubForge {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn authenticated_user(&self) -> Result<String, ForgeError> {
        let url = self.endpoint(["user"])?;
        let user: GitHubOwner = self.send(self.client.get(url)).await?;
        Ok(user.login)
    }

    async fn get_repository(&self, repo: &RepositoryRef) -> Result<RepositoryInfo, ForgeError> {
        let url = self.repo_endpoint(repo, [])?;
        let gh: GitHubRepository = self.send(self.client.get(url)).await?;
        Ok(gh.into())
    }

    async fn create_fork(&self, repo: &RepositoryRef) -> Result<ForkInfo, ForgeError> {
        let url = self.repo_endpoint(repo, ["forks"])?;
        let gh: GitHubRepository = self
            .send(self.client.post(url).json(&serde_json::json!({})))
            .await?;
        Ok(ForkInfo {
            repo: RepositoryRef::new(gh.owner.login, gh.name),
        })
    }

    async fn get_branch(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
    ) -> Result<Option<Oid>, ForgeError> {
        let url = self.repo_endpoint(
            repo,
            ["git", "ref", "heads"]
                .into_iter()
                .chain(branch.as_str().split('/')),
        )?;
        match self.send::<GitHubRef>(self.client.get(url)).await {
            Ok(gh) => Ok(Some(gh.object.sha)),
            Err(ForgeError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_commit(&self, repo: &RepositoryRef, sha: &Oid) -> Result<CommitInfo, ForgeError> {
        let url = self.repo_endpoint(repo, ["git", "commits", sha.as_str()])?;
        let gh: GitHubCommit = self.send(self.client.get(url)).await?;
        Ok(CommitInfo {
            sha: gh.sha,
            tree_sha: gh.tree.sha,
        })
    }

    async fn create_tree(
        &self,
        repo: &RepositoryRef,
        request: CreateTreeRequest,
    ) -> Result<Oid, ForgeError> {
        let url = self.repo_endpoint(repo, ["git", "trees"])?;
        let body = CreateTreeBody {
            base_tree: request.base_tree.as_str(),
            tree: request.entries.iter().map(TreeItemBody::from).collect(),
        };
        let created: GitHubSha = self.send(self.client.post(url).json(&body)).await?;
        Ok(created.sha)
    }

    async fn create_commit(
        &self,
        repo: &RepositoryRef,
        request: CreateCommitRequest,
    ) -> Result<Oid, ForgeError> {
        let url = self.repo_endpoint(repo, ["git", "commits"])?;
        let body = CreateCommitBody {
            message: &request.message,
            tree: request.tree.as_str(),
            parents: request.parents.iter().map(Oid::as_str).collect(),
        };
        let created: GitHubSha = self.send(self.client.post(url).json(&body)).await?;
        Ok(created.sha)
    }

    async fn create_branch(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
        sha: &Oid,
    ) -> Result<(), ForgeError> {
        let url = self.repo_endpoint(repo, ["git", "refs"])?;
        let body = CreateRefBody {
            ref_name: branch.ref_path(),
            sha: sha.as_str(),
        };
        let _: IgnoredAny = self.send(self.client.post(url).json(&body)).await?;
        Ok(())
    }

    async fn update_branch(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
        sha: &Oid,
        force: bool,
    ) -> Result<(), ForgeError> {
        let url = self.repo_endpoint(
            repo,
            ["git", "refs", "heads"]
                .into_iter()
                .chain(branch.as_str().split('/')),
        )?;
        let body = UpdateRefBody {
            sha: sha.as_str(),
            force,
        };
        let _: IgnoredAny = self.send(self.client.patch(url).json(&body)).await?;
        Ok(())
    }

    async fn create_pr(
        &self,
        repo: &RepositoryRef,
        request: CreatePrRequest,
    ) -> Result<PullRequest, ForgeError> {
        let url = self.repo_endpoint(repo, ["pulls"])?;
        let body = CreatePrBody {
            head: &request.head,
            base: &request.base,
            title: &request.title,
            body: request.body.as_deref(),
            draft: request.draft,
        };
        let pr: GitHubPullRequest = self.send(self.client.post(url).json(&body)).await?;
        Ok(pr.into())
    }

    async fn find_pr_by_head(
        &self,
        repo: &RepositoryRef,
        head: &str,
    ) -> Result<Option<PullRequest>, ForgeError> {
        // GitHub requires owner:branch; same-repo heads use the repo owner
        let head_param = if head.contains(':') {
            head.to_string()
        } else {
            format!("{}:{}", repo.owner, head)
        };

        let url = self.repo_endpoint(repo, ["pulls"])?;
        let request = self
            .client
            .get(url)
            .query(&[("head", head_param.as_str()), ("state", "open")]);
        let prs: Vec<GitHubPullRequest> = self.send(request).await?;
        Ok(prs.into_iter().next().map(Into::into))
    }
}

/// Hands out [`GitHubForge`] instances that share one connection pool.
#[derive(Debug, Clone)]
pub struct GitHubConnector {
    client: Client,
    api_base: String,
}

impl GitHubConnector {
    /// Build a connector with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `ForgeError::NetworkError` if the HTTP client cannot be built
    /// or `api_base` is not a valid URL.
    pub fn new(api_base: &str, user_agent: Option<&str>) -> Result<Self, ForgeError> {
        Url::parse(api_base)
            .map_err(|e| ForgeError::NetworkError(format!("invalid API base '{}': {}", api_base, e)))?;
        let client = Client::builder()
            .user_agent(user_agent.unwrap_or(USER_AGENT_VALUE))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ForgeError::NetworkError(e.to_string()))?;
        Ok(Self {
            client,
            api_base: api_base.to_string(),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }
}

impl ForgeConnector for GitHubConnector {
    fn connect(&self, credential: Credential) -> Box<dyn Forge> {
        Box::new(GitHubForge::with_client(
            self.client.clone(),
            credential,
            self.api_base.as_str(),
        ))
    }
}

// --------------------------------------------------------------------------
// Request/Response Types
// --------------------------------------------------------------------------

/// Request body for creating a tree.
#[derive(Serialize)]
struct CreateTreeBody<'a> {
    base_tree: &'a str,
    tree: Vec<TreeItemBody<'a>>,
}

/// One entry of a create-tree request.
#[derive(Serialize)]
struct TreeItemBody<'a> {
    path: &'a str,
    mode: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    content: &'a str,
}

impl<'a> From<&'a TreeEntry> for TreeItemBody<'a> {
    fn from(entry: &'a TreeEntry) -> Self {
        TreeItemBody {
            path: &entry.path,
            mode: TreeEntry::MODE_REGULAR_FILE,
            kind: "blob",
            content: &entry.content,
        }
    }
}

/// Request body for creating a commit.
#[derive(Serialize)]
struct CreateCommitBody<'a> {
    message: &'a str,
    tree: &'a str,
    parents: Vec<&'a str>,
}

/// Request body for creating a ref.
#[derive(Serialize)]
struct CreateRefBody<'a> {
    #[serde(rename = "ref")]
    ref_name: String,
    sha: &'a str,
}

/// Request body for updating a ref.
#[derive(Serialize)]
struct UpdateRefBody<'a> {
    sha: &'a str,
    force: bool,
}

/// Request body for creating a PR.
#[derive(Serialize)]
struct CreatePrBody<'a> {
    head: &'a str,
    base: &'a str,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    draft: bool,
}

/// GitHub error response format.
///
/// Validation failures carry a generic `message` ("Validation Failed") and
/// the useful text in `errors[].message`.
#[derive(Deserialize)]
struct GitHubErrorResponse {
    message: String,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

impl GitHubErrorResponse {
    /// The first detail message if there is one, else the top-level message.
    fn first_message(self) -> String {
        self.errors
            .first()
            .and_then(|e| {
                e.get("message")
                    .and_then(|m| m.as_str())
                    .or_else(|| e.as_str())
            })
            .map(|m| m.to_string())
            .unwrap_or(self.message)
    }
}

/// Minimal GitHub owner/user info.
#[derive(Deserialize)]
struct GitHubOwner {
    login: String,
}

/// Push-related permissions of the authenticated identity.
#[derive(Deserialize, Default)]
struct GitHubPermissions {
    #[serde(default)]
    admin: bool,
    #[serde(default)]
    maintain: bool,
    #[serde(default)]
    push: bool,
}

/// GitHub repository response format.
#[derive(Deserialize)]
struct GitHubRepository {
    name: String,
    owner: GitHubOwner,
    #[serde(default)]
    default_branch: Option<String>,
    /// Absent for anonymous or app-scoped requests without access
    #[serde(default)]
    permissions: Option<GitHubPermissions>,
}

impl From<GitHubRepository> for RepositoryInfo {
    fn from(gh: GitHubRepository) -> Self {
        let perms = gh.permissions.unwrap_or_default();
        RepositoryInfo {
            repo: RepositoryRef::new(gh.owner.login, gh.name),
            default_branch: gh.default_branch.unwrap_or_else(|| "main".to_string()),
            can_write: perms.push || perms.maintain || perms.admin,
        }
    }
}

/// Object a ref points at.
#[derive(Deserialize)]
struct GitHubRef {
    object: GitHubSha,
}

/// Anything identified only by its sha.
#[derive(Deserialize)]
struct GitHubSha {
    sha: Oid,
}

/// GitHub commit response format.
#[derive(Deserialize)]
struct GitHubCommit {
    sha: Oid,
    tree: GitHubSha,
}

/// GitHub PR response format.
#[derive(Deserialize)]
struct GitHubPullRequest {
    number: u64,
    html_url: String,
    title: String,
    head: GitHubBranchRef,
    base: GitHubBranchRef,
}

/// GitHub head/base ref format.
#[derive(Deserialize)]
struct GitHubBranchRef {
    #[serde(rename = "ref")]
    ref_name: String,
}

impl From<GitHubPullRequest> for PullRequest {
    fn from(pr: GitHubPullRequest) -> Self {
        PullRequest {
            number: pr.number,
            url: pr.html_url,
            head: pr.head.ref_name,
            base: pr.base.ref_name,
            title: pr.title,
        }
    }
}
