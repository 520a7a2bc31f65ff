//! forge::mock
//!
//! In-memory hosting service for deterministic testing.
//!
//! # Design
//!
//! `MockForge` keeps repositories, branches, trees, commits and pull
//! requests in memory and enforces the server-side rules the workflow
//! depends on: push access for object writes, existing refs for updates,
//! fast-forward checks for non-forced updates, one open PR per head.
//! Forks can be made to appear only after a number of lookups, so fork
//! polling can be exercised without real delays.
//!
//! Object ids are content-addressed: the same tree, message and parents
//! always yield the same commit id, so reruns are reproducible.
//!
//! It also acts as its own [`ForgeConnector`], recording each credential it
//! is connected with. Failures are injected per method (optionally per
//! repository, optionally a limited number of times), and every call is
//! recorded as a [`MockOperation`].
//!
//! # Example
//!
//! ```
//! use changeset_pr::core::types::{BranchName, RepositoryRef};
//! use changeset_pr::forge::mock::MockForge;
//! use changeset_pr::forge::Forge;
//!
//! # tokio_test::block_on(async {
//! let forge = MockForge::new();
//! let repo = RepositoryRef::new("acme", "widgets");
//! let head = forge.add_repository(&repo, true);
//!
//! let info = forge.get_repository(&repo).await.unwrap();
//! assert_eq!(info.default_branch, "main");
//!
//! let main = BranchName::new("main").unwrap();
//! assert_eq!(forge.get_branch(&repo, &main).await.unwrap(), Some(head));
//! # });
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::traits::{
    CommitInfo, CreateCommitRequest, CreatePrRequest, CreateTreeRequest, Forge, ForgeConnector,
    ForgeError, ForkInfo, PullRequest, RepositoryInfo,
};
use crate::auth::Credential;
use crate::core::types::{BranchName, Oid, RepositoryRef};

/// Login used when none is configured.
pub const DEFAULT_LOGIN: &str = "mock-user";

/// Mock forge for testing.
///
/// Clones share state. A clone returned by [`ForgeConnector::connect`]
/// additionally carries the credential it was connected with.
#[derive(Debug, Clone)]
pub struct MockForge {
    inner: Arc<Mutex<MockForgeInner>>,
    credential: Option<Credential>,
}

#[derive(Debug)]
struct MockForgeInner {
    login: String,
    /// Keyed by lowercase `owner/name`; lookups are case-insensitive.
    repos: HashMap<String, MockRepo>,
    trees: HashMap<Oid, BTreeMap<String, String>>,
    commits: HashMap<Oid, MockCommit>,
    prs: Vec<MockPr>,
    next_pr_number: u64,
    /// Mixed into commit ids so identical commits get distinct ids, like
    /// a real server's timestamps do.
    fork: ForkBehavior,
    faults: Vec<Fault>,
    accepted_tokens: Option<Vec<String>>,
    latency: Duration,
    connections: Vec<Credential>,
    operations: Vec<MockOperation>,
}

#[derive(Debug, Clone)]
struct MockRepo {
    repo: RepositoryRef,
    default_branch: String,
    can_write: bool,
    branches: BTreeMap<String, Oid>,
    /// Lookups that still answer "not found" before the repo is visible.
    pending_lookups: u32,
}

#[derive(Debug, Clone)]
struct MockPr {
    repo: RepositoryRef,
    /// `owner:branch`
    label: String,
    pr: PullRequest,
}

/// A stored commit object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCommit {
    pub tree: Oid,
    pub parents: Vec<Oid>,
    pub message: String,
}

/// How `create_fork` behaves.
#[derive(Debug, Clone)]
pub struct ForkBehavior {
    /// Name the server gives the fork; `None` keeps the upstream name.
    pub name: Option<String>,
    /// Repository lookups that report "not found" after the fork request.
    pub ready_after: u32,
    /// Whether the new fork starts with the upstream branches.
    pub copy_branches: bool,
}

impl Default for ForkBehavior {
    fn default() -> Self {
        Self {
            name: None,
            ready_after: 0,
            copy_branches: true,
        }
    }
}

/// Forge methods, for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    AuthenticatedUser,
    GetRepository,
    CreateFork,
    GetBranch,
    GetCommit,
    CreateTree,
    CreateCommit,
    CreateBranch,
    UpdateBranch,
    CreatePr,
    FindPrByHead,
}

#[derive(Debug, Clone)]
struct Fault {
    method: Method,
    repo: Option<RepositoryRef>,
    error: ForgeError,
    /// `None` fails forever.
    remaining: Option<u32>,
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    AuthenticatedUser,
    GetRepository {
        repo: RepositoryRef,
    },
    CreateFork {
        repo: RepositoryRef,
    },
    GetBranch {
        repo: RepositoryRef,
        branch: String,
    },
    GetCommit {
        repo: RepositoryRef,
        sha: Oid,
    },
    CreateTree {
        repo: RepositoryRef,
        base_tree: Oid,
        paths: Vec<String>,
    },
    CreateCommit {
        repo: RepositoryRef,
        tree: Oid,
        parents: Vec<Oid>,
    },
    CreateBranch {
        repo: RepositoryRef,
        branch: String,
        sha: Oid,
    },
    UpdateBranch {
        repo: RepositoryRef,
        branch: String,
        sha: Oid,
        force: bool,
    },
    CreatePr {
        repo: RepositoryRef,
        head: String,
        base: String,
        title: String,
    },
    FindPrByHead {
        repo: RepositoryRef,
        head: String,
    },
}

impl MockOperation {
    pub fn method(&self) -> Method {
        match self {
            MockOperation::AuthenticatedUser => Method::AuthenticatedUser,
            MockOperation::GetRepository { .. } => Method::GetRepository,
            MockOperation::CreateFork { .. } => Method::CreateFork,
            MockOperation::GetBranch { .. } => Method::GetBranch,
            MockOperation::GetCommit { .. } => Method::GetCommit,
            MockOperation::CreateTree { .. } => Method::CreateTree,
            MockOperation::CreateCommit { .. } => Method::CreateCommit,
            MockOperation::CreateBranch { .. } => Method::CreateBranch,
            MockOperation::UpdateBranch { .. } => Method::UpdateBranch,
            MockOperation::CreatePr { .. } => Method::CreatePr,
            MockOperation::FindPrByHead { .. } => Method::FindPrByHead,
        }
    }

    /// Repository the operation addressed.
    pub fn repo(&self) -> Option<&RepositoryRef> {
        match self {
            MockOperation::AuthenticatedUser => None,
            MockOperation::GetRepository { repo }
            | MockOperation::CreateFork { repo }
            | MockOperation::GetBranch { repo, .. }
            | MockOperation::GetCommit { repo, .. }
            | MockOperation::CreateTree { repo, .. }
            | MockOperation::CreateCommit { repo, .. }
            | MockOperation::CreateBranch { repo, .. }
            | MockOperation::UpdateBranch { repo, .. }
            | MockOperation::CreatePr { repo, .. }
            | MockOperation::FindPrByHead { repo, .. } => Some(repo),
        }
    }

    /// Whether the operation changes server state when it succeeds.
    pub fn is_write(&self) -> bool {
        matches!(
            self.method(),
            Method::CreateFork
                | Method::CreateTree
                | Method::CreateCommit
                | Method::CreateBranch
                | Method::UpdateBranch
                | Method::CreatePr
        )
    }
}

fn repo_key(repo: &RepositoryRef) -> String {
    repo.full_name().to_lowercase()
}

fn object_id(kind: &str, parts: &[&str]) -> Oid {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    for part in parts {
        hasher.update([0u8]);
        hasher.update(part.as_bytes());
    }
    Oid::from_digest(&hasher.finalize())
}

fn tree_id(files: &BTreeMap<String, String>) -> Oid {
    let parts: Vec<&str> = files
        .iter()
        .flat_map(|(path, content)| [path.as_str(), content.as_str()])
        .collect();
    object_id("tree", &parts)
}

fn unprocessable(message: impl Into<String>) -> ForgeError {
    ForgeError::ApiError {
        status: 422,
        message: message.into(),
    }
}

impl MockForgeInner {
    fn repo(&self, repo: &RepositoryRef) -> Result<&MockRepo, ForgeError> {
        self.repos
            .get(&repo_key(repo))
            .filter(|r| r.pending_lookups == 0)
            .ok_or_else(|| ForgeError::NotFound(format!("repository {}", repo)))
    }

    fn repo_mut(&mut self, repo: &RepositoryRef) -> Result<&mut MockRepo, ForgeError> {
        self.repos
            .get_mut(&repo_key(repo))
            .filter(|r| r.pending_lookups == 0)
            .ok_or_else(|| ForgeError::NotFound(format!("repository {}", repo)))
    }

    fn writable(&self, repo: &RepositoryRef) -> Result<&MockRepo, ForgeError> {
        let found = self.repo(repo)?;
        if !found.can_write {
            return Err(ForgeError::PermissionDenied(
                "Resource not accessible by integration".into(),
            ));
        }
        Ok(found)
    }

    fn take_fault(&mut self, op: &MockOperation) -> Result<(), ForgeError> {
        let method = op.method();
        let repo = op.repo();
        let position = self.faults.iter().position(|f| {
            f.method == method
                && f.repo
                    .as_ref()
                    .map_or(true, |target| repo.is_some_and(|r| repo_key(r) == repo_key(target)))
                && f.remaining != Some(0)
        });
        let Some(position) = position else {
            return Ok(());
        };
        let fault = &mut self.faults[position];
        if let Some(remaining) = fault.remaining.as_mut() {
            *remaining -= 1;
        }
        Err(fault.error.clone())
    }

    fn is_ancestor(&self, ancestor: &Oid, descendant: &Oid) -> bool {
        let mut stack = vec![descendant.clone()];
        let mut seen = HashSet::new();
        while let Some(sha) = stack.pop() {
            if &sha == ancestor {
                return true;
            }
            if !seen.insert(sha.clone()) {
                continue;
            }
            if let Some(commit) = self.commits.get(&sha) {
                stack.extend(commit.parents.iter().cloned());
            }
        }
        false
    }

    fn write_commit(
        &mut self,
        files: BTreeMap<String, String>,
        parents: Vec<Oid>,
        message: &str,
    ) -> Oid {
        let tree = tree_id(&files);
        self.trees.insert(tree.clone(), files);
        let mut parts = vec![tree.as_str(), message];
        parts.extend(parents.iter().map(Oid::as_str));
        let sha = object_id("commit", &parts);
        self.commits.insert(
            sha.clone(),
            MockCommit {
                tree,
                parents,
                message: message.to_string(),
            },
        );
        sha
    }
}

impl MockForge {
    /// Create a new empty mock forge.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockForgeInner {
                login: DEFAULT_LOGIN.to_string(),
                repos: HashMap::new(),
                trees: HashMap::new(),
                commits: HashMap::new(),
                prs: Vec::new(),
                next_pr_number: 1,
                fork: ForkBehavior::default(),
                faults: Vec::new(),
                accepted_tokens: None,
                latency: Duration::ZERO,
                connections: Vec::new(),
                operations: Vec::new(),
            })),
            credential: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockForgeInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the login of the authenticated identity.
    pub fn with_login(self, login: impl Into<String>) -> Self {
        self.lock().login = login.into();
        self
    }

    /// Configure how `create_fork` behaves.
    pub fn with_fork_behavior(self, behavior: ForkBehavior) -> Self {
        self.lock().fork = behavior;
        self
    }

    /// Only accept these tokens; any other credential gets `AuthFailed`.
    pub fn accept_only(self, tokens: &[&str]) -> Self {
        self.lock().accepted_tokens = Some(tokens.iter().map(|t| t.to_string()).collect());
        self
    }

    /// Delay every call by `latency` (tokio time, so paused clocks apply).
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = latency;
        self
    }

    /// Create a repository with a `main` branch holding one commit.
    ///
    /// Returns the sha `main` points at.
    pub fn add_repository(&self, repo: &RepositoryRef, can_write: bool) -> Oid {
        let mut inner = self.lock();
        let mut files = BTreeMap::new();
        files.insert("README.md".to_string(), format!("# {}\n", repo.name));
        let head = inner.write_commit(files, Vec::new(), "Initial commit");
        let mut branches = BTreeMap::new();
        branches.insert("main".to_string(), head.clone());
        inner.repos.insert(
            repo_key(repo),
            MockRepo {
                repo: repo.clone(),
                default_branch: "main".to_string(),
                can_write,
                branches,
                pending_lookups: 0,
            },
        );
        head
    }

    /// Commit `files` on top of `branch` (creating it from the default
    /// branch if absent) and move the branch. Returns the new commit.
    ///
    /// For an unknown repository the commit is stored but no ref moves.
    pub fn seed_commit(&self, repo: &RepositoryRef, branch: &str, files: &[(&str, &str)]) -> Oid {
        let mut inner = self.lock();
        let parent = inner.repos.get(&repo_key(repo)).and_then(|found| {
            found
                .branches
                .get(branch)
                .or_else(|| found.branches.get(&found.default_branch))
                .cloned()
        });
        let mut tree = parent
            .as_ref()
            .and_then(|p| inner.commits.get(p))
            .and_then(|c| inner.trees.get(&c.tree))
            .cloned()
            .unwrap_or_default();
        for (path, content) in files {
            tree.insert(path.to_string(), content.to_string());
        }
        let parents = parent.into_iter().collect();
        let sha = inner.write_commit(tree, parents, "Seed commit");
        if let Some(found) = inner.repos.get_mut(&repo_key(repo)) {
            found.branches.insert(branch.to_string(), sha.clone());
        }
        sha
    }

    /// Change a repository's default branch.
    pub fn set_default_branch(&self, repo: &RepositoryRef, branch: &str) {
        if let Some(found) = self.lock().repos.get_mut(&repo_key(repo)) {
            found.default_branch = branch.to_string();
        }
    }

    /// Fail every call to `method` with `error`.
    pub fn fail_on(&self, method: Method, error: ForgeError) {
        self.push_fault(method, None, error, None);
    }

    /// Fail calls to `method` addressed at `repo`.
    pub fn fail_on_repo(&self, method: Method, repo: &RepositoryRef, error: ForgeError) {
        self.push_fault(method, Some(repo.clone()), error, None);
    }

    /// Fail the next `times` calls to `method`, then behave normally.
    pub fn fail_times(&self, method: Method, times: u32, error: ForgeError) {
        self.push_fault(method, None, error, Some(times));
    }

    fn push_fault(
        &self,
        method: Method,
        repo: Option<RepositoryRef>,
        error: ForgeError,
        remaining: Option<u32>,
    ) {
        self.lock().faults.push(Fault {
            method,
            repo,
            error,
            remaining,
        });
    }

    /// Clear all injected failures.
    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.lock().operations.clone()
    }

    /// Clear recorded operations.
    pub fn clear_operations(&self) {
        self.lock().operations.clear();
    }

    /// Credentials passed to [`ForgeConnector::connect`], in order.
    pub fn connections(&self) -> Vec<Credential> {
        self.lock().connections.clone()
    }

    pub fn has_repository(&self, repo: &RepositoryRef) -> bool {
        self.lock().repos.contains_key(&repo_key(repo))
    }

    /// Current head of a branch.
    pub fn branch_head(&self, repo: &RepositoryRef, branch: &str) -> Option<Oid> {
        self.lock()
            .repos
            .get(&repo_key(repo))
            .and_then(|r| r.branches.get(branch).cloned())
    }

    /// Files in the tree of the commit a branch points at.
    pub fn files_at(&self, repo: &RepositoryRef, branch: &str) -> Option<BTreeMap<String, String>> {
        let inner = self.lock();
        let head = inner.repos.get(&repo_key(repo))?.branches.get(branch)?;
        let commit = inner.commits.get(head)?;
        inner.trees.get(&commit.tree).cloned()
    }

    /// Files recorded under a tree id.
    pub fn tree_files(&self, tree: &Oid) -> Option<BTreeMap<String, String>> {
        self.lock().trees.get(tree).cloned()
    }

    pub fn commit(&self, sha: &Oid) -> Option<MockCommit> {
        self.lock().commits.get(sha).cloned()
    }

    /// Pull requests opened against `repo`, oldest first.
    pub fn pull_requests(&self, repo: &RepositoryRef) -> Vec<PullRequest> {
        self.lock()
            .prs
            .iter()
            .filter(|p| repo_key(&p.repo) == repo_key(repo))
            .map(|p| p.pr.clone())
            .collect()
    }

    /// `owner:branch` label of a pull request.
    pub fn pr_head_label(&self, number: u64) -> Option<String> {
        self.lock()
            .prs
            .iter()
            .find(|p| p.pr.number == number)
            .map(|p| p.label.clone())
    }

    /// Record the call, wait out latency, then apply auth and faults.
    async fn begin(&self, op: MockOperation) -> Result<(), ForgeError> {
        let latency = {
            let mut inner = self.lock();
            inner.operations.push(op.clone());
            inner.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self.lock();
        if let Some(accepted) = &inner.accepted_tokens {
            let ok = self
                .credential
                .as_ref()
                .is_some_and(|c| accepted.iter().any(|t| t == c.expose()));
            if !ok {
                return Err(ForgeError::AuthFailed("Bad credentials".into()));
            }
        }
        inner.take_fault(&op)
    }
}

impl Default for MockForge {
    fn default() -> Self {
        Self::new()
    }
}

impl ForgeConnector for MockForge {
    fn connect(&self, credential: Credential) -> Box<dyn Forge> {
        self.lock().connections.push(credential.clone());
        Box::new(MockForge {
            inner: Arc::clone(&self.inner),
            credential: Some(credential),
        })
    }
}

#[async_trait]
impl Forge for MockForge {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn authenticated_user(&self) -> Result<String, ForgeError> {
        self.begin(MockOperation::AuthenticatedUser).await?;
        Ok(self.lock().login.clone())
    }

    async fn get_repository(&self, repo: &RepositoryRef) -> Result<RepositoryInfo, ForgeError> {
        self.begin(MockOperation::GetRepository { repo: repo.clone() })
            .await?;

        let mut inner = self.lock();
        let found = inner
            .repos
            .get_mut(&repo_key(repo))
            .ok_or_else(|| ForgeError::NotFound(format!("repository {}", repo)))?;
        if found.pending_lookups > 0 {
            found.pending_lookups -= 1;
            return Err(ForgeError::NotFound(format!("repository {}", repo)));
        }
        Ok(RepositoryInfo {
            repo: found.repo.clone(),
            default_branch: found.default_branch.clone(),
            can_write: found.can_write,
        })
    }

    async fn create_fork(&self, repo: &RepositoryRef) -> Result<ForkInfo, ForgeError> {
        self.begin(MockOperation::CreateFork { repo: repo.clone() })
            .await?;

        let mut inner = self.lock();
        let upstream = inner.repo(repo)?.clone();
        let name = inner
            .fork
            .name
            .clone()
            .unwrap_or_else(|| upstream.repo.name.clone());
        let fork = RepositoryRef::new(inner.login.clone(), name);
        let key = repo_key(&fork);

        if let Some(existing) = inner.repos.get(&key) {
            return Ok(ForkInfo {
                repo: existing.repo.clone(),
            });
        }

        let branches = if inner.fork.copy_branches {
            upstream.branches.clone()
        } else {
            BTreeMap::new()
        };
        let pending_lookups = inner.fork.ready_after;
        inner.repos.insert(
            key,
            MockRepo {
                repo: fork.clone(),
                default_branch: upstream.default_branch,
                can_write: true,
                branches,
                pending_lookups,
            },
        );
        Ok(ForkInfo { repo: fork })
    }

    async fn get_branch(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
    ) -> Result<Option<Oid>, ForgeError> {
        self.begin(MockOperation::GetBranch {
            repo: repo.clone(),
            branch: branch.to_string(),
        })
        .await?;

        let inner = self.lock();
        Ok(inner.repo(repo)?.branches.get(branch.as_str()).cloned())
    }

    async fn get_commit(&self, repo: &RepositoryRef, sha: &Oid) -> Result<CommitInfo, ForgeError> {
        self.begin(MockOperation::GetCommit {
            repo: repo.clone(),
            sha: sha.clone(),
        })
        .await?;

        let inner = self.lock();
        inner.repo(repo)?;
        let commit = inner
            .commits
            .get(sha)
            .ok_or_else(|| ForgeError::NotFound(format!("commit {}", sha)))?;
        Ok(CommitInfo {
            sha: sha.clone(),
            tree_sha: commit.tree.clone(),
        })
    }

    async fn create_tree(
        &self,
        repo: &RepositoryRef,
        request: CreateTreeRequest,
    ) -> Result<Oid, ForgeError> {
        self.begin(MockOperation::CreateTree {
            repo: repo.clone(),
            base_tree: request.base_tree.clone(),
            paths: request.entries.iter().map(|e| e.path.clone()).collect(),
        })
        .await?;

        let mut inner = self.lock();
        inner.writable(repo)?;
        let mut files = inner
            .trees
            .get(&request.base_tree)
            .cloned()
            .ok_or_else(|| unprocessable("tree.base_tree is invalid"))?;
        for entry in request.entries {
            files.insert(entry.path, entry.content);
        }
        let sha = tree_id(&files);
        inner.trees.insert(sha.clone(), files);
        Ok(sha)
    }

    async fn create_commit(
        &self,
        repo: &RepositoryRef,
        request: CreateCommitRequest,
    ) -> Result<Oid, ForgeError> {
        self.begin(MockOperation::CreateCommit {
            repo: repo.clone(),
            tree: request.tree.clone(),
            parents: request.parents.clone(),
        })
        .await?;

        let mut inner = self.lock();
        inner.writable(repo)?;
        let files = inner
            .trees
            .get(&request.tree)
            .cloned()
            .ok_or_else(|| unprocessable("Tree SHA does not exist"))?;
        if let Some(missing) = request
            .parents
            .iter()
            .find(|p| !inner.commits.contains_key(*p))
        {
            return Err(unprocessable(format!("Parent SHA {} does not exist", missing)));
        }
        Ok(inner.write_commit(files, request.parents, &request.message))
    }

    async fn create_branch(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
        sha: &Oid,
    ) -> Result<(), ForgeError> {
        self.begin(MockOperation::CreateBranch {
            repo: repo.clone(),
            branch: branch.to_string(),
            sha: sha.clone(),
        })
        .await?;

        let mut inner = self.lock();
        inner.writable(repo)?;
        if !inner.commits.contains_key(sha) {
            return Err(unprocessable("Object does not exist"));
        }
        let found = inner.repo_mut(repo)?;
        if found.branches.contains_key(branch.as_str()) {
            return Err(unprocessable("Reference already exists"));
        }
        found.branches.insert(branch.to_string(), sha.clone());
        Ok(())
    }

    async fn update_branch(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
        sha: &Oid,
        force: bool,
    ) -> Result<(), ForgeError> {
        self.begin(MockOperation::UpdateBranch {
            repo: repo.clone(),
            branch: branch.to_string(),
            sha: sha.clone(),
            force,
        })
        .await?;

        let mut inner = self.lock();
        inner.writable(repo)?;
        if !inner.commits.contains_key(sha) {
            return Err(unprocessable("Object does not exist"));
        }
        let current = inner
            .repo(repo)?
            .branches
            .get(branch.as_str())
            .cloned()
            .ok_or_else(|| unprocessable("Reference does not exist"))?;
        if !force && !inner.is_ancestor(&current, sha) {
            return Err(unprocessable("Update is not a fast forward"));
        }
        inner
            .repo_mut(repo)?
            .branches
            .insert(branch.to_string(), sha.clone());
        Ok(())
    }

    async fn create_pr(
        &self,
        repo: &RepositoryRef,
        request: CreatePrRequest,
    ) -> Result<PullRequest, ForgeError> {
        self.begin(MockOperation::CreatePr {
            repo: repo.clone(),
            head: request.head.clone(),
            base: request.base.clone(),
            title: request.title.clone(),
        })
        .await?;

        let mut inner = self.lock();
        let base_repo = inner.repo(repo)?.clone();
        if !base_repo.branches.contains_key(&request.base) {
            return Err(unprocessable(format!(
                "base branch '{}' does not exist",
                request.base
            )));
        }

        let (head_owner, head_branch) = match request.head.split_once(':') {
            Some((owner, branch)) => (owner.to_string(), branch.to_string()),
            None => (base_repo.repo.owner.clone(), request.head.clone()),
        };
        let head_exists = inner.repos.values().any(|r| {
            r.pending_lookups == 0
                && r.repo.owner.eq_ignore_ascii_case(&head_owner)
                && r.branches.contains_key(&head_branch)
        });
        if !head_exists {
            return Err(unprocessable(format!("head '{}' is invalid", request.head)));
        }

        let label = format!("{}:{}", head_owner, head_branch);
        let duplicate = inner.prs.iter().any(|p| {
            repo_key(&p.repo) == repo_key(repo) && p.label.eq_ignore_ascii_case(&label)
        });
        if duplicate {
            return Err(unprocessable(format!(
                "A pull request already exists for {}.",
                label
            )));
        }

        let number = inner.next_pr_number;
        inner.next_pr_number += 1;
        let pr = PullRequest {
            number,
            url: format!(
                "https://github.com/{}/{}/pull/{}",
                base_repo.repo.owner, base_repo.repo.name, number
            ),
            head: head_branch,
            base: request.base,
            title: request.title,
        };
        inner.prs.push(MockPr {
            repo: base_repo.repo,
            label,
            pr: pr.clone(),
        });
        Ok(pr)
    }

    async fn find_pr_by_head(
        &self,
        repo: &RepositoryRef,
        head: &str,
    ) -> Result<Option<PullRequest>, ForgeError> {
        self.begin(MockOperation::FindPrByHead {
            repo: repo.clone(),
            head: head.to_string(),
        })
        .await?;

        let inner = self.lock();
        inner.repo(repo)?;
        let label = if head.contains(':') {
            head.to_string()
        } else {
            format!("{}:{}", repo.owner, head)
        };
        Ok(inner
            .prs
            .iter()
            .find(|p| repo_key(&p.repo) == repo_key(repo) && p.label.eq_ignore_ascii_case(&label))
            .map(|p| p.pr.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::TreeEntry;

    fn repo() -> RepositoryRef {
        RepositoryRef::new("acme", "widgets")
    }

    fn branch(name: &str) -> BranchName {
        BranchName::new(name).unwrap()
    }

    mod repositories {
        use super::*;

        #[tokio::test]
        async fn lookup_is_case_insensitive_and_canonical() {
            let forge = MockForge::new();
            forge.add_repository(&RepositoryRef::new("Acme", "Widgets"), false);
            let info = forge.get_repository(&repo()).await.unwrap();
            assert_eq!(info.repo, RepositoryRef::new("Acme", "Widgets"));
            assert!(!info.can_write);
        }

        #[tokio::test]
        async fn unknown_repository_not_found() {
            let forge = MockForge::new();
            assert!(matches!(
                forge.get_repository(&repo()).await,
                Err(ForgeError::NotFound(_))
            ));
        }
    }

    mod forks {
        use super::*;

        #[tokio::test]
        async fn fork_appears_after_configured_lookups() {
            let forge = MockForge::new().with_fork_behavior(ForkBehavior {
                ready_after: 2,
                ..Default::default()
            });
            forge.add_repository(&repo(), false);
            let fork = forge.create_fork(&repo()).await.unwrap().repo;
            assert_eq!(fork, RepositoryRef::new(DEFAULT_LOGIN, "widgets"));

            assert!(forge.get_repository(&fork).await.is_err());
            assert!(forge.get_repository(&fork).await.is_err());
            assert!(forge.get_repository(&fork).await.unwrap().can_write);
        }

        #[tokio::test]
        async fn fork_can_be_renamed() {
            let forge = MockForge::new().with_fork_behavior(ForkBehavior {
                name: Some("widgets-1".into()),
                ..Default::default()
            });
            forge.add_repository(&repo(), false);
            let fork = forge.create_fork(&repo()).await.unwrap().repo;
            assert_eq!(fork.name, "widgets-1");
        }

        #[tokio::test]
        async fn repeated_fork_returns_existing() {
            let forge = MockForge::new();
            forge.add_repository(&repo(), false);
            let first = forge.create_fork(&repo()).await.unwrap();
            let second = forge.create_fork(&repo()).await.unwrap();
            assert_eq!(first, second);
        }
    }

    mod objects {
        use super::*;

        #[tokio::test]
        async fn tree_layers_on_base() {
            let forge = MockForge::new();
            let head = forge.add_repository(&repo(), true);
            let base = forge.get_commit(&repo(), &head).await.unwrap();
            let tree = forge
                .create_tree(
                    &repo(),
                    CreateTreeRequest {
                        base_tree: base.tree_sha,
                        entries: vec![TreeEntry {
                            path: "Dockerfile".into(),
                            content: "FROM alpine\n".into(),
                        }],
                    },
                )
                .await
                .unwrap();
            let commit = forge
                .create_commit(
                    &repo(),
                    CreateCommitRequest {
                        message: "m".into(),
                        tree,
                        parents: vec![head.clone()],
                    },
                )
                .await
                .unwrap();
            forge
                .create_branch(&repo(), &branch("topic"), &commit)
                .await
                .unwrap();

            let files = forge.files_at(&repo(), "topic").unwrap();
            assert_eq!(files.len(), 2);
            assert_eq!(files["Dockerfile"], "FROM alpine\n");
            assert_eq!(forge.commit(&commit).unwrap().parents, vec![head]);
        }

        #[tokio::test]
        async fn writes_require_push_access() {
            let forge = MockForge::new();
            let head = forge.add_repository(&repo(), false);
            let base = forge.get_commit(&repo(), &head).await.unwrap();
            let result = forge
                .create_tree(
                    &repo(),
                    CreateTreeRequest {
                        base_tree: base.tree_sha,
                        entries: vec![],
                    },
                )
                .await;
            assert!(matches!(result, Err(ForgeError::PermissionDenied(_))));
        }

        #[tokio::test]
        async fn stacked_commits_get_distinct_ids() {
            let forge = MockForge::new();
            forge.add_repository(&repo(), true);
            let a = forge.seed_commit(&repo(), "main", &[("a", "1")]);
            let b = forge.seed_commit(&repo(), "main", &[("a", "1")]);
            assert_ne!(a, b);
        }
    }

    mod refs {
        use super::*;

        #[tokio::test]
        async fn create_existing_branch_is_unprocessable() {
            let forge = MockForge::new();
            let head = forge.add_repository(&repo(), true);
            let err = forge
                .create_branch(&repo(), &branch("main"), &head)
                .await
                .unwrap_err();
            assert_eq!(
                err,
                ForgeError::ApiError {
                    status: 422,
                    message: "Reference already exists".into()
                }
            );
        }

        #[tokio::test]
        async fn non_fast_forward_requires_force() {
            let forge = MockForge::new();
            let root = forge.add_repository(&repo(), true);
            let ahead = forge.seed_commit(&repo(), "main", &[("a", "1")]);
            forge.seed_commit(&repo(), "side", &[]);

            let side = branch("side");
            forge.update_branch(&repo(), &side, &ahead, false).await.unwrap();
            assert!(forge.update_branch(&repo(), &side, &root, false).await.is_err());
            forge.update_branch(&repo(), &side, &root, true).await.unwrap();
            assert_eq!(forge.branch_head(&repo(), "side"), Some(root));
        }
    }

    mod pull_requests {
        use super::*;

        #[tokio::test]
        async fn duplicate_head_rejected_and_findable() {
            let forge = MockForge::new();
            forge.add_repository(&repo(), true);
            forge.seed_commit(&repo(), "topic", &[("a", "1")]);
            let request = CreatePrRequest {
                head: "topic".into(),
                base: "main".into(),
                title: "t".into(),
                body: None,
                draft: false,
            };
            let pr = forge.create_pr(&repo(), request.clone()).await.unwrap();
            assert_eq!(pr.number, 1);
            assert_eq!(pr.url, "https://github.com/acme/widgets/pull/1");

            match forge.create_pr(&repo(), request).await {
                Err(ForgeError::ApiError { status: 422, message }) => {
                    assert!(message.contains("already exists"))
                }
                other => panic!("expected 422, got {:?}", other),
            }
            let found = forge.find_pr_by_head(&repo(), "acme:topic").await.unwrap();
            assert_eq!(found, Some(pr));
        }

        #[tokio::test]
        async fn missing_head_rejected() {
            let forge = MockForge::new();
            forge.add_repository(&repo(), true);
            let result = forge
                .create_pr(
                    &repo(),
                    CreatePrRequest {
                        head: "someone:nothing".into(),
                        base: "main".into(),
                        title: "t".into(),
                        body: None,
                        draft: false,
                    },
                )
                .await;
            assert!(matches!(result, Err(ForgeError::ApiError { status: 422, .. })));
        }
    }

    mod injection {
        use super::*;

        #[tokio::test]
        async fn fail_times_then_recovers() {
            let forge = MockForge::new();
            forge.add_repository(&repo(), true);
            forge.fail_times(Method::GetRepository, 1, ForgeError::RateLimited);
            assert_eq!(
                forge.get_repository(&repo()).await,
                Err(ForgeError::RateLimited)
            );
            assert!(forge.get_repository(&repo()).await.is_ok());
        }

        #[tokio::test]
        async fn repo_scoped_fault_only_hits_that_repo() {
            let forge = MockForge::new();
            let other = RepositoryRef::new("acme", "gadgets");
            forge.add_repository(&repo(), true);
            forge.add_repository(&other, true);
            forge.fail_on_repo(
                Method::GetRepository,
                &other,
                ForgeError::NetworkError("reset".into()),
            );
            assert!(forge.get_repository(&repo()).await.is_ok());
            assert!(forge.get_repository(&other).await.is_err());
        }

        #[tokio::test]
        async fn connector_records_credentials_and_enforces_tokens() {
            let forge = MockForge::new().accept_only(&["good"]);
            forge.add_repository(&repo(), true);

            let good = forge.connect(Credential::new("good"));
            let bad = forge.connect(Credential::new("bad"));
            assert!(good.get_repository(&repo()).await.is_ok());
            assert!(matches!(
                bad.get_repository(&repo()).await,
                Err(ForgeError::AuthFailed(_))
            ));

            let tokens: Vec<_> = forge
                .connections()
                .iter()
                .map(|c| c.expose().to_string())
                .collect();
            assert_eq!(tokens, vec!["good", "bad"]);
        }

        #[tokio::test]
        async fn operations_are_recorded_even_when_failing() {
            let forge = MockForge::new();
            forge.fail_on(Method::CreateFork, ForgeError::PermissionDenied("no".into()));
            let _ = forge.create_fork(&repo()).await;
            let ops = forge.operations();
            assert_eq!(ops, vec![MockOperation::CreateFork { repo: repo() }]);
            assert!(ops[0].is_write());
        }
    }
}
