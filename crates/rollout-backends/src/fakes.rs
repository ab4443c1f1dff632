//! In-memory fakes for backend traits (testing only)
//!
//! Provides `MemoryGitHost` (a tiny hosted-git model implementing `GitOps`)
//! and `RecordingNotifier`, both satisfying the trait contracts without any
//! network access.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::backend_traits::*;
use crate::error::{BackendError, BackendResult};

/// Operation names accepted by [`MemoryGitHost::fail_on`] and
/// [`MemoryGitHost::delay_on`].
pub mod ops {
    pub const GET_FILE_CONTENT: &str = "get_file_content";
    pub const GET_REF: &str = "get_ref";
    pub const CREATE_REF: &str = "create_ref";
    pub const CREATE_TREE: &str = "create_tree";
    pub const GET_COMMIT: &str = "get_commit";
    pub const CREATE_COMMIT: &str = "create_commit";
    pub const UPDATE_REF: &str = "update_ref";
    pub const CREATE_PULL_REQUEST: &str = "create_pull_request";
    pub const ADD_LABELS: &str = "add_labels";
    pub const MERGE_PULL_REQUEST: &str = "merge_pull_request";
    pub const COMPARE_COMMITS: &str = "compare_commits";
    pub const GET_PULL_REQUEST: &str = "get_pull_request";
}

const WEB_URL: &str = "https://github.com";

// ---------------------------------------------------------------------------
// MemoryGitHost
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct FakeCommit {
    tree_sha: String,
    parents: Vec<String>,
    message: String,
    author: Option<CommitAuthor>,
}

/// A pull request opened against the fake host, with what happened to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRecord {
    pub number: u64,
    pub request: NewPullRequest,
    pub labels: Vec<String>,
    pub merged: Option<MergeRequest>,
    pub html_url: String,
}

#[derive(Debug, Default)]
struct RepoState {
    branches: HashMap<String, String>,
    commits: HashMap<String, FakeCommit>,
    trees: HashMap<String, BTreeMap<String, String>>,
    pulls: Vec<PullRequestRecord>,
    comparisons: HashMap<(String, String), Vec<CommitSummary>>,
    source_pulls: HashMap<u64, PullRequest>,
}

impl RepoState {
    fn tree_of(&self, sha: &str) -> Option<&BTreeMap<String, String>> {
        if let Some(commit) = self.commits.get(sha) {
            return self.trees.get(&commit.tree_sha);
        }
        self.trees.get(sha)
    }

    fn resolve(&self, git_ref: &str) -> Option<&str> {
        if let Some(sha) = self.branches.get(git_ref) {
            return Some(sha);
        }
        self.commits.get_key_value(git_ref).map(|(k, _)| k.as_str())
    }
}

#[derive(Debug, Default)]
struct HostState {
    repos: HashMap<String, RepoState>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    calls: HashMap<String, usize>,
    next_id: u64,
}

impl HostState {
    fn next_sha(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{:038x}", self.next_id)
    }

    fn repo(&self, repo: &RepoCoords) -> BackendResult<&RepoState> {
        self.repos
            .get(&repo.to_string())
            .ok_or_else(|| BackendError::not_found(format!("repository {repo}")))
    }

    fn repo_mut(&mut self, repo: &RepoCoords) -> BackendResult<&mut RepoState> {
        self.repos
            .get_mut(&repo.to_string())
            .ok_or_else(|| BackendError::not_found(format!("repository {repo}")))
    }
}

/// In-memory hosted git service.
///
/// Branches point at commits, commits point at flat `path -> content` trees.
/// Writes follow the same rules a real host enforces: refs must exist before
/// they are updated and non-forced updates must fast-forward.
#[derive(Debug, Default)]
pub struct MemoryGitHost {
    state: Mutex<HostState>,
}

impl MemoryGitHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) `branch` in `repo` with a single commit holding `files`.
    /// Returns the commit SHA.
    pub fn seed_branch(&self, repo: &RepoCoords, branch: &str, files: &[(&str, &str)]) -> String {
        let mut state = self.state.lock().unwrap();
        let tree_sha = state.next_sha("7");
        let commit_sha = state.next_sha("c");
        let repo_state = state.repos.entry(repo.to_string()).or_default();
        let tree = files
            .iter()
            .map(|(path, content)| (path.to_string(), content.to_string()))
            .collect();
        repo_state.trees.insert(tree_sha.clone(), tree);
        repo_state.commits.insert(
            commit_sha.clone(),
            FakeCommit {
                tree_sha,
                parents: Vec::new(),
                message: format!("seed {branch}"),
                author: None,
            },
        );
        repo_state
            .branches
            .insert(branch.to_string(), commit_sha.clone());
        commit_sha
    }

    /// Register the commits returned by `compare_commits(repo, base, head)`.
    pub fn add_comparison(
        &self,
        repo: &RepoCoords,
        base: &str,
        head: &str,
        commits: Vec<CommitSummary>,
    ) {
        let mut state = self.state.lock().unwrap();
        state
            .repos
            .entry(repo.to_string())
            .or_default()
            .comparisons
            .insert((base.to_string(), head.to_string()), commits);
    }

    /// Register a pull request returned by `get_pull_request`.
    pub fn add_source_pull_request(&self, repo: &RepoCoords, pull: PullRequest) {
        let mut state = self.state.lock().unwrap();
        state
            .repos
            .entry(repo.to_string())
            .or_default()
            .source_pulls
            .insert(pull.number, pull);
    }

    /// Make every call to `op` fail with an HTTP 500.
    pub fn fail_on(&self, op: &str) {
        self.state.lock().unwrap().failing.insert(op.to_string());
    }

    /// Delay every call to `op` by `delay` before it runs.
    pub fn delay_on(&self, op: &str, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .delays
            .insert(op.to_string(), delay);
    }

    /// Number of times `op` has been invoked.
    pub fn call_count(&self, op: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(op)
            .copied()
            .unwrap_or(0)
    }

    /// Current head SHA of `branch`.
    pub fn branch_head(&self, repo: &RepoCoords, branch: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.repos.get(&repo.to_string())?.branches.get(branch).cloned()
    }

    /// Content of `path` at the head of `branch`.
    pub fn file_at(&self, repo: &RepoCoords, branch: &str, path: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        let repo_state = state.repos.get(&repo.to_string())?;
        let sha = repo_state.branches.get(branch)?;
        repo_state.tree_of(sha)?.get(path).cloned()
    }

    /// Message and author of the commit at the head of `branch`.
    pub fn head_commit(&self, repo: &RepoCoords, branch: &str) -> Option<(String, Option<CommitAuthor>)> {
        let state = self.state.lock().unwrap();
        let repo_state = state.repos.get(&repo.to_string())?;
        let sha = repo_state.branches.get(branch)?;
        let commit = repo_state.commits.get(sha)?;
        Some((commit.message.clone(), commit.author.clone()))
    }

    /// Pull requests opened against `repo`, in creation order.
    pub fn pull_requests(&self, repo: &RepoCoords) -> Vec<PullRequestRecord> {
        let state = self.state.lock().unwrap();
        state
            .repos
            .get(&repo.to_string())
            .map(|r| r.pulls.clone())
            .unwrap_or_default()
    }

    async fn enter(&self, op: &str) -> BackendResult<()> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            *state.calls.entry(op.to_string()).or_insert(0) += 1;
            state.delays.get(op).copied()
        };
        if let Some(delay) = delay {
            debug!(op = %op, delay_ms = delay.as_millis() as u64, "delaying fake call");
            tokio::time::sleep(delay).await;
        }
        let state = self.state.lock().unwrap();
        if state.failing.contains(op) {
            debug!(op = %op, "injecting fake failure");
            return Err(BackendError::Http {
                status: 500,
                message: format!("injected failure in {op}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ContentStore for MemoryGitHost {
    async fn get_file_content(
        &self,
        repo: &RepoCoords,
        path: &str,
        git_ref: &str,
    ) -> BackendResult<String> {
        self.enter(ops::GET_FILE_CONTENT).await?;
        let state = self.state.lock().unwrap();
        let repo_state = state.repo(repo)?;
        let sha = repo_state
            .resolve(git_ref)
            .ok_or_else(|| BackendError::not_found(format!("ref {git_ref}")))?;
        repo_state
            .tree_of(sha)
            .and_then(|tree| tree.get(path))
            .cloned()
            .ok_or_else(|| BackendError::not_found(format!("{path}@{git_ref}")))
    }
}

#[async_trait]
impl GitOps for MemoryGitHost {
    async fn get_ref(&self, repo: &RepoCoords, branch: &str) -> BackendResult<GitRef> {
        self.enter(ops::GET_REF).await?;
        let state = self.state.lock().unwrap();
        let sha = state
            .repo(repo)?
            .branches
            .get(branch)
            .cloned()
            .ok_or_else(|| BackendError::not_found(format!("refs/heads/{branch}")))?;
        Ok(GitRef {
            branch: branch.to_string(),
            sha,
        })
    }

    async fn create_ref(
        &self,
        repo: &RepoCoords,
        branch: &str,
        sha: &str,
    ) -> BackendResult<GitRef> {
        self.enter(ops::CREATE_REF).await?;
        let mut state = self.state.lock().unwrap();
        let repo_state = state.repo_mut(repo)?;
        if repo_state.branches.contains_key(branch) {
            return Err(BackendError::Rejected {
                message: format!("reference refs/heads/{branch} already exists"),
            });
        }
        if !repo_state.commits.contains_key(sha) {
            return Err(BackendError::not_found(format!("commit {sha}")));
        }
        repo_state
            .branches
            .insert(branch.to_string(), sha.to_string());
        Ok(GitRef {
            branch: branch.to_string(),
            sha: sha.to_string(),
        })
    }

    async fn create_tree(
        &self,
        repo: &RepoCoords,
        base_tree: &str,
        entries: &[TreeEntry],
    ) -> BackendResult<TreeObject> {
        self.enter(ops::CREATE_TREE).await?;
        let mut state = self.state.lock().unwrap();
        let sha = state.next_sha("7");
        let repo_state = state.repo_mut(repo)?;
        let mut tree = repo_state
            .tree_of(base_tree)
            .cloned()
            .ok_or_else(|| BackendError::not_found(format!("tree {base_tree}")))?;
        for entry in entries {
            tree.insert(entry.path.clone(), entry.content.clone());
        }
        repo_state.trees.insert(sha.clone(), tree);
        Ok(TreeObject { sha })
    }

    async fn get_commit(&self, repo: &RepoCoords, sha: &str) -> BackendResult<CommitObject> {
        self.enter(ops::GET_COMMIT).await?;
        let state = self.state.lock().unwrap();
        let commit = state
            .repo(repo)?
            .commits
            .get(sha)
            .ok_or_else(|| BackendError::not_found(format!("commit {sha}")))?;
        Ok(CommitObject {
            sha: sha.to_string(),
            tree_sha: commit.tree_sha.clone(),
            message: commit.message.clone(),
            html_url: format!("{WEB_URL}/{repo}/commit/{sha}"),
        })
    }

    async fn create_commit(
        &self,
        repo: &RepoCoords,
        commit: &NewCommit,
    ) -> BackendResult<CommitObject> {
        self.enter(ops::CREATE_COMMIT).await?;
        let mut state = self.state.lock().unwrap();
        let sha = state.next_sha("c");
        let repo_state = state.repo_mut(repo)?;
        if !repo_state.trees.contains_key(&commit.tree_sha) {
            return Err(BackendError::not_found(format!("tree {}", commit.tree_sha)));
        }
        if let Some(missing) = commit
            .parents
            .iter()
            .find(|p| !repo_state.commits.contains_key(p.as_str()))
        {
            return Err(BackendError::not_found(format!("parent commit {missing}")));
        }
        repo_state.commits.insert(
            sha.clone(),
            FakeCommit {
                tree_sha: commit.tree_sha.clone(),
                parents: commit.parents.clone(),
                message: commit.message.clone(),
                author: Some(commit.author.clone()),
            },
        );
        Ok(CommitObject {
            sha: sha.clone(),
            tree_sha: commit.tree_sha.clone(),
            message: commit.message.clone(),
            html_url: format!("{WEB_URL}/{repo}/commit/{sha}"),
        })
    }

    async fn update_ref(
        &self,
        repo: &RepoCoords,
        branch: &str,
        sha: &str,
        force: bool,
    ) -> BackendResult<GitRef> {
        self.enter(ops::UPDATE_REF).await?;
        let mut state = self.state.lock().unwrap();
        let repo_state = state.repo_mut(repo)?;
        let current = repo_state
            .branches
            .get(branch)
            .cloned()
            .ok_or_else(|| BackendError::not_found(format!("refs/heads/{branch}")))?;
        let commit = repo_state
            .commits
            .get(sha)
            .ok_or_else(|| BackendError::not_found(format!("commit {sha}")))?;
        if !force && current != sha && !commit.parents.contains(&current) {
            debug!(branch = %branch, current = %current, sha = %sha, "rejecting non-fast-forward update");
            return Err(BackendError::Rejected {
                message: format!("update of refs/heads/{branch} is not a fast forward"),
            });
        }
        repo_state
            .branches
            .insert(branch.to_string(), sha.to_string());
        Ok(GitRef {
            branch: branch.to_string(),
            sha: sha.to_string(),
        })
    }

    async fn create_pull_request(
        &self,
        repo: &RepoCoords,
        request: &NewPullRequest,
    ) -> BackendResult<PullRequest> {
        self.enter(ops::CREATE_PULL_REQUEST).await?;
        let mut state = self.state.lock().unwrap();
        let repo_state = state.repo_mut(repo)?;
        for branch in [&request.head, &request.base] {
            if !repo_state.branches.contains_key(branch.as_str()) {
                return Err(BackendError::Rejected {
                    message: format!("branch {branch} does not exist"),
                });
            }
        }
        let number = repo_state.pulls.len() as u64 + 1;
        let html_url = format!("{WEB_URL}/{repo}/pull/{number}");
        repo_state.pulls.push(PullRequestRecord {
            number,
            request: request.clone(),
            labels: Vec::new(),
            merged: None,
            html_url: html_url.clone(),
        });
        Ok(PullRequest {
            number,
            title: request.title.clone(),
            author: "rollout-bot".to_string(),
            html_url,
        })
    }

    async fn add_labels(
        &self,
        repo: &RepoCoords,
        number: u64,
        labels: &[String],
    ) -> BackendResult<()> {
        self.enter(ops::ADD_LABELS).await?;
        let mut state = self.state.lock().unwrap();
        let pull = state
            .repo_mut(repo)?
            .pulls
            .iter_mut()
            .find(|p| p.number == number)
            .ok_or_else(|| BackendError::not_found(format!("pull request #{number}")))?;
        for label in labels {
            if !pull.labels.contains(label) {
                pull.labels.push(label.clone());
            }
        }
        Ok(())
    }

    async fn merge_pull_request(
        &self,
        repo: &RepoCoords,
        number: u64,
        request: &MergeRequest,
    ) -> BackendResult<()> {
        self.enter(ops::MERGE_PULL_REQUEST).await?;
        let mut state = self.state.lock().unwrap();
        let pull = state
            .repo_mut(repo)?
            .pulls
            .iter_mut()
            .find(|p| p.number == number)
            .ok_or_else(|| BackendError::not_found(format!("pull request #{number}")))?;
        if pull.merged.is_some() {
            return Err(BackendError::Rejected {
                message: format!("pull request #{number} is already merged"),
            });
        }
        pull.merged = Some(request.clone());
        Ok(())
    }

    async fn compare_commits(
        &self,
        repo: &RepoCoords,
        base: &str,
        head: &str,
    ) -> BackendResult<Vec<CommitSummary>> {
        self.enter(ops::COMPARE_COMMITS).await?;
        let state = self.state.lock().unwrap();
        state
            .repo(repo)?
            .comparisons
            .get(&(base.to_string(), head.to_string()))
            .cloned()
            .ok_or_else(|| BackendError::not_found(format!("comparison {base}...{head}")))
    }

    async fn get_pull_request(
        &self,
        repo: &RepoCoords,
        number: u64,
    ) -> BackendResult<PullRequest> {
        self.enter(ops::GET_PULL_REQUEST).await?;
        let state = self.state.lock().unwrap();
        state
            .repo(repo)?
            .source_pulls
            .get(&number)
            .cloned()
            .ok_or_else(|| BackendError::not_found(format!("pull request #{number}")))
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// Notifier that records every posted message.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    posts: Mutex<Vec<(String, RolloutMessage)>>,
    fail: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent posts fail.
    pub fn fail_posts(&self) {
        *self.fail.lock().unwrap() = true;
    }

    /// Posted `(channel, message)` pairs in order.
    pub fn posts(&self) -> Vec<(String, RolloutMessage)> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn post(&self, channel: &str, message: &RolloutMessage) -> BackendResult<()> {
        if *self.fail.lock().unwrap() {
            return Err(BackendError::Http {
                status: 503,
                message: "chat unavailable".to_string(),
            });
        }
        self.posts
            .lock()
            .unwrap()
            .push((channel.to_string(), message.clone()));
        Ok(())
    }
}
