//! Backend trait definitions for Rollout
//!
//! These traits define the capabilities the release engine consumes:
//! - `ContentStore`: read a file at a ref of a repository
//! - `GitOps`: low-level git data API plus pull request operations
//! - `Notifier`: post an aggregate rollout message to a chat channel
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BackendResult;

// ---------------------------------------------------------------------------
// Repository addressing
// ---------------------------------------------------------------------------

/// Owner/name coordinates of a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoCoords {
    pub owner: String,
    pub name: String,
}

impl RepoCoords {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for RepoCoords {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

// ---------------------------------------------------------------------------
// Git data objects
// ---------------------------------------------------------------------------

/// A branch reference and the commit it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRef {
    /// Branch name without the `refs/heads/` prefix
    pub branch: String,
    pub sha: String,
}

/// File mode for regular, non-executable blobs.
pub const MODE_REGULAR_FILE: &str = "100644";

/// One entry of a tree to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
}

impl TreeEntry {
    /// Regular-file blob entry carrying inline content.
    pub fn blob(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: MODE_REGULAR_FILE.to_string(),
            kind: "blob".to_string(),
            content: content.into(),
        }
    }
}

/// A created tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeObject {
    pub sha: String,
}

/// Author identity stamped on a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
    pub date: DateTime<Utc>,
}

/// Parameters for creating a commit object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCommit {
    pub message: String,
    pub tree_sha: String,
    pub parents: Vec<String>,
    pub author: CommitAuthor,
}

/// A commit as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitObject {
    pub sha: String,
    pub tree_sha: String,
    pub message: String,
    /// Browser URL of the commit
    pub html_url: String,
}

/// Minimal commit view used when comparing two revisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub sha: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Pull requests
// ---------------------------------------------------------------------------

/// Parameters for opening a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPullRequest {
    pub title: String,
    /// Source branch
    pub head: String,
    /// Target branch
    pub base: String,
    pub body: String,
    pub maintainer_can_modify: bool,
}

/// A pull request as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    /// Login of the user who opened it
    pub author: String,
    pub html_url: String,
}

/// How a pull request is merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMethod {
    Merge,
    Squash,
    Rebase,
}

/// Parameters for merging a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequest {
    pub commit_title: String,
    pub method: MergeMethod,
}

// ---------------------------------------------------------------------------
// ContentStore / GitOps
// ---------------------------------------------------------------------------

/// Read access to file contents.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Return the text content of `path` at `git_ref` (branch name or SHA).
    /// Returns `BackendError::NotFound` if the file or ref is absent.
    async fn get_file_content(
        &self,
        repo: &RepoCoords,
        path: &str,
        git_ref: &str,
    ) -> BackendResult<String>;
}

/// Git data and pull request operations against a hosted repository.
///
/// Guarantees expected from implementations:
/// - `update_ref` with `force = false` only fast-forwards; a concurrent push
///   to the same branch yields `BackendError::Rejected`.
/// - `create_tree` layers `entries` over `base_tree` (a tree or commit SHA).
#[async_trait]
pub trait GitOps: ContentStore {
    /// Resolve a branch. Returns `BackendError::NotFound` if absent.
    async fn get_ref(&self, repo: &RepoCoords, branch: &str) -> BackendResult<GitRef>;

    /// Create `branch` pointing at `sha`.
    async fn create_ref(&self, repo: &RepoCoords, branch: &str, sha: &str)
        -> BackendResult<GitRef>;

    /// Create a tree from `entries` on top of `base_tree`.
    async fn create_tree(
        &self,
        repo: &RepoCoords,
        base_tree: &str,
        entries: &[TreeEntry],
    ) -> BackendResult<TreeObject>;

    /// Fetch a commit by SHA.
    async fn get_commit(&self, repo: &RepoCoords, sha: &str) -> BackendResult<CommitObject>;

    /// Create a commit object (does not move any ref).
    async fn create_commit(&self, repo: &RepoCoords, commit: &NewCommit)
        -> BackendResult<CommitObject>;

    /// Move `branch` to `sha`.
    async fn update_ref(
        &self,
        repo: &RepoCoords,
        branch: &str,
        sha: &str,
        force: bool,
    ) -> BackendResult<GitRef>;

    /// Open a pull request.
    async fn create_pull_request(
        &self,
        repo: &RepoCoords,
        request: &NewPullRequest,
    ) -> BackendResult<PullRequest>;

    /// Attach labels to an issue or pull request.
    async fn add_labels(&self, repo: &RepoCoords, number: u64, labels: &[String])
        -> BackendResult<()>;

    /// Merge a pull request.
    async fn merge_pull_request(
        &self,
        repo: &RepoCoords,
        number: u64,
        request: &MergeRequest,
    ) -> BackendResult<()>;

    /// Commits reachable from `head` but not from `base`, oldest first.
    async fn compare_commits(
        &self,
        repo: &RepoCoords,
        base: &str,
        head: &str,
    ) -> BackendResult<Vec<CommitSummary>>;

    /// Fetch a pull request by number.
    async fn get_pull_request(&self, repo: &RepoCoords, number: u64)
        -> BackendResult<PullRequest>;
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Result of rolling out to one manifest target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum OutcomeStatus {
    /// Pull request (or direct commit) URL
    Success { url: String },
    Failure { error: String },
}

/// Outcome for one manifest target, keyed by its environment label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestOutcome {
    pub env: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl PullRequestOutcome {
    pub fn success(env: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            env: env.into(),
            status: OutcomeStatus::Success { url: url.into() },
        }
    }

    pub fn failure(env: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            env: env.into(),
            status: OutcomeStatus::Failure {
                error: error.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success { .. })
    }

    /// The URL on success.
    pub fn url(&self) -> Option<&str> {
        match &self.status {
            OutcomeStatus::Success { url } => Some(url),
            OutcomeStatus::Failure { .. } => None,
        }
    }
}

/// Aggregate message describing one processed build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutMessage {
    pub app_name: String,
    pub image: String,
    pub version: String,
    pub outcomes: Vec<PullRequestOutcome>,
}

impl RolloutMessage {
    /// `true` when every target succeeded.
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(PullRequestOutcome::is_success)
    }
}

/// Chat notification sink.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Post `message` to `channel`.
    async fn post(&self, channel: &str, message: &RolloutMessage) -> BackendResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_coords_display() {
        assert_eq!(RepoCoords::new("org", "manifests").to_string(), "org/manifests");
    }

    #[test]
    fn tree_entry_blob_uses_regular_file_mode() {
        let entry = TreeEntry::blob("deploy.yaml", "image: app:v2\n");
        assert_eq!(entry.mode, "100644");
        assert_eq!(entry.kind, "blob");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "blob");
    }

    #[test]
    fn message_success_requires_every_outcome() {
        let mut message = RolloutMessage {
            app_name: "foo".to_string(),
            image: "gcr.io/x/foo".to_string(),
            version: "v2".to_string(),
            outcomes: vec![PullRequestOutcome::success("prod", "https://example/pull/1")],
        };
        assert!(message.is_success());

        message
            .outcomes
            .push(PullRequestOutcome::failure("stg", "ref not found"));
        assert!(!message.is_success());
        assert_eq!(message.outcomes[0].url(), Some("https://example/pull/1"));
        assert_eq!(message.outcomes[1].url(), None);
    }

    #[test]
    fn outcome_serializes_flat() {
        let outcome = PullRequestOutcome::failure("prod", "boom");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["env"], "prod");
        assert_eq!(json["status"], "failure");
        assert_eq!(json["error"], "boom");
    }
}
