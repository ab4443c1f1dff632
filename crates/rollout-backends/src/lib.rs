//! Rollout-Backends: capability contracts for Rollout
//!
//! This crate defines the outbound interfaces the release engine talks to.
//! The engine never speaks HTTP itself; it drives these traits, and the
//! concrete adapters (GitHub, Slack) live in `rollout-github`.
//!
//! ## Layer 0 - Backends
//!
//! Focus: a narrow, async, backend-agnostic surface that is easy to fake.
//!
//! ## Key Components
//!
//! - `ContentStore`: read file contents at a ref
//! - `GitOps`: refs, trees, commits, pull requests, comparisons
//! - `Notifier`: post the aggregate rollout message to chat
//! - `fakes`: in-memory implementations for tests

mod error;
pub mod backend_traits;
pub mod fakes;

pub use backend_traits::{
    CommitAuthor, CommitObject, CommitSummary, ContentStore, GitOps, GitRef, MergeMethod,
    MergeRequest, NewCommit, NewPullRequest, Notifier, OutcomeStatus, PullRequest,
    PullRequestOutcome, RepoCoords, RolloutMessage, TreeEntry, TreeObject, MODE_REGULAR_FILE,
};
pub use error::{BackendError, BackendResult};
