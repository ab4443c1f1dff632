//! Domain-level error taxonomy for Rollout.
//!
//! Errors are contained at the manifest-target boundary: the orchestrator
//! turns a failed target into an error outcome and moves on. Variants marked
//! "logged only" never reach an outcome.

use crate::context::CallError;

/// Rollout domain errors.
#[derive(Debug, thiserror::Error)]
pub enum RolloutError {
    /// No application is configured for the built image (event dropped).
    #[error("no application configured for image {image}")]
    NoApplication { image: String },

    #[error("invalid image reference: {0}")]
    InvalidImageTag(String),

    /// A manifest file could not be fetched; that file is skipped.
    #[error("failed to fetch {path}: {source}")]
    ContentFetch {
        path: String,
        #[source]
        source: CallError,
    },

    #[error("failed to resolve branch {branch}: {source}")]
    RefResolution {
        branch: String,
        #[source]
        source: CallError,
    },

    #[error("failed to create tree: {0}")]
    Tree(#[source] CallError),

    #[error("failed to push commit: {0}")]
    Commit(#[source] CallError),

    #[error("nothing to commit: no manifest file could be edited")]
    NothingToCommit,

    /// The commit already landed on the branch when this happens.
    #[error("failed to create pull request: {0}")]
    PullRequestCreation(#[source] CallError),

    /// Degrades the changelog only (logged only).
    #[error("failed to build changelog for {range}: {source}")]
    ChangelogFetch {
        range: String,
        #[source]
        source: CallError,
    },

    /// Logged only; the pull request stays open for a manual merge.
    #[error("failed to auto-merge pull request: {0}")]
    AutoMerge(#[source] CallError),

    #[error("cannot parse pull request URL: {0}")]
    InvalidPullRequestUrl(String),

    #[error("failed to post notification: {0}")]
    Notify(#[source] CallError),

    #[error("invalid rewrite pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Rollout domain operations.
pub type Result<T> = std::result::Result<T, RolloutError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rollout_backends::BackendError;

    #[test]
    fn test_no_application_display() {
        let err = RolloutError::NoApplication {
            image: "gcr.io/x/foo".to_string(),
        };
        assert!(err.to_string().contains("gcr.io/x/foo"));
    }

    #[test]
    fn test_ref_resolution_display_includes_cause() {
        let err = RolloutError::RefResolution {
            branch: "main".to_string(),
            source: CallError::Backend(BackendError::not_found("refs/heads/main")),
        };
        let msg = err.to_string();
        assert!(msg.contains("main"));
        assert!(msg.contains("not found"));
    }

    #[test]
    fn test_cancelled_commit_display() {
        let err = RolloutError::Commit(CallError::Cancelled { op: "create_commit" });
        assert!(err.to_string().contains("cancelled"));
    }
}
