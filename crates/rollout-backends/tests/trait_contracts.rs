//! Trait contract tests for ContentStore, GitOps, and Notifier.
//!
//! These tests verify the behavioral contracts of the backend traits
//! using in-memory fakes. Any conforming implementation must pass these.

use chrono::Utc;
use rollout_backends::backend_traits::*;
use rollout_backends::fakes::{ops, MemoryGitHost, RecordingNotifier};
use rollout_backends::BackendError;

fn manifests() -> RepoCoords {
    RepoCoords::new("org", "manifests")
}

fn author() -> CommitAuthor {
    CommitAuthor {
        name: "rollout-bot".to_string(),
        email: "bot@example.com".to_string(),
        date: Utc::now(),
    }
}

// ===========================================================================
// ContentStore contract tests
// ===========================================================================

#[tokio::test]
async fn content_read_at_branch() {
    let host = MemoryGitHost::new();
    host.seed_branch(&manifests(), "main", &[("deploy.yaml", "image: app:v1\n")]);

    let content = host
        .get_file_content(&manifests(), "deploy.yaml", "main")
        .await
        .unwrap();
    assert_eq!(content, "image: app:v1\n");
}

#[tokio::test]
async fn content_missing_file_is_not_found() {
    let host = MemoryGitHost::new();
    host.seed_branch(&manifests(), "main", &[]);

    let err = host
        .get_file_content(&manifests(), "missing.yaml", "main")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

// ===========================================================================
// GitOps contract tests
// ===========================================================================

#[tokio::test]
async fn ref_missing_branch_is_not_found() {
    let host = MemoryGitHost::new();
    host.seed_branch(&manifests(), "main", &[]);

    let err = host.get_ref(&manifests(), "feature").await.unwrap_err();
    assert!(matches!(err, BackendError::NotFound { .. }));
}

#[tokio::test]
async fn create_ref_twice_is_rejected() {
    let host = MemoryGitHost::new();
    let sha = host.seed_branch(&manifests(), "main", &[]);

    host.create_ref(&manifests(), "rollout/x", &sha).await.unwrap();
    let err = host
        .create_ref(&manifests(), "rollout/x", &sha)
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Rejected { .. }));
}

#[tokio::test]
async fn tree_commit_and_fast_forward() {
    let host = MemoryGitHost::new();
    let base = host.seed_branch(
        &manifests(),
        "main",
        &[("a.yaml", "a: 1\n"), ("b.yaml", "b: 1\n")],
    );

    let tree = host
        .create_tree(&manifests(), &base, &[TreeEntry::blob("a.yaml", "a: 2\n")])
        .await
        .unwrap();
    let commit = host
        .create_commit(
            &manifests(),
            &NewCommit {
                message: "bump a".to_string(),
                tree_sha: tree.sha,
                parents: vec![base],
                author: author(),
            },
        )
        .await
        .unwrap();
    host.update_ref(&manifests(), "main", &commit.sha, false)
        .await
        .unwrap();

    assert_eq!(
        host.file_at(&manifests(), "main", "a.yaml").as_deref(),
        Some("a: 2\n")
    );
    // untouched files carry over from the base tree
    assert_eq!(
        host.file_at(&manifests(), "main", "b.yaml").as_deref(),
        Some("b: 1\n")
    );
    assert!(commit.html_url.ends_with(&commit.sha));
}

#[tokio::test]
async fn non_fast_forward_update_is_rejected() {
    let host = MemoryGitHost::new();
    let base = host.seed_branch(&manifests(), "main", &[("a.yaml", "a: 1\n")]);
    let tree = host.create_tree(&manifests(), &base, &[]).await.unwrap();

    // orphan commit: no parent, so moving main onto it would drop history
    let orphan = host
        .create_commit(
            &manifests(),
            &NewCommit {
                message: "orphan".to_string(),
                tree_sha: tree.sha,
                parents: vec![],
                author: author(),
            },
        )
        .await
        .unwrap();

    let err = host
        .update_ref(&manifests(), "main", &orphan.sha, false)
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Rejected { .. }));
    assert_eq!(host.branch_head(&manifests(), "main"), Some(base));
}

#[tokio::test]
async fn pull_request_labels_and_merge() {
    let host = MemoryGitHost::new();
    let sha = host.seed_branch(&manifests(), "main", &[]);
    host.create_ref(&manifests(), "rollout/prod-v2", &sha)
        .await
        .unwrap();

    let pr = host
        .create_pull_request(
            &manifests(),
            &NewPullRequest {
                title: "Rollout prod v2".to_string(),
                head: "rollout/prod-v2".to_string(),
                base: "main".to_string(),
                body: String::new(),
                maintainer_can_modify: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(pr.html_url, "https://github.com/org/manifests/pull/1");

    host.add_labels(&manifests(), pr.number, &["prod".to_string()])
        .await
        .unwrap();
    let merge = MergeRequest {
        commit_title: "merge".to_string(),
        method: MergeMethod::Squash,
    };
    host.merge_pull_request(&manifests(), pr.number, &merge)
        .await
        .unwrap();
    let err = host
        .merge_pull_request(&manifests(), pr.number, &merge)
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Rejected { .. }));

    let records = host.pull_requests(&manifests());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].labels, vec!["prod".to_string()]);
    assert_eq!(records[0].merged.as_ref().map(|m| m.method), Some(MergeMethod::Squash));
}

#[tokio::test]
async fn injected_failures_surface_as_http_errors() {
    let host = MemoryGitHost::new();
    host.seed_branch(&manifests(), "main", &[]);
    host.fail_on(ops::GET_REF);

    let err = host.get_ref(&manifests(), "main").await.unwrap_err();
    assert!(matches!(err, BackendError::Http { status: 500, .. }));
    assert_eq!(host.call_count(ops::GET_REF), 1);
}

// ===========================================================================
// Notifier contract tests
// ===========================================================================

#[tokio::test]
async fn notifier_records_posts_in_order() {
    let notifier = RecordingNotifier::new();
    let message = RolloutMessage {
        app_name: "foo".to_string(),
        image: "gcr.io/x/foo".to_string(),
        version: "v2".to_string(),
        outcomes: vec![PullRequestOutcome::success("prod", "https://x/pull/1")],
    };

    notifier.post("#deploys", &message).await.unwrap();
    let posts = notifier.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].0, "#deploys");
    assert_eq!(posts[0].1, message);

    notifier.fail_posts();
    assert!(notifier.post("#deploys", &message).await.is_err());
}
