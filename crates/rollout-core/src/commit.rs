//! Turns a release's edited files into one commit and, optionally, a pull
//! request.
//!
//! Stages run in order:
//! `ResolveRef -> BuildTree -> PushCommit -> CreatePullRequest -> AddLabels -> AutoMerge`.
//! Direct-commit releases stop after `PushCommit`. Label and auto-merge
//! failures are logged; every earlier failure ends the release.

use std::fmt;

use chrono::Utc;
use rollout_backends::{
    CommitAuthor, CommitObject, GitOps, GitRef, MergeMethod, MergeRequest, NewCommit,
    NewPullRequest, PullRequest, RepoCoords, TreeEntry, TreeObject,
};
use tracing::{info, warn};

use crate::context::CallContext;
use crate::domain::{Release, Result, RolloutError};
use crate::obs;

/// Title of the squash commit created by auto-merge.
pub const AUTO_MERGE_TITLE: &str = "Auto-merged by rollout";

/// Commit builder stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStage {
    ResolveRef,
    BuildTree,
    PushCommit,
    CreatePullRequest,
    AddLabels,
    AutoMerge,
}

impl fmt::Display for CommitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommitStage::ResolveRef => "resolve_ref",
            CommitStage::BuildTree => "build_tree",
            CommitStage::PushCommit => "push_commit",
            CommitStage::CreatePullRequest => "create_pull_request",
            CommitStage::AddLabels => "add_labels",
            CommitStage::AutoMerge => "auto_merge",
        };
        f.write_str(name)
    }
}

/// Drives the commit stages for one release at a time.
pub struct CommitBuilder<'a, G: GitOps + ?Sized> {
    ctx: &'a CallContext,
    git: &'a G,
    auto_merge: bool,
}

impl<'a, G: GitOps + ?Sized> CommitBuilder<'a, G> {
    pub fn new(ctx: &'a CallContext, git: &'a G, auto_merge: bool) -> Self {
        Self {
            ctx,
            git,
            auto_merge,
        }
    }

    /// Run every applicable stage. Returns the pull request URL, or the
    /// commit URL for direct-commit releases.
    pub async fn run(&self, release: &Release) -> Result<String> {
        let commit = self.commit(release).await?;
        if release.commit_without_pr {
            return Ok(commit.html_url);
        }

        let pull = self.open_pull_request(release).await?;
        self.add_labels(release, pull.number).await;
        if self.auto_merge {
            self.auto_merge(&release.env, &pull.html_url).await;
        }
        Ok(pull.html_url)
    }

    /// `ResolveRef`, `BuildTree` and `PushCommit`.
    pub async fn commit(&self, release: &Release) -> Result<CommitObject> {
        let head = self.resolve_ref(release).await?;
        let tree = self.build_tree(release, &head).await?;
        self.push_commit(release, &head, &tree).await
    }

    async fn resolve_ref(&self, release: &Release) -> Result<GitRef> {
        obs::emit_target_stage(&release.env, &CommitStage::ResolveRef);
        let repo = &release.repo;
        let branch = &release.commit_branch;
        match self.ctx.call("get_ref", self.git.get_ref(repo, branch)).await {
            Ok(head) => Ok(head),
            Err(e) if e.is_not_found() => {
                let base = self
                    .ctx
                    .call("get_ref", self.git.get_ref(repo, &release.base_branch))
                    .await
                    .map_err(|source| RolloutError::RefResolution {
                        branch: release.base_branch.clone(),
                        source,
                    })?;
                info!(repo = %repo, branch = %branch, from = %base.sha, "creating rollout branch");
                self.ctx
                    .call("create_ref", self.git.create_ref(repo, branch, &base.sha))
                    .await
                    .map_err(|source| RolloutError::RefResolution {
                        branch: branch.clone(),
                        source,
                    })
            }
            Err(source) => Err(RolloutError::RefResolution {
                branch: branch.clone(),
                source,
            }),
        }
    }

    async fn build_tree(&self, release: &Release, head: &GitRef) -> Result<TreeObject> {
        obs::emit_target_stage(&release.env, &CommitStage::BuildTree);
        if release.files.is_empty() {
            return Err(RolloutError::NothingToCommit);
        }
        let entries: Vec<TreeEntry> = release
            .files
            .iter()
            .map(|(path, content)| TreeEntry::blob(path.as_str(), content.as_str()))
            .collect();
        self.ctx
            .call(
                "create_tree",
                self.git.create_tree(&release.repo, &head.sha, &entries),
            )
            .await
            .map_err(RolloutError::Tree)
    }

    async fn push_commit(
        &self,
        release: &Release,
        head: &GitRef,
        tree: &TreeObject,
    ) -> Result<CommitObject> {
        obs::emit_target_stage(&release.env, &CommitStage::PushCommit);
        let repo = &release.repo;
        let parent = self
            .ctx
            .call("get_commit", self.git.get_commit(repo, &head.sha))
            .await
            .map_err(RolloutError::Commit)?;

        let new_commit = NewCommit {
            message: release.message.clone(),
            tree_sha: tree.sha.clone(),
            parents: vec![parent.sha],
            author: CommitAuthor {
                name: release.author.name.clone(),
                email: release.author.email.clone(),
                date: Utc::now(),
            },
        };
        let commit = self
            .ctx
            .call("create_commit", self.git.create_commit(repo, &new_commit))
            .await
            .map_err(RolloutError::Commit)?;

        self.ctx
            .call(
                "update_ref",
                self.git
                    .update_ref(repo, &release.commit_branch, &commit.sha, false),
            )
            .await
            .map_err(RolloutError::Commit)?;
        info!(repo = %repo, branch = %release.commit_branch, sha = %commit.sha, "pushed rollout commit");
        Ok(commit)
    }

    /// `CreatePullRequest`
    pub async fn open_pull_request(&self, release: &Release) -> Result<PullRequest> {
        obs::emit_target_stage(&release.env, &CommitStage::CreatePullRequest);
        let request = NewPullRequest {
            title: release.message.clone(),
            head: release.commit_branch.clone(),
            base: release.base_branch.clone(),
            body: release.body.clone(),
            maintainer_can_modify: true,
        };
        self.ctx
            .call(
                "create_pull_request",
                self.git.create_pull_request(&release.repo, &request),
            )
            .await
            .map_err(RolloutError::PullRequestCreation)
    }

    /// `AddLabels`; failures are logged only.
    pub async fn add_labels(&self, release: &Release, number: u64) {
        if release.labels.is_empty() {
            return;
        }
        obs::emit_target_stage(&release.env, &CommitStage::AddLabels);
        if let Err(e) = self
            .ctx
            .call(
                "add_labels",
                self.git.add_labels(&release.repo, number, &release.labels),
            )
            .await
        {
            warn!(env = %release.env, number = number, error = %e, "failed to add labels");
        }
    }

    /// `AutoMerge`; failures are logged only.
    pub async fn auto_merge(&self, env: &str, pull_url: &str) {
        obs::emit_target_stage(env, &CommitStage::AutoMerge);
        if let Err(e) = self.try_auto_merge(pull_url).await {
            warn!(env = %env, url = %pull_url, error = %e, "auto-merge failed");
        }
    }

    async fn try_auto_merge(&self, pull_url: &str) -> Result<()> {
        let (repo, number) = parse_pull_request_url(pull_url)?;
        let request = MergeRequest {
            commit_title: AUTO_MERGE_TITLE.to_string(),
            method: MergeMethod::Squash,
        };
        self.ctx
            .call(
                "merge_pull_request",
                self.git.merge_pull_request(&repo, number, &request),
            )
            .await
            .map_err(RolloutError::AutoMerge)?;
        info!(repo = %repo, number = number, "auto-merged pull request");
        Ok(())
    }
}

/// Parse `.../{owner}/{repo}/pull/{number}`.
pub fn parse_pull_request_url(url: &str) -> Result<(RepoCoords, u64)> {
    let invalid = || RolloutError::InvalidPullRequestUrl(url.to_string());
    let parts: Vec<&str> = url.trim_end_matches('/').split('/').collect();
    if parts.len() < 5 {
        return Err(invalid());
    }
    let n = parts.len();
    if parts[n - 2] != "pull" || parts[n - 4].is_empty() || parts[n - 3].is_empty() {
        return Err(invalid());
    }
    let number = parts[n - 1].parse::<u64>().map_err(|_| invalid())?;
    Ok((RepoCoords::new(parts[n - 4], parts[n - 3]), number))
}
