//! Pull request body describing what a rollout ships.
//!
//! For every superseded version the body links the source repository's
//! compare view and lists the pull requests merged in that range, found by
//! reading merge-commit messages. Anything that cannot be fetched degrades
//! the body and is logged; it never fails the rollout.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use rollout_backends::{GitOps, RepoCoords};
use tracing::warn;

use crate::context::CallContext;
use crate::domain::{Application, ManifestTarget, RolloutError};

/// First line of a GitHub merge commit.
static MERGE_COMMIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Merge pull request #(?P<number>\d+) ").expect("merge commit regex is valid")
});

/// Builds PR bodies against a source-code host's web UI.
pub struct ChangelogGenerator<'a, G: GitOps + ?Sized> {
    ctx: &'a CallContext,
    git: &'a G,
    web_url: &'a str,
}

impl<'a, G: GitOps + ?Sized> ChangelogGenerator<'a, G> {
    pub fn new(ctx: &'a CallContext, git: &'a G, web_url: &'a str) -> Self {
        Self { ctx, git, web_url }
    }

    /// Render the body for rolling `app` out at `new_version` over
    /// `old_versions`, ending with the target's own PR body when set.
    pub async fn generate_body(
        &self,
        app: &Application,
        target: &ManifestTarget,
        new_version: &str,
        old_versions: &BTreeSet<String>,
    ) -> String {
        let mut body = String::new();
        let source = app.source_repo();
        let source_url = format!("{}/{}", self.web_url, source);

        if !target.hide_source_release_desc {
            body.push_str("# Release\n");
            let _ = writeln!(body, "{source_url}/releases/tag/{new_version}");
            body.push('\n');
            body.push_str("## Changes\n\n");

            for old in old_versions.iter().filter(|v| v.as_str() != new_version) {
                let _ = write!(body, "{source_url}/compare/{old}...{new_version}\n\n");
                if target.hide_source_release_pull_requests {
                    continue;
                }
                body.push_str("### Pull Requests\n\n");
                match self.merged_pull_requests(&source, old, new_version).await {
                    Ok(lines) => {
                        for line in lines {
                            body.push_str(&line);
                            body.push('\n');
                        }
                        body.push('\n');
                    }
                    Err(e) => warn!(error = %e, "skipping pull request listing"),
                }
            }
            body.push('\n');
        }

        if !target.pr_body.is_empty() {
            let _ = write!(body, "\n---\n{}", target.pr_body);
        }
        body
    }

    /// One `- <title> by @<login> in <owner>/<name>#<n>` line per merged PR
    /// between `old` and `new`. PRs that cannot be fetched are left out.
    async fn merged_pull_requests(
        &self,
        source: &RepoCoords,
        old: &str,
        new: &str,
    ) -> Result<Vec<String>, RolloutError> {
        let range = format!("{old}...{new}");
        let commits = self
            .ctx
            .call("compare_commits", self.git.compare_commits(source, old, new))
            .await
            .map_err(|source| RolloutError::ChangelogFetch {
                range: range.clone(),
                source,
            })?;

        let numbers: Vec<u64> = commits
            .iter()
            .filter_map(|c| MERGE_COMMIT.captures(&c.message))
            .filter_map(|caps| caps.name("number")?.as_str().parse().ok())
            .collect();

        let mut lines = Vec::with_capacity(numbers.len());
        for number in numbers {
            match self
                .ctx
                .call("get_pull_request", self.git.get_pull_request(source, number))
                .await
            {
                Ok(pull) => lines.push(format!(
                    "- {} by @{} in {}#{}",
                    pull.title, pull.author, source, pull.number
                )),
                Err(e) => warn!(range = %range, number = number, error = %e, "failed to fetch pull request"),
            }
        }
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollout_backends::fakes::MemoryGitHost;
    use rollout_backends::{CommitSummary, PullRequest};
    use std::time::Duration;

    const WEB: &str = "https://github.com";

    fn app() -> Application {
        Application {
            name: "foo".to_string(),
            source_owner: "x".to_string(),
            source_name: "foo".to_string(),
            ..Default::default()
        }
    }

    fn versions(v: &[&str]) -> BTreeSet<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn summary(message: &str) -> CommitSummary {
        CommitSummary {
            sha: "0".repeat(40),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_merge_commit_pattern() {
        let caps = MERGE_COMMIT
            .captures("Merge pull request #42 from x/feature\n\nAdd thing")
            .unwrap();
        assert_eq!(&caps["number"], "42");
        assert!(MERGE_COMMIT.captures("Revert \"Merge pull request #42 \"").is_none());
        assert!(MERGE_COMMIT.captures("Merge pull request #42").is_none());
    }

    #[tokio::test]
    async fn test_body_lists_merged_pull_requests() {
        let host = MemoryGitHost::new();
        let source = RepoCoords::new("x", "foo");
        host.add_comparison(
            &source,
            "v1",
            "v2",
            vec![
                summary("Merge pull request #7 from x/feature\n\nAdd feature"),
                summary("fix typo"),
                summary("Merge pull request #9 from x/missing"),
            ],
        );
        host.add_source_pull_request(
            &source,
            PullRequest {
                number: 7,
                title: "Add feature".to_string(),
                author: "alice".to_string(),
                html_url: format!("{WEB}/x/foo/pull/7"),
            },
        );
        let ctx = CallContext::with_timeout(Duration::from_secs(5));
        let gen = ChangelogGenerator::new(&ctx, &host, WEB);
        let target = ManifestTarget {
            env: "prod".to_string(),
            pr_body: "Deploy carefully".to_string(),
            ..Default::default()
        };

        let body = gen.generate_body(&app(), &target, "v2", &versions(&["v1"])).await;
        assert_eq!(
            body,
            "# Release\n\
             https://github.com/x/foo/releases/tag/v2\n\
             \n\
             ## Changes\n\
             \n\
             https://github.com/x/foo/compare/v1...v2\n\
             \n\
             ### Pull Requests\n\
             \n\
             - Add feature by @alice in x/foo#7\n\
             \n\
             \n\
             \n---\nDeploy carefully"
        );
    }

    #[tokio::test]
    async fn test_compare_failure_keeps_compare_link() {
        let host = MemoryGitHost::new();
        let ctx = CallContext::with_timeout(Duration::from_secs(5));
        let gen = ChangelogGenerator::new(&ctx, &host, WEB);
        let target = ManifestTarget::default();

        let body = gen
            .generate_body(&app(), &target, "v3", &versions(&["v1", "v2"]))
            .await;
        assert!(body.contains("compare/v1...v3"));
        assert!(body.contains("compare/v2...v3"));
        assert!(!body.contains("- "));
    }

    #[tokio::test]
    async fn test_hidden_sections() {
        let host = MemoryGitHost::new();
        let ctx = CallContext::with_timeout(Duration::from_secs(5));
        let gen = ChangelogGenerator::new(&ctx, &host, WEB);

        let no_prs = ManifestTarget {
            hide_source_release_pull_requests: true,
            ..Default::default()
        };
        let body = gen.generate_body(&app(), &no_prs, "v2", &versions(&["v1"])).await;
        assert!(body.contains("compare/v1...v2"));
        assert!(!body.contains("### Pull Requests"));

        let hidden = ManifestTarget {
            hide_source_release_desc: true,
            pr_body: "notes".to_string(),
            ..Default::default()
        };
        let body = gen.generate_body(&app(), &hidden, "v2", &versions(&["v1"])).await;
        assert_eq!(body, "\n---\nnotes");
    }

    #[tokio::test]
    async fn test_same_version_is_not_compared() {
        let host = MemoryGitHost::new();
        let ctx = CallContext::with_timeout(Duration::from_secs(5));
        let gen = ChangelogGenerator::new(&ctx, &host, "https://ghe.example.com");
        let body = gen
            .generate_body(&app(), &ManifestTarget::default(), "v2", &versions(&["v2"]))
            .await;
        assert!(body.starts_with("# Release\nhttps://ghe.example.com/x/foo/releases/tag/v2\n"));
        assert!(!body.contains("compare/"));
    }
}
