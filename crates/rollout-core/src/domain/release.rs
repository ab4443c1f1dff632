//! The in-flight unit of work for one (application, manifest target, version).

use std::collections::{BTreeMap, BTreeSet};

use rollout_backends::RepoCoords;
use serde::{Deserialize, Serialize};

use crate::config::RolloutSettings;
use crate::domain::application::{Application, ManifestTarget};

/// Base branch used when nothing else is configured.
pub const FALLBACK_BASE_BRANCH: &str = "master";

/// Identity stamped on rollout commits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitAuthor {
    pub name: String,
    pub email: String,
}

/// Accumulated edits, branch and message for one manifest target.
///
/// Created fresh per target and dropped once the commit/PR step finishes.
/// `files` is the only content cache: a file is fetched once, then every
/// later rule edits the stored copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub env: String,
    pub repo: RepoCoords,
    pub base_branch: String,
    pub commit_branch: String,
    /// Commit message and PR title
    pub message: String,
    pub body: String,
    pub labels: Vec<String>,
    pub author: GitAuthor,
    pub commit_without_pr: bool,
    /// File path -> fully edited content
    pub files: BTreeMap<String, String>,
    /// Versions superseded by the edits, deduplicated
    pub old_versions: BTreeSet<String>,
}

impl Release {
    pub fn new(
        settings: &RolloutSettings,
        app: &Application,
        target: &ManifestTarget,
        version: &str,
    ) -> Self {
        let base_branch = resolve_base_branch(settings, app, target);
        let commit_branch = if target.commit_without_pr {
            base_branch.clone()
        } else {
            branch_name(app, target, version)
        };

        Release {
            env: target.env.clone(),
            repo: resolve_manifest_repo(settings, app, target),
            base_branch,
            commit_branch,
            message: commit_message(app, target, version),
            body: String::new(),
            labels: release_labels(app, target),
            author: settings.git_author.clone(),
            commit_without_pr: target.commit_without_pr,
            files: BTreeMap::new(),
            old_versions: BTreeSet::new(),
        }
    }
}

fn first_non_empty<'a>(candidates: &[&'a str]) -> Option<&'a str> {
    candidates.iter().copied().find(|c| !c.is_empty())
}

/// Target override > application override > process default > `master`.
pub fn resolve_base_branch(
    settings: &RolloutSettings,
    app: &Application,
    target: &ManifestTarget,
) -> String {
    first_non_empty(&[
        target.base_branch.as_str(),
        app.manifest_base_branch.as_str(),
        settings.default_branch.as_str(),
    ])
    .unwrap_or(FALLBACK_BASE_BRANCH)
    .to_string()
}

/// Target value > application value > process default, for owner and name
/// independently.
pub fn resolve_manifest_repo(
    settings: &RolloutSettings,
    app: &Application,
    target: &ManifestTarget,
) -> RepoCoords {
    let owner = first_non_empty(&[
        target.manifest_owner.as_str(),
        app.manifest_owner.as_str(),
        settings.default_manifest_owner.as_str(),
    ])
    .unwrap_or_default();
    let name = first_non_empty(&[
        target.manifest_name.as_str(),
        app.manifest_name.as_str(),
        settings.default_manifest_name.as_str(),
    ])
    .unwrap_or_default();
    RepoCoords::new(owner, name)
}

/// `rollout/<env>[-<label>]-<version>`
pub fn branch_name(app: &Application, target: &ManifestTarget, version: &str) -> String {
    let mut branch = format!("rollout/{}", target.env);
    if let Some(label) = app.display_label(target, "-") {
        branch.push('-');
        branch.push_str(&label);
    }
    branch.push('-');
    branch.push_str(version);
    branch
}

/// `Rollout <env> [<label>] <version>`
pub fn commit_message(app: &Application, target: &ManifestTarget, version: &str) -> String {
    let mut message = format!("Rollout {}", target.env);
    if let Some(label) = app.display_label(target, "/") {
        message.push(' ');
        message.push_str(&label);
    }
    message.push(' ');
    message.push_str(version);
    message
}

/// Source repository name, env, then configured labels; no empties, no repeats.
pub fn release_labels(app: &Application, target: &ManifestTarget) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    let candidates = [&app.source_name, &target.env]
        .into_iter()
        .chain(target.labels.iter());
    for label in candidates {
        if !label.is_empty() && !labels.contains(label) {
            labels.push(label.clone());
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> RolloutSettings {
        RolloutSettings {
            git_author: GitAuthor {
                name: "test".to_string(),
                email: "test@test.test".to_string(),
            },
            ..Default::default()
        }
    }

    fn app() -> Application {
        Application {
            name: "foo".to_string(),
            source_owner: "acme".to_string(),
            source_name: "foo-src".to_string(),
            manifest_base_branch: "master".to_string(),
            ..Default::default()
        }
    }

    fn target(env: &str) -> ManifestTarget {
        ManifestTarget {
            env: env.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_release_branches() {
        let mut manifest = target("production");
        let r = Release::new(&settings(), &app(), &manifest, "bar");
        assert_eq!(r.commit_branch, "rollout/production-foo-bar");
        assert_eq!(r.base_branch, "master");
        assert_eq!(r.author.name, "test");

        manifest.base_branch = "production".to_string();
        let r2 = Release::new(&settings(), &app(), &manifest, "bar");
        assert_eq!(r2.commit_branch, "rollout/production-foo-bar");
        assert_eq!(r2.base_branch, "production");

        manifest.commit_without_pr = true;
        let r3 = Release::new(&settings(), &app(), &manifest, "bar");
        assert_eq!(r3.commit_branch, "production");
        assert_eq!(r3.base_branch, "production");
        assert!(r3.commit_without_pr);
    }

    #[test]
    fn test_base_branch_precedence() {
        let mut s = settings();
        let mut a = app();
        let mut t = target("prod");
        a.manifest_base_branch.clear();
        assert_eq!(resolve_base_branch(&s, &a, &t), "master");

        s.default_branch = "develop".to_string();
        assert_eq!(resolve_base_branch(&s, &a, &t), "develop");

        a.manifest_base_branch = "main".to_string();
        assert_eq!(resolve_base_branch(&s, &a, &t), "main");

        t.base_branch = "staging".to_string();
        assert_eq!(resolve_base_branch(&s, &a, &t), "staging");
    }

    #[test]
    fn test_manifest_repo_precedence() {
        let mut s = settings();
        s.default_manifest_owner = "default-org".to_string();
        s.default_manifest_name = "default-manifests".to_string();
        let mut a = app();
        let mut t = target("prod");
        assert_eq!(
            resolve_manifest_repo(&s, &a, &t).to_string(),
            "default-org/default-manifests"
        );

        a.manifest_owner = "app-org".to_string();
        assert_eq!(
            resolve_manifest_repo(&s, &a, &t).to_string(),
            "app-org/default-manifests"
        );

        t.manifest_owner = "target-org".to_string();
        t.manifest_name = "target-manifests".to_string();
        assert_eq!(
            resolve_manifest_repo(&s, &a, &t).to_string(),
            "target-org/target-manifests"
        );
    }

    #[test]
    fn test_naming_is_deterministic() {
        let t = target("prod");
        assert_eq!(branch_name(&app(), &t, "v2"), branch_name(&app(), &t, "v2"));
        assert_eq!(commit_message(&app(), &t, "v2"), "Rollout prod foo v2");
    }

    #[test]
    fn test_naming_without_app_name() {
        let mut a = app();
        a.name.clear();
        let mut t = target("prod");
        assert_eq!(branch_name(&a, &t, "v2"), "rollout/prod-foo-src-v2");
        assert_eq!(commit_message(&a, &t, "v2"), "Rollout prod foo-src v2");

        t.show_source_owner = true;
        assert_eq!(branch_name(&a, &t, "v2"), "rollout/prod-acme-foo-src-v2");
        assert_eq!(commit_message(&a, &t, "v2"), "Rollout prod acme/foo-src v2");

        t.hide_source_name = true;
        assert_eq!(branch_name(&a, &t, "v2"), "rollout/prod-v2");
        assert_eq!(commit_message(&a, &t, "v2"), "Rollout prod v2");
    }

    #[test]
    fn test_labels_order_and_dedup() {
        let mut t = target("prod");
        t.labels = vec!["release".to_string(), "prod".to_string(), String::new()];
        assert_eq!(
            release_labels(&app(), &t),
            vec!["foo-src".to_string(), "prod".to_string(), "release".to_string()]
        );
    }
}
