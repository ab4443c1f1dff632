//! Regex rewrite rules over manifest files.
//!
//! Rules run in a fixed order per file: image tag, generic `version:` field,
//! additional keys, additional prefixes. Every match records the version it
//! replaces into the release's old-version set before substituting the new
//! one. The generic `version:` rule leaves a match alone when a
//! `do-not-rewrite` or `no-rewrite` marker follows it on the same line.

use std::collections::BTreeSet;

use regex::{Captures, Regex};
use rollout_backends::ContentStore;
use tracing::{debug, warn};

use crate::context::CallContext;
use crate::domain::{Application, Release, Result, RolloutError};

/// Characters a version token may contain.
const VERSION_TOKEN: &str = r"(?P<version>[A-Za-z0-9_+.-]*)";

/// Comments that pin a `version:` field.
const REWRITE_MARKERS: [&str; 2] = ["do-not-rewrite", "no-rewrite"];

/// Which configured value produced a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleKind {
    ImageTag,
    VersionField,
    AdditionalKey(String),
    AdditionalPrefix(String),
}

/// A compiled rewrite with its fixed replacement text.
#[derive(Debug, Clone)]
pub struct ChangeRule {
    kind: RuleKind,
    pattern: Regex,
    replacement: String,
    skip_marked: bool,
}

fn quoted(value: &str, quote: bool) -> String {
    if quote {
        format!("\"{value}\"")
    } else {
        value.to_string()
    }
}

impl ChangeRule {
    /// `<image>:<old>` -> `<image>:<new>`
    pub fn image_tag(image: &str, new_version: &str) -> Result<Self> {
        Ok(Self {
            kind: RuleKind::ImageTag,
            pattern: Regex::new(&format!("{}:{VERSION_TOKEN}", regex::escape(image)))?,
            replacement: format!("{image}:{new_version}"),
            skip_marked: false,
        })
    }

    /// `version: <old>` -> `version: <new>`, unless a marker follows.
    pub fn version_field(new_version: &str, quote: bool) -> Result<Self> {
        Ok(Self {
            kind: RuleKind::VersionField,
            pattern: Regex::new(&format!("version: +\"?{VERSION_TOKEN}\"?"))?,
            replacement: format!("version: {}", quoted(new_version, quote)),
            skip_marked: true,
        })
    }

    /// `<key>: <old>` -> `<key>: <new>`
    pub fn additional_key(key: &str, new_version: &str, quote: bool) -> Result<Self> {
        Ok(Self {
            kind: RuleKind::AdditionalKey(key.to_string()),
            pattern: Regex::new(&format!(
                "{}: +\"?{VERSION_TOKEN}\"?",
                regex::escape(key)
            ))?,
            replacement: format!("{key}: {}", quoted(new_version, quote)),
            skip_marked: false,
        })
    }

    /// `<prefix><old>` -> `<prefix><new>`
    pub fn additional_prefix(prefix: &str, new_version: &str) -> Result<Self> {
        Ok(Self {
            kind: RuleKind::AdditionalPrefix(prefix.to_string()),
            pattern: Regex::new(&format!("{}{VERSION_TOKEN}", regex::escape(prefix)))?,
            replacement: format!("{prefix}{new_version}"),
            skip_marked: false,
        })
    }

    pub fn kind(&self) -> &RuleKind {
        &self.kind
    }

    /// Rewrite every match in `content`, recording superseded versions.
    pub fn apply(&self, content: &str, old_versions: &mut BTreeSet<String>) -> String {
        self.pattern
            .replace_all(content, |caps: &Captures<'_>| {
                let whole = &caps[0];
                let start = caps.get(0).map_or(0, |m| m.start());
                if self.skip_marked && marker_follows(content, start) {
                    return whole.to_string();
                }
                if let Some(old) = caps.name("version") {
                    if !old.as_str().is_empty() {
                        old_versions.insert(old.as_str().to_string());
                    }
                }
                self.replacement.clone()
            })
            .into_owned()
    }
}

/// Whether a rewrite marker appears between `start` and the end of its line.
///
/// Text before `start` is not inspected, so `# no-rewrite version: v1` is
/// still rewritten.
fn marker_follows(content: &str, start: usize) -> bool {
    let rest = &content[start..];
    let line = rest.find('\n').map_or(rest, |end| &rest[..end]);
    REWRITE_MARKERS.iter().any(|marker| line.contains(marker))
}

/// All rules for rolling `app` out at `version`, in application order.
pub fn rules_for(app: &Application, version: &str, quote: bool) -> Result<Vec<ChangeRule>> {
    let mut rules = Vec::with_capacity(
        2 + app.additional_rewrite_keys.len() + app.additional_rewrite_prefix.len(),
    );
    rules.push(ChangeRule::image_tag(&app.image, version)?);
    rules.push(ChangeRule::version_field(version, quote)?);
    for key in &app.additional_rewrite_keys {
        rules.push(ChangeRule::additional_key(key, version, quote)?);
    }
    for prefix in &app.additional_rewrite_prefix {
        rules.push(ChangeRule::additional_prefix(prefix, version)?);
    }
    Ok(rules)
}

/// Apply `rules` to `path` within `release`.
///
/// Content already edited for this release is reused; otherwise the file is
/// fetched from the release's base branch exactly once.
pub async fn apply_rules<S>(
    ctx: &CallContext,
    store: &S,
    release: &mut Release,
    path: &str,
    rules: &[ChangeRule],
) -> Result<()>
where
    S: ContentStore + ?Sized,
{
    let mut content = match release.files.get(path) {
        Some(edited) => edited.clone(),
        None => ctx
            .call(
                "get_file_content",
                store.get_file_content(&release.repo, path, &release.base_branch),
            )
            .await
            .map_err(|source| RolloutError::ContentFetch {
                path: path.to_string(),
                source,
            })?,
    };

    for rule in rules {
        content = rule.apply(&content, &mut release.old_versions);
    }
    debug!(path = %path, rules = rules.len(), "rewrote manifest file");
    release.files.insert(path.to_string(), content);
    Ok(())
}

/// Apply `rules` to every file in `paths`. Files that cannot be fetched are
/// logged and left out of the release.
pub async fn rewrite_files<S>(
    ctx: &CallContext,
    store: &S,
    release: &mut Release,
    paths: &[String],
    rules: &[ChangeRule],
) where
    S: ContentStore + ?Sized,
{
    for path in paths {
        if let Err(e) = apply_rules(ctx, store, release, path, rules).await {
            warn!(env = %release.env, path = %path, error = %e, "skipping manifest file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RolloutSettings;
    use crate::domain::ManifestTarget;
    use rollout_backends::fakes::{ops, MemoryGitHost};
    use rollout_backends::RepoCoords;
    use std::time::Duration;

    fn rewrite(rule: &ChangeRule, content: &str) -> (String, BTreeSet<String>) {
        let mut old = BTreeSet::new();
        let out = rule.apply(content, &mut old);
        (out, old)
    }

    #[test]
    fn test_image_tag_rule() {
        let rule = ChangeRule::image_tag("gcr.io/x/foo", "v2").unwrap();
        let (out, old) = rewrite(&rule, "image: gcr.io/x/foo:v1\nother: gcr.io/x/food:v1\n");
        assert_eq!(out, "image: gcr.io/x/foo:v2\nother: gcr.io/x/food:v1\n");
        assert_eq!(old.into_iter().collect::<Vec<_>>(), vec!["v1".to_string()]);
    }

    #[test]
    fn test_image_is_matched_literally() {
        let rule = ChangeRule::image_tag("gcr.io/x/foo", "v2").unwrap();
        let (out, old) = rewrite(&rule, "image: gcrXio/x/foo:v1\n");
        assert_eq!(out, "image: gcrXio/x/foo:v1\n");
        assert!(old.is_empty());
    }

    #[test]
    fn test_version_field_quoting() {
        let plain = ChangeRule::version_field("v2", false).unwrap();
        assert_eq!(rewrite(&plain, "version: \"v1\"\n").0, "version: v2\n");

        let quoted = ChangeRule::version_field("v2", true).unwrap();
        assert_eq!(rewrite(&quoted, "version:   v1\n").0, "version: \"v2\"\n");
    }

    #[test]
    fn test_version_field_skips_marker_lines() {
        let rule = ChangeRule::version_field("v2", false).unwrap();
        let content = "version: v1\nversion: v0 # do-not-rewrite\n  version: v0 # no-rewrite\n";
        let (out, old) = rewrite(&rule, content);
        assert_eq!(
            out,
            "version: v2\nversion: v0 # do-not-rewrite\n  version: v0 # no-rewrite\n"
        );
        assert_eq!(old.into_iter().collect::<Vec<_>>(), vec!["v1".to_string()]);
    }

    #[test]
    fn test_marker_before_field_does_not_protect_it() {
        let rule = ChangeRule::version_field("v2", false).unwrap();
        let content = "# no-rewrite version: v1\nversion: v0 # no-rewrite\n";
        let (out, old) = rewrite(&rule, content);
        assert_eq!(out, "# no-rewrite version: v2\nversion: v0 # no-rewrite\n");
        assert_eq!(old.into_iter().collect::<Vec<_>>(), vec!["v1".to_string()]);
    }

    #[test]
    fn test_marker_on_next_line_does_not_protect() {
        let rule = ChangeRule::version_field("v2", false).unwrap();
        let (out, _) = rewrite(&rule, "version: v1\n# do-not-rewrite\n");
        assert_eq!(out, "version: v2\n# do-not-rewrite\n");
    }

    #[test]
    fn test_marker_does_not_protect_image_tag() {
        let rule = ChangeRule::image_tag("gcr.io/x/foo", "v2").unwrap();
        let (out, _) = rewrite(&rule, "image: gcr.io/x/foo:v1 # do-not-rewrite\n");
        assert_eq!(out, "image: gcr.io/x/foo:v2 # do-not-rewrite\n");
    }

    #[test]
    fn test_additional_key_and_prefix() {
        let key = ChangeRule::additional_key("appVersion", "v2", true).unwrap();
        assert_eq!(rewrite(&key, "appVersion: v1\n").0, "appVersion: \"v2\"\n");

        let prefix = ChangeRule::additional_prefix("ref=", "v2").unwrap();
        let (out, old) = rewrite(&prefix, "url: git::https://h/r?ref=v1\n");
        assert_eq!(out, "url: git::https://h/r?ref=v2\n");
        assert!(old.contains("v1"));
        assert_eq!(prefix.kind(), &RuleKind::AdditionalPrefix("ref=".to_string()));
    }

    #[test]
    fn test_empty_capture_not_recorded() {
        let prefix = ChangeRule::additional_prefix("ref=", "v2").unwrap();
        let (out, old) = rewrite(&prefix, "ref=\n");
        assert_eq!(out, "ref=v2\n");
        assert!(old.is_empty());
    }

    #[test]
    fn test_zero_matches_is_unchanged() {
        let rule = ChangeRule::image_tag("gcr.io/x/foo", "v2").unwrap();
        let (out, old) = rewrite(&rule, "kind: Service\n");
        assert_eq!(out, "kind: Service\n");
        assert!(old.is_empty());
    }

    #[test]
    fn test_rules_compose_in_order() {
        let app = Application {
            image: "gcr.io/x/foo".to_string(),
            additional_rewrite_keys: vec!["appVersion".to_string()],
            additional_rewrite_prefix: vec!["ref=".to_string()],
            ..Default::default()
        };
        let rules = rules_for(&app, "v2", false).unwrap();
        let kinds: Vec<_> = rules.iter().map(|r| r.kind().clone()).collect();
        assert_eq!(
            kinds,
            vec![
                RuleKind::ImageTag,
                RuleKind::VersionField,
                RuleKind::AdditionalKey("appVersion".to_string()),
                RuleKind::AdditionalPrefix("ref=".to_string()),
            ]
        );

        let mut content =
            "image: gcr.io/x/foo:v1\nversion: v1\nappVersion: v0\nsrc: ?ref=v1\n".to_string();
        let mut old = BTreeSet::new();
        for rule in &rules {
            content = rule.apply(&content, &mut old);
        }
        assert_eq!(
            content,
            "image: gcr.io/x/foo:v2\nversion: v2\nappVersion: v2\nsrc: ?ref=v2\n"
        );
        assert_eq!(
            old.into_iter().collect::<Vec<_>>(),
            vec!["v0".to_string(), "v1".to_string()]
        );
    }

    fn release_for(repo: &RepoCoords) -> Release {
        let app = Application {
            name: "foo".to_string(),
            image: "gcr.io/x/foo".to_string(),
            manifest_owner: repo.owner.clone(),
            manifest_name: repo.name.clone(),
            ..Default::default()
        };
        let target = ManifestTarget {
            env: "prod".to_string(),
            ..Default::default()
        };
        Release::new(&RolloutSettings::default(), &app, &target, "v2")
    }

    #[tokio::test]
    async fn test_apply_rules_fetches_each_file_once() {
        let repo = RepoCoords::new("x", "manifests");
        let host = MemoryGitHost::new();
        host.seed_branch(
            &repo,
            "master",
            &[
                ("a.yaml", "image: gcr.io/x/foo:v1\n"),
                ("b.yaml", "image: gcr.io/x/foo:v1\nversion: v0\n"),
            ],
        );
        let ctx = CallContext::with_timeout(Duration::from_secs(5));
        let mut release = release_for(&repo);
        let image = vec![ChangeRule::image_tag("gcr.io/x/foo", "v2").unwrap()];
        let version = vec![ChangeRule::version_field("v2", false).unwrap()];

        for path in ["a.yaml", "b.yaml"] {
            apply_rules(&ctx, &host, &mut release, path, &image).await.unwrap();
            apply_rules(&ctx, &host, &mut release, path, &version).await.unwrap();
        }

        assert_eq!(host.call_count(ops::GET_FILE_CONTENT), 2);
        assert_eq!(release.files["b.yaml"], "image: gcr.io/x/foo:v2\nversion: v2\n");
        assert_eq!(
            release.old_versions.iter().cloned().collect::<Vec<_>>(),
            vec!["v0".to_string(), "v1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_skipped() {
        let repo = RepoCoords::new("x", "manifests");
        let host = MemoryGitHost::new();
        host.seed_branch(&repo, "master", &[("a.yaml", "image: gcr.io/x/foo:v1\n")]);
        let ctx = CallContext::with_timeout(Duration::from_secs(5));
        let mut release = release_for(&repo);
        let rules = vec![ChangeRule::image_tag("gcr.io/x/foo", "v2").unwrap()];

        let err = apply_rules(&ctx, &host, &mut release, "missing.yaml", &rules)
            .await
            .unwrap_err();
        assert!(matches!(err, RolloutError::ContentFetch { .. }));

        let paths = vec!["a.yaml".to_string(), "missing.yaml".to_string()];
        rewrite_files(&ctx, &host, &mut release, &paths, &rules).await;
        assert_eq!(release.files.len(), 1);
        assert_eq!(release.files["a.yaml"], "image: gcr.io/x/foo:v2\n");
    }
}
