//! YAML configuration and the settings derived from it.
//!
//! The file is read once at startup. [`RolloutConfig::settings`] and
//! [`RolloutConfig::registry`] hand the immutable pieces to the engine;
//! nothing holds a global pointer to the configuration.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Application, GitAuthor, Result, RolloutError};
use crate::registry::ApplicationRegistry;

/// Environment variable holding the config file path.
pub const CONFIG_PATH_ENV: &str = "ROLLOUT_CONFIG_PATH";

const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;
const DEFAULT_GITHUB_WEB_URL: &str = "https://github.com";

fn default_call_timeout_secs() -> u64 {
    DEFAULT_CALL_TIMEOUT_SECS
}

fn default_github_web_url() -> String {
    DEFAULT_GITHUB_WEB_URL.to_string()
}

/// On-disk configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutConfig {
    pub applications: Vec<Application>,
    pub git_author: GitAuthor,

    pub default_manifest_owner: String,
    pub default_manifest_name: String,
    pub default_branch: String,

    /// Chat channel for rollout notifications; empty disables posting
    pub slack_notify_channel: String,

    /// Write `version: "v2"` instead of `version: v2`
    pub enable_version_quote: bool,
    /// Squash-merge rollout PRs right after opening them
    pub enable_auto_merge: bool,

    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_github_web_url")]
    pub github_web_url: String,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        RolloutConfig {
            applications: Vec::new(),
            git_author: GitAuthor::default(),
            default_manifest_owner: String::new(),
            default_manifest_name: String::new(),
            default_branch: String::new(),
            slack_notify_channel: String::new(),
            enable_version_quote: false,
            enable_auto_merge: false,
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
            github_web_url: default_github_web_url(),
        }
    }
}

impl RolloutConfig {
    /// Read, apply environment overrides, and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::from_path(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "reading rollout config");
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Apply `ROLLOUT_ENABLE_VERSION_QUOTE`, `ROLLOUT_ENABLE_AUTO_MERGE` and
    /// `ROLLOUT_CALL_TIMEOUT_SECS` from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Same as [`apply_env_overrides`](Self::apply_env_overrides) with an
    /// injectable lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("ROLLOUT_ENABLE_VERSION_QUOTE") {
            self.enable_version_quote = parse_flag("ROLLOUT_ENABLE_VERSION_QUOTE", &raw)?;
        }
        if let Some(raw) = lookup("ROLLOUT_ENABLE_AUTO_MERGE") {
            self.enable_auto_merge = parse_flag("ROLLOUT_ENABLE_AUTO_MERGE", &raw)?;
        }
        if let Some(raw) = lookup("ROLLOUT_CALL_TIMEOUT_SECS") {
            self.call_timeout_secs = raw.trim().parse().map_err(|_| {
                RolloutError::Config(format!("ROLLOUT_CALL_TIMEOUT_SECS is not a number: {raw}"))
            })?;
        }
        Ok(())
    }

    /// Reject configurations the engine cannot act on.
    pub fn validate(&self) -> Result<()> {
        if self.call_timeout_secs == 0 {
            return Err(RolloutError::Config(
                "call_timeout_secs must be positive".to_string(),
            ));
        }
        let mut images = HashSet::new();
        for (idx, app) in self.applications.iter().enumerate() {
            if app.image.is_empty() {
                return Err(RolloutError::Config(format!(
                    "application #{idx} has no image"
                )));
            }
            if !images.insert(app.image.as_str()) {
                return Err(RolloutError::Config(format!(
                    "image {} is configured more than once",
                    app.image
                )));
            }
            for target in &app.manifest_targets {
                if target.env.is_empty() {
                    return Err(RolloutError::Config(format!(
                        "a manifest of {} has no env",
                        app.image
                    )));
                }
                if target.files.is_empty() {
                    return Err(RolloutError::Config(format!(
                        "manifest {} of {} lists no files",
                        target.env, app.image
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn settings(&self) -> RolloutSettings {
        RolloutSettings {
            git_author: self.git_author.clone(),
            default_manifest_owner: self.default_manifest_owner.clone(),
            default_manifest_name: self.default_manifest_name.clone(),
            default_branch: self.default_branch.clone(),
            notify_channel: Some(self.slack_notify_channel.clone()).filter(|c| !c.is_empty()),
            enable_version_quote: self.enable_version_quote,
            enable_auto_merge: self.enable_auto_merge,
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            github_web_url: self.github_web_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn registry(&self) -> ApplicationRegistry {
        ApplicationRegistry::new(self.applications.clone())
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(RolloutError::Config(format!(
            "{key} must be true or false, got {other}"
        ))),
    }
}

/// Process-wide, read-only settings used by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolloutSettings {
    pub git_author: GitAuthor,
    pub default_manifest_owner: String,
    pub default_manifest_name: String,
    pub default_branch: String,
    pub notify_channel: Option<String>,
    pub enable_version_quote: bool,
    pub enable_auto_merge: bool,
    pub call_timeout: Duration,
    pub github_web_url: String,
}

impl Default for RolloutSettings {
    fn default() -> Self {
        RolloutConfig::default().settings()
    }
}
