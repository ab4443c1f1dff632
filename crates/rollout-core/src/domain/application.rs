//! Applications and their manifest targets.
//!
//! Both are loaded once from configuration and never mutated afterwards.

use rollout_backends::RepoCoords;
use serde::{Deserialize, Serialize};

/// Version-prefix filters of a manifest target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filters {
    pub include_prefixes: Vec<String>,
    pub exclude_prefixes: Vec<String>,
}

/// One environment's set of files to rewrite plus its branch/PR policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestTarget {
    /// Environment label, e.g. `prod`
    pub env: String,
    /// Overrides the application's manifest repository owner
    pub manifest_owner: String,
    /// Overrides the application's manifest repository name
    pub manifest_name: String,
    pub files: Vec<String>,
    pub filters: Filters,
    /// Free text appended to the generated PR body
    pub pr_body: String,
    /// Overrides every other base-branch setting
    pub base_branch: String,
    pub commit_without_pr: bool,
    pub labels: Vec<String>,

    pub show_source_owner: bool,
    pub hide_source_name: bool,
    pub hide_source_release_desc: bool,
    pub hide_source_release_pull_requests: bool,
}

/// A built container image mapped to the manifests that deploy it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Application {
    pub name: String,
    pub source_owner: String,
    pub source_name: String,
    pub image: String,

    pub manifest_owner: String,
    pub manifest_name: String,
    pub manifest_base_branch: String,

    /// YAML keys whose value is the version, e.g. `appVersion`
    pub additional_rewrite_keys: Vec<String>,
    /// Raw prefixes directly followed by the version, e.g. `ref=`
    #[serde(alias = "additional_rewrite_prefixes")]
    pub additional_rewrite_prefix: Vec<String>,

    #[serde(rename = "manifests")]
    pub manifest_targets: Vec<ManifestTarget>,
}

impl Application {
    /// Repository the image is built from.
    pub fn source_repo(&self) -> RepoCoords {
        RepoCoords::new(&self.source_owner, &self.source_name)
    }

    /// Label identifying this application in branch names: the application
    /// name when set, otherwise the source repository name (optionally
    /// owner-qualified with `separator`), or `None` when the target hides it.
    pub fn display_label(&self, target: &ManifestTarget, separator: &str) -> Option<String> {
        if !self.name.is_empty() {
            return Some(self.name.clone());
        }
        if target.hide_source_name {
            return None;
        }
        if target.show_source_owner {
            Some(format!("{}{}{}", self.source_owner, separator, self.source_name))
        } else {
            Some(self.source_name.clone())
        }
    }
}
