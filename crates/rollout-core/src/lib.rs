//! Rollout Core Library
//!
//! Release construction engine: a built image is matched to its
//! application, qualifying manifest targets are rewritten with regex rules,
//! committed as one atomic change and proposed as a pull request.
//!
//! ## Key Components
//!
//! - `ApplicationRegistry`: image -> application lookup
//! - `filter`: version-prefix policy per manifest target
//! - `rewrite`: ordered change rules over file contents
//! - `CommitBuilder`: ref, tree, commit, pull request, labels, auto-merge
//! - `ChangelogGenerator`: PR body from the compared source history
//! - `ReleaseOrchestrator` / `Rollout`: per-target sequencing and notification

pub mod changelog;
pub mod commit;
pub mod config;
pub mod context;
pub mod domain;
pub mod filter;
pub mod obs;
pub mod orchestrator;
pub mod registry;
pub mod rewrite;
pub mod rollout;
pub mod telemetry;

pub use changelog::ChangelogGenerator;
pub use commit::{parse_pull_request_url, CommitBuilder, CommitStage, AUTO_MERGE_TITLE};
pub use config::{RolloutConfig, RolloutSettings, CONFIG_PATH_ENV};
pub use context::{CallContext, CallError, CancelHandle};
pub use domain::{
    Application, Filters, GitAuthor, ImageTag, ManifestTarget, RegistryAction, RegistryEvent,
    Release, Result, Result as RolloutResult, RolloutError,
};
pub use filter::should_process;
pub use orchestrator::ReleaseOrchestrator;
pub use registry::ApplicationRegistry;
pub use rewrite::{apply_rules, rules_for, ChangeRule, RuleKind};
pub use rollout::{Rollout, RolloutReport};
