//! Rollout-GitHub: HTTP adapters for Rollout (Layer 1)
//!
//! - `GitHubClient` implements `GitOps` against the GitHub REST v3 API,
//!   authenticated by a token or a GitHub App installation
//! - `SlackNotifier` implements `Notifier` with `chat.postMessage`
//!
//! Both are configured from the environment; tokens never come from the
//! YAML config file.

pub mod app;
pub mod error;
pub mod github;
pub mod slack;

pub use app::GitHubAppCredentials;
pub use error::AdapterError;
pub use github::{GitHubAuth, GitHubClient, GitHubConfig};
pub use slack::{SlackConfig, SlackNotifier};
