//! Structured observability hooks for rollout lifecycle events.
//!
//! This module provides:
//! - [`rollout_span`], instrumenting the future that handles one build
//! - Emission functions for key lifecycle events: start, target skip,
//!   commit stage, target finish, notification
//!
//! Events are emitted at `info!` level except skips (`debug!`) and
//! failures (`warn!`); filter with `RUST_LOG`.

use tracing::{debug, info, warn};

/// Span tagging every event of one build with a fresh rollout id, the image
/// and the version.
pub fn rollout_span(image: &str, version: &str) -> tracing::Span {
    let rollout_id = uuid::Uuid::new_v4();
    tracing::info_span!("rollout", rollout_id = %rollout_id, image = %image, version = %version)
}

/// Emit event: a build matched an application and processing starts.
pub fn emit_rollout_started(app_name: &str, image: &str, version: &str, targets: usize) {
    info!(
        event = "rollout.started",
        app = %app_name,
        image = %image,
        version = %version,
        targets = targets,
    );
}

/// Emit event: a manifest target was filtered out for this version.
pub fn emit_target_skipped(env: &str, version: &str) {
    debug!(event = "target.skipped", env = %env, version = %version);
}

/// Emit event: the commit builder entered a stage for a target.
pub fn emit_target_stage(env: &str, stage: &dyn std::fmt::Display) {
    info!(event = "target.stage", env = %env, stage = %stage);
}

/// Emit event: a manifest target finished with a URL or an error.
pub fn emit_target_finished(env: &str, success: bool, detail: &str, duration_ms: u64) {
    if success {
        info!(
            event = "target.finished",
            env = %env,
            success = true,
            url = %detail,
            duration_ms = duration_ms,
        );
    } else {
        warn!(
            event = "target.finished",
            env = %env,
            success = false,
            error = %detail,
            duration_ms = duration_ms,
        );
    }
}

/// Emit event: the aggregate message was posted (or failed to post).
pub fn emit_rollout_notified(channel: &str, success: bool, error: Option<&dyn std::fmt::Display>) {
    match error {
        None => info!(event = "rollout.notified", channel = %channel, success = success),
        Some(error) => warn!(
            event = "rollout.notified",
            channel = %channel,
            success = success,
            error = %error,
        ),
    }
}
