//! Entry point for one build: lookup, orchestration, notification.

use std::sync::Arc;

use rollout_backends::{GitOps, Notifier, PullRequestOutcome, RolloutMessage};
use serde::{Deserialize, Serialize};
use tracing::{info, Instrument};

use crate::config::RolloutSettings;
use crate::context::CallContext;
use crate::domain::{ImageTag, Result, RolloutError};
use crate::obs;
use crate::orchestrator::ReleaseOrchestrator;
use crate::registry::ApplicationRegistry;

/// What happened to one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutReport {
    pub app_name: String,
    pub image: String,
    pub version: String,
    pub outcomes: Vec<PullRequestOutcome>,
    pub notified: bool,
}

impl RolloutReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(PullRequestOutcome::is_success)
    }
}

/// Wires the registry, the orchestrator and an optional chat notifier.
pub struct Rollout {
    registry: ApplicationRegistry,
    orchestrator: ReleaseOrchestrator,
    notifier: Option<Arc<dyn Notifier>>,
    channel: Option<String>,
}

impl Rollout {
    pub fn new(
        settings: Arc<RolloutSettings>,
        registry: ApplicationRegistry,
        git: Arc<dyn GitOps>,
    ) -> Self {
        let channel = settings.notify_channel.clone();
        Self {
            registry,
            orchestrator: ReleaseOrchestrator::new(settings, git),
            notifier: None,
            channel,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Process `image:version`.
    pub async fn handle_image_tag(&self, ctx: &CallContext, reference: &str) -> Result<RolloutReport> {
        let tag = ImageTag::parse(reference)?;
        self.handle_image(ctx, &tag.image, &tag.version).await
    }

    /// Roll `version` of `image` out and notify.
    ///
    /// Fails only with [`RolloutError::NoApplication`]; per-target failures
    /// are reported as outcomes.
    pub async fn handle_image(
        &self,
        ctx: &CallContext,
        image: &str,
        version: &str,
    ) -> Result<RolloutReport> {
        self.run(ctx, image, version)
            .instrument(obs::rollout_span(image, version))
            .await
    }

    async fn run(&self, ctx: &CallContext, image: &str, version: &str) -> Result<RolloutReport> {
        let app = self.registry.find_by_image(image)?;
        obs::emit_rollout_started(&app.name, image, version, app.manifest_targets.len());

        let outcomes = self.orchestrator.process(ctx, app, version).await;
        for outcome in &outcomes {
            if let Some(url) = outcome.url() {
                info!(env = %outcome.env, url = %url, "processed rollout");
            }
        }

        let message = RolloutMessage {
            app_name: app.name.clone(),
            image: image.to_string(),
            version: version.to_string(),
            outcomes,
        };
        let notified = self.notify(ctx, &message).await;

        Ok(RolloutReport {
            app_name: message.app_name,
            image: message.image,
            version: message.version,
            outcomes: message.outcomes,
            notified,
        })
    }

    async fn notify(&self, ctx: &CallContext, message: &RolloutMessage) -> bool {
        let (Some(notifier), Some(channel)) = (&self.notifier, &self.channel) else {
            return false;
        };
        if message.outcomes.is_empty() {
            return false;
        }
        match ctx
            .call("post_message", notifier.post(channel, message))
            .await
            .map_err(RolloutError::Notify)
        {
            Ok(()) => {
                obs::emit_rollout_notified(channel, message.is_success(), None);
                true
            }
            Err(e) => {
                let error: &dyn std::fmt::Display = &e;
                obs::emit_rollout_notified(channel, message.is_success(), Some(error));
                false
            }
        }
    }
}
