//! Sequences filter, rewrite, changelog and commit for every manifest target
//! of an application.
//!
//! Targets run one after another in declaration order. A failing target
//! becomes an error outcome and never stops its siblings.

use std::sync::Arc;
use std::time::Instant;

use rollout_backends::{GitOps, PullRequestOutcome};

use crate::changelog::ChangelogGenerator;
use crate::commit::CommitBuilder;
use crate::config::RolloutSettings;
use crate::context::CallContext;
use crate::domain::{Application, ManifestTarget, Release, Result};
use crate::filter::should_process;
use crate::obs;
use crate::rewrite::{rewrite_files, rules_for};

/// Builds releases for one application build at a time.
pub struct ReleaseOrchestrator {
    settings: Arc<RolloutSettings>,
    git: Arc<dyn GitOps>,
}

impl ReleaseOrchestrator {
    pub fn new(settings: Arc<RolloutSettings>, git: Arc<dyn GitOps>) -> Self {
        Self { settings, git }
    }

    /// Roll `version` of `app` out to every qualifying manifest target.
    ///
    /// Returns one outcome per target that passed the filter, in target
    /// order.
    pub async fn process(
        &self,
        ctx: &CallContext,
        app: &Application,
        version: &str,
    ) -> Vec<PullRequestOutcome> {
        let mut outcomes = Vec::new();
        for target in &app.manifest_targets {
            if !should_process(target, version) {
                obs::emit_target_skipped(&target.env, version);
                continue;
            }

            let started = Instant::now();
            let (outcome, detail) = match self.process_target(ctx, app, target, version).await {
                Ok(url) => (PullRequestOutcome::success(&target.env, &url), url),
                Err(e) => {
                    let error = e.to_string();
                    (PullRequestOutcome::failure(&target.env, &error), error)
                }
            };
            obs::emit_target_finished(
                &target.env,
                outcome.is_success(),
                &detail,
                started.elapsed().as_millis() as u64,
            );
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn process_target(
        &self,
        ctx: &CallContext,
        app: &Application,
        target: &ManifestTarget,
        version: &str,
    ) -> Result<String> {
        let settings = &*self.settings;
        let git = &*self.git;
        let mut release = Release::new(settings, app, target, version);

        let rules = rules_for(app, version, settings.enable_version_quote)?;
        rewrite_files(ctx, git, &mut release, &target.files, &rules).await;

        release.body = ChangelogGenerator::new(ctx, git, &settings.github_web_url)
            .generate_body(app, target, version, &release.old_versions)
            .await;

        CommitBuilder::new(ctx, git, settings.enable_auto_merge)
            .run(&release)
            .await
    }
}
