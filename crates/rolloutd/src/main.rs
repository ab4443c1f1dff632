//! Rollout daemon
//!
//! Turns one container build into manifest pull requests.
//!
//! ## Commands
//!
//! - `process <image:tag>`: roll out an image reference
//! - `event [--file PATH]`: roll out the image of a registry notification
//! - `check-config`: validate the configuration and list applications

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rollout_backends::{GitOps, Notifier};
use rollout_core::{
    CallContext, CancelHandle, RegistryEvent, Rollout, RolloutConfig, RolloutError,
    RolloutReport, CONFIG_PATH_ENV,
};
use rollout_github::{GitHubClient, SlackNotifier};
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "rolloutd")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "GitOps rollout bot", long_about = None)]
struct Cli {
    /// Path to the YAML configuration
    #[arg(short, long, global = true, env = CONFIG_PATH_ENV, default_value = "config.yaml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Roll out an image reference such as `gcr.io/x/foo:v2`
    Process {
        /// Image reference including the tag
        reference: String,
    },

    /// Roll out the image named by a container-registry notification
    Event {
        /// JSON payload file (default: stdin)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Validate the configuration and list configured applications
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    rollout_core::telemetry::init_tracing(cli.json, level);

    let config = RolloutConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;

    match cli.command {
        Commands::CheckConfig => cmd_check_config(&config),
        Commands::Process { reference } => {
            let rollout = build_rollout(&config).await?;
            let ctx = cancellable_context(&config);
            let report = process_reference(&rollout, &ctx, &reference).await?;
            finish(report)
        }
        Commands::Event { file } => {
            let raw = read_payload(file.as_deref())?;
            let Some(reference) = event_reference(&raw)? else {
                info!("event does not name a pushed tag, ignoring");
                return Ok(());
            };
            let rollout = build_rollout(&config).await?;
            let ctx = cancellable_context(&config);
            let report = process_reference(&rollout, &ctx, &reference).await?;
            finish(report)
        }
    }
}

async fn build_rollout(config: &RolloutConfig) -> Result<Rollout> {
    let settings = Arc::new(config.settings());
    let github = GitHubClient::from_env()
        .await
        .context("Failed to create GitHub client")?;
    let git: Arc<dyn GitOps> = Arc::new(github);
    let mut rollout = Rollout::new(settings.clone(), config.registry(), git);

    if settings.notify_channel.is_some() {
        match SlackNotifier::from_env() {
            Ok(slack) => {
                let notifier: Arc<dyn Notifier> = Arc::new(slack);
                rollout = rollout.with_notifier(notifier);
            }
            Err(e) => warn!(error = %e, "notification channel configured but Slack is unavailable"),
        }
    }
    Ok(rollout)
}

/// Context bounded by the configured per-call timeout and cancelled on Ctrl-C.
fn cancellable_context(config: &RolloutConfig) -> CallContext {
    let (ctx, handle) = CallContext::new(config.settings().call_timeout);
    tokio::spawn(cancel_on_ctrl_c(handle));
    ctx
}

async fn cancel_on_ctrl_c(handle: CancelHandle) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupt received, cancelling outstanding calls");
        handle.cancel();
    }
}

/// Process one image reference. An image without a configured application
/// is logged and dropped.
async fn process_reference(
    rollout: &Rollout,
    ctx: &CallContext,
    reference: &str,
) -> Result<Option<RolloutReport>> {
    match rollout.handle_image_tag(ctx, reference).await {
        Ok(report) => Ok(Some(report)),
        Err(e @ RolloutError::NoApplication { .. }) => {
            warn!(reference = %reference, error = %e, "dropping build event");
            Ok(None)
        }
        Err(e) => Err(e).with_context(|| format!("Failed to process {reference}")),
    }
}

fn finish(report: Option<RolloutReport>) -> Result<()> {
    let Some(report) = report else {
        return Ok(());
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    let failed = report.outcomes.iter().filter(|o| !o.is_success()).count();
    if failed > 0 {
        bail!("{failed} of {} targets failed", report.outcomes.len());
    }
    Ok(())
}

fn read_payload(file: Option<&Path>) -> Result<Vec<u8>> {
    match file {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
        }
        None => {
            let mut raw = Vec::new();
            std::io::stdin()
                .read_to_end(&mut raw)
                .context("Failed to read event from stdin")?;
            Ok(raw)
        }
    }
}

/// The `image:tag` reference carried by a registry event, if it triggers a
/// rollout.
fn event_reference(raw: &[u8]) -> Result<Option<String>> {
    let event = RegistryEvent::from_json(raw).context("Failed to decode registry event")?;
    Ok(event.image_tag()?.map(|tag| tag.to_string()))
}

fn cmd_check_config(config: &RolloutConfig) -> Result<()> {
    let settings = config.settings();
    println!("Configuration OK");
    println!(
        "  call timeout: {}s, auto-merge: {}, quote versions: {}",
        settings.call_timeout.as_secs(),
        settings.enable_auto_merge,
        settings.enable_version_quote
    );
    if let Some(channel) = &settings.notify_channel {
        println!("  notify channel: {channel}");
    }
    for app in config.registry().applications() {
        let envs: Vec<&str> = app.manifest_targets.iter().map(|t| t.env.as_str()).collect();
        println!("  {} ({}) -> {}", app.name, app.image, envs.join(", "));
    }
    Ok(())
}
