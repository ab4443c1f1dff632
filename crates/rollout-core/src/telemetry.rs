//! Tracing initialisation for the rollout daemon.
//!
//! Without `RUST_LOG`, the requested level applies to the rollout crates
//! only; the HTTP stack underneath (`reqwest`, `hyper`, `rustls`) stays at
//! `warn` so request chatter does not drown rollout events. JSON output
//! flattens event fields and carries the enclosing `rollout` span, so every
//! line of one build shares its `rollout_id`.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events follow the requested level.
const ROLLOUT_TARGETS: [&str; 4] = [
    "rollout_core",
    "rollout_backends",
    "rollout_github",
    "rolloutd",
];

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    let mut directives = vec!["warn".to_string()];
    directives.extend(ROLLOUT_TARGETS.iter().map(|target| format!("{target}={level}")));
    directives.join(",")
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init()
            .ok();
    } else {
        registry.with(fmt::layer().with_target(false)).try_init().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_scope_level_to_rollout_crates() {
        assert_eq!(
            default_directives(Level::DEBUG),
            "warn,rollout_core=debug,rollout_backends=debug,rollout_github=debug,rolloutd=debug"
        );
        assert!(EnvFilter::try_new(default_directives(Level::INFO)).is_ok());
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing(false, Level::DEBUG);
        init_tracing(true, Level::INFO);
        tracing::info!(event = "test.logged");
    }
}
