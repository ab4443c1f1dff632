//! Error types for adapter construction and HTTP failures.

use rollout_backends::BackendError;
use thiserror::Error;

/// Errors raised while building an adapter.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Required environment variable not set
    #[error("{0} is not set")]
    MissingToken(&'static str),

    /// Environment variable holds a value that cannot be used
    #[error("invalid value for {key}: {value:?}")]
    InvalidSetting { key: &'static str, value: String },

    /// GitHub App token could not be signed or exchanged
    #[error("GitHub App authentication failed: {0}")]
    Auth(String),

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Client(String),
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        AdapterError::Client(err.to_string())
    }
}

/// Classify a transport-level `reqwest` failure.
pub(crate) fn transport_error(err: reqwest::Error) -> BackendError {
    if err.is_decode() {
        BackendError::Decode(err.to_string())
    } else {
        BackendError::Transport(err.to_string())
    }
}

/// Map a non-2xx response to the backend taxonomy.
///
/// `body` is GitHub's JSON error document when available; its `message`
/// field is preferred over the raw text.
pub fn status_error(status: u16, what: &str, body: &str) -> BackendError {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message")?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());
    match status {
        404 => BackendError::NotFound {
            what: what.to_string(),
        },
        409 | 422 => BackendError::Rejected {
            message: format!("{what}: {detail}"),
        },
        _ => BackendError::Http {
            status,
            message: format!("{what}: {detail}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(status_error(404, "refs/heads/main", "").is_not_found());
        assert!(matches!(
            status_error(422, "update ref", r#"{"message":"Update is not a fast forward"}"#),
            BackendError::Rejected { ref message } if message.contains("not a fast forward")
        ));
        assert!(matches!(
            status_error(409, "merge", "conflict"),
            BackendError::Rejected { .. }
        ));
        assert!(matches!(
            status_error(502, "get ref", "bad gateway"),
            BackendError::Http { status: 502, ref message } if message.contains("bad gateway")
        ));
    }

    #[test]
    fn test_missing_token_display() {
        assert_eq!(
            AdapterError::MissingToken("ROLLOUT_GITHUB_TOKEN").to_string(),
            "ROLLOUT_GITHUB_TOKEN is not set"
        );
    }
}
