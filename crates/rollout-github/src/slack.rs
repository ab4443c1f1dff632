//! Slack notifier
//!
//! Posts one colored attachment per rollout through `chat.postMessage`.

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use rollout_backends::{BackendError, BackendResult, Notifier, OutcomeStatus, RolloutMessage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{status_error, transport_error, AdapterError};

pub const DEFAULT_SLACK_API_URL: &str = "https://slack.com/api";

const COLOR_SUCCESS: &str = "good";
const COLOR_FAILURE: &str = "danger";

/// Slack connection settings
#[derive(Debug, Clone)]
pub struct SlackConfig {
    pub api_url: String,
    pub token: String,
}

impl SlackConfig {
    pub fn new(token: &str) -> Self {
        SlackConfig {
            api_url: DEFAULT_SLACK_API_URL.to_string(),
            token: token.to_string(),
        }
    }

    /// Read `ROLLOUT_SLACK_TOKEN`.
    pub fn from_env() -> Result<Self, AdapterError> {
        std::env::var("ROLLOUT_SLACK_TOKEN")
            .map(|token| Self::new(&token))
            .map_err(|_| AdapterError::MissingToken("ROLLOUT_SLACK_TOKEN"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentField {
    pub title: String,
    pub value: String,
    pub short: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub color: String,
    pub title: String,
    pub fields: Vec<AttachmentField>,
}

/// `chat.postMessage` request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostMessage {
    pub channel: String,
    pub attachments: Vec<Attachment>,
    pub mrkdwn: bool,
    pub link_names: bool,
}

#[derive(Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

fn field(title: &str, value: &str, short: bool) -> AttachmentField {
    AttachmentField {
        title: title.to_string(),
        value: value.to_string(),
        short,
    }
}

/// Render the attachment for `message`: App, Image, Version, then one field
/// per environment holding the PR URL or the error.
pub fn render_message(channel: &str, message: &RolloutMessage) -> PostMessage {
    let (color, title) = if message.is_success() {
        (COLOR_SUCCESS, "Rollout Success")
    } else {
        (COLOR_FAILURE, "Rollout Failure")
    };

    let mut fields = vec![
        field("App", &message.app_name, true),
        field("Image", &message.image, false),
        field("Version", &message.version, true),
    ];
    fields.extend(message.outcomes.iter().map(|outcome| match &outcome.status {
        OutcomeStatus::Success { url } => field(&outcome.env, url, false),
        OutcomeStatus::Failure { error } => field(&outcome.env, &format!("Error: {error}"), false),
    }));

    PostMessage {
        channel: channel.to_string(),
        attachments: vec![Attachment {
            color: color.to_string(),
            title: title.to_string(),
            fields,
        }],
        mrkdwn: true,
        link_names: true,
    }
}

/// Slack Web API notifier
pub struct SlackNotifier {
    config: SlackConfig,
    http_client: reqwest::Client,
}

impl SlackNotifier {
    pub fn new(config: SlackConfig) -> Result<Self, AdapterError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("rollout/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(SlackNotifier {
            config,
            http_client,
        })
    }

    pub fn from_env() -> Result<Self, AdapterError> {
        Self::new(SlackConfig::from_env()?)
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn post(&self, channel: &str, message: &RolloutMessage) -> BackendResult<()> {
        let url = format!("{}/chat.postMessage", self.config.api_url.trim_end_matches('/'));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", self.config.token))
            .map_err(|e| BackendError::InvalidInput(e.to_string()))?;
        auth.set_sensitive(true);

        debug!(channel = %channel, "posting rollout message");
        let response = self
            .http_client
            .post(url)
            .header(AUTHORIZATION, auth)
            .json(&render_message(channel, message))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), "chat.postMessage", &body));
        }
        let body: PostMessageResponse = response.json().await.map_err(transport_error)?;
        if !body.ok {
            return Err(BackendError::Rejected {
                message: format!(
                    "chat.postMessage: {}",
                    body.error.as_deref().unwrap_or("unknown error")
                ),
            });
        }
        Ok(())
    }
}
