//! GitHub App installation authentication
//!
//! An App authenticates with a short-lived RS256 JWT signed by its private
//! key, then trades it for an installation access token at
//! `POST /app/installations/{id}/access_tokens`. The installation token is
//! used as a bearer token exactly like a personal token.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{status_error, AdapterError};

pub const APP_ID_ENV: &str = "ROLLOUT_GITHUB_APP_ID";
pub const INSTALLATION_ID_ENV: &str = "ROLLOUT_GITHUB_APP_INSTALLATION_ID";
pub const PRIVATE_KEY_ENV: &str = "ROLLOUT_GITHUB_APP_PRIVATE_KEY";

/// Backdating of `iat` against clock drift.
const ISSUED_AT_SKEW_SECS: i64 = 60;
/// GitHub rejects app JWTs that live longer than ten minutes.
const JWT_LIFETIME_SECS: i64 = 9 * 60;

/// Identity of a GitHub App installation.
#[derive(Clone)]
pub struct GitHubAppCredentials {
    pub app_id: u64,
    pub installation_id: u64,
    private_key: String,
}

impl fmt::Debug for GitHubAppCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubAppCredentials")
            .field("app_id", &self.app_id)
            .field("installation_id", &self.installation_id)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Claims of the app JWT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppClaims {
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

/// Installation token returned by GitHub.
#[derive(Debug, Clone, Deserialize)]
pub struct InstallationToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl GitHubAppCredentials {
    pub fn new(app_id: u64, installation_id: u64, private_key: &str) -> Self {
        Self {
            app_id,
            installation_id,
            private_key: private_key.to_string(),
        }
    }

    /// Build credentials for `raw_app_id`, reading the installation id and
    /// the PEM private key through `lookup`.
    pub fn from_lookup<F>(raw_app_id: &str, lookup: F) -> Result<Self, AdapterError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_id = parse_id(APP_ID_ENV, raw_app_id)?;
        let installation_id =
            parse_id(INSTALLATION_ID_ENV, &lookup(INSTALLATION_ID_ENV).unwrap_or_default())?;
        let private_key = lookup(PRIVATE_KEY_ENV)
            .filter(|key| !key.trim().is_empty())
            .ok_or(AdapterError::MissingToken(PRIVATE_KEY_ENV))?;
        Ok(Self::new(app_id, installation_id, &private_key))
    }

    pub fn claims(&self, now: DateTime<Utc>) -> AppClaims {
        AppClaims {
            iat: (now - Duration::seconds(ISSUED_AT_SKEW_SECS)).timestamp(),
            exp: (now + Duration::seconds(JWT_LIFETIME_SECS)).timestamp(),
            iss: self.app_id.to_string(),
        }
    }

    /// Sign the app JWT valid from `now`.
    pub fn jwt(&self, now: DateTime<Utc>) -> Result<String, AdapterError> {
        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| AdapterError::Auth(format!("invalid app private key: {e}")))?;
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &self.claims(now), &key)
            .map_err(|e| AdapterError::Auth(format!("failed to sign app token: {e}")))
    }
}

fn parse_id(key: &'static str, raw: &str) -> Result<u64, AdapterError> {
    raw.trim().parse().map_err(|_| AdapterError::InvalidSetting {
        key,
        value: raw.to_string(),
    })
}

/// `{api}/app/installations/{id}/access_tokens`
pub fn access_tokens_url(api_url: &str, installation_id: u64) -> String {
    format!(
        "{}/app/installations/{installation_id}/access_tokens",
        api_url.trim_end_matches('/')
    )
}

/// Exchange a freshly signed app JWT for an installation token.
pub async fn installation_token(
    http_client: &reqwest::Client,
    api_url: &str,
    credentials: &GitHubAppCredentials,
    accept: &str,
) -> Result<InstallationToken, AdapterError> {
    let jwt = credentials.jwt(Utc::now())?;
    let url = access_tokens_url(api_url, credentials.installation_id);
    debug!(
        app_id = credentials.app_id,
        installation_id = credentials.installation_id,
        "requesting installation token"
    );

    let response = http_client
        .post(url)
        .header(ACCEPT, accept)
        .header(AUTHORIZATION, format!("Bearer {jwt}"))
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let err = status_error(status.as_u16(), "installation access token", &body);
        return Err(AdapterError::Auth(err.to_string()));
    }
    let token: InstallationToken = response.json().await?;
    info!(
        installation_id = credentials.installation_id,
        expires_at = %token.expires_at,
        "authenticated as GitHub App installation"
    );
    Ok(token)
}
