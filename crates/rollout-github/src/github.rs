//! GitHub REST v3 client
//!
//! Implements [`GitOps`] with the git data API (refs, trees, commits), the
//! pulls API and the issues label API. Every method is a single request; the
//! caller bounds it with its own timeout.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Method, RequestBuilder};
use rollout_backends::{
    BackendError, BackendResult, CommitObject, CommitSummary, ContentStore, GitOps, GitRef,
    MergeMethod, MergeRequest, NewCommit, NewPullRequest, PullRequest, RepoCoords, TreeEntry,
    TreeObject,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::app::{self, GitHubAppCredentials, APP_ID_ENV};
use crate::error::{status_error, transport_error, AdapterError};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";
const API_VERSION: &str = "2022-11-28";

pub const TOKEN_ENV: &str = "ROLLOUT_GITHUB_TOKEN";
pub const API_URL_ENV: &str = "ROLLOUT_GITHUB_API_URL";

/// How the client proves its identity.
#[derive(Clone)]
pub enum GitHubAuth {
    /// Personal or bot access token
    Token(String),
    /// GitHub App installation; exchanged for a token on connect
    App(GitHubAppCredentials),
}

impl fmt::Debug for GitHubAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GitHubAuth::Token(_) => f.write_str("Token(<redacted>)"),
            GitHubAuth::App(credentials) => f.debug_tuple("App").field(credentials).finish(),
        }
    }
}

/// GitHub connection settings
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// API root, e.g. `https://api.github.com` or a GHES `/api/v3` URL
    pub api_url: String,
    pub auth: GitHubAuth,
    pub user_agent: String,
}

impl GitHubConfig {
    pub fn new(token: &str) -> Self {
        Self::with_auth(GitHubAuth::Token(token.to_string()))
    }

    pub fn with_app(credentials: GitHubAppCredentials) -> Self {
        Self::with_auth(GitHubAuth::App(credentials))
    }

    fn with_auth(auth: GitHubAuth) -> Self {
        GitHubConfig {
            api_url: DEFAULT_API_URL.to_string(),
            auth,
            user_agent: concat!("rollout/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    /// Read credentials from the process environment.
    pub fn from_env() -> Result<Self, AdapterError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// GitHub App settings win when `ROLLOUT_GITHUB_APP_ID` is set;
    /// otherwise `ROLLOUT_GITHUB_TOKEN` is required. `ROLLOUT_GITHUB_API_URL`
    /// optionally points at GitHub Enterprise.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AdapterError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_id = lookup(APP_ID_ENV).filter(|id| !id.is_empty());
        let mut config = match app_id {
            Some(app_id) => Self::with_app(GitHubAppCredentials::from_lookup(&app_id, &lookup)?),
            None => {
                let token = lookup(TOKEN_ENV)
                    .filter(|token| !token.is_empty())
                    .ok_or(AdapterError::MissingToken(TOKEN_ENV))?;
                Self::new(&token)
            }
        };
        if let Some(api_url) = lookup(API_URL_ENV).filter(|url| !url.is_empty()) {
            config = config.with_api_url(&api_url);
        }
        Ok(config)
    }

    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }
}

/// GitHub client for manifest repositories
pub struct GitHubClient {
    config: GitHubConfig,
    http_client: reqwest::Client,
}

impl GitHubClient {
    /// Resolve the bearer token (exchanging App credentials when needed) and
    /// build the client.
    pub async fn connect(config: GitHubConfig) -> Result<Self, AdapterError> {
        let token = match &config.auth {
            GitHubAuth::Token(token) => token.clone(),
            GitHubAuth::App(credentials) => {
                let bootstrap = http_client(&config.user_agent, None)?;
                app::installation_token(&bootstrap, &config.api_url, credentials, JSON_MEDIA_TYPE)
                    .await?
                    .token
            }
        };
        Ok(GitHubClient {
            http_client: http_client(&config.user_agent, Some(&token))?,
            config,
        })
    }

    pub async fn from_env() -> Result<Self, AdapterError> {
        Self::connect(GitHubConfig::from_env()?).await
    }

    fn request(&self, method: Method, repo: &RepoCoords, path: &str) -> RequestBuilder {
        let url = repo_url(&self.config.api_url, repo, path);
        debug!(method = %method, url = %url, "github request");
        self.http_client.request(method, url)
    }

    async fn send(&self, req: RequestBuilder, what: &str) -> BackendResult<reqwest::Response> {
        let response = req.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status.as_u16(), what, &body))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        what: &str,
    ) -> BackendResult<T> {
        self.send(req, what)
            .await?
            .json::<T>()
            .await
            .map_err(|e| BackendError::Decode(format!("{what}: {e}")))
    }
}

/// `reqwest` client sending GitHub's JSON media type and API version, plus
/// the bearer `token` when given.
fn http_client(user_agent: &str, token: Option<&str>) -> Result<reqwest::Client, AdapterError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(JSON_MEDIA_TYPE));
    headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));
    if let Some(token) = token {
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| AdapterError::Client(e.to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
    }
    Ok(reqwest::Client::builder()
        .user_agent(user_agent)
        .default_headers(headers)
        .build()?)
}

/// `{api}/repos/{owner}/{name}/{path}`
pub fn repo_url(api_url: &str, repo: &RepoCoords, path: &str) -> String {
    format!(
        "{}/repos/{}/{}/{}",
        api_url.trim_end_matches('/'),
        repo.owner,
        repo.name,
        path.trim_start_matches('/')
    )
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ShaOnly {
    sha: String,
}

#[derive(Deserialize)]
struct RefResponse {
    #[serde(rename = "ref")]
    full_ref: String,
    object: ShaOnly,
}

impl RefResponse {
    fn into_git_ref(self) -> GitRef {
        GitRef {
            branch: self
                .full_ref
                .strip_prefix("refs/heads/")
                .unwrap_or(self.full_ref.as_str())
                .to_string(),
            sha: self.object.sha,
        }
    }
}

#[derive(Serialize)]
struct CreateRefBody<'a> {
    #[serde(rename = "ref")]
    full_ref: String,
    sha: &'a str,
}

#[derive(Serialize)]
struct UpdateRefBody<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Serialize)]
struct CreateTreeBody<'a> {
    base_tree: &'a str,
    tree: &'a [TreeEntry],
}

#[derive(Serialize)]
struct AuthorBody<'a> {
    name: &'a str,
    email: &'a str,
    date: DateTime<Utc>,
}

#[derive(Serialize)]
struct CreateCommitBody<'a> {
    message: &'a str,
    tree: &'a str,
    parents: &'a [String],
    author: AuthorBody<'a>,
}

#[derive(Deserialize)]
struct CommitResponse {
    sha: String,
    tree: ShaOnly,
    message: String,
    #[serde(default)]
    html_url: String,
}

impl From<CommitResponse> for CommitObject {
    fn from(c: CommitResponse) -> Self {
        CommitObject {
            sha: c.sha,
            tree_sha: c.tree.sha,
            message: c.message,
            html_url: c.html_url,
        }
    }
}

#[derive(Deserialize)]
struct User {
    login: String,
}

#[derive(Deserialize)]
struct PullResponse {
    number: u64,
    title: String,
    user: User,
    html_url: String,
}

impl From<PullResponse> for PullRequest {
    fn from(p: PullResponse) -> Self {
        PullRequest {
            number: p.number,
            title: p.title,
            author: p.user.login,
            html_url: p.html_url,
        }
    }
}

#[derive(Serialize)]
struct LabelsBody<'a> {
    labels: &'a [String],
}

#[derive(Serialize)]
struct MergeBody<'a> {
    commit_title: &'a str,
    merge_method: MergeMethod,
}

#[derive(Deserialize)]
struct CompareCommit {
    sha: String,
    commit: CompareCommitDetail,
}

#[derive(Deserialize)]
struct CompareCommitDetail {
    message: String,
}

#[derive(Deserialize)]
struct CompareResponse {
    #[serde(default)]
    commits: Vec<CompareCommit>,
}

// ---------------------------------------------------------------------------
// Trait implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl ContentStore for GitHubClient {
    async fn get_file_content(
        &self,
        repo: &RepoCoords,
        path: &str,
        git_ref: &str,
    ) -> BackendResult<String> {
        let what = format!("{repo}/{path}@{git_ref}");
        let req = self
            .request(Method::GET, repo, &format!("contents/{}", path.trim_start_matches('/')))
            .query(&[("ref", git_ref)])
            .header(ACCEPT, RAW_MEDIA_TYPE);
        self.send(req, &what)
            .await?
            .text()
            .await
            .map_err(transport_error)
    }
}

#[async_trait]
impl GitOps for GitHubClient {
    async fn get_ref(&self, repo: &RepoCoords, branch: &str) -> BackendResult<GitRef> {
        let req = self.request(Method::GET, repo, &format!("git/ref/heads/{branch}"));
        let resp: RefResponse = self
            .send_json(req, &format!("refs/heads/{branch}"))
            .await?;
        Ok(resp.into_git_ref())
    }

    async fn create_ref(
        &self,
        repo: &RepoCoords,
        branch: &str,
        sha: &str,
    ) -> BackendResult<GitRef> {
        let body = CreateRefBody {
            full_ref: format!("refs/heads/{branch}"),
            sha,
        };
        let req = self.request(Method::POST, repo, "git/refs").json(&body);
        let resp: RefResponse = self
            .send_json(req, &format!("create refs/heads/{branch}"))
            .await?;
        Ok(resp.into_git_ref())
    }

    async fn create_tree(
        &self,
        repo: &RepoCoords,
        base_tree: &str,
        entries: &[TreeEntry],
    ) -> BackendResult<TreeObject> {
        let body = CreateTreeBody {
            base_tree,
            tree: entries,
        };
        let req = self.request(Method::POST, repo, "git/trees").json(&body);
        let resp: ShaOnly = self.send_json(req, "create tree").await?;
        Ok(TreeObject { sha: resp.sha })
    }

    async fn get_commit(&self, repo: &RepoCoords, sha: &str) -> BackendResult<CommitObject> {
        let req = self.request(Method::GET, repo, &format!("git/commits/{sha}"));
        let resp: CommitResponse = self.send_json(req, &format!("commit {sha}")).await?;
        Ok(resp.into())
    }

    async fn create_commit(
        &self,
        repo: &RepoCoords,
        commit: &NewCommit,
    ) -> BackendResult<CommitObject> {
        let body = CreateCommitBody {
            message: &commit.message,
            tree: &commit.tree_sha,
            parents: &commit.parents,
            author: AuthorBody {
                name: &commit.author.name,
                email: &commit.author.email,
                date: commit.author.date,
            },
        };
        let req = self.request(Method::POST, repo, "git/commits").json(&body);
        let resp: CommitResponse = self.send_json(req, "create commit").await?;
        Ok(resp.into())
    }

    async fn update_ref(
        &self,
        repo: &RepoCoords,
        branch: &str,
        sha: &str,
        force: bool,
    ) -> BackendResult<GitRef> {
        let req = self
            .request(Method::PATCH, repo, &format!("git/refs/heads/{branch}"))
            .json(&UpdateRefBody { sha, force });
        let resp: RefResponse = self
            .send_json(req, &format!("update refs/heads/{branch}"))
            .await?;
        Ok(resp.into_git_ref())
    }

    async fn create_pull_request(
        &self,
        repo: &RepoCoords,
        request: &NewPullRequest,
    ) -> BackendResult<PullRequest> {
        let req = self.request(Method::POST, repo, "pulls").json(request);
        let resp: PullResponse = self
            .send_json(req, &format!("pull request {}", request.head))
            .await?;
        Ok(resp.into())
    }

    async fn add_labels(
        &self,
        repo: &RepoCoords,
        number: u64,
        labels: &[String],
    ) -> BackendResult<()> {
        let req = self
            .request(Method::POST, repo, &format!("issues/{number}/labels"))
            .json(&LabelsBody { labels });
        self.send(req, &format!("labels of #{number}")).await?;
        Ok(())
    }

    async fn merge_pull_request(
        &self,
        repo: &RepoCoords,
        number: u64,
        request: &MergeRequest,
    ) -> BackendResult<()> {
        let req = self
            .request(Method::PUT, repo, &format!("pulls/{number}/merge"))
            .json(&MergeBody {
                commit_title: &request.commit_title,
                merge_method: request.method,
            });
        self.send(req, &format!("merge of #{number}")).await?;
        Ok(())
    }

    async fn compare_commits(
        &self,
        repo: &RepoCoords,
        base: &str,
        head: &str,
    ) -> BackendResult<Vec<CommitSummary>> {
        let range = format!("{base}...{head}");
        let req = self.request(Method::GET, repo, &format!("compare/{range}"));
        let resp: CompareResponse = self.send_json(req, &range).await?;
        Ok(resp
            .commits
            .into_iter()
            .map(|c| CommitSummary {
                sha: c.sha,
                message: c.commit.message,
            })
            .collect())
    }

    async fn get_pull_request(
        &self,
        repo: &RepoCoords,
        number: u64,
    ) -> BackendResult<PullRequest> {
        let req = self.request(Method::GET, repo, &format!("pulls/{number}"));
        let resp: PullResponse = self
            .send_json(req, &format!("pull request #{number}"))
            .await?;
        Ok(resp.into())
    }
}
