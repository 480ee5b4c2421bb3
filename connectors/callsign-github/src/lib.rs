//! GitHub-backed ledger store.
//!
//! Persists the allocation ledger as a single JSON file in a repository and
//! uses the contents API's `sha` precondition as the version check: a `PUT`
//! carrying a stale blob sha is rejected, which is exactly the
//! write-if-unchanged primitive the allocator needs.

mod api;
mod limit;

use std::fmt;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use tracing::debug;

use callsign_ledger::{
    CreateOutcome, Ledger, LedgerStore, StoreError, StoreResult, VersionToken, VersionedLedger,
    WriteOutcome,
};

pub use governor::Quota;
pub use limit::RequestLimiter;

const DEFAULT_API_URL: &str = "https://api.github.com";
const DEFAULT_LEDGER_PATH: &str = "codes.json";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = "callsign-ledger";

/// Connection settings for a [`GithubStore`].
#[derive(Clone, Debug)]
pub struct GithubConfig {
    /// API root; overridable for tests and GitHub Enterprise.
    pub api_url: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Path of the ledger document inside the repository.
    pub path: String,
    /// Optional cap on contents-API requests.
    pub request_quota: Option<Quota>,
}

impl GithubConfig {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            owner: owner.into(),
            repo: repo.into(),
            branch: "main".into(),
            path: DEFAULT_LEDGER_PATH.into(),
            request_quota: None,
        }
    }

    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    #[must_use]
    pub fn with_request_quota(mut self, quota: Quota) -> Self {
        self.request_quota = Some(quota);
        self
    }
}

/// Token used to authenticate against the contents API.
#[derive(Clone)]
pub struct GithubCredentials {
    pub token: String,
}

impl fmt::Debug for GithubCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubCredentials")
            .field("token", &"***")
            .finish()
    }
}

/// [`LedgerStore`] over the GitHub contents API.
pub struct GithubStore {
    client: Client,
    config: GithubConfig,
    credentials: GithubCredentials,
    limiter: Option<RequestLimiter>,
}

impl GithubStore {
    pub fn new(config: GithubConfig, credentials: GithubCredentials) -> Self {
        let limiter = config.request_quota.map(RequestLimiter::new);
        Self {
            client: Client::new(),
            config,
            credentials,
            limiter,
        }
    }

    fn contents_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.owner,
            self.config.repo,
            self.config.path
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.credentials.token),
            )
            .header(header::ACCEPT, "application/vnd.github+json")
            .header(header::USER_AGENT, USER_AGENT)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn throttle(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    async fn put_contents(&self, body: api::PutContents<'_>) -> StoreResult<Response> {
        self.throttle().await;
        self.authorize(self.client.put(self.contents_url()))
            .json(&body)
            .send()
            .await
            .map_err(StoreError::transport)
    }
}

#[async_trait]
impl LedgerStore for GithubStore {
    async fn read(&self) -> StoreResult<Option<VersionedLedger>> {
        self.throttle().await;
        let response = self
            .authorize(self.client.get(self.contents_url()))
            .query(&[("ref", self.config.branch.as_str())])
            .send()
            .await
            .map_err(StoreError::transport)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(path = %self.config.path, "ledger document not found");
            return Ok(None);
        }
        let body = response.text().await.map_err(StoreError::transport)?;
        if !status.is_success() {
            return Err(transport_status("GET", status, &body));
        }

        let file: api::ContentsFile = serde_json::from_str(&body).map_err(|err| {
            StoreError::transport(format!("malformed contents response: {err}"))
        })?;
        let ledger = decode_document(&file)?;
        Ok(Some(VersionedLedger {
            ledger,
            token: VersionToken::new(file.sha),
        }))
    }

    async fn create(&self, ledger: &Ledger) -> StoreResult<CreateOutcome> {
        let response = self
            .put_contents(api::PutContents {
                message: "initialize code ledger",
                content: encode_document(ledger)?,
                branch: &self.config.branch,
                sha: None,
            })
            .await?;

        let status = response.status();
        if precondition_failed(status) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        let body = response.text().await.map_err(StoreError::transport)?;
        if !status.is_success() {
            return Err(transport_status("PUT", status, &body));
        }
        let put: api::PutContentsResponse = serde_json::from_str(&body).map_err(|err| {
            StoreError::transport(format!("malformed contents response: {err}"))
        })?;
        Ok(CreateOutcome::Created(VersionToken::new(put.content.sha)))
    }

    async fn write_if_match(
        &self,
        ledger: &Ledger,
        token: &VersionToken,
    ) -> StoreResult<WriteOutcome> {
        let message = commit_message(ledger);
        let response = self
            .put_contents(api::PutContents {
                message: &message,
                content: encode_document(ledger)?,
                branch: &self.config.branch,
                sha: Some(token.as_str()),
            })
            .await?;

        let status = response.status();
        if precondition_failed(status) {
            debug!(%status, "contents write rejected, sha out of date");
            return Ok(WriteOutcome::Conflict);
        }
        let body = response.text().await.map_err(StoreError::transport)?;
        if !status.is_success() {
            return Err(transport_status("PUT", status, &body));
        }
        let put: api::PutContentsResponse = serde_json::from_str(&body).map_err(|err| {
            StoreError::transport(format!("malformed contents response: {err}"))
        })?;
        Ok(WriteOutcome::Committed(VersionToken::new(put.content.sha)))
    }
}

// 409 is the sha-mismatch answer; 422 is what an unconditional PUT gets when
// the file already exists. Decided on status codes alone, never message text.
fn precondition_failed(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY
    )
}

fn encode_document(ledger: &Ledger) -> StoreResult<String> {
    let json = serde_json::to_vec_pretty(ledger)?;
    Ok(STANDARD.encode(json))
}

fn decode_document(file: &api::ContentsFile) -> StoreResult<Ledger> {
    let raw = file
        .content
        .as_deref()
        .ok_or_else(|| StoreError::transport("contents response missing file body"))?;
    // the API wraps base64 bodies in newlines
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|err| StoreError::invalid(format!("ledger body is not valid base64: {err}")))?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn commit_message(ledger: &Ledger) -> String {
    match ledger.assignments.last() {
        Some(assignment) => format!("assign {} to {}", assignment.code, assignment.label),
        None => "update code ledger".into(),
    }
}

fn transport_status(verb: &str, status: StatusCode, body: &str) -> StoreError {
    StoreError::Transport(format!(
        "{verb} contents returned {status}: {}",
        truncate(body, 256)
    ))
}

fn truncate(body: &str, max: usize) -> String {
    if body.len() <= max {
        body.to_string()
    } else {
        let mut end = max;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &body[..end])
    }
}
