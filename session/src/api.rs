//! Auth API contract and the reqwest REST backend.
//!
//! ARCHITECTURE
//! ============
//! [`AuthApi`] is the seam the controller depends on; tests substitute a
//! scripted implementation. [`RestClient`] implements both [`AuthApi`] and
//! [`Transport`] over a single `reqwest::Client` whose cookie jar holds the
//! refresh credential, so every request carries it ambiently and nothing in
//! application state ever sees it.
//!
//! WIRE FORMAT
//! ===========
//! - `POST /auth/login` form-urlencoded `username`, `password`
//! - `POST /auth/register` JSON `{username, email, password}`
//! - `GET  /auth/refresh` (cookie) -> `{access_token, user_id?}`
//! - `GET  /auth/logout` drops the cookie
//!
//! Replies may be flat or wrapped in `{success, message, data}`; `user_id`
//! may be a number or a string. Error bodies carry `detail`.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{AuthError, HttpError};
use crate::http::{ApiResponse, RequestAttempt, Transport};

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// CONTRACT
// =============================================================================

/// Username/password pair submitted by the login form.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// New-account submission from the registration form.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Successful login or registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub user_id: String,
}

/// Successful refresh. The server may omit the user id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshGrant {
    pub access_token: String,
    pub user_id: Option<String>,
}

#[async_trait::async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<TokenGrant, AuthError>;
    async fn register(&self, registration: &Registration) -> Result<TokenGrant, AuthError>;
    /// Mint a new access token from the ambient refresh credential.
    async fn refresh(&self) -> Result<RefreshGrant, AuthError>;
    /// Ask the server to drop the refresh credential.
    async fn logout(&self) -> Result<(), AuthError>;
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Deserialize)]
struct GrantBody {
    access_token: String,
    #[serde(default, deserialize_with = "id_as_string")]
    user_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GrantReply {
    Flat(GrantBody),
    Enveloped { data: GrantBody },
}

impl GrantReply {
    fn into_body(self) -> GrantBody {
        match self {
            Self::Flat(body) | Self::Enveloped { data: body } => body,
        }
    }
}

fn id_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

pub(crate) fn parse_grant(body: &str) -> Result<RefreshGrant, AuthError> {
    let reply: GrantReply = serde_json::from_str(body).map_err(|e| AuthError::Decode(e.to_string()))?;
    let body = reply.into_body();
    if body.access_token.is_empty() {
        return Err(AuthError::Decode("empty access_token".into()));
    }
    Ok(RefreshGrant { access_token: body.access_token, user_id: body.user_id })
}

fn parse_token_grant(body: &str) -> Result<TokenGrant, AuthError> {
    let grant = parse_grant(body)?;
    let user_id = grant
        .user_id
        .ok_or_else(|| AuthError::Decode("missing user_id".into()))?;
    Ok(TokenGrant { access_token: grant.access_token, user_id })
}

/// Pull a human-readable `detail` out of a JSON error body. FastAPI-style
/// validation errors put a list there; the first `msg` is used.
#[must_use]
pub fn detail_from_body(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items
            .first()
            .and_then(|item| item.get("msg"))
            .and_then(Value::as_str)
            .map(ToOwned::to_owned),
        _ => value.get("message").and_then(Value::as_str).map(ToOwned::to_owned),
    }
}

fn rejected(status: StatusCode, body: &str) -> AuthError {
    AuthError::Rejected { status: status.as_u16(), detail: detail_from_body(body) }
}

// =============================================================================
// REST CLIENT
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

/// reqwest-backed Auth API and protected-resource transport.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    jar: Arc<Jar>,
    base_url: String,
    origin: Url,
}

impl RestClient {
    /// Build a client rooted at `base_url` (e.g. `http://host/api/v1`).
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse or the HTTP client fails
    /// to build.
    pub fn new(base_url: &str, timeouts: Timeouts) -> Result<Self, HttpError> {
        let base_url = base_url.trim_end_matches('/').to_owned();
        let origin = Url::parse(&base_url).map_err(|e| HttpError::Setup(format!("invalid base URL {base_url}: {e}")))?;
        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| HttpError::Setup(e.to_string()))?;
        Ok(Self { http, jar, base_url, origin })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Cookies the jar would send to the API origin, as a `Cookie` header
    /// value (`a=1; b=2`).
    #[must_use]
    pub fn export_cookies(&self) -> Option<String> {
        let header = self.jar.cookies(&self.origin)?;
        header.to_str().ok().map(ToOwned::to_owned)
    }

    /// Seed the jar from a previously exported `Cookie` header value.
    pub fn import_cookies(&self, header: &str) {
        for pair in header.split(';').map(str::trim).filter(|pair| pair.contains('=')) {
            self.jar.add_cookie_str(pair, &self.origin);
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read(response: reqwest::Response) -> Result<(StatusCode, String), AuthError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        Ok((status, body))
    }
}

#[async_trait::async_trait]
impl AuthApi for RestClient {
    async fn login(&self, credentials: &Credentials) -> Result<TokenGrant, AuthError> {
        let response = self
            .http
            .post(self.url("/auth/login"))
            .form(credentials)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        let (status, body) = Self::read(response).await?;
        if !status.is_success() {
            return Err(rejected(status, &body));
        }
        parse_token_grant(&body)
    }

    async fn register(&self, registration: &Registration) -> Result<TokenGrant, AuthError> {
        let response = self
            .http
            .post(self.url("/auth/register"))
            .json(registration)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        let (status, body) = Self::read(response).await?;
        if !status.is_success() {
            return Err(rejected(status, &body));
        }
        parse_token_grant(&body)
    }

    async fn refresh(&self) -> Result<RefreshGrant, AuthError> {
        let response = self
            .http
            .get(self.url("/auth/refresh"))
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        let (status, body) = Self::read(response).await?;
        if !status.is_success() {
            return Err(rejected(status, &body));
        }
        parse_grant(&body)
    }

    async fn logout(&self) -> Result<(), AuthError> {
        let response = self
            .http
            .get(self.url("/auth/logout"))
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        let (status, body) = Self::read(response).await?;
        if !status.is_success() {
            return Err(rejected(status, &body));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Transport for RestClient {
    async fn send(&self, attempt: &RequestAttempt) -> Result<ApiResponse, HttpError> {
        let request = attempt.request();
        let mut builder = self
            .http
            .request(request.method().clone(), self.url(request.path()))
            .query(request.query_pairs());
        if let Some(token) = attempt.bearer() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        debug!(method = %request.method(), path = request.path(), status, retried = attempt.retried(), "api response");
        Ok(ApiResponse::new(status, body))
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
