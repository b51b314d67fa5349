//! HTTP client adapter with expired-token recovery.
//!
//! DESIGN
//! ======
//! An [`ApiRequest`] is an immutable description of a call. Each send wraps
//! it in a [`RequestAttempt`] carrying the bearer token and an explicit
//! `retried` flag; a retry is a new attempt record, never a mutation of the
//! request.
//!
//! On a 401 for an attempt that has not been retried, the adapter asks the
//! controller to refresh (joining any refresh already in flight), splices the
//! new token in, and resends exactly once. A 401 on the retried attempt ends
//! the session instead of looping. The refresh call goes through
//! [`crate::AuthApi`], not through this adapter, so it is never itself
//! retried.
//!
//! The session epoch is read together with the bearer when the attempt is
//! built and re-checked after every suspension:
//! - if the token already rotated under the same epoch, the request is
//!   resent with it and no refresh is issued;
//! - a refreshed token is only spliced into the session it was minted for;
//! - logout is only invoked while the failing session is still current, so a
//!   newer sign-in is never torn down and a refresh failure that already
//!   cleared the session is not signalled twice.

use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::controller::SessionController;
use crate::error::{AuthError, HttpError};

const UNAUTHORIZED: u16 = 401;

// =============================================================================
// REQUEST / RESPONSE
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), query: Vec::new(), body: None }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Attach a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` cannot be serialized.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, HttpError> {
        self.body = Some(serde_json::to_value(body).map_err(|e| HttpError::Decode(e.to_string()))?);
        Ok(self)
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }
}

/// One send of an [`ApiRequest`].
#[derive(Debug, Clone)]
pub struct RequestAttempt {
    request: Arc<ApiRequest>,
    bearer: Option<String>,
    retried: bool,
}

impl RequestAttempt {
    #[must_use]
    pub fn first(request: ApiRequest, bearer: Option<String>) -> Self {
        Self { request: Arc::new(request), bearer, retried: false }
    }

    /// The single permitted resend, carrying a fresh token.
    #[must_use]
    pub fn retry_with(&self, token: String) -> Self {
        Self { request: Arc::clone(&self.request), bearer: Some(token), retried: true }
    }

    #[must_use]
    pub fn request(&self) -> &ApiRequest {
        &self.request
    }

    #[must_use]
    pub fn bearer(&self) -> Option<&str> {
        self.bearer.as_deref()
    }

    #[must_use]
    pub fn retried(&self) -> bool {
        self.retried
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode a success body, or turn a failure status into an error.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Status`] for non-2xx responses and
    /// [`HttpError::Decode`] if the body does not match `T`.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T, HttpError> {
        if !self.is_success() {
            return Err(HttpError::Status { status: self.status, body: self.body });
        }
        serde_json::from_str(&self.body).map_err(|e| HttpError::Decode(e.to_string()))
    }
}

/// Sends one attempt and returns whatever the server answered.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, attempt: &RequestAttempt) -> Result<ApiResponse, HttpError>;
}

// =============================================================================
// AUTHORIZED CLIENT
// =============================================================================

#[derive(Clone)]
pub struct AuthorizedClient {
    transport: Arc<dyn Transport>,
    session: SessionController,
}

impl AuthorizedClient {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, session: SessionController) -> Self {
        Self { transport, session }
    }

    #[must_use]
    pub fn session(&self) -> &SessionController {
        &self.session
    }

    /// Send `request` with the current access token.
    ///
    /// Returns every response except a recoverable first-time 401 as-is.
    ///
    /// # Errors
    ///
    /// [`HttpError::Transport`] when no response arrived;
    /// [`HttpError::SessionEnded`] when token recovery failed and the session
    /// was logged out.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, HttpError> {
        let state = self.session.state();
        let epoch = state.epoch();
        let attempt = RequestAttempt::first(request, state.access_token);
        let response = self.transport.send(&attempt).await?;
        if response.status != UNAUTHORIZED {
            return Ok(response);
        }
        self.recover(&attempt, epoch).await
    }

    /// [`send`](Self::send) and decode the success body as JSON.
    ///
    /// # Errors
    ///
    /// Everything [`send`](Self::send) returns, plus non-2xx statuses and
    /// decode failures.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, HttpError> {
        self.send(request).await?.into_json()
    }

    async fn recover(&self, attempt: &RequestAttempt, epoch: u64) -> Result<ApiResponse, HttpError> {
        let path = attempt.request().path().to_owned();
        let current = self.session.state();
        if current.epoch() != epoch {
            info!(%path, "api: session changed while request was in flight");
            return Err(HttpError::SessionEnded(AuthError::Superseded));
        }
        if let Some(token) = current.access_token.filter(|token| Some(token.as_str()) != attempt.bearer()) {
            debug!(%path, "api: access token already rotated, resending");
            return self.resend(&path, attempt.retry_with(token), epoch).await;
        }

        info!(%path, "api: access token rejected, refreshing");
        let token = match self.session.refresh().await {
            Ok(token) => token,
            Err(err) => {
                warn!(%path, error = %err, "api: refresh failed, ending session");
                self.logout_if_current(epoch).await;
                return Err(HttpError::SessionEnded(err));
            }
        };

        if !self.session.update_access_token(epoch, &token) {
            return Err(HttpError::SessionEnded(AuthError::Superseded));
        }
        self.resend(&path, attempt.retry_with(token), epoch).await
    }

    async fn resend(&self, path: &str, retry: RequestAttempt, epoch: u64) -> Result<ApiResponse, HttpError> {
        let response = self.transport.send(&retry).await?;
        if response.status != UNAUTHORIZED {
            return Ok(response);
        }
        warn!(%path, "api: retried request still unauthorized, ending session");
        self.logout_if_current(epoch).await;
        Err(HttpError::SessionEnded(AuthError::Rejected {
            status: response.status,
            detail: crate::api::detail_from_body(&response.body),
        }))
    }

    /// Log out unless the session behind `epoch` is already gone; whoever
    /// ended it owns the transition.
    async fn logout_if_current(&self, epoch: u64) {
        if self.session.state().epoch() == epoch {
            self.session.logout().await;
        }
    }
}

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;
