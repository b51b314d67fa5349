//! Error types for the session core.
//!
//! ERROR HANDLING
//! ==============
//! `AuthError` carries owned strings instead of wrapping `reqwest::Error`:
//! a single refresh result is shared with every caller that joined it, so the
//! error must be `Clone`.

/// Failure of an Auth API call or of a session operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The server rejected the request (bad credentials, expired refresh
    /// cookie, duplicate username). `detail` is the server's message, if any.
    #[error("rejected by server: status {status}")]
    Rejected { status: u16, detail: Option<String> },

    /// No response was received.
    #[error("network error: {0}")]
    Network(String),

    /// A response arrived but its body could not be decoded.
    #[error("response decode failed: {0}")]
    Decode(String),

    /// The operation was suppressed because a logout is in progress.
    #[error("logout in progress")]
    LoggingOut,

    /// The session this operation started under has since ended or been
    /// replaced; the result was discarded.
    #[error("session superseded")]
    Superseded,
}

impl AuthError {
    /// Server-provided human-readable detail, when the server sent one.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Rejected { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }

    /// True when the failure came from the transport rather than the server.
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// True when a logout already owns the session transition, so callers
    /// must not start another one.
    #[must_use]
    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::LoggingOut | Self::Superseded)
    }
}

/// Failure of a protected request sent through the authorized client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HttpError {
    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status}")]
    Status { status: u16, body: String },

    /// The session ended while recovering from an expired token. Callers
    /// should send the user back to sign in.
    #[error("session ended: {0}")]
    SessionEnded(AuthError),

    /// The response body did not match the expected shape.
    #[error("response decode failed: {0}")]
    Decode(String),

    /// The HTTP client or a request URL could not be built.
    #[error("client setup failed: {0}")]
    Setup(String),
}

impl HttpError {
    /// `detail` message from a JSON error body, when present.
    #[must_use]
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::Status { body, .. } => crate::api::detail_from_body(body),
            Self::SessionEnded(err) => err.detail().map(ToOwned::to_owned),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
