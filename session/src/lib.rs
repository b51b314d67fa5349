//! Authenticated-session core for the folio client.
//!
//! This crate owns how the client acquires, refreshes, invalidates, and gates
//! access with a short-lived access token plus a cookie-held refresh
//! credential.
//!
//! ARCHITECTURE
//! ============
//! - [`controller::SessionController`] is the only writer of
//!   [`state::SessionState`]. It is an explicit handle owned by the
//!   application root and cloned into consumers.
//! - [`http::AuthorizedClient`] attaches the bearer token and recovers from a
//!   single expired-token 401 by refreshing and resending once.
//! - [`guard::RouteGuard`] turns state into wait / render / redirect.
//! - [`api::RestClient`] is the reqwest backend for both the Auth API and
//!   protected calls; one cookie jar carries the refresh credential.

pub mod api;
pub mod cache;
pub mod controller;
pub mod error;
pub mod flight;
pub mod guard;
pub mod http;
pub mod navigation;
pub mod state;
mod store;

pub use api::{AuthApi, Credentials, RefreshGrant, Registration, RestClient, Timeouts, TokenGrant};
pub use cache::{CachedToken, FileTokenCache, MemoryTokenCache, TokenCache};
pub use controller::SessionController;
pub use error::{AuthError, HttpError};
pub use guard::{GuardDecision, RouteGuard};
pub use http::{ApiRequest, ApiResponse, AuthorizedClient, RequestAttempt, Transport};
pub use navigation::Navigation;
pub use state::{Phase, SessionState};
