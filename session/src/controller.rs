//! Session controller: the single writer of [`SessionState`].
//!
//! ARCHITECTURE
//! ============
//! The controller is a cheap-to-clone handle around shared internals. The
//! application root creates one, calls [`SessionController::hydrate`] once,
//! and hands clones to pages, the route guard, and the authorized client.
//! State changes are published on a `watch` channel; navigation intents on a
//! `broadcast` channel.
//!
//! ORDERING
//! ========
//! - Refreshes are single-flight: concurrent triggers (hydration, any number
//!   of 401s) join one network call and observe the same result.
//! - A refresh captures the session epoch when it starts and applies its
//!   result only if the epoch is unchanged. Login and logout bump the epoch,
//!   so a late refresh can never resurrect a session the user ended.
//! - While a logout is in progress, new refreshes are refused outright.
//!
//! ERROR HANDLING
//! ==============
//! `hydrate` and `logout` never fail; every failure path lands in a defined
//! state. `login`/`register` return the error for the page to display and
//! leave state untouched. A failed refresh clears the session and signals
//! the landing page.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::api::{AuthApi, Credentials, Registration, TokenGrant};
use crate::cache::{CachedToken, TokenCache};
use crate::error::AuthError;
use crate::flight::SingleFlight;
use crate::guard::RouteGuard;
use crate::navigation::Navigation;
use crate::state::SessionState;
use crate::store::SessionStore;

const REFRESH: &str = "refresh";
const NAVIGATION_CAPACITY: usize = 16;

type RefreshResult = Result<String, AuthError>;

#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

struct Inner {
    api: Arc<dyn AuthApi>,
    cache: Arc<dyn TokenCache>,
    store: SessionStore,
    flights: SingleFlight<(&'static str, u64), RefreshResult>,
    logging_out: AtomicBool,
    hydrate_started: AtomicBool,
    navigation: broadcast::Sender<Navigation>,
}

impl SessionController {
    #[must_use]
    pub fn new(api: Arc<dyn AuthApi>, cache: Arc<dyn TokenCache>) -> Self {
        let (navigation, _rx) = broadcast::channel(NAVIGATION_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                api,
                cache,
                store: SessionStore::new(),
                flights: SingleFlight::new(),
                logging_out: AtomicBool::new(false),
                hydrate_started: AtomicBool::new(false),
                navigation,
            }),
        }
    }

    // =========================================================================
    // READERS
    // =========================================================================

    /// Current snapshot. Do not hold it across an await without comparing
    /// epochs afterwards.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.store.snapshot()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.store.subscribe()
    }

    #[must_use]
    pub fn navigation(&self) -> broadcast::Receiver<Navigation> {
        self.inner.navigation.subscribe()
    }

    /// Route guard bound to this controller's state.
    #[must_use]
    pub fn guard(&self) -> RouteGuard {
        RouteGuard::new(self.subscribe())
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    // =========================================================================
    // HYDRATION
    // =========================================================================

    /// Determine the initial session. Runs once; later calls return the
    /// current state without doing anything.
    pub async fn hydrate(&self) -> SessionState {
        if self.inner.hydrate_started.swap(true, Ordering::AcqRel) {
            debug!("session: hydrate already ran");
            return self.state();
        }

        let cached = self.inner.cache.load();
        let user_hint = cached.as_ref().and_then(|c| c.user_id.clone());
        if cached.is_none() {
            debug!("session: no cached credential, starting unauthenticated");
        } else {
            match self.refresh().await {
                Ok(_) => info!("session: hydrated from refresh"),
                Err(err) => info!(error = %err, "session: hydration refresh failed"),
            }
        }

        if self.inner.store.resolve_loading(user_hint.as_deref()) {
            let state = self.state();
            info!(authenticated = state.is_authenticated(), "session: hydration settled");
            if let Some(token) = state.access_token.as_deref() {
                self.persist(token, state.user_id.as_deref());
            }
        }
        self.state()
    }

    // =========================================================================
    // LOGIN / REGISTER
    // =========================================================================

    /// Exchange credentials for a session.
    ///
    /// # Errors
    ///
    /// Returns the Auth API error unchanged; state is not touched.
    pub async fn login(&self, credentials: &Credentials) -> Result<SessionState, AuthError> {
        let grant = self.inner.api.login(credentials).await.inspect_err(|err| {
            info!(username = %credentials.username, error = %err, "session: login rejected");
        })?;
        Ok(self.establish(grant, "login"))
    }

    /// Create an account and sign straight into it.
    ///
    /// # Errors
    ///
    /// Returns the Auth API error unchanged; state is not touched.
    pub async fn register(&self, registration: &Registration) -> Result<SessionState, AuthError> {
        let grant = self.inner.api.register(registration).await.inspect_err(|err| {
            info!(username = %registration.username, error = %err, "session: registration rejected");
        })?;
        Ok(self.establish(grant, "register"))
    }

    fn establish(&self, grant: TokenGrant, via: &'static str) -> SessionState {
        let state = self.inner.store.authenticate(&grant.access_token, &grant.user_id);
        self.persist(&grant.access_token, Some(&grant.user_id));
        info!(user_id = %grant.user_id, via, "session: authenticated");
        self.navigate(Navigation::Dashboard);
        state
    }

    // =========================================================================
    // REFRESH
    // =========================================================================

    /// Mint a new access token from the ambient refresh credential.
    ///
    /// Concurrent callers within the same session share one network call.
    /// On failure the session is
    /// cleared and the landing page signalled.
    ///
    /// # Errors
    ///
    /// The Auth API error, [`AuthError::LoggingOut`] if a logout is running,
    /// or [`AuthError::Superseded`] if the session changed while the call was
    /// outstanding.
    pub async fn refresh(&self) -> Result<String, AuthError> {
        if self.inner.logging_out.load(Ordering::Acquire) {
            debug!("session: refresh suppressed during logout");
            return Err(AuthError::LoggingOut);
        }
        let epoch = self.inner.store.snapshot().epoch;
        let inner = Arc::downgrade(&self.inner);
        self.inner
            .flights
            .run((REFRESH, epoch), move || refresh_once(inner, epoch))
            .await
    }

    /// Splice a freshly refreshed token into the session identified by
    /// `epoch` (taken from [`SessionState::epoch`] before the refresh was
    /// awaited) without touching the user id or signalling navigation.
    /// Returns `false` when there is no session to update or the session
    /// changed since `epoch` was read.
    #[must_use]
    pub fn update_access_token(&self, epoch: u64, token: &str) -> bool {
        if self.inner.logging_out.load(Ordering::Acquire) {
            return false;
        }
        if !self.inner.store.replace_token(epoch, token) {
            debug!(epoch, "session: token update refused, session changed or absent");
            return false;
        }
        let user_id = self.state().user_id;
        self.persist(token, user_id.as_deref());
        true
    }

    // =========================================================================
    // LOGOUT
    // =========================================================================

    /// End the session. Any refresh still in flight is discarded when it
    /// lands. Server-side cookie revocation is best-effort.
    pub async fn logout(&self) {
        self.inner.logging_out.store(true, Ordering::Release);
        self.inner.store.begin_logout();
        self.inner.cache.clear();
        info!("session: logged out");
        self.navigate(Navigation::Landing);

        if let Err(err) = self.inner.api.logout().await {
            warn!(error = %err, "session: server logout failed");
        }

        self.inner.store.finish_logout();
        self.inner.logging_out.store(false, Ordering::Release);
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn persist(&self, token: &str, user_id: Option<&str>) {
        self.inner.persist(token, user_id);
    }

    fn navigate(&self, to: Navigation) {
        self.inner.navigate(to);
    }
}

impl Inner {
    fn persist(&self, token: &str, user_id: Option<&str>) {
        self.cache.store(&CachedToken { access_token: token.to_owned(), user_id: user_id.map(ToOwned::to_owned) });
    }

    fn navigate(&self, to: Navigation) {
        debug!(?to, "session: navigate");
        // No receivers is fine: nobody is routing yet.
        let _ = self.navigation.send(to);
    }
}

/// Body of the shared refresh operation for one session epoch. Holds only a
/// weak handle so an abandoned flight cannot keep the controller alive.
async fn refresh_once(inner: Weak<Inner>, epoch: u64) -> RefreshResult {
    let Some(inner) = inner.upgrade() else {
        return Err(AuthError::Superseded);
    };
    if !inner.store.begin_refresh(epoch) {
        return Err(AuthError::Superseded);
    }
    debug!(epoch, "session: refresh started");

    match inner.api.refresh().await {
        Ok(grant) => {
            if !inner.store.apply_refresh(epoch, &grant.access_token, grant.user_id.as_deref()) {
                info!(epoch, "session: refresh result discarded, session changed");
                return Err(AuthError::Superseded);
            }
            let state = inner.store.snapshot();
            inner.persist(&grant.access_token, state.user_id.as_deref());
            info!(epoch, "session: access token refreshed");
            Ok(grant.access_token)
        }
        Err(err) => {
            if inner.store.fail_refresh(epoch) {
                warn!(epoch, error = %err, "session: refresh failed, clearing session");
                inner.cache.clear();
                inner.navigate(Navigation::Landing);
            } else {
                debug!(epoch, error = %err, "session: stale refresh failure ignored");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
#[path = "controller_test.rs"]
mod tests;
