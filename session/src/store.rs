//! Session store: the mutable cell behind [`SessionState`].
//!
//! Every mutation runs inside `watch::Sender::send_if_modified`, so the
//! epoch check and the write happen under one lock and subscribers are only
//! woken for real changes. Only the controller holds a `SessionStore`.

use tokio::sync::watch;

use crate::state::{Phase, SessionState};

pub(crate) struct SessionStore {
    tx: watch::Sender<SessionState>,
}

impl SessionStore {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::initial());
        Self { tx }
    }

    pub(crate) fn snapshot(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    /// Mark a refresh as started for `epoch`. Returns `false` if that
    /// session is already gone.
    pub(crate) fn begin_refresh(&self, epoch: u64) -> bool {
        let mut current = false;
        self.tx.send_if_modified(|state| {
            current = state.epoch == epoch;
            if current && state.phase == Phase::Authenticated {
                state.phase = Phase::Refreshing;
                return true;
            }
            false
        });
        current
    }

    /// Splice a refreshed token in. Refused when the session moved on.
    pub(crate) fn apply_refresh(&self, epoch: u64, token: &str, user_id: Option<&str>) -> bool {
        let mut applied = false;
        self.tx.send_if_modified(|state| {
            if state.epoch != epoch {
                return false;
            }
            state.access_token = Some(token.to_owned());
            if let Some(user_id) = user_id {
                state.user_id = Some(user_id.to_owned());
            }
            if !state.loading() {
                state.phase = Phase::Authenticated;
            }
            applied = true;
            true
        });
        applied
    }

    /// Drop credentials after a failed refresh. Refused when the session
    /// moved on, since whoever moved it already owns the transition.
    pub(crate) fn fail_refresh(&self, epoch: u64) -> bool {
        let mut cleared = false;
        self.tx.send_if_modified(|state| {
            if state.epoch != epoch {
                return false;
            }
            state.access_token = None;
            state.user_id = None;
            state.epoch += 1;
            if !state.loading() {
                state.phase = Phase::Unauthenticated;
            }
            cleared = true;
            true
        });
        cleared
    }

    /// Install a freshly issued session (login or registration).
    pub(crate) fn authenticate(&self, token: &str, user_id: &str) -> SessionState {
        self.tx.send_modify(|state| {
            state.access_token = Some(token.to_owned());
            state.user_id = Some(user_id.to_owned());
            state.phase = Phase::Authenticated;
            state.epoch += 1;
        });
        self.snapshot()
    }

    /// Replace only the access token of the session identified by `epoch`.
    pub(crate) fn replace_token(&self, epoch: u64, token: &str) -> bool {
        let mut applied = false;
        self.tx.send_if_modified(|state| {
            if state.epoch != epoch || state.access_token.is_none() || state.phase == Phase::LoggingOut {
                return false;
            }
            if state.access_token.as_deref() == Some(token) {
                applied = true;
                return false;
            }
            state.access_token = Some(token.to_owned());
            applied = true;
            true
        });
        applied
    }

    pub(crate) fn begin_logout(&self) {
        self.tx.send_modify(|state| {
            state.access_token = None;
            state.user_id = None;
            state.epoch += 1;
            if !state.loading() {
                state.phase = Phase::LoggingOut;
            }
        });
    }

    pub(crate) fn finish_logout(&self) {
        self.tx.send_if_modified(|state| {
            if state.phase != Phase::LoggingOut {
                return false;
            }
            state.phase = Phase::Unauthenticated;
            true
        });
    }

    /// Settle hydration. Returns `true` only for the call that actually
    /// flipped `loading` from true to false.
    pub(crate) fn resolve_loading(&self, user_hint: Option<&str>) -> bool {
        self.tx.send_if_modified(|state| {
            if !state.loading() {
                return false;
            }
            if state.access_token.is_some() {
                if state.user_id.is_none() {
                    state.user_id = user_hint.map(ToOwned::to_owned);
                }
                state.phase = Phase::Authenticated;
            } else {
                state.user_id = None;
                state.phase = Phase::Unauthenticated;
            }
            true
        })
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
