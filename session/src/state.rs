//! Session state published by the controller.
//!
//! DESIGN
//! ======
//! `phase` is the state machine; `loading` is not stored separately but
//! derived as `phase == Unknown`, so the two can never disagree. `epoch`
//! identifies the current session: every login and logout bumps it, and
//! anything that suspends across I/O compares epochs before trusting what it
//! read earlier.

use serde::Serialize;

/// Authentication lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Startup hydration has not settled yet.
    Unknown,
    Unauthenticated,
    Authenticated,
    /// An authenticated session is minting a new access token.
    Refreshing,
    LoggingOut,
}

/// Snapshot of the current session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionState {
    /// Bearer credential for protected API calls.
    pub access_token: Option<String>,
    /// Authenticated principal. Carried forward across refreshes that do not
    /// return one.
    pub user_id: Option<String>,
    pub phase: Phase,
    #[serde(skip)]
    pub(crate) epoch: u64,
}

impl SessionState {
    /// State at application start: hydration outstanding, no credentials.
    #[must_use]
    pub fn initial() -> Self {
        Self { access_token: None, user_id: None, phase: Phase::Unknown, epoch: 0 }
    }

    /// True while hydration is outstanding. `access_token` is indeterminate
    /// in this window, not "unauthenticated".
    #[must_use]
    pub fn loading(&self) -> bool {
        self.phase == Phase::Unknown
    }

    /// True when a usable session exists and hydration has settled.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self.phase, Phase::Authenticated | Phase::Refreshing) && self.access_token.is_some()
    }

    /// Session identity for re-validation after a suspension point.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// `true` if `other` still describes the same session as `self`.
    #[must_use]
    pub fn same_session(&self, other: &Self) -> bool {
        self.epoch == other.epoch
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::initial()
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
