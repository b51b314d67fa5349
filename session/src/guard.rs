//! Route guard for protected views.
//!
//! A protected view renders only once hydration settled and a session
//! exists; while hydration is outstanding the guard answers "wait", never a
//! redirect. The guard follows the controller's `watch` channel so a
//! background logout redirects a view that is already on screen.

use tokio::sync::watch;

use crate::navigation::LOGIN_PATH;
use crate::state::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Show the neutral waiting indicator.
    Waiting,
    /// Show the protected content.
    Render,
    /// Leave for the given path.
    Redirect(&'static str),
}

/// Pure decision for a single snapshot.
#[must_use]
pub fn decide(state: &SessionState) -> GuardDecision {
    if state.loading() {
        GuardDecision::Waiting
    } else if state.is_authenticated() {
        GuardDecision::Render
    } else {
        GuardDecision::Redirect(LOGIN_PATH)
    }
}

pub struct RouteGuard {
    rx: watch::Receiver<SessionState>,
}

impl RouteGuard {
    #[must_use]
    pub fn new(rx: watch::Receiver<SessionState>) -> Self {
        Self { rx }
    }

    /// Decision for the state as it is right now.
    #[must_use]
    pub fn current(&mut self) -> GuardDecision {
        decide(&self.rx.borrow_and_update())
    }

    /// Wait for the next state change and re-evaluate. Returns `None` once
    /// the controller is gone.
    pub async fn changed(&mut self) -> Option<GuardDecision> {
        self.rx.changed().await.ok()?;
        Some(self.current())
    }

    /// Wait until the decision is no longer [`GuardDecision::Waiting`].
    pub async fn settled(&mut self) -> GuardDecision {
        let mut decision = self.current();
        while decision == GuardDecision::Waiting {
            match self.changed().await {
                Some(next) => decision = next,
                None => return GuardDecision::Redirect(LOGIN_PATH),
            }
        }
        decision
    }
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
