//! Navigation signals emitted by the session controller.
//!
//! The controller never routes by itself; it announces where the user should
//! go and the application root decides how to get there.

use serde::Serialize;

/// Path of the public landing page.
pub const LANDING_PATH: &str = "/";
/// Path of the authenticated area.
pub const DASHBOARD_PATH: &str = "/dashboard";
/// Path of the login entry point protected views redirect to.
pub const LOGIN_PATH: &str = "/login";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Navigation {
    /// Session ended or never existed; go to the public landing page.
    Landing,
    /// Session established; go to the dashboard.
    Dashboard,
}

impl Navigation {
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Landing => LANDING_PATH,
            Self::Dashboard => DASHBOARD_PATH,
        }
    }
}
