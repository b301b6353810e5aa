use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use tracing::info;

use crate::security::roles::Destination;

/// Why the user is being sent back to the login screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectReason {
    SessionExpired,
    NotAuthenticated,
    NetworkFailure,
    RoleUnresolvable,
    LoggedOut,
}

impl RedirectReason {
    /// Query marker appended to the login route, e.g. `/login?sessionExpired=true`.
    pub fn query_marker(&self) -> &'static str {
        match self {
            RedirectReason::SessionExpired => "sessionExpired",
            RedirectReason::NotAuthenticated => "notAuthenticated",
            RedirectReason::NetworkFailure => "networkFailure",
            RedirectReason::RoleUnresolvable => "roleUnresolvable",
            RedirectReason::LoggedOut => "loggedOut",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Navigation {
    Dashboard { destination: Destination },
    Login { reason: RedirectReason },
}

impl fmt::Display for Navigation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Navigation::Dashboard { destination } => f.write_str(destination.path()),
            Navigation::Login { reason } => write!(f, "/login?{}=true", reason.query_marker()),
        }
    }
}

/// Where the session core sends navigations it decides on (the router, in a UI).
pub trait Navigator: Send + Sync {
    fn navigate(&self, navigation: Navigation);
}

/// Navigator that logs and remembers every navigation; used by the CLI and tests.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    history: Mutex<Vec<Navigation>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<Navigation> {
        self.history.lock().clone()
    }

    pub fn last(&self) -> Option<Navigation> {
        self.history.lock().last().copied()
    }

    pub fn login_redirects(&self) -> usize {
        self.history
            .lock()
            .iter()
            .filter(|n| matches!(n, Navigation::Login { .. }))
            .count()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, navigation: Navigation) {
        info!(route = %navigation, "navigating");
        self.history.lock().push(navigation);
    }
}
