use crate::navigation::RedirectReason;
use crate::security::token_refresh::RefreshFailure;
use crate::transport::TransportError;

/// Everything the session core can report to its callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("not authenticated")]
    Unauthenticated,
    #[error("access token rejected")]
    Unauthorized,
    #[error("session expired: {0}")]
    RefreshExhausted(RefreshFailure),
    #[error("session validation unreachable")]
    ValidationUnreachable,
    #[error("cannot determine destination for role {0:?}")]
    RoleUnresolvable(Option<String>),
    #[error("login rejected ({status}): {message}")]
    LoginRejected { status: u16, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SessionError {
    /// Whether the error ends the session and forces the user back to login.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionError::RefreshExhausted(_) | SessionError::RoleUnresolvable(_)
        )
    }

    /// Reason code the UI layer uses to pick a message on the login screen.
    pub fn redirect_reason(&self) -> Option<RedirectReason> {
        match self {
            SessionError::Unauthenticated => Some(RedirectReason::NotAuthenticated),
            SessionError::RefreshExhausted(RefreshFailure::Superseded) => {
                Some(RedirectReason::LoggedOut)
            }
            SessionError::RefreshExhausted(_) | SessionError::Unauthorized => {
                Some(RedirectReason::SessionExpired)
            }
            SessionError::ValidationUnreachable => Some(RedirectReason::NetworkFailure),
            SessionError::RoleUnresolvable(_) => Some(RedirectReason::RoleUnresolvable),
            SessionError::LoginRejected { .. }
            | SessionError::InvalidResponse(_)
            | SessionError::Transport(_) => None,
        }
    }
}
