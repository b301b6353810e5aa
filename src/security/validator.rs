use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::security::credential_store::CredentialStore;
use crate::transport::{ApiRequest, ApiResponse, Transport, TransportError};

pub const SELF_PATH: &str = "/auth/self";

/// Why a session was found invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    /// No access token to validate; no request was made.
    NoToken,
    /// The backend answered with a non-success status.
    Rejected(u16),
    /// Transport failure or timeout.
    Unreachable,
    /// Success status with a body that is not JSON.
    Malformed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Valid,
    Invalid(InvalidReason),
}

impl Validity {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validity::Valid)
    }
}

/// Current user as returned by `/auth/self`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, alias = "_id")]
    pub id: Option<Value>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "firstName")]
    pub first_name: Option<String>,
    #[serde(default, alias = "lastName")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Asks the backend whether the stored access token is still accepted.
#[derive(Clone)]
pub struct SessionValidator {
    transport: Arc<dyn Transport>,
    store: CredentialStore,
    timeout: Duration,
}

impl SessionValidator {
    pub fn new(transport: Arc<dyn Transport>, store: CredentialStore, timeout: Duration) -> Self {
        Self {
            transport,
            store,
            timeout,
        }
    }

    /// Never fails: every problem is an `Invalid` outcome.
    pub async fn validate(&self) -> Validity {
        let resp = match self.fetch_self().await {
            Ok(resp) => resp,
            Err(SessionError::Unauthenticated) => return Validity::Invalid(InvalidReason::NoToken),
            Err(err) => {
                warn!(error = %err, "session validation unreachable");
                return Validity::Invalid(InvalidReason::Unreachable);
            }
        };

        if !resp.is_success() {
            debug!(status = resp.status.as_u16(), "session rejected by backend");
            return Validity::Invalid(InvalidReason::Rejected(resp.status.as_u16()));
        }
        match resp.json::<Value>() {
            Ok(_) => Validity::Valid,
            Err(err) => {
                warn!(error = %err, "malformed /auth/self body");
                Validity::Invalid(InvalidReason::Malformed)
            }
        }
    }

    /// Fetch the current user, accepting `{data:{user}}`, `{user}` or a bare user body.
    pub async fn current_user(&self) -> Result<User, SessionError> {
        let resp = self.fetch_self().await?;
        match resp.status.as_u16() {
            200..=299 => {}
            401 | 403 => return Err(SessionError::Unauthorized),
            code => {
                return Err(SessionError::InvalidResponse(format!(
                    "/auth/self returned {code}"
                )))
            }
        }

        let body: Value = resp
            .json()
            .map_err(|e| SessionError::InvalidResponse(format!("parsing current user: {e}")))?;
        let user = body
            .pointer("/data/user")
            .or_else(|| body.get("user"))
            .unwrap_or(&body);
        if !user.is_object() {
            return Err(SessionError::InvalidResponse("current user is not an object".into()));
        }
        serde_json::from_value(user.clone())
            .map_err(|e| SessionError::InvalidResponse(format!("mapping current user: {e}")))
    }

    async fn fetch_self(&self) -> Result<ApiResponse, SessionError> {
        let token = self.store.access_token().ok_or(SessionError::Unauthenticated)?;
        let request = ApiRequest::get(SELF_PATH).bearer(&token)?;
        match tokio::time::timeout(self.timeout, self.transport.send(request)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(TransportError::Timeout.into()),
        }
    }
}
