use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::security::audit_log::AuditLogger;
use crate::security::credential_store::CredentialStore;
use crate::security::token_refresh::{RefreshCoordinator, RefreshFailure, RefreshOutcome};
use crate::transport::{ApiRequest, ApiResponse, Transport};

/// Paths that must never carry a token or trigger a refresh.
pub const DEFAULT_EXCLUDED_PATHS: &[&str] = &["/auth/login", "/auth/signup", "/auth/refresh"];

/// A request that came back 401, stripped of its stale credential.
///
/// `replay` consumes it, so one caller request is retried at most once.
#[derive(Debug)]
pub struct PendingRequest {
    request: ApiRequest,
}

impl PendingRequest {
    pub fn capture(request: &ApiRequest) -> Self {
        Self {
            request: request.clone().without_authorization(),
        }
    }

    pub fn replay(self, token: &str) -> Result<ApiRequest, SessionError> {
        Ok(self.request.bearer(token)?)
    }
}

/// Attaches the bearer token to outbound calls and recovers from 401 via refresh.
#[derive(Clone)]
pub struct RequestAuthorizer {
    transport: Arc<dyn Transport>,
    store: CredentialStore,
    coordinator: RefreshCoordinator,
    excluded_paths: Vec<String>,
    audit: AuditLogger,
}

impl RequestAuthorizer {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: CredentialStore,
        coordinator: RefreshCoordinator,
        excluded_paths: Vec<String>,
    ) -> Self {
        Self {
            transport,
            store,
            coordinator,
            excluded_paths,
            audit: AuditLogger::new(),
        }
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded_paths.iter().any(|excluded| {
            path.strip_prefix(excluded.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'))
        })
    }

    /// Send `request`, refreshing and replaying once on 401.
    ///
    /// Every HTTP response, including a 401 from the replay, is returned as
    /// `Ok`; only transport errors and terminal session failures are `Err`.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, SessionError> {
        if self.is_excluded(&request.path) {
            debug!(path = %request.path, "path excluded from authorization");
            return Ok(self.transport.send(request).await?);
        }

        let pending = PendingRequest::capture(&request);
        let sent_token = self.store.access_token();
        let outbound = match &sent_token {
            Some(token) => request.bearer(token)?,
            None => request.without_authorization(),
        };

        let resp = self.transport.send(outbound).await?;
        if !resp.is_unauthorized() {
            return Ok(resp);
        }

        debug!(
            path = %pending.request.path,
            request_id = %pending.request.request_id(),
            "401 received, obtaining fresh access token"
        );
        let token = self.fresh_token(sent_token.as_deref()).await?;

        self.audit
            .request_replayed(pending.request.request_id(), &pending.request.path);
        let retry = pending.replay(&token)?;
        let resp = self.transport.send(retry).await?;
        if resp.is_unauthorized() {
            warn!("replayed request rejected again; not retrying");
        }
        Ok(resp)
    }

    async fn fresh_token(&self, sent_token: Option<&str>) -> Result<String, SessionError> {
        // another cycle already rotated the token since this request went out
        if let Some(current) = self.store.access_token() {
            if sent_token.is_some_and(|sent| sent != current) && !self.coordinator.is_refreshing() {
                debug!("access token rotated while request was in flight; reusing it");
                return Ok(current);
            }
        }

        // the session this request was sent under is already gone: a cycle
        // failed and redirected, or the user logged out
        if sent_token.is_some() && self.store.access_token().is_none() && !self.coordinator.is_refreshing() {
            let failure = self
                .coordinator
                .failure_behind_current_session()
                .unwrap_or(RefreshFailure::Superseded);
            debug!(%failure, "session already ended; not starting another refresh");
            return Err(SessionError::RefreshExhausted(failure));
        }

        match self.coordinator.refresh().await {
            RefreshOutcome::Succeeded(token) => Ok(token),
            RefreshOutcome::Failed(failure) => Err(SessionError::RefreshExhausted(failure)),
        }
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, SessionError> {
        self.execute(ApiRequest::get(path)).await
    }

    pub async fn post(&self, path: &str, body: serde_json::Value) -> Result<ApiResponse, SessionError> {
        self.execute(ApiRequest::post(path).json(body)).await
    }

    pub async fn put(&self, path: &str, body: serde_json::Value) -> Result<ApiResponse, SessionError> {
        self.execute(ApiRequest::put(path).json(body)).await
    }

    pub async fn patch(&self, path: &str, body: serde_json::Value) -> Result<ApiResponse, SessionError> {
        self.execute(ApiRequest::patch(path).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, SessionError> {
        self.execute(ApiRequest::delete(path)).await
    }
}
