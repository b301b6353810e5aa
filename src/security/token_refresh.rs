use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::navigation::{Navigation, Navigator, RedirectReason};
use crate::security::audit_log::AuditLogger;
use crate::security::credential_store::CredentialStore;
use crate::transport::{ApiRequest, Transport, TransportError};

pub const REFRESH_PATH: &str = "/auth/refresh";

/// Why a refresh cycle ended without a usable token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshFailure {
    #[error("no refresh token available")]
    NoRefreshToken,
    #[error("refresh rejected with status {0}")]
    Rejected(u16),
    #[error("invalid refresh response: {0}")]
    Malformed(String),
    #[error("refresh request failed: {0}")]
    Transport(TransportError),
    #[error("refresh timed out")]
    TimedOut,
    #[error("session was replaced while refreshing")]
    Superseded,
    #[error("refresh task ended without an outcome")]
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Succeeded(String),
    Failed(RefreshFailure),
}

#[derive(Debug, Deserialize)]
struct TokenPairResponse {
    #[serde(default, alias = "accessToken")]
    access_token: Option<String>,
    #[serde(default, alias = "refreshToken")]
    refresh_token: Option<String>,
}

type OutcomeReceiver = watch::Receiver<Option<RefreshOutcome>>;

enum RefreshState {
    Idle,
    Refreshing(OutcomeReceiver),
}

struct Inner {
    transport: Arc<dyn Transport>,
    store: CredentialStore,
    navigator: Arc<dyn Navigator>,
    audit: AuditLogger,
    timeout: Duration,
    state: Mutex<RefreshState>,
    // store epoch right after a failed cycle cleared it, with that failure
    last_failure: Mutex<Option<(u64, RefreshFailure)>>,
}

/// Single-flight refresh of the access token.
///
/// The first caller of a cycle flips the state to `Refreshing` inside the same
/// critical section that saw `Idle`, then hands the backend call to a spawned
/// task. Everyone arriving before that task settles subscribes to the same
/// outcome channel, so a burst of 401s costs exactly one `/auth/refresh` call
/// and every waiter sees the same token (or the same failure).
///
/// On failure the store is cleared and one forced-logout navigation is emitted
/// per cycle.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: CredentialStore,
        navigator: Arc<dyn Navigator>,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                store,
                navigator,
                audit: AuditLogger::new(),
                timeout,
                state: Mutex::new(RefreshState::Idle),
                last_failure: Mutex::new(None),
            }),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.inner.state.lock(), RefreshState::Refreshing(_))
    }

    /// The failure of the cycle that cleared the current (empty) session.
    ///
    /// `None` once anything has touched the store since that cycle.
    pub fn failure_behind_current_session(&self) -> Option<RefreshFailure> {
        let epoch = self.inner.store.epoch();
        match &*self.inner.last_failure.lock() {
            Some((cleared_at, failure)) if *cleared_at == epoch => Some(failure.clone()),
            _ => None,
        }
    }

    /// Obtain a fresh access token, joining the in-flight cycle if there is one.
    pub async fn refresh(&self) -> RefreshOutcome {
        let mut rx = self.join_or_start();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(settled) => (*settled).clone(),
            Err(_) => None,
        };
        outcome.unwrap_or(RefreshOutcome::Failed(RefreshFailure::Abandoned))
    }

    fn join_or_start(&self) -> OutcomeReceiver {
        let mut state = self.inner.state.lock();
        if let RefreshState::Refreshing(rx) = &*state {
            debug!("joining in-flight token refresh");
            return rx.clone();
        }

        let (tx, rx) = watch::channel(None);
        *state = RefreshState::Refreshing(rx.clone());
        drop(state);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let outcome = inner.run_cycle().await;
            inner.settle(&tx, outcome);
        });
        rx
    }
}

impl Inner {
    async fn run_cycle(&self) -> RefreshOutcome {
        let epoch = self.store.epoch();
        let had_access_token = self.store.access_token().is_some();

        let outcome = match self.store.refresh_token() {
            None => RefreshOutcome::Failed(RefreshFailure::NoRefreshToken),
            Some(refresh_token) => {
                self.audit.refresh_started();
                match self.call_backend(&refresh_token).await {
                    Ok((access, refresh)) => {
                        if self.store.replace_tokens_if(epoch, &access, &refresh) {
                            RefreshOutcome::Succeeded(access)
                        } else {
                            RefreshOutcome::Failed(RefreshFailure::Superseded)
                        }
                    }
                    Err(failure) => RefreshOutcome::Failed(failure),
                }
            }
        };

        match &outcome {
            RefreshOutcome::Succeeded(_) => self.audit.refresh_succeeded(),
            RefreshOutcome::Failed(RefreshFailure::Superseded) => {
                info!("session changed during refresh; keeping the newer state");
            }
            RefreshOutcome::Failed(failure) => {
                self.audit.refresh_failed(&failure.to_string());
                // a login that landed mid-cycle must not be wiped
                if self.store.clear_if(epoch) {
                    *self.last_failure.lock() = Some((epoch + 1, failure.clone()));
                    let reason = if had_access_token {
                        RedirectReason::SessionExpired
                    } else {
                        RedirectReason::NotAuthenticated
                    };
                    self.navigator.navigate(Navigation::Login { reason });
                }
            }
        }
        outcome
    }

    async fn call_backend(&self, refresh_token: &str) -> Result<(String, String), RefreshFailure> {
        let request = ApiRequest::post(REFRESH_PATH)
            .bearer(refresh_token)
            .map_err(RefreshFailure::Transport)?;

        let resp = match tokio::time::timeout(self.timeout, self.transport.send(request)).await {
            Err(_) => return Err(RefreshFailure::TimedOut),
            Ok(Err(TransportError::Timeout)) => return Err(RefreshFailure::TimedOut),
            Ok(Err(err)) => return Err(RefreshFailure::Transport(err)),
            Ok(Ok(resp)) => resp,
        };

        if !resp.is_success() {
            warn!(status = resp.status.as_u16(), "refresh token rejected");
            return Err(RefreshFailure::Rejected(resp.status.as_u16()));
        }

        let pair: TokenPairResponse = resp
            .json()
            .map_err(|e| RefreshFailure::Malformed(e.to_string()))?;
        match (pair.access_token, pair.refresh_token) {
            (Some(access), Some(refresh)) if !access.is_empty() && !refresh.is_empty() => {
                Ok((access, refresh))
            }
            _ => Err(RefreshFailure::Malformed("missing access or refresh token".into())),
        }
    }

    fn settle(&self, tx: &watch::Sender<Option<RefreshOutcome>>, outcome: RefreshOutcome) {
        let mut state = self.state.lock();
        *state = RefreshState::Idle;
        tx.send_replace(Some(outcome));
    }
}
