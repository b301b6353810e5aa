use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use taskboard_session::security::token_refresh::REFRESH_PATH;
use taskboard_session::transport::{ApiRequest, ApiResponse, Transport, TransportError};
use taskboard_session::{
    ClientConfig, CredentialStore, Navigation, RecordingNavigator, RedirectReason, RefreshFailure,
    SessionClient, SessionError,
};
use tokio::sync::Semaphore;

/// Backend where `A1` is expired, `A2` is accepted, and `/auth/refresh` blocks on a gate.
struct GatedBackend {
    gate: Semaphore,
    refresh_status: StatusCode,
    refresh_calls: AtomicUsize,
    rejected: AtomicUsize,
}

impl GatedBackend {
    fn new(refresh_status: StatusCode) -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            refresh_status,
            refresh_calls: AtomicUsize::new(0),
            rejected: AtomicUsize::new(0),
        })
    }

    fn open_gate(&self) {
        self.gate.add_permits(64);
    }
}

#[async_trait]
impl Transport for GatedBackend {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let bearer = request
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if request.path == REFRESH_PATH {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            let _permit = self.gate.acquire().await.map_err(|e| TransportError::Network(e.to_string()))?;
            return Ok(if self.refresh_status.is_success() {
                ApiResponse::new(
                    self.refresh_status,
                    r#"{"access_token":"A2","refresh_token":"R2"}"#,
                )
            } else {
                ApiResponse::new(self.refresh_status, r#"{"message":"refresh token expired"}"#)
            });
        }

        match bearer.as_deref() {
            Some("Bearer A2") => Ok(ApiResponse::new(
                StatusCode::OK,
                format!(r#"{{"path":"{}","token":"A2"}}"#, request.path),
            )),
            _ => {
                self.rejected.fetch_add(1, Ordering::SeqCst);
                Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, ""))
            }
        }
    }
}

fn client_over(backend: Arc<GatedBackend>, store: CredentialStore) -> (SessionClient, Arc<RecordingNavigator>) {
    let navigator = Arc::new(RecordingNavigator::new());
    let client = SessionClient::new(backend, store, navigator.clone(), &ClientConfig::default());
    (client, navigator)
}

fn signed_in_store() -> CredentialStore {
    let store = CredentialStore::in_memory();
    store.set_session("A1".into(), Some("R1".into()), Some("user".into()));
    store
}

async fn wait_until(mut ready: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if ready() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

fn spawn_requests(
    client: &SessionClient,
    n: usize,
) -> Vec<tokio::task::JoinHandle<Result<ApiResponse, SessionError>>> {
    (0..n)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move { client.authorizer().get(&format!("/tasks/{i}")).await })
        })
        .collect()
}

#[tokio::test]
async fn concurrent_401s_share_one_refresh() {
    const N: usize = 8;
    let backend = GatedBackend::new(StatusCode::OK);
    let store = signed_in_store();
    let (client, navigator) = client_over(backend.clone(), store.clone());

    let handles = spawn_requests(&client, N);
    wait_until(|| {
        backend.rejected.load(Ordering::SeqCst) == N && backend.refresh_calls.load(Ordering::SeqCst) == 1
    })
    .await;
    assert!(client.coordinator().is_refreshing());
    backend.open_gate();

    for (i, handle) in handles.into_iter().enumerate() {
        let resp = handle.await.unwrap().expect("request should succeed after refresh");
        assert_eq!(resp.status, StatusCode::OK);
        let body: serde_json::Value = resp.json().unwrap();
        assert_eq!(body["token"], "A2");
        assert_eq!(body["path"], format!("/tasks/{i}"));
    }

    assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.access_token().as_deref(), Some("A2"));
    assert_eq!(store.refresh_token().as_deref(), Some("R2"));
    assert!(!client.coordinator().is_refreshing());
    assert!(navigator.history().is_empty());
}

#[tokio::test]
async fn failed_refresh_fails_every_waiter_and_clears_store() {
    const N: usize = 5;
    let backend = GatedBackend::new(StatusCode::UNAUTHORIZED);
    let store = signed_in_store();
    let (client, navigator) = client_over(backend.clone(), store.clone());

    let handles = spawn_requests(&client, N);
    wait_until(|| backend.rejected.load(Ordering::SeqCst) == N).await;
    backend.open_gate();

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err, SessionError::RefreshExhausted(RefreshFailure::Rejected(401)));
        assert_eq!(err.redirect_reason(), Some(RedirectReason::SessionExpired));
    }

    assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
    assert!(store.snapshot().is_empty());
    assert_eq!(store.access_token(), None);
    assert_eq!(store.refresh_token(), None);
    assert_eq!(store.role(), None);
    // one forced logout for the whole cycle
    assert_eq!(
        navigator.history(),
        vec![Navigation::Login {
            reason: RedirectReason::SessionExpired
        }]
    );
}

#[tokio::test]
async fn missing_refresh_token_is_terminal_without_network_refresh() {
    let backend = GatedBackend::new(StatusCode::OK);
    let store = CredentialStore::in_memory();
    store.set_access_token("A1");
    store.set_role("admin");
    let (client, _) = client_over(backend.clone(), store.clone());

    let err = client.authorizer().get("/tasks").await.unwrap_err();
    assert_eq!(err, SessionError::RefreshExhausted(RefreshFailure::NoRefreshToken));
    assert!(err.is_terminal());
    assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 0);
    assert!(store.snapshot().is_empty());
}

#[tokio::test]
async fn logout_during_refresh_wins() {
    let backend = GatedBackend::new(StatusCode::OK);
    let store = signed_in_store();
    let (client, navigator) = client_over(backend.clone(), store.clone());

    let mut handles = spawn_requests(&client, 1);
    wait_until(|| backend.refresh_calls.load(Ordering::SeqCst) == 1).await;

    client.logout();
    backend.open_gate();

    let err = handles.remove(0).await.unwrap().unwrap_err();
    assert_eq!(err, SessionError::RefreshExhausted(RefreshFailure::Superseded));
    assert!(store.snapshot().is_empty());
    assert_eq!(
        navigator.history(),
        vec![Navigation::Login {
            reason: RedirectReason::LoggedOut
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn hung_refresh_times_out_and_releases_waiters() {
    let backend = GatedBackend::new(StatusCode::OK);
    let store = signed_in_store();
    let (client, _) = client_over(backend.clone(), store.clone());

    // gate never opens
    let results = futures_util::future::join_all((0..3).map(|_| client.authorizer().get("/tasks"))).await;
    for result in results {
        assert_eq!(
            result.unwrap_err(),
            SessionError::RefreshExhausted(RefreshFailure::TimedOut)
        );
    }
    assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
    assert!(store.snapshot().is_empty());
    assert!(!client.coordinator().is_refreshing());
}

/// Refresh always fails; `/tasks/slow` holds its 401 until the gate opens.
struct StaggeredBackend {
    gate: Semaphore,
    slow_waiting: AtomicUsize,
    refresh_calls: AtomicUsize,
}

#[async_trait]
impl Transport for StaggeredBackend {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        if request.path == REFRESH_PATH {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, ""));
        }
        if request.path == "/tasks/slow" {
            self.slow_waiting.fetch_add(1, Ordering::SeqCst);
            let _permit = self.gate.acquire().await.map_err(|e| TransportError::Network(e.to_string()))?;
        }
        Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, ""))
    }
}

#[tokio::test]
async fn late_401_after_failed_cycle_keeps_expired_marker() {
    let backend = Arc::new(StaggeredBackend {
        gate: Semaphore::new(0),
        slow_waiting: AtomicUsize::new(0),
        refresh_calls: AtomicUsize::new(0),
    });
    let store = signed_in_store();
    let navigator = Arc::new(RecordingNavigator::new());
    let client = SessionClient::new(backend.clone(), store.clone(), navigator.clone(), &ClientConfig::default());

    let slow = {
        let client = client.clone();
        tokio::spawn(async move { client.authorizer().get("/tasks/slow").await })
    };
    wait_until(|| backend.slow_waiting.load(Ordering::SeqCst) == 1).await;

    let fast = client.authorizer().get("/tasks/fast").await.unwrap_err();
    assert_eq!(fast, SessionError::RefreshExhausted(RefreshFailure::Rejected(401)));
    assert!(store.snapshot().is_empty());

    backend.gate.add_permits(1);
    let slow = slow.await.unwrap().unwrap_err();
    assert_eq!(slow, fast);

    assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        navigator.history(),
        vec![Navigation::Login {
            reason: RedirectReason::SessionExpired
        }]
    );
}
