pub mod config;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::config::ClientConfig;
use crate::error::SessionError;
use crate::navigation::{Navigation, Navigator, RedirectReason};
use crate::security::admission::AdmissionGuard;
use crate::security::audit_log::AuditLogger;
use crate::security::credential_store::CredentialStore;
use crate::security::roles::{route_for_role, Destination};
use crate::security::storage::{DisabledStorage, FileStorage};
use crate::security::token_refresh::RefreshCoordinator;
use crate::security::validator::{SessionValidator, User};
use crate::transport::http::HttpTransport;
use crate::transport::interceptor::RequestAuthorizer;
use crate::transport::{ApiRequest, ApiResponse, Transport};

pub const LOGIN_PATH: &str = "/auth/login";
pub const SIGNUP_PATH: &str = "/auth/signup";
pub const FORGOT_PASSWORD_PATH: &str = "/auth/forgot-password";
pub const RESET_PASSWORD_PATH: &str = "/auth/reset-password";

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default, alias = "accessToken")]
    access_token: Option<String>,
    #[serde(default, alias = "refreshToken")]
    refresh_token: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

/// The session core, wired together over one transport and one store.
#[derive(Clone)]
pub struct SessionClient {
    store: CredentialStore,
    validator: SessionValidator,
    coordinator: RefreshCoordinator,
    authorizer: RequestAuthorizer,
    guard: AdmissionGuard,
    navigator: Arc<dyn Navigator>,
    audit: AuditLogger,
}

impl SessionClient {
    /// Build the client against the configured backend and credential file.
    pub fn from_config(config: &ClientConfig, navigator: Arc<dyn Navigator>) -> Result<Self> {
        let transport = HttpTransport::new(&config.api_url, config.request_timeout())?;
        let store = match (config.persist_credentials, config.credentials_path.clone()) {
            (false, _) => CredentialStore::in_memory(),
            (true, Some(path)) => CredentialStore::open(FileStorage::new(path)),
            (true, None) => match FileStorage::default_path() {
                Some(path) => CredentialStore::open(FileStorage::new(path)),
                None => {
                    warn!("no config directory available; session will not persist");
                    CredentialStore::open(DisabledStorage)
                }
            },
        };
        Ok(Self::new(Arc::new(transport), store, navigator, config))
    }

    pub fn new(
        transport: Arc<dyn Transport>,
        store: CredentialStore,
        navigator: Arc<dyn Navigator>,
        config: &ClientConfig,
    ) -> Self {
        let validator = SessionValidator::new(transport.clone(), store.clone(), config.validate_timeout());
        let coordinator = RefreshCoordinator::new(
            transport.clone(),
            store.clone(),
            navigator.clone(),
            config.refresh_timeout(),
        );
        let authorizer = RequestAuthorizer::new(
            transport,
            store.clone(),
            coordinator.clone(),
            config.excluded_paths.clone(),
        );
        let guard = AdmissionGuard::new(
            store.clone(),
            validator.clone(),
            coordinator.clone(),
            navigator.clone(),
        );
        Self {
            store,
            validator,
            coordinator,
            authorizer,
            guard,
            navigator,
            audit: AuditLogger::new(),
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn validator(&self) -> &SessionValidator {
        &self.validator
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn authorizer(&self) -> &RequestAuthorizer {
        &self.authorizer
    }

    pub fn guard(&self) -> &AdmissionGuard {
        &self.guard
    }

    /// Log in, store the session and navigate to the role's dashboard.
    pub async fn login(&self, email: &str, password: &str) -> Result<Destination, SessionError> {
        let resp = self
            .authorizer
            .post(LOGIN_PATH, json!({ "email": email, "password": password }))
            .await?;
        if !resp.is_success() {
            self.audit.login_failure(resp.status.as_u16());
            return Err(SessionError::LoginRejected {
                status: resp.status.as_u16(),
                message: resp.message().unwrap_or_else(|| "Login failed".to_string()),
            });
        }

        let body: LoginResponse = resp
            .json()
            .map_err(|e| SessionError::InvalidResponse(format!("parsing login response: {e}")))?;
        let access_token = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SessionError::InvalidResponse("missing access token".into()))?;

        self.store.set_session(access_token, body.refresh_token, body.role);
        self.audit.login_success(self.store.role().as_deref());
        self.enter_dashboard().await
    }

    /// Resume a stored session: route by the stored role, fetching it first if missing.
    pub async fn restore(&self) -> Result<Destination, SessionError> {
        if self.store.access_token().is_none() {
            return Err(SessionError::Unauthenticated);
        }
        self.enter_dashboard().await
    }

    async fn enter_dashboard(&self) -> Result<Destination, SessionError> {
        if self.store.role().is_none() {
            debug!("role missing from session, asking /auth/self");
            match self.validator.current_user().await {
                Ok(User { role: Some(role), .. }) => self.store.set_role(role),
                Ok(_) => {}
                Err(SessionError::Unauthorized) => {
                    self.store.clear();
                    self.navigator.navigate(Navigation::Login {
                        reason: RedirectReason::SessionExpired,
                    });
                    return Err(SessionError::Unauthorized);
                }
                Err(err) => return Err(err),
            }
        }

        match route_for_role(self.store.role().as_deref()) {
            Ok(destination) => {
                info!(destination = destination.path(), "session established");
                self.navigator.navigate(Navigation::Dashboard { destination });
                Ok(destination)
            }
            Err(err) => {
                self.audit.role_unresolvable(self.store.role().as_deref());
                self.store.clear();
                self.navigator.navigate(Navigation::Login {
                    reason: RedirectReason::RoleUnresolvable,
                });
                Err(err)
            }
        }
    }

    /// Client-local logout. Takes effect over any refresh still in flight.
    pub fn logout(&self) {
        self.store.clear();
        self.audit.logout();
        self.navigator.navigate(Navigation::Login {
            reason: RedirectReason::LoggedOut,
        });
    }

    pub async fn signup(&self, request: &SignupRequest) -> Result<ApiResponse, SessionError> {
        let body = serde_json::to_value(request)
            .map_err(|e| SessionError::InvalidResponse(format!("serializing signup: {e}")))?;
        self.authorizer.post(SIGNUP_PATH, body).await
    }

    pub async fn forgot_password(&self, email: &str) -> Result<ApiResponse, SessionError> {
        self.authorizer
            .post(FORGOT_PASSWORD_PATH, json!({ "email": email }))
            .await
    }

    pub async fn reset_password(&self, token: &str, password: &str) -> Result<ApiResponse, SessionError> {
        self.authorizer
            .post(RESET_PASSWORD_PATH, json!({ "token": token, "password": password }))
            .await
    }

    pub async fn current_user(&self) -> Result<User, SessionError> {
        self.validator.current_user().await
    }

    pub async fn can_enter(&self, target: &str) -> bool {
        self.guard.can_enter(target).await
    }

    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, SessionError> {
        self.authorizer.execute(request).await
    }
}
