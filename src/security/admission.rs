use std::sync::Arc;
use tracing::debug;

use crate::error::SessionError;
use crate::navigation::{Navigation, Navigator, RedirectReason};
use crate::security::audit_log::AuditLogger;
use crate::security::credential_store::CredentialStore;
use crate::security::roles::{role_admits, route_access, Role, RouteAccess};
use crate::security::token_refresh::{RefreshCoordinator, RefreshOutcome};
use crate::security::validator::{InvalidReason, SessionValidator, Validity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied(RedirectReason),
}

/// Decides whether a navigation into a protected area may commit.
///
/// A 401 from validation gets one shot at the refresh coordinator before the
/// navigation is denied.
#[derive(Clone)]
pub struct AdmissionGuard {
    store: CredentialStore,
    validator: SessionValidator,
    coordinator: RefreshCoordinator,
    navigator: Arc<dyn Navigator>,
    audit: AuditLogger,
}

impl AdmissionGuard {
    pub fn new(
        store: CredentialStore,
        validator: SessionValidator,
        coordinator: RefreshCoordinator,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            store,
            validator,
            coordinator,
            navigator,
            audit: AuditLogger::new(),
        }
    }

    /// Re-validates on every call; denial redirects to login.
    pub async fn can_enter(&self, target: &str) -> bool {
        self.admit(target, None).await.0 == Admission::Allowed
    }

    /// Same decision as `can_enter`, reported as the error behind a denial.
    /// Does not redirect.
    pub async fn check(&self, target: &str) -> Result<(), SessionError> {
        self.evaluate(target, None).await.map(|_| ())
    }

    /// Start a navigation burst that may reuse one `Valid` result.
    pub fn burst(&self) -> NavigationBurst<'_> {
        NavigationBurst {
            guard: self,
            validated_token: None,
        }
    }

    /// Returns the decision and, when the session was validated, the token
    /// that passed.
    async fn admit(&self, target: &str, validated_token: Option<&str>) -> (Admission, Option<String>) {
        match self.evaluate(target, validated_token).await {
            Ok(validated) => (Admission::Allowed, validated),
            Err(err) => (self.deny(target, &err), None),
        }
    }

    async fn evaluate(&self, target: &str, validated_token: Option<&str>) -> Result<Option<String>, SessionError> {
        let access = route_access(target);
        if access == RouteAccess::Public {
            return Ok(None);
        }

        let mut token = self.store.access_token().ok_or(SessionError::Unauthenticated)?;

        if validated_token == Some(token.as_str()) {
            debug!(route = %target, "reusing validation from this navigation burst");
        } else {
            match self.validator.validate().await {
                Validity::Valid => {}
                Validity::Invalid(InvalidReason::Rejected(401)) => {
                    token = self.refresh_and_revalidate().await?;
                }
                Validity::Invalid(reason) => return Err(denial_for(reason)),
            }
        }

        self.check_role(access)?;
        Ok(Some(token))
    }

    async fn refresh_and_revalidate(&self) -> Result<String, SessionError> {
        debug!("access token rejected during admission; refreshing once");
        let token = match self.coordinator.refresh().await {
            RefreshOutcome::Succeeded(token) => token,
            RefreshOutcome::Failed(failure) => return Err(SessionError::RefreshExhausted(failure)),
        };
        match self.validator.validate().await {
            Validity::Valid => Ok(token),
            Validity::Invalid(reason) => Err(denial_for(reason)),
        }
    }

    fn check_role(&self, access: RouteAccess) -> Result<(), SessionError> {
        let stored = self.store.role();
        let role = match stored.as_deref().map(str::parse::<Role>) {
            Some(Ok(role)) => role,
            _ => {
                self.audit.role_unresolvable(stored.as_deref());
                self.store.clear();
                return Err(SessionError::RoleUnresolvable(stored));
            }
        };

        if role_admits(access, role) {
            Ok(())
        } else {
            Err(SessionError::Unauthenticated)
        }
    }

    fn deny(&self, target: &str, err: &SessionError) -> Admission {
        let reason = err.redirect_reason().unwrap_or(RedirectReason::NotAuthenticated);
        self.audit.admission_denied(target, reason);
        // a failed refresh cycle has already sent the user to login
        if !matches!(err, SessionError::RefreshExhausted(_)) {
            self.navigator.navigate(Navigation::Login { reason });
        }
        Admission::Denied(reason)
    }
}

fn denial_for(reason: InvalidReason) -> SessionError {
    match reason {
        InvalidReason::NoToken => SessionError::Unauthenticated,
        InvalidReason::Unreachable => SessionError::ValidationUnreachable,
        InvalidReason::Rejected(_) | InvalidReason::Malformed => SessionError::Unauthorized,
    }
}

/// Guarded navigations triggered by one user action.
///
/// A `Valid` result is reused only for the lifetime of the burst and only while
/// the access token is the one that was validated.
pub struct NavigationBurst<'a> {
    guard: &'a AdmissionGuard,
    validated_token: Option<String>,
}

impl NavigationBurst<'_> {
    pub async fn can_enter(&mut self, target: &str) -> bool {
        let (admission, validated) = self
            .guard
            .admit(target, self.validated_token.as_deref())
            .await;
        if validated.is_some() {
            self.validated_token = validated;
        }
        admission == Admission::Allowed
    }
}
