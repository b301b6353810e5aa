use tracing::{info, warn};

use crate::navigation::RedirectReason;

/// Security-relevant session events, emitted on the `audit` target.
#[derive(Debug, Clone, Default)]
pub struct AuditLogger;

impl AuditLogger {
    pub fn new() -> Self {
        Self
    }

    pub fn login_success(&self, role: Option<&str>) {
        info!(target: "audit", event = "login_success", role = role.unwrap_or(""));
    }

    pub fn login_failure(&self, status: u16) {
        warn!(target: "audit", event = "login_failure", status);
    }

    pub fn logout(&self) {
        info!(target: "audit", event = "logout");
    }

    pub fn refresh_started(&self) {
        info!(target: "audit", event = "refresh_started");
    }

    pub fn refresh_succeeded(&self) {
        info!(target: "audit", event = "refresh_succeeded");
    }

    pub fn refresh_failed(&self, reason: &str) {
        warn!(target: "audit", event = "refresh_failed", reason);
    }

    pub fn request_replayed(&self, request_id: &str, path: &str) {
        info!(target: "audit", event = "request_replayed", request_id, path);
    }

    pub fn admission_denied(&self, route: &str, reason: RedirectReason) {
        warn!(target: "audit", event = "admission_denied", route, reason = reason.query_marker());
    }

    pub fn role_unresolvable(&self, role: Option<&str>) {
        warn!(target: "audit", event = "role_unresolvable", role = role.unwrap_or(""));
    }
}
