use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::security::storage::{CredentialStorage, DisabledStorage};

/// The persisted session: three independently optional scalars.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl Credential {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.role.is_none()
    }
}

#[derive(Debug, Default)]
struct State {
    credential: Credential,
    /// Bumped by whole-session writes and clears; guards conditional refresh writes.
    epoch: u64,
    last_rotated: Option<DateTime<Utc>>,
}

struct Inner {
    state: Mutex<State>,
    storage: Box<dyn CredentialStorage>,
}

/// Process-wide credential store with write-through persistence.
///
/// Every operation runs in one short critical section, so readers never
/// observe a half-applied write. Storage failures are logged and swallowed.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("CredentialStore")
            .field("has_access_token", &state.credential.access_token.is_some())
            .field("has_refresh_token", &state.credential.refresh_token.is_some())
            .field("role", &state.credential.role)
            .field("epoch", &state.epoch)
            .finish()
    }
}

impl CredentialStore {
    /// Open the store, loading whatever the storage currently holds.
    pub fn open(storage: impl CredentialStorage + 'static) -> Self {
        let credential = match storage.load() {
            Ok(found) => found.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "stored credential unreadable, starting signed out");
                Credential::default()
            }
        };
        let last_rotated = credential.access_token.as_ref().map(|_| Utc::now());
        debug!(
            has_access_token = credential.access_token.is_some(),
            has_refresh_token = credential.refresh_token.is_some(),
            "credential store opened"
        );
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    credential,
                    epoch: 0,
                    last_rotated,
                }),
                storage: Box::new(storage),
            }),
        }
    }

    /// Store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::open(DisabledStorage)
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.state.lock().credential.access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner.state.lock().credential.refresh_token.clone()
    }

    pub fn role(&self) -> Option<String> {
        self.inner.state.lock().credential.role.clone()
    }

    pub fn snapshot(&self) -> Credential {
        self.inner.state.lock().credential.clone()
    }

    pub fn epoch(&self) -> u64 {
        self.inner.state.lock().epoch
    }

    pub fn set_access_token(&self, token: impl Into<String>) {
        let token = token.into();
        self.update(|state| {
            if state.credential.access_token.as_deref() != Some(token.as_str()) {
                state.credential.access_token = Some(token);
                state.last_rotated = Some(Utc::now());
            }
        });
    }

    pub fn set_refresh_token(&self, token: impl Into<String>) {
        let token = token.into();
        self.update(|state| state.credential.refresh_token = Some(token));
    }

    pub fn set_role(&self, role: impl Into<String>) {
        let role = role.into();
        self.update(|state| state.credential.role = Some(role));
    }

    /// Replace the whole credential at once (login). Invalidates any refresh in flight.
    pub fn set_session(&self, access_token: String, refresh_token: Option<String>, role: Option<String>) {
        self.update(|state| {
            state.credential = Credential {
                access_token: Some(access_token),
                refresh_token,
                role,
            };
            state.epoch += 1;
            state.last_rotated = Some(Utc::now());
        });
    }

    /// Remove all three fields. Idempotent.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        state.credential = Credential::default();
        state.epoch += 1;
        state.last_rotated = None;
        self.erase_locked();
    }

    /// Store a refreshed token pair unless the session changed since `epoch`.
    pub fn replace_tokens_if(&self, epoch: u64, access_token: &str, refresh_token: &str) -> bool {
        let mut state = self.inner.state.lock();
        if state.epoch != epoch {
            debug!(expected = epoch, actual = state.epoch, "session changed during refresh; discarding tokens");
            return false;
        }
        state.credential.access_token = Some(access_token.to_string());
        state.credential.refresh_token = Some(refresh_token.to_string());
        state.last_rotated = Some(Utc::now());
        self.persist_locked(&state.credential);
        true
    }

    /// Clear the store unless the session changed since `epoch`.
    pub fn clear_if(&self, epoch: u64) -> bool {
        let mut state = self.inner.state.lock();
        if state.epoch != epoch {
            return false;
        }
        state.credential = Credential::default();
        state.epoch += 1;
        state.last_rotated = None;
        self.erase_locked();
        true
    }

    /// When the access token last changed.
    pub fn last_rotated(&self) -> Option<DateTime<Utc>> {
        self.inner.state.lock().last_rotated
    }

    /// Seconds since the access token last changed, 0 when there is none.
    pub fn token_age_seconds(&self) -> u64 {
        match self.last_rotated() {
            Some(rotated) => (Utc::now() - rotated).num_seconds().max(0) as u64,
            None => 0,
        }
    }

    fn update(&self, apply: impl FnOnce(&mut State)) {
        let mut state = self.inner.state.lock();
        apply(&mut *state);
        if state.credential.is_empty() {
            self.erase_locked();
        } else {
            self.persist_locked(&state.credential);
        }
    }

    // Storage is written while the state lock is held so disk order matches memory order.
    fn persist_locked(&self, credential: &Credential) {
        if let Err(err) = self.inner.storage.save(credential) {
            warn!(error = %err, "failed to persist credential");
        }
    }

    fn erase_locked(&self) {
        if let Err(err) = self.inner.storage.erase() {
            warn!(error = %err, "failed to erase stored credential");
        }
    }
}
