pub mod client;
pub mod error;
pub mod navigation;
pub mod security;
pub mod transport;
pub mod utils;

pub use client::config::ClientConfig;
pub use client::SessionClient;
pub use error::SessionError;
pub use navigation::{Navigation, Navigator, RecordingNavigator, RedirectReason};
pub use security::credential_store::{Credential, CredentialStore};
pub use security::roles::{route_for_role, Destination, Role};
pub use security::token_refresh::{RefreshCoordinator, RefreshFailure, RefreshOutcome};
pub use security::validator::{SessionValidator, Validity};

// Crate version exposed for runtime queries
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
