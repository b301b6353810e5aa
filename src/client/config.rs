use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::transport::interceptor::DEFAULT_EXCLUDED_PATHS;

const API_URL_ENV: &str = "TASKBOARD_API_URL";
const CREDENTIALS_PATH_ENV: &str = "TASKBOARD_CREDENTIALS_PATH";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the REST backend, e.g. `http://localhost:3000/api`.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Credential file; defaults to the platform config dir.
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
    /// Keep the session across restarts. When false nothing touches disk.
    #[serde(default = "default_true")]
    pub persist_credentials: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_refresh_timeout")]
    pub refresh_timeout_secs: u64,
    #[serde(default = "default_validate_timeout")]
    pub validate_timeout_secs: u64,
    /// Paths sent without a token and never refreshed on 401.
    #[serde(default = "default_excluded_paths")]
    pub excluded_paths: Vec<String>,
}

fn default_api_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_true() -> bool {
    true
}
fn default_request_timeout() -> u64 {
    30
}
fn default_refresh_timeout() -> u64 {
    10
}
fn default_validate_timeout() -> u64 {
    10
}
fn default_excluded_paths() -> Vec<String> {
    DEFAULT_EXCLUDED_PATHS.iter().map(|p| p.to_string()).collect()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            credentials_path: None,
            persist_credentials: true,
            request_timeout_secs: default_request_timeout(),
            refresh_timeout_secs: default_refresh_timeout(),
            validate_timeout_secs: default_validate_timeout(),
            excluded_paths: default_excluded_paths(),
        }
    }
}

impl ClientConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let raw = fs::read_to_string(path).context("reading config file")?;
        let cfg: ClientConfig = serde_json::from_str(&raw).context("parsing config JSON")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Config file if it exists, defaults otherwise; env overrides applied last.
    pub fn load(path: &str) -> Result<Self> {
        let mut cfg = if fs::metadata(path).is_ok() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api_url = url;
            }
        }
        if let Ok(path) = std::env::var(CREDENTIALS_PATH_ENV) {
            if !path.trim().is_empty() {
                self.credentials_path = Some(PathBuf::from(path));
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            anyhow::bail!("api_url must be an http(s) URL, got {:?}", self.api_url);
        }
        if self.request_timeout_secs == 0 || self.refresh_timeout_secs == 0 || self.validate_timeout_secs == 0 {
            anyhow::bail!("request, refresh and validate timeouts must be non-zero");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }

    pub fn validate_timeout(&self) -> Duration {
        Duration::from_secs(self.validate_timeout_secs)
    }
}
