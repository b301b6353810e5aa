use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::security::credential_store::Credential;

/// Durable key/value home of the credential.
pub trait CredentialStorage: Send + Sync {
    fn load(&self) -> Result<Option<Credential>>;
    fn save(&self, credential: &Credential) -> Result<()>;
    fn erase(&self) -> Result<()>;
}

/// Storage for contexts without a durable store; every operation is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledStorage;

impl CredentialStorage for DisabledStorage {
    fn load(&self) -> Result<Option<Credential>> {
        Ok(None)
    }

    fn save(&self, _credential: &Credential) -> Result<()> {
        Ok(())
    }

    fn erase(&self) -> Result<()> {
        Ok(())
    }
}

/// JSON file holding `access_token`, `refresh_token` and `role`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/taskboard/credentials.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("taskboard").join("credentials.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStorage for FileStorage {
    fn load(&self) -> Result<Option<Credential>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context("reading credential file"),
        };
        let credential: Credential =
            serde_json::from_str(&raw).context("parsing credential file")?;
        Ok(Some(credential))
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("creating credential directory")?;
        }
        let body = serde_json::to_vec_pretty(credential).context("serializing credential")?;

        // write-then-rename so a crash never leaves a half-written file behind
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = open_private(&tmp).context("creating temp credential file")?;
            file.write_all(&body).context("writing temp credential file")?;
            file.sync_all().context("syncing temp credential file")?;
        }
        fs::rename(&tmp, &self.path).context("replacing credential file")?;
        debug!(path = %self.path.display(), "credential persisted");
        Ok(())
    }

    fn erase(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("removing credential file"),
        }
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::File::create(path)
}
