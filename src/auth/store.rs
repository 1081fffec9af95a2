//! On-disk persistence of the GitHub bearer credential
//!
//! The credential lives in a small JSON document so the device flow only has
//! to run once per machine. On unix the file is created with mode `0600`.
//! Keys other than `github_token` belong to other tools sharing the file and
//! survive a save.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::{AuthError, BearerCredential};

#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    github_token: Option<String>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// JSON file holding the bearer credential
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored credential, if any.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn load(&self) -> Result<Option<BearerCredential>, AuthError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AuthError::Store(format!(
                    "Failed to read '{}': {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let stored: StoredCredentials = serde_json::from_str(&content).map_err(|e| {
            AuthError::Store(format!("Failed to parse '{}': {}", self.path.display(), e))
        })?;

        Ok(stored
            .github_token
            .filter(|t| !t.is_empty())
            .map(BearerCredential::new))
    }

    /// Persist `bearer`, replacing the previous credential and keeping any
    /// other keys already in the file.
    #[instrument(skip(self, bearer), fields(path = %self.path.display()))]
    pub fn save(&self, bearer: &BearerCredential) -> Result<(), AuthError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                AuthError::Store(format!("Failed to create '{}': {}", dir.display(), e))
            })?;
        }

        let mut stored = self.read_existing();
        stored.github_token = Some(bearer.expose().to_string());

        let content = serde_json::to_string_pretty(&stored)
            .map_err(|e| AuthError::Store(format!("Failed to serialize credentials: {}", e)))?;

        write_private(&self.path, content.as_bytes()).map_err(|e| {
            AuthError::Store(format!("Failed to write '{}': {}", self.path.display(), e))
        })?;

        debug!("Credential saved");
        Ok(())
    }

    fn read_existing(&self) -> StoredCredentials {
        let Ok(content) = std::fs::read_to_string(&self.path) else {
            return StoredCredentials::default();
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(error = %e, "Existing credential file is not valid JSON, overwriting");
            StoredCredentials::default()
        })
    }

    /// Remove the stored credential. Returns whether a file was removed.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn delete(&self) -> Result<bool, AuthError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AuthError::Store(format!(
                "Failed to remove '{}': {}",
                self.path.display(),
                e
            ))),
        }
    }
}

#[cfg(unix)]
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(FILE_MODE)
        .open(path)?;
    // An existing file keeps its old mode on open, so tighten it explicitly.
    file.set_permissions(std::fs::Permissions::from_mode(FILE_MODE))?;
    file.write_all(content)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, content)
}
