//! Persistent storage for the last known session.
//!
//! The stored token and user survive process restarts so the CLI can
//! re-validate a previous login without asking for credentials.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;

/// File name under the `patient-portal` configuration directory.
pub const SESSION_FILE_NAME: &str = "session.json";

/// A cached login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
    pub user: Value,
}

/// Where a [`StoredSession`] is kept between runs.
pub trait SessionStore: Send + Sync {
    /// The stored session, if any.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` when the backing storage cannot be read.
    fn load(&self) -> Result<Option<StoredSession>, StoreError>;

    /// Replace the stored session.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` when the backing storage cannot be written.
    fn save(&self, session: &StoredSession) -> Result<(), StoreError>;

    /// Forget the stored session. Clearing an empty store is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` when the backing storage cannot be modified.
    fn clear(&self) -> Result<(), StoreError>;
}

/// In-process store, mostly for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    session: Mutex<Option<StoredSession>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `session`.
    #[must_use]
    pub fn with_session(session: StoredSession) -> Self {
        Self {
            session: Mutex::new(Some(session)),
        }
    }
}

impl SessionStore for MemoryStore {
    fn load(&self) -> Result<Option<StoredSession>, StoreError> {
        Ok(self
            .session
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone())
    }

    fn save(&self, session: &StoredSession) -> Result<(), StoreError> {
        *self
            .session
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self
            .session
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
        Ok(())
    }
}

/// JSON file store.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Store at an explicit path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store under the user's configuration directory, e.g.
    /// `~/.config/patient-portal/session.json` on Linux.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NoConfigDir` when the platform has none.
    pub fn default_location() -> Result<Self, StoreError> {
        let dir = dirs::config_dir().ok_or(StoreError::NoConfigDir)?;
        Ok(Self::new(dir.join("patient-portal").join(SESSION_FILE_NAME)))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileStore {
    fn load(&self) -> Result<Option<StoredSession>, StoreError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, session: &StoredSession) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(session)?;
        std::fs::write(&self.path, json)?;
        restrict_permissions(&self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
