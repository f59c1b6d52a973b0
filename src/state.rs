//! Persisted provider session
//!
//! The hosted identity SDK keeps the signed-in user across restarts.
//! `SessionStore` gives the in-process provider the same behaviour:
//! it saves on sign-in/sign-out and restores on construction.

use crate::error::{Result, SessionError};
use crate::types::User;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// On-disk shape of a persisted session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub user: Option<User>,

    /// Unix timestamp in milliseconds of the last save
    pub saved_at: i64,
}

/// Trait for persisting the provider's signed-in user
pub trait SessionStore: Send + Sync {
    /// Save the current user (`None` clears the session)
    fn save(&self, user: Option<&User>) -> Result<()>;

    /// Load the last saved user
    fn load(&self) -> Result<Option<User>>;
}

/// JSON file-based session store
///
/// Atomic writes via temp file + rename to prevent corruption.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn save(&self, user: Option<&User>) -> Result<()> {
        let persisted = PersistedSession {
            user: user.cloned(),
            saved_at: chrono::Utc::now().timestamp_millis(),
        };
        let json = serde_json::to_string_pretty(&persisted)?;

        let tmp_path = self.path.with_extension("tmp");

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SessionError::Store(format!(
                    "Failed to create session directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        std::fs::write(&tmp_path, json).map_err(|e| {
            SessionError::Store(format!(
                "Failed to write session file {}: {}",
                tmp_path.display(),
                e
            ))
        })?;

        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            SessionError::Store(format!(
                "Failed to rename session file {} → {}: {}",
                tmp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::debug!(
            path = %self.path.display(),
            signed_in = user.is_some(),
            "Session saved"
        );
        Ok(())
    }

    fn load(&self) -> Result<Option<User>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let json = std::fs::read_to_string(&self.path).map_err(|e| {
            SessionError::Store(format!(
                "Failed to read session file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let persisted: PersistedSession = serde_json::from_str(&json).map_err(|e| {
            SessionError::Store(format!(
                "Failed to parse session file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        tracing::debug!(
            path = %self.path.display(),
            signed_in = persisted.user.is_some(),
            "Session loaded"
        );
        Ok(persisted.user)
    }
}

/// In-memory session store for testing
#[derive(Default)]
pub struct MemorySessionStore {
    user: std::sync::RwLock<Option<User>>,
}

impl SessionStore for MemorySessionStore {
    fn save(&self, user: Option<&User>) -> Result<()> {
        let mut state = self.user.write().map_err(|e| {
            SessionError::Store(format!("Failed to acquire session lock: {}", e))
        })?;
        *state = user.cloned();
        Ok(())
    }

    fn load(&self) -> Result<Option<User>> {
        let state = self.user.read().map_err(|e| {
            SessionError::Store(format!("Failed to acquire session lock: {}", e))
        })?;
        Ok(state.clone())
    }
}
