//! Session storage with pluggable backends
//!
//! Values are opaque strings keyed by short identifiers. The session layer
//! and the OAuth2 provider's account cache both persist through this trait.

use async_trait::async_trait;
use etcetera::{choose_base_strategy, BaseStrategy};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Storage trait for different session backends
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Get a value, `None` when the key was never written or was deleted
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete a value; deleting a missing key succeeds
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Keyring error: {0}")]
    Keyring(String),
}

/// Default per-user data directory for session files
pub fn get_sdk_data_dir() -> Result<PathBuf, StoreError> {
    let strategy = choose_base_strategy()
        .map_err(|e| StoreError::Storage(format!("Failed to determine base directories: {}", e)))?;

    Ok(strategy.data_dir().join("signet"))
}

/// In-memory session storage, lost when the process exits
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    data: Arc<RwLock<HashMap<String, String>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.data
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.data.write().await.remove(key);
        Ok(())
    }
}

/// File-based session storage, one file per key
pub struct FileSessionStore {
    base_dir: PathBuf,
}

impl FileSessionStore {
    /// Create a store rooted at `base_dir`, creating the directory if needed
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;

        Ok(Self { base_dir })
    }

    /// Store under the default per-user data directory
    pub fn default_location() -> Result<Self, StoreError> {
        Self::new(get_sdk_data_dir()?)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn key_to_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.base_dir.join(format!("{}.session", key)))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.key_to_path(key)?;

        match tokio::fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.key_to_path(key)?;

        // Write to a sibling temp file first so readers never see a torn value
        let tmp = path.with_extension("session.tmp");
        tokio::fs::write(&tmp, value).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }

        tokio::fs::rename(&tmp, &path).await?;
        debug!("Stored session key {} at {}", key, path.display());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.key_to_path(key)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// OS keyring-backed session storage
///
/// Each key becomes one keyring entry under the configured service name.
pub struct KeyringSessionStore {
    service: String,
}

impl KeyringSessionStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry, StoreError> {
        validate_key(key)?;
        keyring::Entry::new(&self.service, key).map_err(|e| StoreError::Keyring(e.to_string()))
    }
}

#[async_trait]
impl SessionStore for KeyringSessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entry = self.entry(key)?;
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StoreError::Keyring(e.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| StoreError::Keyring(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StoreError::Keyring(e.to_string())),
        }
    }
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    // Keys become file names, so block traversal
    if key.is_empty() || key.contains("..") || key.contains('/') || key.contains('\\') {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}
