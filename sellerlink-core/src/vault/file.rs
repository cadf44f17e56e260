//! JSON-file vault backend.
//!
//! Persists sealed credential records to a single JSON file. Only ciphertext
//! ever reaches disk; without the vault key the file contents are useless.
//!
//! # Storage Location
//!
//! The default path is `credentials.json` inside the platform data directory,
//! `~/.local/share/sellerlink/` on Linux.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use crate::model::AccountId;

use super::{CredentialRecord, VaultBackend, VaultError};

/// Internal storage format for the vault file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileVaultData {
    /// Version of the store format (for future migrations).
    version: u32,

    /// Sealed records keyed by account.
    records: HashMap<AccountId, CredentialRecord>,
}

impl Default for FileVaultData {
    fn default() -> Self {
        Self {
            version: 1,
            records: HashMap::new(),
        }
    }
}

/// Disk-backed vault storing sealed credential records as JSON.
///
/// # Thread Safety
///
/// This implementation uses interior mutability via `RwLock` and is safe to
/// share across threads via `Arc`.
pub struct FileVault {
    /// Path to the credentials JSON file.
    path: PathBuf,

    /// In-memory cache of the file contents.
    data: RwLock<FileVaultData>,
}

impl FileVault {
    /// Get the default storage path for sealed credentials.
    pub fn default_path() -> Result<PathBuf, VaultError> {
        let dirs = directories::ProjectDirs::from("io", "sellerlink", "sellerlink").ok_or(
            VaultError::Backend {
                message: "data directory not available".to_string(),
            },
        )?;

        Ok(dirs.data_dir().join("credentials.json"))
    }

    /// Load the vault file from the default location.
    ///
    /// Creates the file and parent directories if they don't exist.
    pub fn load() -> Result<Self, VaultError> {
        Self::load_from_path(Self::default_path()?)
    }

    /// Load the vault file from a specific path.
    ///
    /// Creates the file and parent directories if they don't exist.
    pub fn load_from_path(path: PathBuf) -> Result<Self, VaultError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            FileVaultData::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Save the current state to disk.
    fn save(&self) -> Result<(), VaultError> {
        let data = self.data.read().map_err(|e| VaultError::Backend {
            message: format!("read lock poisoned: {}", e),
        })?;

        let contents = serde_json::to_string_pretty(&*data)?;
        fs::write(&self.path, contents)?;

        Ok(())
    }

    /// Get the storage path for this vault file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl std::fmt::Debug for FileVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileVault").field("path", &self.path).finish()
    }
}

#[async_trait]
impl VaultBackend for FileVault {
    async fn get(&self, account: &AccountId) -> Result<Option<CredentialRecord>, VaultError> {
        let data = self.data.read().map_err(|e| VaultError::Backend {
            message: format!("read lock poisoned: {}", e),
        })?;
        Ok(data.records.get(account).cloned())
    }

    async fn put(&self, record: CredentialRecord) -> Result<(), VaultError> {
        {
            let mut data = self.data.write().map_err(|e| VaultError::Backend {
                message: format!("write lock poisoned: {}", e),
            })?;
            data.records.insert(record.account, record);
        }

        self.save()
    }

    async fn remove(&self, account: &AccountId) -> Result<(), VaultError> {
        {
            let mut data = self.data.write().map_err(|e| VaultError::Backend {
                message: format!("write lock poisoned: {}", e),
            })?;
            data.records.remove(account);
        }

        self.save()
    }
}
