//! Linked account metadata persistence.
//!
//! This module provides disk-backed storage for linked account metadata using
//! JSON serialization and platform-specific data directories. Token material
//! never passes through here; the registry holds metadata only.
//!
//! # Storage Location
//!
//! Accounts are stored at `~/.local/share/sellerlink/accounts.json` on Linux.
//!
//! # Example
//!
//! ```rust,ignore
//! use sellerlink_core::registry::AccountRegistry;
//! use sellerlink_core::{Account, EbayUserId};
//!
//! let registry = AccountRegistry::load()?;
//! let account = Account::new(EbayUserId::new("seller-8842"), None);
//! registry.add(account)?;
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use thiserror::Error;

use crate::model::{Account, AccountId, EbayUserId};

/// Error type for account registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// An account with this eBay user ID is already linked.
    #[error("account with eBay user id {ebay_user_id} is already linked")]
    DuplicateAccount { ebay_user_id: EbayUserId },

    /// No account with this ID exists.
    #[error("account {account} not found")]
    NotFound { account: AccountId },

    /// I/O error reading or writing the store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Data directory not available.
    #[error("data directory not available")]
    DataDirUnavailable,

    /// Internal lock poisoning error.
    #[error("internal lock error: {message}")]
    LockError { message: String },
}

/// Internal storage format for accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryData {
    /// Version of the store format (for future migrations).
    version: u32,

    /// All linked accounts.
    accounts: Vec<Account>,
}

impl Default for RegistryData {
    fn default() -> Self {
        Self {
            version: 1,
            accounts: Vec::new(),
        }
    }
}

/// Disk-backed registry of linked seller accounts.
///
/// Enforces eBay user ID uniqueness: one seller account links at most once.
/// The duplicate check and the insert happen under a single write guard, so
/// two concurrent links of the same seller cannot both succeed.
///
/// # Thread Safety
///
/// This implementation uses interior mutability via `RwLock` and is safe to
/// share across threads via `Arc`.
pub struct AccountRegistry {
    /// Path to the accounts JSON file.
    path: PathBuf,

    /// In-memory cache of account data.
    data: Arc<RwLock<RegistryData>>,
}

impl AccountRegistry {
    /// Get the default storage path for accounts.
    pub fn default_path() -> Result<PathBuf, RegistryError> {
        let dirs = directories::ProjectDirs::from("io", "sellerlink", "sellerlink")
            .ok_or(RegistryError::DataDirUnavailable)?;

        Ok(dirs.data_dir().join("accounts.json"))
    }

    /// Load the registry from the default location.
    ///
    /// Creates the file and parent directories if they don't exist.
    pub fn load() -> Result<Self, RegistryError> {
        let path = Self::default_path()?;
        Self::load_from_path(path)
    }

    /// Load the registry from a specific path.
    ///
    /// Creates the file and parent directories if they don't exist.
    pub fn load_from_path(path: PathBuf) -> Result<Self, RegistryError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            RegistryData::default()
        };

        Ok(Self {
            path,
            data: Arc::new(RwLock::new(data)),
        })
    }

    /// Save the current state to disk.
    fn save(&self) -> Result<(), RegistryError> {
        let data = self.data.read().map_err(|e| RegistryError::LockError {
            message: format!("read lock poisoned: {}", e),
        })?;

        let contents = serde_json::to_string_pretty(&*data)?;
        fs::write(&self.path, contents)?;

        Ok(())
    }

    /// Register a newly linked account.
    ///
    /// Returns an error if an account with the same eBay user ID is already
    /// linked.
    pub fn add(&self, account: Account) -> Result<(), RegistryError> {
        let mut data = self.data.write().map_err(|e| RegistryError::LockError {
            message: format!("write lock poisoned: {}", e),
        })?;

        if data
            .accounts
            .iter()
            .any(|a| a.ebay_user_id == account.ebay_user_id)
        {
            return Err(RegistryError::DuplicateAccount {
                ebay_user_id: account.ebay_user_id,
            });
        }

        tracing::info!(account = %account.id, ebay_user_id = %account.ebay_user_id, "linked account");
        data.accounts.push(account);
        drop(data);

        self.save()
    }

    /// Get an account by its internal ID.
    ///
    /// Returns `Ok(None)` if the account doesn't exist.
    pub fn get(&self, account: &AccountId) -> Result<Option<Account>, RegistryError> {
        let data = self.data.read().map_err(|e| RegistryError::LockError {
            message: format!("read lock poisoned: {}", e),
        })?;

        Ok(data.accounts.iter().find(|a| &a.id == account).cloned())
    }

    /// Look up an account by its eBay user ID.
    ///
    /// Returns `Ok(None)` if no such account is linked.
    pub fn find_by_ebay_user_id(
        &self,
        ebay_user_id: &EbayUserId,
    ) -> Result<Option<Account>, RegistryError> {
        let data = self.data.read().map_err(|e| RegistryError::LockError {
            message: format!("read lock poisoned: {}", e),
        })?;

        Ok(data
            .accounts
            .iter()
            .find(|a| &a.ebay_user_id == ebay_user_id)
            .cloned())
    }

    /// List all linked accounts.
    pub fn list(&self) -> Result<Vec<Account>, RegistryError> {
        let data = self.data.read().map_err(|e| RegistryError::LockError {
            message: format!("read lock poisoned: {}", e),
        })?;

        Ok(data.accounts.clone())
    }

    /// Change an account's display name.
    ///
    /// The eBay user ID is immutable after linking; the display name is the
    /// only mutable piece of metadata.
    pub fn rename(
        &self,
        account: &AccountId,
        display_name: Option<String>,
    ) -> Result<(), RegistryError> {
        let mut data = self.data.write().map_err(|e| RegistryError::LockError {
            message: format!("write lock poisoned: {}", e),
        })?;

        let entry = data
            .accounts
            .iter_mut()
            .find(|a| &a.id == account)
            .ok_or(RegistryError::NotFound { account: *account })?;

        entry.display_name = display_name;
        entry.touch();
        drop(data);

        self.save()
    }

    /// Remove an account from the registry.
    ///
    /// Returns an error if the account doesn't exist. Callers are expected
    /// to cascade credential and role-binding removal; see the service layer.
    pub fn remove(&self, account: &AccountId) -> Result<(), RegistryError> {
        let mut data = self.data.write().map_err(|e| RegistryError::LockError {
            message: format!("write lock poisoned: {}", e),
        })?;

        let initial_len = data.accounts.len();
        data.accounts.retain(|a| &a.id != account);

        if data.accounts.len() == initial_len {
            return Err(RegistryError::NotFound { account: *account });
        }

        tracing::info!(%account, "unlinked account");
        drop(data);

        self.save()
    }

    /// Get the storage path for this registry.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl std::fmt::Debug for AccountRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountRegistry")
            .field("path", &self.path)
            .finish()
    }
}
