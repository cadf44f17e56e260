//! In-memory vault backend.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::model::AccountId;

use super::{CredentialRecord, VaultBackend, VaultError};

/// In-memory vault backend for testing and development.
///
/// This backend is not persistent; records are lost when the process exits.
///
/// # Thread Safety
///
/// This implementation uses interior mutability via `RwLock` and is
/// safe to share across threads.
pub struct MemoryVault {
    records: RwLock<HashMap<AccountId, CredentialRecord>>,
}

impl MemoryVault {
    /// Create a new empty memory vault.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryVault {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.records.read().map(|r| r.len()).unwrap_or(0);
        f.debug_struct("MemoryVault")
            .field("record_count", &count)
            .finish()
    }
}

#[async_trait]
impl VaultBackend for MemoryVault {
    async fn get(&self, account: &AccountId) -> Result<Option<CredentialRecord>, VaultError> {
        let records = self.records.read().map_err(|e| VaultError::Backend {
            message: format!("lock poisoned: {}", e),
        })?;
        Ok(records.get(account).cloned())
    }

    async fn put(&self, record: CredentialRecord) -> Result<(), VaultError> {
        let mut records = self.records.write().map_err(|e| VaultError::Backend {
            message: format!("lock poisoned: {}", e),
        })?;
        records.insert(record.account, record);
        Ok(())
    }

    async fn remove(&self, account: &AccountId) -> Result<(), VaultError> {
        let mut records = self.records.write().map_err(|e| VaultError::Backend {
            message: format!("lock poisoned: {}", e),
        })?;
        records.remove(account);
        Ok(())
    }
}
