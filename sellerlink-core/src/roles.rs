//! Role binding persistence and escalation checks.
//!
//! This module provides disk-backed storage for the (user, account, role)
//! authorization edges, in the same JSON-file shape as the account registry.
//! At most one binding exists per (user, account) pair.
//!
//! Every mutation takes an [`Actor`]. Escalation checks run inside the write
//! guard, against the actor's own binding in the same store, so a privilege
//! check and the mutation it protects cannot interleave with another writer.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use thiserror::Error;

use crate::model::{AccountId, Role, RoleBinding, UserId};

/// Error type for role binding operations.
#[derive(Debug, Error)]
pub enum RoleError {
    /// The (user, account) pair already has a binding.
    #[error("user {user} already holds a role on account {account}")]
    DuplicateBinding { user: UserId, account: AccountId },

    /// No binding exists for the (user, account) pair.
    #[error("user {user} holds no role on account {account}")]
    BindingNotFound { user: UserId, account: AccountId },

    /// The acting user may not perform this role mutation.
    #[error("user {user} lacks privilege to manage role {role} on account {account}")]
    InsufficientPrivilege {
        user: UserId,
        account: AccountId,
        role: Role,
    },

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

/// The identity performing a role mutation.
///
/// `System` is for trusted internal flows, notably granting the first role
/// on a freshly linked account, where no administrator exists yet. Request
/// paths always use `User`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// Trusted internal caller; escalation checks are skipped.
    System,

    /// An ordinary user; escalation checks apply.
    User(UserId),
}

/// Internal storage format for role bindings.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RoleStoreData {
    /// Version of the store format (for future migrations).
    version: u32,

    /// All bindings.
    bindings: Vec<RoleBinding>,
}

impl Default for RoleStoreData {
    fn default() -> Self {
        Self {
            version: 1,
            bindings: Vec::new(),
        }
    }
}

/// Disk-backed store of role bindings.
///
/// # Thread Safety
///
/// This implementation uses interior mutability via `RwLock` and is safe to
/// share across threads via `Arc`.
pub struct RoleBindingStore {
    /// Path to the bindings JSON file.
    path: PathBuf,

    /// In-memory cache of binding data.
    data: Arc<RwLock<RoleStoreData>>,
}

impl RoleBindingStore {
    /// Get the default storage path for role bindings.
    pub fn default_path() -> Result<PathBuf, RoleError> {
        let dirs = directories::ProjectDirs::from("io", "sellerlink", "sellerlink")
            .ok_or(RoleError::DataDirUnavailable)?;

        Ok(dirs.data_dir().join("role_bindings.json"))
    }

    /// Load the store from the default location.
    ///
    /// Creates the file and parent directories if they don't exist.
    pub fn load() -> Result<Self, RoleError> {
        Self::load_from_path(Self::default_path()?)
    }

    /// Load the store from a specific path.
    ///
    /// Creates the file and parent directories if they don't exist.
    pub fn load_from_path(path: PathBuf) -> Result<Self, RoleError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            RoleStoreData::default()
        };

        Ok(Self {
            path,
            data: Arc::new(RwLock::new(data)),
        })
    }

    /// Save the current state to disk.
    fn save(&self) -> Result<(), RoleError> {
        let data = self.data.read().map_err(|e| RoleError::LockError {
            message: format!("read lock poisoned: {}", e),
        })?;

        let contents = serde_json::to_string_pretty(&*data)?;
        fs::write(&self.path, contents)?;

        Ok(())
    }

    /// Grant a role to a user on an account.
    ///
    /// Fails if the pair already has a binding, or if the actor may not
    /// grant a role of this rank on this account.
    pub fn grant(
        &self,
        actor: Actor,
        user: UserId,
        account: AccountId,
        role: Role,
    ) -> Result<RoleBinding, RoleError> {
        let mut data = self.data.write().map_err(|e| RoleError::LockError {
            message: format!("write lock poisoned: {}", e),
        })?;

        check_privilege(&data.bindings, actor, &account, role)?;

        if data
            .bindings
            .iter()
            .any(|b| b.user == user && b.account == account)
        {
            return Err(RoleError::DuplicateBinding { user, account });
        }

        let binding = RoleBinding::new(user, account, role);
        tracing::info!(%user, %account, %role, "granted role");
        data.bindings.push(binding.clone());
        drop(data);

        self.save()?;
        Ok(binding)
    }

    /// Change the role an existing binding carries.
    ///
    /// The actor must outrank or match both the new role and the role being
    /// replaced; otherwise an Admin could silently demote a SuperAdmin.
    pub fn set_role(
        &self,
        actor: Actor,
        user: UserId,
        account: AccountId,
        role: Role,
    ) -> Result<RoleBinding, RoleError> {
        let mut data = self.data.write().map_err(|e| RoleError::LockError {
            message: format!("write lock poisoned: {}", e),
        })?;

        check_privilege(&data.bindings, actor, &account, role)?;

        let current = data
            .bindings
            .iter()
            .find(|b| b.user == user && b.account == account)
            .ok_or(RoleError::BindingNotFound { user, account })?
            .role;
        check_privilege(&data.bindings, actor, &account, current)?;

        let binding = data
            .bindings
            .iter_mut()
            .find(|b| b.user == user && b.account == account)
            .ok_or(RoleError::BindingNotFound { user, account })?;

        binding.set_role(role);
        let updated = binding.clone();
        tracing::info!(%user, %account, %role, "changed role");
        drop(data);

        self.save()?;
        Ok(updated)
    }

    /// Revoke a user's role on an account.
    ///
    /// The actor must outrank or match the role being revoked.
    pub fn revoke(&self, actor: Actor, user: UserId, account: AccountId) -> Result<(), RoleError> {
        let mut data = self.data.write().map_err(|e| RoleError::LockError {
            message: format!("write lock poisoned: {}", e),
        })?;

        let current = data
            .bindings
            .iter()
            .find(|b| b.user == user && b.account == account)
            .ok_or(RoleError::BindingNotFound { user, account })?
            .role;
        check_privilege(&data.bindings, actor, &account, current)?;

        data.bindings
            .retain(|b| !(b.user == user && b.account == account));
        tracing::info!(%user, %account, "revoked role");
        drop(data);

        self.save()
    }

    /// Get the binding for a (user, account) pair.
    ///
    /// Returns `Ok(None)` if the user holds no role on the account.
    pub fn get(&self, user: &UserId, account: &AccountId) -> Result<Option<RoleBinding>, RoleError> {
        let data = self.data.read().map_err(|e| RoleError::LockError {
            message: format!("read lock poisoned: {}", e),
        })?;

        Ok(data
            .bindings
            .iter()
            .find(|b| &b.user == user && &b.account == account)
            .cloned())
    }

    /// List all bindings on an account.
    pub fn list_for_account(&self, account: &AccountId) -> Result<Vec<RoleBinding>, RoleError> {
        let data = self.data.read().map_err(|e| RoleError::LockError {
            message: format!("read lock poisoned: {}", e),
        })?;

        Ok(data
            .bindings
            .iter()
            .filter(|b| &b.account == account)
            .cloned()
            .collect())
    }

    /// List all bindings held by a user.
    pub fn list_for_user(&self, user: &UserId) -> Result<Vec<RoleBinding>, RoleError> {
        let data = self.data.read().map_err(|e| RoleError::LockError {
            message: format!("read lock poisoned: {}", e),
        })?;

        Ok(data
            .bindings
            .iter()
            .filter(|b| &b.user == user)
            .cloned()
            .collect())
    }

    /// Remove every binding on an account.
    ///
    /// Cascade path for account unlinking; returns how many bindings went.
    pub fn remove_all_for_account(&self, account: &AccountId) -> Result<usize, RoleError> {
        let mut data = self.data.write().map_err(|e| RoleError::LockError {
            message: format!("write lock poisoned: {}", e),
        })?;

        let before = data.bindings.len();
        data.bindings.retain(|b| &b.account != account);
        let removed = before - data.bindings.len();
        drop(data);

        if removed > 0 {
            tracing::info!(%account, removed, "removed bindings for unlinked account");
            self.save()?;
        }
        Ok(removed)
    }

    /// Remove every binding held by a user.
    ///
    /// Cascade path for user deletion; returns how many bindings went.
    pub fn remove_all_for_user(&self, user: &UserId) -> Result<usize, RoleError> {
        let mut data = self.data.write().map_err(|e| RoleError::LockError {
            message: format!("write lock poisoned: {}", e),
        })?;

        let before = data.bindings.len();
        data.bindings.retain(|b| &b.user != user);
        let removed = before - data.bindings.len();
        drop(data);

        if removed > 0 {
            tracing::info!(%user, removed, "removed bindings for deleted user");
            self.save()?;
        }
        Ok(removed)
    }

    /// Get the storage path for this store.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl std::fmt::Debug for RoleBindingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleBindingStore")
            .field("path", &self.path)
            .finish()
    }
}

/// Check that the actor may manage a role of this rank on this account.
///
/// The actor must hold an administrative role on the same account, and must
/// not touch a role that outranks their own.
fn check_privilege(
    bindings: &[RoleBinding],
    actor: Actor,
    account: &AccountId,
    role: Role,
) -> Result<(), RoleError> {
    let user = match actor {
        Actor::System => return Ok(()),
        Actor::User(user) => user,
    };

    let own_role = bindings
        .iter()
        .find(|b| b.user == user && &b.account == account)
        .map(|b| b.role);

    match own_role {
        Some(own) if own.is_administrative() && own.escalation_rank() >= role.escalation_rank() => {
            Ok(())
        }
        _ => Err(RoleError::InsufficientPrivilege {
            user,
            account: *account,
            role,
        }),
    }
}
