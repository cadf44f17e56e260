//! User directory abstraction.
//!
//! Users are owned by an external identity system; this crate only needs to
//! look them up when validating role grants. The directory is modeled as a
//! trait so deployments can plug in whatever backs their identity store.
//!
//! This module provides:
//! - [`User`] - Directory record with email as the unique identifier
//! - [`UserDirectory`] - Trait for directory backends
//! - [`MemoryUserDirectory`] - In-memory implementation for testing

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

use crate::model::UserId;
use crate::vault::Secret;

/// Error type for user directory operations.
#[derive(Debug, Error)]
pub enum UserError {
    /// An email address is required to create a user.
    #[error("email must not be empty")]
    EmptyEmail,

    /// A user with this email already exists.
    #[error("a user with email {email} already exists")]
    DuplicateEmail { email: String },

    /// No user with this ID exists.
    #[error("user {user} not found")]
    NotFound { user: UserId },

    /// The directory backend encountered an error.
    #[error("directory error: {message}")]
    Directory { message: String },
}

/// A user as known to the directory.
///
/// Email is the unique identifier. The staff and superuser flags describe
/// directory-level standing, not per-account roles; those live in the role
/// binding store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Internal handle for this user.
    pub id: UserId,

    /// Unique email address, domain part normalized to lowercase.
    pub email: String,

    /// The user's first name.
    pub first_name: String,

    /// The user's last name.
    pub last_name: String,

    /// Whether this user account is active. Inactive users keep their
    /// records but cannot receive new role grants.
    pub is_active: bool,

    /// Whether the user can access administrative tooling.
    pub is_staff: bool,

    /// Directory-level superuser flag.
    pub is_superuser: bool,

    /// When the user was created.
    pub created_at: DateTime<Utc>,

    /// When the user record was last modified.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// The user's full name.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// The user's short name (first name).
    pub fn short_name(&self) -> &str {
        &self.first_name
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.email)
    }
}

/// Normalize an email address by lowercasing its domain part.
///
/// The local part is left untouched; mail systems may treat it as
/// case-sensitive.
pub fn normalize_email(email: &str) -> String {
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.to_string(),
    }
}

/// Abstraction over user directory backends.
///
/// Implementations include:
/// - [`MemoryUserDirectory`] - In-memory directory for testing
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Create a regular user.
    ///
    /// The email is normalized and must be unique and non-empty. The password
    /// is handed to the backing authentication subsystem for hashing; it is
    /// never stored by this crate.
    async fn create_user(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
        password: &Secret,
    ) -> Result<User, UserError>;

    /// Create a superuser.
    ///
    /// Superusers are always staff and always carry the superuser flag.
    async fn create_superuser(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
        password: &Secret,
    ) -> Result<User, UserError>;

    /// Look up a user by ID.
    ///
    /// Returns `Ok(None)` if no such user exists.
    async fn get(&self, user: &UserId) -> Result<Option<User>, UserError>;

    /// Look up a user by normalized email.
    ///
    /// Returns `Ok(None)` if no such user exists.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserError>;

    /// Deactivate a user.
    ///
    /// The record survives; the user just stops being eligible for new
    /// grants.
    async fn deactivate(&self, user: &UserId) -> Result<(), UserError>;
}

/// In-memory user directory for testing and development.
///
/// Passwords handed to the create methods are dropped; credential custody
/// belongs to a real authentication backend.
///
/// # Thread Safety
///
/// This implementation uses interior mutability via `RwLock` and is
/// safe to share across threads.
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<UserId, User>>,
}

impl MemoryUserDirectory {
    /// Create a new empty directory.
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
        }
    }

    fn insert(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
        is_staff: bool,
        is_superuser: bool,
    ) -> Result<User, UserError> {
        if email.is_empty() {
            return Err(UserError::EmptyEmail);
        }
        let email = normalize_email(email);

        let mut users = self.users.write().map_err(|e| UserError::Directory {
            message: format!("lock poisoned: {}", e),
        })?;

        if users.values().any(|u| u.email == email) {
            return Err(UserError::DuplicateEmail { email });
        }

        let now = Utc::now();
        let user = User {
            id: UserId::new(),
            email,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            is_active: true,
            is_staff,
            is_superuser,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }
}

impl Default for MemoryUserDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryUserDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.users.read().map(|u| u.len()).unwrap_or(0);
        f.debug_struct("MemoryUserDirectory")
            .field("user_count", &count)
            .finish()
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn create_user(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
        _password: &Secret,
    ) -> Result<User, UserError> {
        self.insert(email, first_name, last_name, false, false)
    }

    async fn create_superuser(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
        _password: &Secret,
    ) -> Result<User, UserError> {
        self.insert(email, first_name, last_name, true, true)
    }

    async fn get(&self, user: &UserId) -> Result<Option<User>, UserError> {
        let users = self.users.read().map_err(|e| UserError::Directory {
            message: format!("lock poisoned: {}", e),
        })?;
        Ok(users.get(user).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserError> {
        let email = normalize_email(email);
        let users = self.users.read().map_err(|e| UserError::Directory {
            message: format!("lock poisoned: {}", e),
        })?;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn deactivate(&self, user: &UserId) -> Result<(), UserError> {
        let mut users = self.users.write().map_err(|e| UserError::Directory {
            message: format!("lock poisoned: {}", e),
        })?;

        let record = users
            .get_mut(user)
            .ok_or(UserError::NotFound { user: *user })?;
        record.is_active = false;
        record.updated_at = Utc::now();
        Ok(())
    }
}
