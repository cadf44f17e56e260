//! Credential vault: encrypted-at-rest custody of OAuth token material.
//!
//! This module provides:
//! - [`Secret`] - A wrapper for sensitive values that prevents accidental logging
//! - [`TokenPair`] - Decrypted access/refresh tokens plus their expiry metadata
//! - [`CredentialRecord`] - The sealed at-rest form of a token pair
//! - [`VaultBackend`] - Trait for vault storage backends
//! - [`CredentialVault`] - The sealing boundary all token access goes through
//! - [`MemoryVault`] - In-memory backend for testing
//! - [`FileVault`] - JSON-file backend for single-node deployments
//!
//! Plaintext tokens only exist in memory, inside [`Secret`] values. Everything
//! that reaches a backend is an [`EncryptedSecret`]; the [`VaultKey`] lives in
//! the vault itself, never alongside the ciphertext.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::model::AccountId;

mod crypto;
mod file;
#[cfg(feature = "keyring-store")]
mod keyring;
mod memory;

pub use crypto::{CryptoError, EncryptedSecret, KEY_SIZE, VaultKey};
pub use file::FileVault;
#[cfg(feature = "keyring-store")]
pub use keyring::KeyringKeyStore;
pub use memory::MemoryVault;

/// Environment variable consulted when the OS keyring cannot supply a key.
pub const VAULT_KEY_ENV: &str = "SELLERLINK_VAULT_KEY";

/// Obtain the vault master key for a deployment.
///
/// Custody order:
/// 1. The OS keyring entry for `service_name` (feature `keyring-store`),
///    generating and provisioning a fresh key on first use
/// 2. A base64-encoded key in the `SELLERLINK_VAULT_KEY` environment
///    variable, for headless hosts without a keyring daemon
pub fn resolve_vault_key(service_name: &str) -> Result<VaultKey, VaultError> {
    #[cfg(feature = "keyring-store")]
    match KeyringKeyStore::try_new(service_name).and_then(|store| store.load_or_generate()) {
        Ok(key) => return Ok(key),
        Err(e) => {
            tracing::warn!("keyring unavailable, falling back to environment: {}", e);
        }
    }

    #[cfg(not(feature = "keyring-store"))]
    let _ = service_name;

    key_from_encoded(std::env::var(VAULT_KEY_ENV).ok().as_deref())
}

fn key_from_encoded(encoded: Option<&str>) -> Result<VaultKey, VaultError> {
    match encoded {
        Some(value) => {
            VaultKey::from_base64(value).map_err(|e| VaultError::KeyUnavailable {
                message: format!("{} holds an invalid key: {}", VAULT_KEY_ENV, e),
            })
        }
        None => Err(VaultError::KeyUnavailable {
            message: format!("no keyring key and {} is not set", VAULT_KEY_ENV),
        }),
    }
}

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value,
/// and the buffer is zeroed when dropped.
///
/// `Secret` deliberately does not implement `Serialize`: plaintext token
/// material must never be written out. Persist [`EncryptedSecret`] instead.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

/// Error type for vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// No credentials are stored for the account.
    #[error("no credentials stored for account {account}")]
    NotFound { account: AccountId },

    /// Credentials exist but cannot be decrypted: wrong or rotated key, or
    /// corrupted ciphertext. The stored material is unusable and the account
    /// must go through consent again.
    #[error("credentials for account {account} are unreadable")]
    Unreadable { account: AccountId },

    /// Sealing or opening token material failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The storage backend encountered an error.
    #[error("vault backend error: {message}")]
    Backend { message: String },

    /// Reading or writing the backing file failed.
    #[error("vault I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing or deserializing vault contents failed.
    #[error("vault serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The vault key could not be obtained from its custodian.
    #[error("vault key unavailable: {message}")]
    KeyUnavailable { message: String },
}

/// A decrypted access/refresh token pair with expiry metadata.
///
/// This is the only shape in which plaintext tokens move through the crate.
/// Expiry timestamps are plain metadata and may be inspected or logged.
#[derive(Debug, Clone)]
pub struct TokenPair {
    /// Short-lived token presented to the provider API.
    pub access_token: Secret,

    /// When the access token expires.
    pub access_expires_at: DateTime<Utc>,

    /// Long-lived token used to obtain new access tokens.
    pub refresh_token: Secret,

    /// When the refresh token expires. Past this point only a full
    /// re-consent can restore the account.
    pub refresh_expires_at: DateTime<Utc>,
}

/// The at-rest form of an account's credentials.
///
/// Token values are sealed; expiry timestamps stay in the clear so expiry
/// checks never require decryption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// The account these credentials belong to.
    pub account: AccountId,

    /// Sealed access token.
    pub access_token: EncryptedSecret,

    /// When the access token expires.
    pub access_expires_at: DateTime<Utc>,

    /// Sealed refresh token.
    pub refresh_token: EncryptedSecret,

    /// When the refresh token expires.
    pub refresh_expires_at: DateTime<Utc>,

    /// When this record was last written.
    pub updated_at: DateTime<Utc>,
}

/// Abstraction over vault storage backends.
///
/// Backends see only [`CredentialRecord`] values, which carry sealed token
/// material. Implementations include:
/// - [`MemoryVault`] - In-memory storage for testing
/// - [`FileVault`] - JSON file storage for single-node deployments
#[async_trait]
pub trait VaultBackend: Send + Sync {
    /// Retrieve the record for an account.
    ///
    /// Returns `Ok(None)` if the account has no stored credentials.
    async fn get(&self, account: &AccountId) -> Result<Option<CredentialRecord>, VaultError>;

    /// Store a record, overwriting any existing one for the same account.
    async fn put(&self, record: CredentialRecord) -> Result<(), VaultError>;

    /// Delete the record for an account.
    ///
    /// Returns `Ok(())` even if no record existed.
    async fn remove(&self, account: &AccountId) -> Result<(), VaultError>;
}

/// The sealing boundary for token material.
///
/// Holds the [`VaultKey`] and a storage backend; every store seals, every
/// read opens. Callers outside the vault never touch ciphertext or the key.
pub struct CredentialVault {
    backend: Box<dyn VaultBackend>,
    key: VaultKey,
}

impl CredentialVault {
    /// Create a vault over the given backend and key.
    pub fn new(backend: Box<dyn VaultBackend>, key: VaultKey) -> Self {
        Self { backend, key }
    }

    /// Create a vault over an in-memory backend with a fresh random key.
    ///
    /// Intended for tests; nothing persists.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryVault::new()), VaultKey::generate())
    }

    /// Seal a token pair and store it for an account.
    ///
    /// Replaces any existing credentials for the account in one step.
    pub async fn store(&self, account: AccountId, tokens: &TokenPair) -> Result<(), VaultError> {
        let record = CredentialRecord {
            account,
            access_token: self.key.seal(&tokens.access_token)?,
            access_expires_at: tokens.access_expires_at,
            refresh_token: self.key.seal(&tokens.refresh_token)?,
            refresh_expires_at: tokens.refresh_expires_at,
            updated_at: Utc::now(),
        };

        self.backend.put(record).await?;
        tracing::debug!(%account, "stored sealed credentials");
        Ok(())
    }

    /// Read and decrypt the token pair for an account.
    ///
    /// Returns [`VaultError::NotFound`] if the account has no credentials and
    /// [`VaultError::Unreadable`] if the stored material cannot be opened
    /// (rotated key, tampered ciphertext). Unreadable material is surfaced,
    /// never silently dropped, so the caller can route the account back
    /// through consent.
    pub async fn read_decrypted(&self, account: &AccountId) -> Result<TokenPair, VaultError> {
        let record = self
            .backend
            .get(account)
            .await?
            .ok_or(VaultError::NotFound { account: *account })?;

        let opened = self.open_record(&record);
        if opened.is_err() {
            tracing::warn!(%account, "stored credentials failed to decrypt");
        }
        opened.map_err(|_| VaultError::Unreadable { account: *account })
    }

    /// Fetch the raw record for an account, without decrypting.
    ///
    /// Expiry metadata is in the clear, so state checks go through this path
    /// and never touch the key.
    pub async fn record(&self, account: &AccountId) -> Result<CredentialRecord, VaultError> {
        self.backend
            .get(account)
            .await?
            .ok_or(VaultError::NotFound { account: *account })
    }

    /// Whether the stored access token is expired at `now`.
    ///
    /// Works off clear-text expiry metadata; never decrypts.
    pub async fn is_access_expired(
        &self,
        account: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<bool, VaultError> {
        Ok(self.record(account).await?.access_expires_at <= now)
    }

    /// Whether the stored refresh token is expired at `now`.
    ///
    /// A `true` here means refresh can no longer help; only re-consent can.
    pub async fn is_refresh_expired(
        &self,
        account: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<bool, VaultError> {
        Ok(self.record(account).await?.refresh_expires_at <= now)
    }

    /// Delete an account's credentials.
    ///
    /// Idempotent: succeeds even if nothing was stored.
    pub async fn remove(&self, account: &AccountId) -> Result<(), VaultError> {
        self.backend.remove(account).await?;
        tracing::debug!(%account, "removed stored credentials");
        Ok(())
    }

    fn open_record(&self, record: &CredentialRecord) -> Result<TokenPair, CryptoError> {
        Ok(TokenPair {
            access_token: self.key.open(&record.access_token)?,
            access_expires_at: record.access_expires_at,
            refresh_token: self.key.open(&record.refresh_token)?,
            refresh_expires_at: record.refresh_expires_at,
        })
    }
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_tokens() -> TokenPair {
        let now = Utc::now();
        TokenPair {
            access_token: Secret::new("access-abc"),
            access_expires_at: now + Duration::hours(2),
            refresh_token: Secret::new("refresh-xyz"),
            refresh_expires_at: now + Duration::days(540),
        }
    }

    #[test]
    fn test_secret_debug_redacted() {
        let secret = Secret::new("super-secret");
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_secret_display_redacted() {
        let secret = Secret::new("super-secret");
        let display = format!("{}", secret);
        assert!(!display.contains("super-secret"));
        assert!(display.contains("REDACTED"));
    }

    #[tokio::test]
    async fn test_store_and_read_roundtrip() {
        let vault = CredentialVault::in_memory();
        let account = AccountId::new();
        let tokens = sample_tokens();

        vault.store(account, &tokens).await.unwrap();

        let read = vault.read_decrypted(&account).await.unwrap();
        assert_eq!(read.access_token.expose(), "access-abc");
        assert_eq!(read.refresh_token.expose(), "refresh-xyz");
        assert_eq!(read.access_expires_at, tokens.access_expires_at);
        assert_eq!(read.refresh_expires_at, tokens.refresh_expires_at);
    }

    #[tokio::test]
    async fn test_record_is_sealed_at_rest() {
        let vault = CredentialVault::in_memory();
        let account = AccountId::new();
        vault.store(account, &sample_tokens()).await.unwrap();

        let record = vault.record(&account).await.unwrap();
        assert_ne!(record.access_token.ciphertext, "access-abc");
        assert_ne!(record.refresh_token.ciphertext, "refresh-xyz");
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let vault = CredentialVault::in_memory();
        let account = AccountId::new();

        assert!(matches!(
            vault.read_decrypted(&account).await,
            Err(VaultError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_rotated_key_is_unreadable() {
        let backend = Box::new(MemoryVault::new());
        let account = AccountId::new();

        let vault = CredentialVault::new(backend, VaultKey::generate());
        vault.store(account, &sample_tokens()).await.unwrap();
        let record = vault.record(&account).await.unwrap();

        // Same record, different key: the material must surface as unreadable.
        let rotated = CredentialVault::in_memory();
        rotated.backend.put(record).await.unwrap();

        assert!(matches!(
            rotated.read_decrypted(&account).await,
            Err(VaultError::Unreadable { .. })
        ));
    }

    #[tokio::test]
    async fn test_store_replaces_existing() {
        let vault = CredentialVault::in_memory();
        let account = AccountId::new();

        vault.store(account, &sample_tokens()).await.unwrap();

        let mut newer = sample_tokens();
        newer.access_token = Secret::new("access-newer");
        vault.store(account, &newer).await.unwrap();

        let read = vault.read_decrypted(&account).await.unwrap();
        assert_eq!(read.access_token.expose(), "access-newer");
    }

    #[test]
    fn test_env_key_fallback_decoding() {
        let key = VaultKey::generate();
        let resolved = key_from_encoded(Some(&key.to_base64())).unwrap();
        assert_eq!(resolved.to_base64(), key.to_base64());

        assert!(matches!(
            key_from_encoded(Some("not-a-key")),
            Err(VaultError::KeyUnavailable { .. })
        ));
        assert!(matches!(
            key_from_encoded(None),
            Err(VaultError::KeyUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_expiry_checks_use_clear_metadata() {
        let vault = CredentialVault::in_memory();
        let account = AccountId::new();
        let tokens = sample_tokens();
        vault.store(account, &tokens).await.unwrap();

        let now = Utc::now();
        assert!(!vault.is_access_expired(&account, now).await.unwrap());
        assert!(!vault.is_refresh_expired(&account, now).await.unwrap());

        let later = tokens.access_expires_at + Duration::seconds(1);
        assert!(vault.is_access_expired(&account, later).await.unwrap());
        assert!(!vault.is_refresh_expired(&account, later).await.unwrap());

        let much_later = tokens.refresh_expires_at + Duration::seconds(1);
        assert!(vault.is_refresh_expired(&account, much_later).await.unwrap());
    }

    #[tokio::test]
    async fn test_expiry_check_missing_is_not_found() {
        let vault = CredentialVault::in_memory();
        let account = AccountId::new();

        assert!(matches!(
            vault.is_access_expired(&account, Utc::now()).await,
            Err(VaultError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let vault = CredentialVault::in_memory();
        let account = AccountId::new();

        vault.store(account, &sample_tokens()).await.unwrap();
        vault.remove(&account).await.unwrap();
        vault.remove(&account).await.unwrap();

        assert!(matches!(
            vault.read_decrypted(&account).await,
            Err(VaultError::NotFound { .. })
        ));
    }
}
