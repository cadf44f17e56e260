//! OS keyring custody of the vault master key.
//!
//! The vault key is the one secret that cannot protect itself; it lives in
//! the platform's native keyring service:
//! - macOS: Keychain
//! - Linux: Secret Service API (via libsecret)
//! - Windows: Credential Manager
//!
//! Stored base64-encoded under a single entry. Sealed records on disk are
//! useless without it.

use keyring::Entry;

use super::{VaultError, VaultKey};

const ENTRY_USER: &str = "vault-key";

/// OS keyring custodian for the vault master key.
///
/// # Example
///
/// ```rust,ignore
/// use sellerlink_core::vault::KeyringKeyStore;
///
/// let store = KeyringKeyStore::try_new("sellerlink")?;
/// let key = store.load_or_generate()?;
/// ```
pub struct KeyringKeyStore {
    service_name: String,
}

impl KeyringKeyStore {
    /// Try to create a keyring key store for the given service name.
    ///
    /// Returns an error if the keyring backend is not available on this
    /// platform.
    pub fn try_new(service_name: &str) -> Result<Self, VaultError> {
        match Entry::new(service_name, ENTRY_USER) {
            Ok(_) => Ok(Self {
                service_name: service_name.to_string(),
            }),
            Err(e) => Err(VaultError::KeyUnavailable {
                message: format!("keyring backend not available: {}", e),
            }),
        }
    }

    fn entry(&self) -> Result<Entry, VaultError> {
        Entry::new(&self.service_name, ENTRY_USER).map_err(|e| VaultError::KeyUnavailable {
            message: format!("failed to create keyring entry: {}", e),
        })
    }

    /// Load the vault key, if one has been provisioned.
    pub fn load(&self) -> Result<Option<VaultKey>, VaultError> {
        let entry = self.entry()?;

        match entry.get_password() {
            Ok(encoded) => {
                let key =
                    VaultKey::from_base64(&encoded).map_err(|e| VaultError::KeyUnavailable {
                        message: format!("stored vault key is invalid: {}", e),
                    })?;
                Ok(Some(key))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(VaultError::KeyUnavailable {
                message: format!("keyring error: {}", e),
            }),
        }
    }

    /// Store a vault key, replacing any existing one.
    ///
    /// Replacing the key makes every record sealed under the old key
    /// unreadable.
    pub fn store(&self, key: &VaultKey) -> Result<(), VaultError> {
        let entry = self.entry()?;

        entry
            .set_password(&key.to_base64())
            .map_err(|e| VaultError::KeyUnavailable {
                message: format!("failed to store vault key: {}", e),
            })
    }

    /// Load the vault key, generating and storing a fresh one on first use.
    pub fn load_or_generate(&self) -> Result<VaultKey, VaultError> {
        if let Some(key) = self.load()? {
            return Ok(key);
        }

        tracing::info!("no vault key provisioned, generating one");
        let key = VaultKey::generate();
        self.store(&key)?;
        Ok(key)
    }

    /// Delete the stored vault key.
    ///
    /// Idempotent: succeeds even if no key was stored.
    pub fn delete(&self) -> Result<(), VaultError> {
        let entry = self.entry()?;

        match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(VaultError::KeyUnavailable {
                message: format!("failed to delete vault key: {}", e),
            }),
        }
    }
}

impl std::fmt::Debug for KeyringKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringKeyStore")
            .field("service_name", &self.service_name)
            .finish()
    }
}
