//! AES-256-GCM sealing for token material.
//!
//! Every token is sealed separately with a fresh random nonce. Ciphertext and
//! nonce are base64-encoded for storage; the key itself never travels with
//! them. Error messages never include ciphertext, nonce, or key bytes.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::Secret;

/// Size of the vault key in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// Size of the GCM nonce in bytes (96 bits).
const NONCE_SIZE: usize = 12;

/// Error type for sealing and opening token material.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The key is not the required length after decoding.
    #[error("vault key must be {KEY_SIZE} bytes (256 bits), got {got}")]
    InvalidKeyLength { got: usize },

    /// The key is not valid base64.
    #[error("vault key is not valid base64")]
    InvalidKeyEncoding,

    /// Sealing failed.
    #[error("failed to seal token material")]
    SealFailed,

    /// The stored ciphertext or nonce is not valid base64 or has the wrong
    /// shape.
    #[error("stored token material is malformed")]
    Malformed,

    /// Authenticated decryption failed: wrong key, rotated key, or tampered
    /// ciphertext.
    #[error("failed to open token material")]
    OpenFailed,
}

/// A sealed token value as persisted at rest.
///
/// Carries the ciphertext and the nonce used to produce it, both
/// base64-encoded. Useless without the [`VaultKey`], which is held elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    /// Base64-encoded AES-256-GCM ciphertext (includes the auth tag).
    pub ciphertext: String,

    /// Base64-encoded nonce, unique per sealing operation.
    pub nonce: String,
}

/// The vault-wide 256-bit sealing key.
///
/// Held in memory only and zeroized on drop. Sealing happens on construction
/// of an [`EncryptedSecret`] and opening on access, so the encryption
/// boundary is visible in the type system: anything outside the vault only
/// ever sees [`EncryptedSecret`] values.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VaultKey([u8; KEY_SIZE]);

impl VaultKey {
    /// Create a key from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Decode a key from its base64 representation.
    ///
    /// The decoded key must be exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let mut decoded = BASE64
            .decode(encoded.trim())
            .map_err(|_| CryptoError::InvalidKeyEncoding)?;

        if decoded.len() != KEY_SIZE {
            let got = decoded.len();
            decoded.zeroize();
            return Err(CryptoError::InvalidKeyLength { got });
        }

        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self(bytes))
    }

    /// Encode the key as base64, for provisioning into a key store.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(&mut OsRng);
        Self(key.into())
    }

    /// Seal a plaintext secret with a fresh random nonce.
    pub fn seal(&self, plaintext: &Secret) -> Result<EncryptedSecret, CryptoError> {
        let cipher =
            Aes256Gcm::new_from_slice(&self.0).map_err(|_| CryptoError::SealFailed)?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.expose().as_bytes())
            .map_err(|_| CryptoError::SealFailed)?;

        Ok(EncryptedSecret {
            ciphertext: BASE64.encode(&ciphertext),
            nonce: BASE64.encode(nonce),
        })
    }

    /// Open a sealed secret.
    ///
    /// Fails if the material is malformed, the key does not match the one
    /// used to seal, or the ciphertext was tampered with.
    pub fn open(&self, sealed: &EncryptedSecret) -> Result<Secret, CryptoError> {
        let ciphertext = BASE64
            .decode(&sealed.ciphertext)
            .map_err(|_| CryptoError::Malformed)?;
        let nonce_bytes = BASE64
            .decode(&sealed.nonce)
            .map_err(|_| CryptoError::Malformed)?;

        if nonce_bytes.len() != NONCE_SIZE {
            return Err(CryptoError::Malformed);
        }

        let cipher =
            Aes256Gcm::new_from_slice(&self.0).map_err(|_| CryptoError::OpenFailed)?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let mut plaintext = cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|_| CryptoError::OpenFailed)?;

        match String::from_utf8(std::mem::take(&mut plaintext)) {
            Ok(value) => Ok(Secret::new(value)),
            Err(_) => Err(CryptoError::Malformed),
        }
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VaultKey([REDACTED])")
    }
}
