//! Passphrase-based key derivation.
//!
//! PBKDF2-HMAC-SHA256 stretches an operator passphrase into the 32-byte
//! AES-256 key that protects resident records. The salt is random per vault
//! (and per export package) and is not secret.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::VaultError;
use crate::types::{AES_KEY_LENGTH, MIN_PASSPHRASE_LENGTH, PBKDF2_ITERATIONS, SALT_LENGTH};

/// 32-byte key derived from a passphrase. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; AES_KEY_LENGTH]);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; AES_KEY_LENGTH] {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn from_bytes(bytes: [u8; AES_KEY_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey(..)")
    }
}

/// Reject input too weak to stretch.
///
/// Runs before any key-derivation work; weak input fails fast.
pub fn validate_passphrase(passphrase: &str) -> Result<(), VaultError> {
    if passphrase.is_empty() {
        return Err(VaultError::WeakInput {
            reason: "passphrase is empty".to_string(),
        });
    }
    if passphrase.chars().count() < MIN_PASSPHRASE_LENGTH {
        return Err(VaultError::WeakInput {
            reason: format!("passphrase shorter than {MIN_PASSPHRASE_LENGTH} characters"),
        });
    }
    Ok(())
}

/// Generate a fresh random 16-byte salt.
pub fn generate_salt() -> Result<[u8; SALT_LENGTH], VaultError> {
    let mut salt = [0u8; SALT_LENGTH];
    getrandom::getrandom(&mut salt).map_err(|e| VaultError::RngFailed(e.to_string()))?;
    Ok(salt)
}

/// Derive a 256-bit key from a passphrase and salt.
///
/// # Arguments
/// * `passphrase` - Operator passphrase (validated for minimum strength first)
/// * `salt` - 16-byte salt, stored alongside whatever the key protects
///
/// # Returns
/// 32-byte derived key; deterministic for a given (passphrase, salt) pair
pub fn derive_key(passphrase: &str, salt: &[u8; SALT_LENGTH]) -> Result<DerivedKey, VaultError> {
    validate_passphrase(passphrase)?;
    let mut key = [0u8; AES_KEY_LENGTH];
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    Ok(DerivedKey(key))
}
