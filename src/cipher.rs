//! AES-256-GCM field encryption.
//!
//! Each sensitive field value is sealed independently: fresh random 12-byte
//! IV per call, ciphertext with the 16-byte authentication tag appended.
//! Decryption fails closed: any tag mismatch (tampered bytes, wrong key,
//! wrong IV) surfaces as `VaultError::Integrity` with no partial plaintext.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};

use crate::error::VaultError;
use crate::kdf::DerivedKey;
use crate::types::{AES_GCM_IV_LENGTH, AES_GCM_TAG_LENGTH};

/// One encrypted field value: ciphertext (tag appended) plus the IV it was
/// sealed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedField {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; AES_GCM_IV_LENGTH],
}

/// Generate a random 12-byte IV for AES-GCM.
pub fn generate_iv() -> Result<[u8; AES_GCM_IV_LENGTH], VaultError> {
    let mut iv = [0u8; AES_GCM_IV_LENGTH];
    getrandom::getrandom(&mut iv).map_err(|e| VaultError::RngFailed(e.to_string()))?;
    Ok(iv)
}

/// AES-256-GCM cipher over a derived key.
///
/// Built once per key; field operations reuse the expanded key schedule.
pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl FieldCipher {
    pub fn new(key: &DerivedKey) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.as_bytes().into()),
        }
    }

    /// Encrypt one field value under a fresh IV.
    ///
    /// # Returns
    /// Ciphertext plus the IV it must be decrypted with
    pub fn encrypt_field(&self, plaintext: &[u8]) -> Result<EncryptedField, VaultError> {
        let iv = generate_iv()?;
        let nonce = Nonce::from_slice(&iv);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;
        Ok(EncryptedField { ciphertext, iv })
    }

    /// Decrypt one field value.
    ///
    /// # Returns
    /// Plaintext bytes, or `VaultError::Integrity` on any authentication
    /// failure
    pub fn decrypt_field(&self, field: &EncryptedField) -> Result<Vec<u8>, VaultError> {
        if field.ciphertext.len() < AES_GCM_TAG_LENGTH {
            return Err(VaultError::Integrity);
        }
        let nonce = Nonce::from_slice(&field.iv);
        self.cipher
            .decrypt(nonce, field.ciphertext.as_slice())
            .map_err(|_| VaultError::Integrity)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> DerivedKey {
        let mut bytes = [0u8; 32];
        getrandom::getrandom(&mut bytes).unwrap();
        DerivedKey::from_bytes(bytes)
    }

    #[test]
    fn round_trip() {
        let cipher = FieldCipher::new(&test_key());
        let sealed = cipher.encrypt_field(b"Jane Doe").unwrap();
        let plaintext = cipher.decrypt_field(&sealed).unwrap();
        assert_eq!(plaintext, b"Jane Doe");
    }

    #[test]
    fn empty_plaintext_round_trip() {
        let cipher = FieldCipher::new(&test_key());
        let sealed = cipher.encrypt_field(b"").unwrap();
        assert_eq!(cipher.decrypt_field(&sealed).unwrap(), b"");
        // Even empty plaintext carries a full tag.
        assert_eq!(sealed.ciphertext.len(), AES_GCM_TAG_LENGTH);
    }

    #[test]
    fn unicode_round_trip() {
        let cipher = FieldCipher::new(&test_key());
        let sealed = cipher.encrypt_field("Ægir Ólafsdóttir 😷".as_bytes()).unwrap();
        assert_eq!(
            cipher.decrypt_field(&sealed).unwrap(),
            "Ægir Ólafsdóttir 😷".as_bytes()
        );
    }

    #[test]
    fn fresh_iv_per_call() {
        let cipher = FieldCipher::new(&test_key());
        let a = cipher.encrypt_field(b"same plaintext").unwrap();
        let b = cipher.encrypt_field(b"same plaintext").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        let cipher = FieldCipher::new(&test_key());
        let mut sealed = cipher.encrypt_field(b"123-45-6789").unwrap();
        sealed.ciphertext[0] ^= 0x01;
        assert!(matches!(
            cipher.decrypt_field(&sealed),
            Err(VaultError::Integrity)
        ));
    }

    #[test]
    fn rejects_tampered_tag() {
        let cipher = FieldCipher::new(&test_key());
        let mut sealed = cipher.encrypt_field(b"123-45-6789").unwrap();
        let last = sealed.ciphertext.len() - 1;
        sealed.ciphertext[last] ^= 0x80;
        assert!(matches!(
            cipher.decrypt_field(&sealed),
            Err(VaultError::Integrity)
        ));
    }

    #[test]
    fn rejects_tampered_iv() {
        let cipher = FieldCipher::new(&test_key());
        let mut sealed = cipher.encrypt_field(b"123-45-6789").unwrap();
        sealed.iv[3] ^= 0xff;
        assert!(matches!(
            cipher.decrypt_field(&sealed),
            Err(VaultError::Integrity)
        ));
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = FieldCipher::new(&test_key())
            .encrypt_field(b"123-45-6789")
            .unwrap();
        let other = FieldCipher::new(&test_key());
        assert!(matches!(
            other.decrypt_field(&sealed),
            Err(VaultError::Integrity)
        ));
    }

    #[test]
    fn rejects_truncated_ciphertext() {
        let cipher = FieldCipher::new(&test_key());
        let sealed = EncryptedField {
            ciphertext: vec![0u8; AES_GCM_TAG_LENGTH - 1],
            iv: [0u8; AES_GCM_IV_LENGTH],
        };
        assert!(matches!(
            cipher.decrypt_field(&sealed),
            Err(VaultError::Integrity)
        ));
    }
}
