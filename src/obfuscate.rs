//! Supplementary concealment for resident ciphertext.
//!
//! Keyed byte rotation plus base64 re-encoding, applied to already-encrypted
//! bytes while they sit in memory. This adds no confidentiality or integrity
//! on top of AES-256-GCM and is not a compliance control; it only keeps raw
//! ciphertext from being directly recognizable in heap dumps. Plaintext is
//! never passed through this layer.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::VaultError;
use crate::kdf::DerivedKey;

/// Domain-separation salt for the rotation keystream.
const OBFUSCATION_SALT: &[u8] = b"phivault:obfuscate:v1";

/// HKDF info string for the rotation keystream.
const OBFUSCATION_INFO: &[u8] = b"resident-concealment";

/// Rotation keystream length in bytes.
const KEYSTREAM_LENGTH: usize = 32;

/// Reversible concealment of ciphertext bytes at rest in memory.
pub struct Obfuscator {
    keystream: [u8; KEYSTREAM_LENGTH],
}

impl Obfuscator {
    /// Derive the rotation keystream from the vault master key.
    ///
    /// HKDF-SHA256 under a fixed domain salt, so the keystream is not the
    /// AES key and cannot be turned back into it.
    pub fn new(key: &DerivedKey) -> Result<Self, VaultError> {
        let hk = Hkdf::<Sha256>::new(Some(OBFUSCATION_SALT), key.as_bytes());
        let mut keystream = [0u8; KEYSTREAM_LENGTH];
        hk.expand(OBFUSCATION_INFO, &mut keystream)
            .map_err(|e| VaultError::EncryptionFailed(format!("HKDF expand failed: {e}")))?;
        Ok(Self { keystream })
    }

    /// Rotate and re-encode ciphertext bytes for memory residence.
    pub fn conceal(&self, bytes: &[u8]) -> Vec<u8> {
        let rotated: Vec<u8> = bytes
            .iter()
            .enumerate()
            .map(|(i, b)| b.wrapping_add(self.keystream[i % KEYSTREAM_LENGTH]))
            .collect();
        STANDARD.encode(rotated).into_bytes()
    }

    /// Reverse [`conceal`](Self::conceal).
    pub fn reveal(&self, bytes: &[u8]) -> Result<Vec<u8>, VaultError> {
        let rotated = STANDARD
            .decode(bytes)
            .map_err(|e| VaultError::Format(format!("obfuscated payload: {e}")))?;
        Ok(rotated
            .iter()
            .enumerate()
            .map(|(i, b)| b.wrapping_sub(self.keystream[i % KEYSTREAM_LENGTH]))
            .collect())
    }
}

impl Drop for Obfuscator {
    fn drop(&mut self) {
        self.keystream.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_obfuscator(seed: u8) -> Obfuscator {
        Obfuscator::new(&DerivedKey::from_bytes([seed; 32])).unwrap()
    }

    #[test]
    fn round_trip() {
        let obf = test_obfuscator(0x11);
        let resident = obf.conceal(b"\x00\x01\xfe\xffciphertext bytes");
        assert_eq!(
            obf.reveal(&resident).unwrap(),
            b"\x00\x01\xfe\xffciphertext bytes"
        );
    }

    #[test]
    fn empty_round_trip() {
        let obf = test_obfuscator(0x11);
        assert_eq!(obf.reveal(&obf.conceal(b"")).unwrap(), b"");
    }

    #[test]
    fn output_differs_from_input() {
        let obf = test_obfuscator(0x11);
        let input = b"recognizable ciphertext";
        let resident = obf.conceal(input);
        assert_ne!(resident.as_slice(), input.as_slice());
    }

    #[test]
    fn output_is_valid_base64() {
        let obf = test_obfuscator(0x11);
        let resident = obf.conceal(&[0u8, 255, 7, 32, 96]);
        let text = std::str::from_utf8(&resident).unwrap();
        assert!(STANDARD.decode(text).is_ok());
    }

    #[test]
    fn different_keys_different_output() {
        let a = test_obfuscator(0x11).conceal(b"same bytes");
        let b = test_obfuscator(0x22).conceal(b"same bytes");
        assert_ne!(a, b);
    }

    #[test]
    fn keystream_is_not_the_master_key() {
        let key = DerivedKey::from_bytes([0x33; 32]);
        let obf = Obfuscator::new(&key).unwrap();
        assert_ne!(&obf.keystream, key.as_bytes());
    }

    #[test]
    fn reveal_rejects_invalid_base64() {
        let obf = test_obfuscator(0x11);
        assert!(matches!(
            obf.reveal(b"not!valid!base64!!"),
            Err(VaultError::Format(_))
        ));
    }
}
