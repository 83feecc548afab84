//! Encrypted export/import snapshots.
//!
//! Export: records → fresh salt + PBKDF2 key → AES-GCM per sensitive field →
//! JSON package with a SHA-256 checksum over the serialized payload.
//! Import: version gate → checksum gate (before any decryption) → key
//! derivation → per-record decryption, all-or-nothing per record.
//!
//! The export key is always derived fresh, never the resident session key, so
//! a package leaks nothing about the vault it came from.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::cipher::{EncryptedField, FieldCipher};
use crate::error::VaultError;
use crate::kdf::{derive_key, generate_salt};
use crate::types::{FieldMap, SensitiveField, AES_GCM_IV_LENGTH, EXPORT_FORMAT_VERSION, SALT_LENGTH};

/// One encrypted field on the wire: base64 ciphertext and IV.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldBlob {
    pub ct: String,
    pub iv: String,
}

impl FieldBlob {
    fn encode(field: &EncryptedField) -> Self {
        Self {
            ct: STANDARD.encode(&field.ciphertext),
            iv: STANDARD.encode(field.iv),
        }
    }

    fn decode(&self) -> Result<EncryptedField, VaultError> {
        let ciphertext = STANDARD
            .decode(&self.ct)
            .map_err(|e| VaultError::Format(format!("ciphertext base64: {e}")))?;
        let iv_bytes = STANDARD
            .decode(&self.iv)
            .map_err(|e| VaultError::Format(format!("iv base64: {e}")))?;
        let iv: [u8; AES_GCM_IV_LENGTH] = iv_bytes
            .try_into()
            .map_err(|_| VaultError::Format("iv is not 12 bytes".to_string()))?;
        Ok(EncryptedField { ciphertext, iv })
    }
}

/// A portable encrypted snapshot.
///
/// `data` maps record id → field name → either a [`FieldBlob`] (fields listed
/// in `encryptedFields`) or the passthrough JSON value. `BTreeMap` keeps the
/// serialization canonical so the checksum is reproducible on both sides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportPackage {
    pub version: String,
    pub timestamp: i64,
    pub salt: String,
    pub data: BTreeMap<String, BTreeMap<String, Value>>,
    pub checksum: String,
    #[serde(rename = "encryptedFields")]
    pub encrypted_fields: Vec<String>,
}

/// Failure handling for an import. Explicit at every call site: strict aborts
/// on the first bad record, lenient decodes what it can.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    Strict,
    Lenient,
}

/// One record a lenient import had to skip.
#[derive(Debug, Clone)]
pub struct ImportFailure {
    pub record_id: String,
    pub error: String,
}

/// Decoded records plus any per-record failures (lenient mode only).
#[derive(Debug)]
pub struct ImportOutcome {
    pub records: Vec<(String, FieldMap)>,
    pub failures: Vec<ImportFailure>,
}

/// What a vault-level import did: record ids stored, failures skipped.
#[derive(Debug, Clone)]
pub struct ImportReport {
    pub imported: Vec<String>,
    pub failures: Vec<ImportFailure>,
}

#[derive(Serialize)]
struct ChecksumPayload<'a> {
    version: &'a str,
    timestamp: i64,
    salt: &'a str,
    data: &'a BTreeMap<String, BTreeMap<String, Value>>,
    #[serde(rename = "encryptedFields")]
    encrypted_fields: &'a [String],
}

/// SHA-256 (hex) over everything in the package except the checksum itself.
pub fn compute_checksum(package: &ExportPackage) -> Result<String, VaultError> {
    let payload = serde_json::to_vec(&ChecksumPayload {
        version: &package.version,
        timestamp: package.timestamp,
        salt: &package.salt,
        data: &package.data,
        encrypted_fields: &package.encrypted_fields,
    })?;
    Ok(hex::encode(Sha256::digest(&payload)))
}

/// Build an encrypted package from plaintext records.
///
/// Derives a fresh key from `password` and a fresh random salt; every
/// sensitive field of every record is sealed under its own IV. Weak passwords
/// are rejected before any record is touched.
pub fn export_records(
    records: &[(String, FieldMap)],
    password: &str,
    now_ms: i64,
) -> Result<ExportPackage, VaultError> {
    let salt = generate_salt()?;
    let key = derive_key(password, &salt)?;
    let cipher = FieldCipher::new(&key);

    let mut data = BTreeMap::new();
    for (record_id, fields) in records {
        data.insert(record_id.clone(), seal_fields(&cipher, fields)?);
    }

    let mut package = ExportPackage {
        version: EXPORT_FORMAT_VERSION.to_string(),
        timestamp: now_ms,
        salt: STANDARD.encode(salt),
        data,
        checksum: String::new(),
        encrypted_fields: SensitiveField::ALL
            .iter()
            .map(|f| f.as_str().to_string())
            .collect(),
    };
    package.checksum = compute_checksum(&package)?;
    Ok(package)
}

/// Decode an encrypted package back into plaintext records.
///
/// The checksum is verified before any decryption is attempted: a package
/// that fails it is rejected whole with `VaultError::Tamper`. Decryption is
/// all-or-nothing per record; `mode` decides whether one bad record aborts
/// the import or is reported alongside the good ones.
pub fn import_records(
    package: &ExportPackage,
    password: &str,
    mode: ImportMode,
) -> Result<ImportOutcome, VaultError> {
    if package.version != EXPORT_FORMAT_VERSION {
        return Err(VaultError::UnsupportedVersion(package.version.clone()));
    }

    let computed = compute_checksum(package)?;
    if computed != package.checksum {
        return Err(VaultError::Tamper {
            expected: package.checksum.clone(),
            actual: computed,
        });
    }

    let salt = decode_salt(&package.salt)?;
    let key = derive_key(password, &salt)?;
    let cipher = FieldCipher::new(&key);

    let mut records = Vec::new();
    let mut failures = Vec::new();
    for (record_id, sealed) in &package.data {
        match open_record(&cipher, sealed, &package.encrypted_fields) {
            Ok(fields) => records.push((record_id.clone(), fields)),
            Err(e) => match mode {
                ImportMode::Strict => return Err(e),
                ImportMode::Lenient => failures.push(ImportFailure {
                    record_id: record_id.clone(),
                    error: e.to_string(),
                }),
            },
        }
    }
    Ok(ImportOutcome { records, failures })
}

fn seal_fields(
    cipher: &FieldCipher,
    fields: &FieldMap,
) -> Result<BTreeMap<String, Value>, VaultError> {
    let mut sealed = BTreeMap::new();
    for (name, value) in fields {
        if SensitiveField::from_field_name(name).is_some() {
            let plaintext = serde_json::to_vec(value)?;
            let field = cipher.encrypt_field(&plaintext)?;
            sealed.insert(name.clone(), serde_json::to_value(FieldBlob::encode(&field))?);
        } else {
            sealed.insert(name.clone(), value.clone());
        }
    }
    Ok(sealed)
}

/// Decrypt one record. Any failing field poisons the whole record; no
/// partially-decrypted map is ever returned.
fn open_record(
    cipher: &FieldCipher,
    sealed: &BTreeMap<String, Value>,
    encrypted_fields: &[String],
) -> Result<FieldMap, VaultError> {
    let mut fields = FieldMap::new();
    for (name, value) in sealed {
        if encrypted_fields.iter().any(|f| f == name) {
            let blob: FieldBlob = serde_json::from_value(value.clone())
                .map_err(|_| VaultError::Format(format!("field {name} is not an encrypted blob")))?;
            let plaintext = cipher.decrypt_field(&blob.decode()?)?;
            let restored: Value = serde_json::from_slice(&plaintext)?;
            fields.insert(name.clone(), restored);
        } else {
            fields.insert(name.clone(), value.clone());
        }
    }
    Ok(fields)
}

fn decode_salt(salt_b64: &str) -> Result<[u8; SALT_LENGTH], VaultError> {
    let bytes = STANDARD
        .decode(salt_b64)
        .map_err(|e| VaultError::Format(format!("salt base64: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| VaultError::Format("salt is not 16 bytes".to_string()))
}

// ============================================================================
// Tests
// ============================================================================
