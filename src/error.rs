use thiserror::Error;

use crate::export::ImportReport;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Weak passphrase: {reason}")]
    WeakInput { reason: String },

    #[error("Decryption failed: authentication tag mismatch")]
    Integrity,

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    Tamper { expected: String, actual: String },

    #[error("Record not found: {key}")]
    NotFound { key: String },

    #[error("Record expired: {key}")]
    Expired { key: String },

    #[error(
        "Partial import: {imported} records imported, {failed} failed",
        imported = .0.imported.len(),
        failed = .0.failures.len()
    )]
    PartialImport(ImportReport),

    #[error("Invalid TTL: must be positive, got {ttl_ms}")]
    InvalidTtl { ttl_ms: i64 },

    #[error("Unsupported export version: {0}")]
    UnsupportedVersion(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Malformed package: {0}")]
    Format(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Random number generation failed: {0}")]
    RngFailed(String),
}
