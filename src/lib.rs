//! Memory-only encrypted store for patient records: field-level AES-256-GCM,
//! TTL expiry, redacted append-only audit trail, and integrity-checked
//! export/import snapshots.

pub mod audit;
pub mod cipher;
pub mod error;
pub mod export;
pub mod kdf;
pub mod obfuscate;
pub mod store;
pub mod sweeper;
pub mod types;
pub mod vault;

pub use audit::{redact_key, AuditAction, AuditEvent, AuditSink, AuditTrail, MemoryAuditSink};
pub use cipher::{generate_iv, EncryptedField, FieldCipher};
pub use error::VaultError;
pub use export::{
    compute_checksum, export_records, import_records, ExportPackage, FieldBlob, ImportFailure,
    ImportMode, ImportOutcome, ImportReport,
};
pub use kdf::{derive_key, generate_salt, validate_passphrase, DerivedKey};
pub use obfuscate::Obfuscator;
pub use store::{ExpiringStore, Lookup, StoreEntry};
pub use sweeper::{spawn_sweeper, SweeperHandle};
pub use types::{
    now_millis, EncryptionStrategy, FieldMap, SensitiveField, DEFAULT_TTL_MS,
    EXPORT_FORMAT_VERSION, MIN_PASSPHRASE_LENGTH, PBKDF2_ITERATIONS, SALT_LENGTH,
};
pub use vault::{HealthReport, HealthStatus, SecureVault, VaultConfig, VaultStats};
