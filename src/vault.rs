//! Secure storage facade.
//!
//! `SecureVault` owns the session cipher, the TTL store, and the audit trail,
//! and is the only surface callers touch. Records go in as plain field maps;
//! sensitive fields (the closed [`SensitiveField`] set) are sealed with
//! AES-256-GCM before they reach the store, everything else passes through.
//! Every operation lands in the audit trail with a redacted key.
//!
//! Key derivation happens once, at construction, and is deliberately slow;
//! per-record operations only pay for AES. Export/import derive their own
//! keys on the blocking pool and batch work with yields in between.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::audit::{redact_key, AuditAction, AuditSink, AuditTrail, MemoryAuditSink};
use crate::cipher::{EncryptedField, FieldCipher};
use crate::error::VaultError;
use crate::export::{export_records, import_records, ExportPackage, ImportMode, ImportReport};
use crate::kdf::{derive_key, generate_salt, validate_passphrase};
use crate::obfuscate::Obfuscator;
use crate::store::{ExpiringStore, Lookup};
use crate::types::{
    now_millis, EncryptionStrategy, FieldMap, SensitiveField, DEFAULT_TTL_MS, EXPORT_BATCH,
    FAILURE_RATE_CRITICAL, FAILURE_RATE_WARNING, HEALTH_WINDOW, ITEM_COUNT_CRITICAL,
    ITEM_COUNT_WARNING,
};

/// Construction-time options. The defaults are the production settings.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// TTL applied by `store` (milliseconds).
    pub default_ttl_ms: i64,
    /// Expected sweep cadence; health reports degrade when sweeps fall more
    /// than two intervals behind.
    pub sweep_interval_ms: i64,
    /// Conceal resident ciphertext (rotation + re-encoding). Cosmetic only.
    pub obfuscate_resident: bool,
    /// Field protection strategy.
    pub strategy: EncryptionStrategy,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: DEFAULT_TTL_MS,
            sweep_interval_ms: 60_000,
            obfuscate_resident: true,
            strategy: EncryptionStrategy::default(),
        }
    }
}

/// One resident field: sealed ciphertext or passthrough value.
#[derive(Debug, Clone)]
pub(crate) enum SealedValue {
    Sealed(EncryptedField),
    Plain(Value),
}

/// A record as it sits in the store.
#[derive(Debug, Clone)]
pub(crate) struct SealedRecord {
    fields: Vec<(String, SealedValue)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

/// Point-in-time operational summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub item_count: usize,
    pub oldest_entry_age_ms: Option<i64>,
    pub recent_failure_rate: f64,
}

/// Lifetime counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultStats {
    pub item_count: usize,
    pub audit_entries: usize,
    pub total_sweeps: u64,
    pub total_expired: u64,
    pub last_sweep_ms: Option<i64>,
}

/// Memory-only encrypted store for patient records.
///
/// All methods take `&self`; the vault is safe to share as
/// `Arc<SecureVault>` across threads and tasks.
pub struct SecureVault {
    store: ExpiringStore<SealedRecord>,
    cipher: FieldCipher,
    obfuscator: Option<Obfuscator>,
    audit: AuditTrail,
    config: VaultConfig,
    opened_at_ms: i64,
    total_sweeps: AtomicU64,
    total_expired: AtomicU64,
    last_sweep_ms: AtomicI64,
}

impl SecureVault {
    /// Open a vault with an in-memory audit sink.
    ///
    /// Derives the session key from `passphrase` (slow by design: 100k PBKDF2
    /// rounds). Weak passphrases are rejected before that work starts.
    pub fn open(passphrase: &str, config: VaultConfig) -> Result<Self, VaultError> {
        Self::with_sink(passphrase, config, Arc::new(MemoryAuditSink::default()))
    }

    /// Open a vault writing audit events to the given sink.
    pub fn with_sink(
        passphrase: &str,
        config: VaultConfig,
        sink: Arc<dyn AuditSink>,
    ) -> Result<Self, VaultError> {
        validate_passphrase(passphrase)?;
        let salt = generate_salt()?;
        let key = derive_key(passphrase, &salt)?;
        let cipher = FieldCipher::new(&key);
        let obfuscator = if config.obfuscate_resident {
            Some(Obfuscator::new(&key)?)
        } else {
            None
        };
        // `key` drops (and zeroizes) here; only the cipher and the keystream
        // derived from it live on.

        Ok(Self {
            store: ExpiringStore::new(config.default_ttl_ms),
            cipher,
            obfuscator,
            audit: AuditTrail::new(sink),
            config,
            opened_at_ms: now_millis(),
            total_sweeps: AtomicU64::new(0),
            total_expired: AtomicU64::new(0),
            last_sweep_ms: AtomicI64::new(0),
        })
    }

    // ========================================================================
    // Record operations
    // ========================================================================

    /// Seal and store a record under the default TTL.
    pub fn store(&self, id: &str, record: &FieldMap, user_id: &str) -> Result<(), VaultError> {
        self.store_inner(id, record, None, user_id)
    }

    /// Seal and store a record with an explicit TTL (milliseconds).
    pub fn store_with_ttl(
        &self,
        id: &str,
        record: &FieldMap,
        ttl_ms: i64,
        user_id: &str,
    ) -> Result<(), VaultError> {
        self.store_inner(id, record, Some(ttl_ms), user_id)
    }

    fn store_inner(
        &self,
        id: &str,
        record: &FieldMap,
        ttl_ms: Option<i64>,
        user_id: &str,
    ) -> Result<(), VaultError> {
        let size = serde_json::to_vec(record)?.len();
        let result = self
            .seal_record(record)
            .and_then(|sealed| self.store.put(id, sealed, ttl_ms, now_millis()));
        self.audit
            .record(AuditAction::Store, id, size, result.is_ok(), user_id);
        if result.is_ok() {
            tracing::debug!(key = %redact_key(id), size, "stored record");
        }
        result
    }

    /// Fetch and unseal a record.
    ///
    /// An entry past its TTL is removed on the spot (lazy expiration) and
    /// reported as `NotFound`, with an `Expire` event in the trail.
    pub fn retrieve(&self, id: &str, user_id: &str) -> Result<FieldMap, VaultError> {
        match self.store.lookup(id, now_millis()) {
            Lookup::Hit(sealed) => match self.unseal_record(&sealed) {
                Ok(record) => {
                    let size = serde_json::to_vec(&record)?.len();
                    self.audit
                        .record(AuditAction::Retrieve, id, size, true, user_id);
                    tracing::debug!(key = %redact_key(id), "retrieved record");
                    Ok(record)
                }
                Err(e) => {
                    self.audit.record(AuditAction::Retrieve, id, 0, false, user_id);
                    Err(e)
                }
            },
            Lookup::ExpiredNow => {
                self.total_expired.fetch_add(1, Ordering::Relaxed);
                self.audit.record(AuditAction::Expire, id, 0, true, user_id);
                self.audit.record(AuditAction::Retrieve, id, 0, false, user_id);
                Err(VaultError::NotFound {
                    key: id.to_string(),
                })
            }
            Lookup::Missing => {
                self.audit.record(AuditAction::Retrieve, id, 0, false, user_id);
                Err(VaultError::NotFound {
                    key: id.to_string(),
                })
            }
        }
    }

    /// Remove a record. Absent ids are an error, so callers can tell a
    /// deletion from a no-op; both outcomes are audited.
    pub fn remove(&self, id: &str, user_id: &str) -> Result<(), VaultError> {
        let removed = self.store.delete(id);
        self.audit
            .record(AuditAction::Delete, id, 0, removed, user_id);
        if removed {
            Ok(())
        } else {
            Err(VaultError::NotFound {
                key: id.to_string(),
            })
        }
    }

    /// Milliseconds until the record expires.
    ///
    /// Distinguishes present-but-expired (`Expired`) from absent
    /// (`NotFound`), unlike `retrieve`, which collapses both.
    pub fn ttl_remaining(&self, id: &str) -> Result<i64, VaultError> {
        self.store.ttl_remaining(id, now_millis())
    }

    // ========================================================================
    // Export / import
    // ========================================================================

    /// Export every live record under a fresh password-derived key.
    ///
    /// Unsealing yields to the runtime between batches; key derivation and
    /// bulk encryption run on the blocking pool.
    pub async fn export_all(
        &self,
        password: &str,
        user_id: &str,
    ) -> Result<ExportPackage, VaultError> {
        let now = now_millis();
        let sealed_entries = self.store.live_snapshot(now);

        let mut records = Vec::with_capacity(sealed_entries.len());
        for chunk in sealed_entries.chunks(EXPORT_BATCH) {
            for (id, sealed) in chunk {
                match self.unseal_record(sealed) {
                    Ok(record) => records.push((id.clone(), record)),
                    Err(e) => {
                        self.audit
                            .record(AuditAction::Export, "*", 0, false, user_id);
                        return Err(e);
                    }
                }
            }
            tokio::task::yield_now().await;
        }

        let password = password.to_string();
        let result =
            tokio::task::spawn_blocking(move || export_records(&records, &password, now))
                .await
                .map_err(|e| VaultError::Task(e.to_string()))?;

        self.audit.record(
            AuditAction::Export,
            "*",
            result.as_ref().map_or(0, |p| p.data.len()),
            result.is_ok(),
            user_id,
        );
        if let Ok(package) = &result {
            tracing::debug!(records = package.data.len(), "exported snapshot");
        }
        result
    }

    /// Decode a package and store its records under the session key.
    ///
    /// Strict mode aborts on the first bad record and stores nothing.
    /// Lenient mode stores the good subset; if anything failed, the result is
    /// `Err(PartialImport)` carrying both the stored ids and the failures.
    pub async fn import_all(
        &self,
        package: ExportPackage,
        password: &str,
        mode: ImportMode,
        user_id: &str,
    ) -> Result<ImportReport, VaultError> {
        let password = password.to_string();
        let outcome = match tokio::task::spawn_blocking(move || {
            import_records(&package, &password, mode)
        })
        .await
        .map_err(|e| VaultError::Task(e.to_string()))?
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.audit.record(AuditAction::Import, "*", 0, false, user_id);
                return Err(e);
            }
        };

        let mut imported = Vec::with_capacity(outcome.records.len());
        for chunk in outcome.records.chunks(EXPORT_BATCH) {
            for (id, record) in chunk {
                let result = self
                    .seal_record(record)
                    .and_then(|sealed| self.store.put(id, sealed, None, now_millis()));
                if let Err(e) = result {
                    self.audit
                        .record(AuditAction::Import, "*", imported.len(), false, user_id);
                    return Err(e);
                }
                imported.push(id.clone());
            }
            tokio::task::yield_now().await;
        }

        let report = ImportReport {
            imported,
            failures: outcome.failures,
        };
        let clean = report.failures.is_empty();
        self.audit
            .record(AuditAction::Import, "*", report.imported.len(), clean, user_id);
        tracing::debug!(
            imported = report.imported.len(),
            failed = report.failures.len(),
            "imported snapshot"
        );
        if clean {
            Ok(report)
        } else {
            Err(VaultError::PartialImport(report))
        }
    }

    // ========================================================================
    // Maintenance and introspection
    // ========================================================================

    /// Remove every expired record now. One `Expire` audit event per removal.
    pub fn sweep_expired(&self) -> usize {
        let now = now_millis();
        let removed = self.store.sweep(now);
        for key in &removed {
            self.audit.record(AuditAction::Expire, key, 0, true, "system");
        }
        self.total_sweeps.fetch_add(1, Ordering::Relaxed);
        self.total_expired
            .fetch_add(removed.len() as u64, Ordering::Relaxed);
        self.last_sweep_ms.store(now, Ordering::Relaxed);
        if removed.is_empty() {
            tracing::debug!("sweep found nothing expired");
        } else {
            tracing::info!(removed = removed.len(), "swept expired records");
        }
        removed.len()
    }

    pub fn health_check(&self) -> HealthReport {
        let now = now_millis();
        let item_count = self.store.len();
        let oldest_entry_age_ms = self.store.oldest_created_at_ms().map(|t| now - t);
        let recent_failure_rate = self.audit.recent_failure_rate(HEALTH_WINDOW);

        let last_sweep = self.last_sweep_ms.load(Ordering::Relaxed);
        let sweep_reference = if last_sweep > 0 {
            last_sweep
        } else {
            self.opened_at_ms
        };
        let sweep_stale =
            now - sweep_reference > self.config.sweep_interval_ms.saturating_mul(2);

        let status = if item_count >= ITEM_COUNT_CRITICAL
            || recent_failure_rate > FAILURE_RATE_CRITICAL
        {
            HealthStatus::Critical
        } else if item_count >= ITEM_COUNT_WARNING
            || recent_failure_rate > FAILURE_RATE_WARNING
            || sweep_stale
        {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };

        HealthReport {
            status,
            item_count,
            oldest_entry_age_ms,
            recent_failure_rate,
        }
    }

    pub fn stats(&self) -> VaultStats {
        VaultStats {
            item_count: self.store.len(),
            audit_entries: self.audit.len(),
            total_sweeps: self.total_sweeps.load(Ordering::Relaxed),
            total_expired: self.total_expired.load(Ordering::Relaxed),
            last_sweep_ms: match self.last_sweep_ms.load(Ordering::Relaxed) {
                0 => None,
                t => Some(t),
            },
        }
    }

    /// The audit trail, for `query` and failure-rate inspection.
    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    pub(crate) fn sweep_interval_ms(&self) -> i64 {
        self.config.sweep_interval_ms
    }

    // ========================================================================
    // Sealing
    // ========================================================================

    fn seal_record(&self, record: &FieldMap) -> Result<SealedRecord, VaultError> {
        #[cfg(feature = "insecure-plaintext")]
        if self.config.strategy == EncryptionStrategy::Plaintext {
            return Ok(SealedRecord {
                fields: record
                    .iter()
                    .map(|(name, value)| (name.clone(), SealedValue::Plain(value.clone())))
                    .collect(),
            });
        }

        let mut fields = Vec::with_capacity(record.len());
        for (name, value) in record {
            if SensitiveField::from_field_name(name).is_some() {
                let plaintext = serde_json::to_vec(value)?;
                let mut encrypted = self.cipher.encrypt_field(&plaintext)?;
                if let Some(obf) = &self.obfuscator {
                    encrypted.ciphertext = obf.conceal(&encrypted.ciphertext);
                }
                fields.push((name.clone(), SealedValue::Sealed(encrypted)));
            } else {
                fields.push((name.clone(), SealedValue::Plain(value.clone())));
            }
        }
        Ok(SealedRecord { fields })
    }

    fn unseal_record(&self, sealed: &SealedRecord) -> Result<FieldMap, VaultError> {
        let mut record = FieldMap::new();
        for (name, value) in &sealed.fields {
            match value {
                SealedValue::Plain(v) => {
                    record.insert(name.clone(), v.clone());
                }
                SealedValue::Sealed(encrypted) => {
                    let field = match &self.obfuscator {
                        Some(obf) => EncryptedField {
                            ciphertext: obf.reveal(&encrypted.ciphertext)?,
                            iv: encrypted.iv,
                        },
                        None => encrypted.clone(),
                    };
                    let plaintext = self.cipher.decrypt_field(&field)?;
                    record.insert(name.clone(), serde_json::from_slice(&plaintext)?);
                }
            }
        }
        Ok(record)
    }
}

// ============================================================================
// Tests
// ============================================================================
