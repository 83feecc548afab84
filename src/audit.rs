//! Append-only audit trail with redacted keys.
//!
//! Every vault operation (store, retrieve, delete, expire, export, import)
//! lands here as a structured event. Record keys are redacted before they
//! reach a sink (SHA-256 prefix, hex); raw keys and field values never enter
//! the log. The log is append-only for the lifetime of the sink: there is no
//! deletion or truncation API.
//!
//! Recording is best-effort by contract: a sink failure must never abort the
//! operation being audited, so failures are routed to `tracing::warn!` as the
//! fallback channel.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::VaultError;
use crate::types::now_millis;

/// Bytes of the SHA-256 digest kept when redacting a record key.
const REDACTED_KEY_BYTES: usize = 8;

/// Operation category for an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Store,
    Retrieve,
    Delete,
    Expire,
    Export,
    Import,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Store => "STORE",
            AuditAction::Retrieve => "RETRIEVE",
            AuditAction::Delete => "DELETE",
            AuditAction::Expire => "EXPIRE",
            AuditAction::Export => "EXPORT",
            AuditAction::Import => "IMPORT",
        }
    }
}

/// One audit event. Carries sizes and outcomes, never values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub timestamp_ms: i64,
    pub action: AuditAction,
    pub redacted_key: String,
    pub size: usize,
    pub success: bool,
    pub user_id: String,
}

/// Redact a record key for the audit log.
///
/// SHA-256, first 8 bytes, lowercase hex. Stable, so events for the same key
/// correlate, without being reversible to the key.
pub fn redact_key(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(&digest[..REDACTED_KEY_BYTES])
}

/// Where audit events land. Injected at vault construction.
pub trait AuditSink: Send + Sync {
    /// Append one event. Errors are routed to the fallback channel by the
    /// trail, never back to the audited operation.
    fn append(&self, event: AuditEvent) -> Result<(), VaultError>;

    /// Copy of the events recorded so far, oldest first.
    fn snapshot(&self) -> Vec<AuditEvent>;

    /// Number of events recorded so far.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory sink: the default, and the double used in tests.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, event: AuditEvent) -> Result<(), VaultError> {
        self.events.lock().push(event);
        Ok(())
    }

    fn snapshot(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    fn len(&self) -> usize {
        self.events.lock().len()
    }
}

/// The trail the vault writes through.
pub struct AuditTrail {
    sink: Arc<dyn AuditSink>,
}

impl AuditTrail {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Record one event, best-effort.
    ///
    /// The key is redacted here, so a raw key never reaches a sink. A sink
    /// failure goes to the fallback channel and the caller proceeds.
    pub fn record(
        &self,
        action: AuditAction,
        key: &str,
        size: usize,
        success: bool,
        user_id: &str,
    ) {
        let event = AuditEvent {
            timestamp_ms: now_millis(),
            action,
            redacted_key: redact_key(key),
            size,
            success,
            user_id: user_id.to_string(),
        };
        if let Err(e) = self.sink.append(event) {
            tracing::warn!(action = action.as_str(), error = %e, "audit sink rejected event");
        }
    }

    /// Events at or after `since_ms`, oldest first, at most `limit`.
    pub fn query(&self, since_ms: i64, limit: usize) -> Vec<AuditEvent> {
        let mut events = self.sink.snapshot();
        events.retain(|e| e.timestamp_ms >= since_ms);
        events.truncate(limit);
        events
    }

    /// Failure rate among the most recent `window` events, 0.0 when empty.
    pub fn recent_failure_rate(&self, window: usize) -> f64 {
        let events = self.sink.snapshot();
        if events.is_empty() || window == 0 {
            return 0.0;
        }
        let recent = &events[events.len().saturating_sub(window)..];
        let failures = recent.iter().filter(|e| !e.success).count();
        failures as f64 / recent.len() as f64
    }

    pub fn len(&self) -> usize {
        self.sink.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sink.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
