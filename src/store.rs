//! In-memory TTL store.
//!
//! Entries live in a single mutex-guarded map. Every read takes an explicit
//! `now_ms`, so expiry is decidable without touching the wall clock: the
//! facade passes real time, tests pass fixed instants. Expiry is enforced
//! twice over: lazily when a lookup meets an expired entry, and in bulk by
//! `sweep`. The per-entry lifecycle is one-way (active, expired, removed);
//! nothing resurrects an expired entry.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::VaultError;

/// A stored value with its lifetime bounds.
///
/// Invariant: `expires_at_ms > created_at_ms` (enforced by `put` rejecting
/// non-positive and overflowing TTLs).
#[derive(Debug, Clone)]
pub struct StoreEntry<V> {
    pub value: V,
    pub created_at_ms: i64,
    pub expires_at_ms: i64,
}

/// Lookup outcome. Expired-and-removed is distinct from plain missing so
/// callers can audit the expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<V> {
    Hit(V),
    ExpiredNow,
    Missing,
}

/// Mutex-guarded map of TTL-bounded entries.
pub struct ExpiringStore<V> {
    entries: Mutex<HashMap<String, StoreEntry<V>>>,
    default_ttl_ms: i64,
}

impl<V: Clone> ExpiringStore<V> {
    pub fn new(default_ttl_ms: i64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl_ms,
        }
    }

    /// Insert or replace an entry.
    ///
    /// `ttl_ms: None` uses the store default. Replacing an entry resets its
    /// creation time. Non-positive TTLs are rejected, as are TTLs whose
    /// expiry instant would overflow.
    pub fn put(
        &self,
        key: &str,
        value: V,
        ttl_ms: Option<i64>,
        now_ms: i64,
    ) -> Result<(), VaultError> {
        let ttl = ttl_ms.unwrap_or(self.default_ttl_ms);
        if ttl <= 0 {
            return Err(VaultError::InvalidTtl { ttl_ms: ttl });
        }
        let expires_at_ms = now_ms
            .checked_add(ttl)
            .ok_or(VaultError::InvalidTtl { ttl_ms: ttl })?;
        let entry = StoreEntry {
            value,
            created_at_ms: now_ms,
            expires_at_ms,
        };
        self.entries.lock().insert(key.to_string(), entry);
        Ok(())
    }

    /// Look a key up, removing it if it has expired (lazy expiration).
    ///
    /// An entry is expired from `expires_at_ms` onward.
    pub fn lookup(&self, key: &str, now_ms: i64) -> Lookup<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            None => Lookup::Missing,
            Some(entry) if entry.expires_at_ms <= now_ms => {
                entries.remove(key);
                Lookup::ExpiredNow
            }
            Some(entry) => Lookup::Hit(entry.value.clone()),
        }
    }

    /// [`lookup`](Self::lookup) collapsed to a Result for callers that do not
    /// care why a key is gone.
    pub fn get(&self, key: &str, now_ms: i64) -> Result<V, VaultError> {
        match self.lookup(key, now_ms) {
            Lookup::Hit(value) => Ok(value),
            Lookup::ExpiredNow | Lookup::Missing => Err(VaultError::NotFound {
                key: key.to_string(),
            }),
        }
    }

    /// Remove an entry. Returns whether one was present.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    /// Remove every expired entry, returning the removed keys so the caller
    /// can audit each removal.
    pub fn sweep(&self, now_ms: i64) -> Vec<String> {
        let mut entries = self.entries.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.expires_at_ms <= now_ms)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.remove(key);
        }
        expired
    }

    /// Explicit TTL check, without the lazy removal a lookup performs.
    ///
    /// Present-but-expired and absent are distinct signals here, unlike
    /// `get`, which collapses both to `NotFound`.
    pub fn ttl_remaining(&self, key: &str, now_ms: i64) -> Result<i64, VaultError> {
        let entries = self.entries.lock();
        match entries.get(key) {
            None => Err(VaultError::NotFound {
                key: key.to_string(),
            }),
            Some(entry) if entry.expires_at_ms <= now_ms => Err(VaultError::Expired {
                key: key.to_string(),
            }),
            Some(entry) => Ok(entry.expires_at_ms - now_ms),
        }
    }

    /// Clone of every live entry. Expired-but-unswept entries are skipped.
    pub fn live_snapshot(&self, now_ms: i64) -> Vec<(String, V)> {
        self.entries
            .lock()
            .iter()
            .filter(|(_, entry)| entry.expires_at_ms > now_ms)
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    /// Entry count, including expired entries not yet swept.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Creation time of the oldest entry still in the map.
    pub fn oldest_created_at_ms(&self) -> Option<i64> {
        self.entries
            .lock()
            .values()
            .map(|entry| entry.created_at_ms)
            .min()
    }
}

// ============================================================================
// Tests
// ============================================================================
