//! Sliding-expiration store for live model instances.
//!
//! Unlike the moka-backed caches, entries here own expensive native
//! resources, so removal has to be deterministic: every path that drops an
//! entry (explicit eviction, replacement, expiry, clear) calls
//! [`Unload::unload`] while the entry is still in the map, then removes it,
//! all under one lock. Nothing observes an entry that has been released.
//!
//! Expiry is sliding: each successful [`TtlCache::get`] re-arms the deadline.
//! Expired entries are released lazily when touched, or in bulk by
//! [`TtlCache::sweep`]. Time comes from tokio's monotonic clock, so tests
//! can drive it with `tokio::time::pause`/`advance`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::key::CacheKey;
use crate::telemetry;

/// Resource release hook run before an entry leaves the cache.
pub trait Unload {
    fn unload(&self);
}

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// TTL elapsed since the last access.
    Expired,
    /// Fingerprint no longer matches the requested configuration.
    Mismatch,
    /// Administrative removal.
    Manual,
    /// Overwritten by a new entry under the same key.
    Replaced,
    /// Whole cache cleared.
    Cleared,
}

impl EvictionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::Mismatch => "mismatch",
            Self::Manual => "manual",
            Self::Replaced => "replaced",
            Self::Cleared => "cleared",
        }
    }
}

struct Entry<V, F> {
    value: V,
    fingerprint: F,
    last_access: Instant,
    ttl: Duration,
}

impl<V, F> Entry<V, F> {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_access) >= self.ttl
    }
}

/// Key -> (value, fingerprint) store with sliding TTL and synchronous release.
pub struct TtlCache<V: Unload, F> {
    entries: Mutex<HashMap<CacheKey, Entry<V, F>>>,
    default_ttl: Duration,
}

impl<V: Unload + Clone, F: Clone> TtlCache<V, F> {
    /// Create an empty cache whose [`insert`](Self::insert) uses `default_ttl`.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Look up a live entry and re-arm its deadline.
    ///
    /// An entry found past its deadline is released and reported as absent.
    pub fn get(&self, key: &CacheKey) -> Option<(V, F)> {
        let mut entries = self.lock();
        let now = Instant::now();
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.last_access = now;
                return Some((entry.value.clone(), entry.fingerprint.clone()));
            }
            Some(_) => {}
            None => return None,
        }
        Self::release(&mut entries, key, EvictionReason::Expired);
        None
    }

    /// Whether a live entry exists, without refreshing it.
    pub fn contains_key(&self, key: &CacheKey) -> bool {
        let now = Instant::now();
        self.lock()
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Insert with an explicit TTL. An existing entry under `key` is released first.
    pub fn put(&self, key: CacheKey, value: V, fingerprint: F, ttl: Duration) {
        let mut entries = self.lock();
        Self::release(&mut entries, &key, EvictionReason::Replaced);
        debug!(key = %key, ttl_secs = ttl.as_secs_f64(), "caching model");
        entries.insert(
            key,
            Entry {
                value,
                fingerprint,
                last_access: Instant::now(),
                ttl,
            },
        );
    }

    /// Insert with the default TTL.
    pub fn insert(&self, key: CacheKey, value: V, fingerprint: F) {
        self.put(key, value, fingerprint, self.default_ttl);
    }

    /// Release and remove the entry under `key`.
    ///
    /// Returns once `unload` has completed. Returns false if absent.
    pub fn evict(&self, key: &CacheKey) -> bool {
        Self::release(&mut self.lock(), key, EvictionReason::Manual)
    }

    /// Release and remove the entry only if `predicate` holds for its fingerprint.
    pub fn evict_if(
        &self,
        key: &CacheKey,
        reason: EvictionReason,
        predicate: impl FnOnce(&F) -> bool,
    ) -> bool {
        let mut entries = self.lock();
        let matches = entries
            .get(key)
            .is_some_and(|entry| predicate(&entry.fingerprint));
        matches && Self::release(&mut entries, key, reason)
    }

    /// Release every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let mut entries = self.lock();
        let now = Instant::now();
        let expired: Vec<CacheKey> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            Self::release(&mut entries, key, EvictionReason::Expired);
        }
        expired.len()
    }

    /// Release every entry. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut entries = self.lock();
        let keys: Vec<CacheKey> = entries.keys().cloned().collect();
        for key in &keys {
            Self::release(&mut entries, key, EvictionReason::Cleared);
        }
        keys.len()
    }

    /// Number of entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of all entries, sorted.
    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Entry<V, F>>> {
        // A panicking unload must not wedge the cache for every later request.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(
        entries: &mut HashMap<CacheKey, Entry<V, F>>,
        key: &CacheKey,
        reason: EvictionReason,
    ) -> bool {
        let Some(entry) = entries.get(key) else {
            return false;
        };
        entry.value.unload();
        entries.remove(key);

        metrics::counter!(telemetry::MODEL_EVICTIONS_TOTAL, "reason" => reason.as_str())
            .increment(1);
        info!(key = %key, reason = reason.as_str(), "evicted cached model");
        true
    }
}

/// Dropping the cache releases whatever is still in it.
impl<V: Unload, F> Drop for TtlCache<V, F> {
    fn drop(&mut self) {
        let entries = self
            .entries
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if !entries.is_empty() {
            debug!(count = entries.len(), "releasing models held by dropped cache");
        }
        for (_, entry) in entries.drain() {
            entry.value.unload();
        }
    }
}
