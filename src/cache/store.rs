//! Bounded LRU fingerprint cache.
//!
//! [`FingerprintCache`] maps normalized request keys to previously computed
//! results. It holds at most `max_size` entries; inserting a new key into a
//! full cache first evicts the least recently accessed entry. Both reads and
//! writes count as an access.
//!
//! The map sits behind a `parking_lot::Mutex`. Every operation takes the
//! lock once and does no I/O while holding it.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

use super::fingerprint::Fingerprint;
use crate::telemetry;
use crate::{MimirError, Result};

/// Default maximum number of cached entries.
pub const DEFAULT_MAX_CACHE_SIZE: usize = 10_000;

/// Configuration for the fingerprint cache.
///
/// ```rust
/// # use mimir::CacheConfig;
/// let config = CacheConfig::new().max_size(500);
/// assert_eq!(config.max_size, 500);
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached entries. Default: 10,000.
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_CACHE_SIZE,
        }
    }
}

impl CacheConfig {
    /// Create a new config with the default capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached entries.
    pub fn max_size(mut self, n: usize) -> Self {
        self.max_size = n;
        self
    }
}

/// A cached value together with its fingerprint and last access time.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: Fingerprint,
    pub value: V,
    pub last_accessed: Instant,
}

struct Slot<V> {
    value: V,
    last_accessed: Instant,
}

/// Thread-safe bounded cache keyed on request fingerprints.
pub struct FingerprintCache<V> {
    entries: Mutex<LruCache<Fingerprint, Slot<V>>>,
}

impl<V: Clone> FingerprintCache<V> {
    /// Create a cache from configuration.
    ///
    /// Fails with `Configuration` if `max_size` is zero.
    pub fn new(config: &CacheConfig) -> Result<Self> {
        let capacity = NonZeroUsize::new(config.max_size).ok_or_else(|| {
            MimirError::Configuration("max_cache_size must be greater than zero".to_string())
        })?;
        Ok(Self::with_capacity(capacity))
    }

    /// Create a cache holding at most `capacity` entries.
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up the value stored for `raw_key`.
    ///
    /// The key is normalized first. A hit refreshes the entry's access time.
    pub fn get(&self, raw_key: &str) -> Option<V> {
        self.get_fingerprint(&Fingerprint::of(raw_key))
    }

    /// Look up by precomputed fingerprint.
    pub fn get_fingerprint(&self, key: &Fingerprint) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(slot) => {
                slot.last_accessed = Instant::now();
                metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
                Some(slot.value.clone())
            }
            None => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
                None
            }
        }
    }

    /// Store `value` for `raw_key`, evicting the least recently accessed
    /// entry if the key is new and the cache is full.
    ///
    /// Overwriting an existing key replaces the value and refreshes its
    /// access time without evicting anything.
    pub fn put(&self, raw_key: &str, value: V) {
        self.put_fingerprint(Fingerprint::of(raw_key), value);
    }

    /// Store by precomputed fingerprint.
    pub fn put_fingerprint(&self, key: Fingerprint, value: V) {
        let slot = Slot {
            value,
            last_accessed: Instant::now(),
        };
        let displaced = self.entries.lock().push(key, slot);
        if let Some((old_key, _)) = displaced
            && old_key != key
        {
            trace!(evicted = %old_key, "fingerprint cache eviction");
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL).increment(1);
        }
    }

    /// Inspect an entry without refreshing its access time.
    pub fn peek(&self, raw_key: &str) -> Option<CacheEntry<V>> {
        let key = Fingerprint::of(raw_key);
        self.entries.lock().peek(&key).map(|slot| CacheEntry {
            key,
            value: slot.value.clone(),
            last_accessed: slot.last_accessed,
        })
    }

    /// Whether an entry exists for `raw_key` (does not count as an access).
    pub fn contains(&self, raw_key: &str) -> bool {
        self.entries.lock().contains(&Fingerprint::of(raw_key))
    }

    /// Remove and return the entry for `raw_key`.
    pub fn remove(&self, raw_key: &str) -> Option<V> {
        self.entries
            .lock()
            .pop(&Fingerprint::of(raw_key))
            .map(|slot| slot.value)
    }

    /// Number of entries currently held.
    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Copy out every entry, most recently accessed first.
    ///
    /// Does not refresh access times. Used to hand entries to a
    /// persistence hook outside the lock.
    pub fn snapshot(&self) -> Vec<(Fingerprint, V)> {
        self.entries
            .lock()
            .iter()
            .map(|(key, slot)| (*key, slot.value.clone()))
            .collect()
    }
}
