//! Cache-then-rotate orchestration.
//!
//! ```text
//! resolve(key, prompt)
//!     │
//!     ▼
//! FingerprintCache::get(key) ── hit ──► Resolved { origin: Cache }
//!     │ miss
//!     ▼
//! ProviderRotator::dispatch(prompt)      (never fails)
//!     │
//!     ▼
//! interpret(completion) → V
//!     │
//!     ├─ remote answer ──► FingerprintCache::put(key, V)
//!     └─ local fallback ─► not cached unless `cache_fallback_responses`
//!     ▼
//! Resolved { origin: Remote | LocalFallback }
//! ```
//!
//! The cache write happens only after the upstream call returns, so a
//! dropped `resolve` future leaves nothing half-written.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::Result;
use crate::cache::{CachePersistence, Fingerprint, FingerprintCache};
use crate::providers::{BudgetSnapshot, Completion, ProviderRotator, ResponseOrigin};

/// Where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Origin {
    /// Served from the fingerprint cache.
    Cache,
    /// Computed from a real provider's answer.
    Remote { provider: String },
    /// Computed from the local fallback's templated answer.
    LocalFallback { provider: String },
}

impl Origin {
    fn from_completion(completion: &Completion) -> Self {
        match completion.origin {
            ResponseOrigin::Remote => Origin::Remote {
                provider: completion.provider.clone(),
            },
            ResponseOrigin::LocalFallback => Origin::LocalFallback {
                provider: completion.provider.clone(),
            },
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Origin::LocalFallback { .. })
    }
}

/// A value plus where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<V> {
    pub value: V,
    pub origin: Origin,
}

/// Monitoring view of a gateway.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStats {
    pub cache_size: usize,
    pub cache_capacity: usize,
    /// Provider the next request will try first.
    pub next_provider: Option<String>,
    pub local_provider: String,
    pub budgets: Vec<BudgetSnapshot>,
}

/// Fingerprint cache composed with provider rotation.
///
/// Build once at startup with [`Mimir::builder()`](crate::Mimir::builder)
/// and share by `Arc` across request handlers.
pub struct Gateway<V> {
    cache: FingerprintCache<V>,
    rotator: ProviderRotator,
    cache_fallback_responses: bool,
}

impl<V> Gateway<V>
where
    V: Clone + Send + Sync,
{
    pub(crate) fn new(
        cache: FingerprintCache<V>,
        rotator: ProviderRotator,
        cache_fallback_responses: bool,
    ) -> Self {
        Self {
            cache,
            rotator,
            cache_fallback_responses,
        }
    }

    pub fn cache(&self) -> &FingerprintCache<V> {
        &self.cache
    }

    pub fn rotator(&self) -> &ProviderRotator {
        &self.rotator
    }

    /// Send a prompt through the rotation chain without touching the cache.
    pub async fn complete(&self, prompt: &str) -> Completion {
        self.rotator.dispatch(prompt).await
    }

    /// Return the cached value for `raw_key`, or compute, cache and return it.
    ///
    /// `interpret` turns the completion into the cached value type. It runs
    /// only on a cache miss.
    #[instrument(skip_all)]
    pub async fn resolve<F>(&self, raw_key: &str, prompt: &str, interpret: F) -> Resolved<V>
    where
        F: FnOnce(&Completion) -> V,
    {
        let key = Fingerprint::of(raw_key);
        if let Some(value) = self.cache.get_fingerprint(&key) {
            debug!(%key, "fingerprint cache hit");
            return Resolved {
                value,
                origin: Origin::Cache,
            };
        }

        let completion = self.rotator.dispatch(prompt).await;
        let value = interpret(&completion);
        let origin = Origin::from_completion(&completion);

        if !completion.is_fallback() || self.cache_fallback_responses {
            self.cache.put_fingerprint(key, value.clone());
        } else {
            debug!(%key, "not caching local fallback answer");
        }

        Resolved { value, origin }
    }

    /// Current cache and budget state.
    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            cache_size: self.cache.size(),
            cache_capacity: self.cache.capacity(),
            next_provider: self.rotator.next_provider(),
            local_provider: self.rotator.local_name().to_string(),
            budgets: self.rotator.budgets(),
        }
    }

    /// Hand a snapshot of the cache to a persistence backend.
    ///
    /// The snapshot is taken under the cache lock; the backend runs after it
    /// is released. Returns the number of entries persisted.
    pub async fn persist(&self, sink: &dyn CachePersistence<V>) -> Result<usize> {
        let entries = self.cache.snapshot();
        sink.persist_all(&entries).await?;
        Ok(entries.len())
    }

    /// Load previously persisted entries into the cache.
    ///
    /// Entries are ordered most recent first, as produced by
    /// [`snapshot`](FingerprintCache::snapshot) and
    /// [`JsonFileStore::load_all`](crate::JsonFileStore::load_all). Only the
    /// first `capacity` entries are kept, inserted in reverse so the first
    /// entry ends up most recent. Returns the number of warmed entries
    /// resident afterwards.
    pub fn warm(&self, mut entries: Vec<(Fingerprint, V)>) -> usize {
        entries.truncate(self.cache.capacity());
        let count = entries.len();
        for (key, value) in entries.into_iter().rev() {
            self.cache.put_fingerprint(key, value);
        }
        count
    }
}
