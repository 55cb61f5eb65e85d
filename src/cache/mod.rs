//! Caching subsystem.
//!
//! - [`FingerprintCache`]: bounded, strict-LRU map from normalized request
//!   keys to previously computed results. Value-type agnostic: callers pick
//!   `V` (a fact check, a generated script, a raw completion).
//!
//! - [`Fingerprint`]: SHA-256 of the case-folded, trimmed request key.
//!
//! - [`persist`]: optional [`CachePersistence`] hook driven by the
//!   orchestrator, plus a JSON file implementation used for warm starts.

pub mod fingerprint;
pub mod persist;
mod store;

pub use fingerprint::{Fingerprint, normalize};
pub use persist::{CachePersistence, JsonFileStore};
pub use store::{CacheConfig, CacheEntry, DEFAULT_MAX_CACHE_SIZE, FingerprintCache};
