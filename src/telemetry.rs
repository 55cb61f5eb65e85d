//! Telemetry metric name constants.
//!
//! Centralised metric names for mimir operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `mimir_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `provider`: provider name (e.g. "gemini", "groq", "local")
//! - `status`: outcome: "ok" or "error"
//! - `reason`: why the local fallback answered: "exhausted" or "failed"

/// Total upstream requests issued by the rotator.
///
/// Labels: `provider`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "mimir_requests_total";

/// Upstream request duration in seconds.
///
/// Labels: `provider`.
pub const REQUEST_DURATION_SECONDS: &str = "mimir_request_duration_seconds";

/// Total requests answered by the local fallback responder.
///
/// Labels: `reason` ("exhausted" | "failed").
pub const FALLBACK_TOTAL: &str = "mimir_fallback_total";

/// Total times a provider was skipped because its window budget was spent.
///
/// Labels: `provider`.
pub const PROVIDER_EXHAUSTED_TOTAL: &str = "mimir_provider_exhausted_total";

/// Total fingerprint cache hits.
pub const CACHE_HITS_TOTAL: &str = "mimir_cache_hits_total";

/// Total fingerprint cache misses.
pub const CACHE_MISSES_TOTAL: &str = "mimir_cache_misses_total";

/// Total LRU evictions from the fingerprint cache.
pub const CACHE_EVICTIONS_TOTAL: &str = "mimir_cache_evictions_total";
