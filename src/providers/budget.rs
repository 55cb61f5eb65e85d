//! Per-provider request budgets over a rolling window.
//!
//! Each budget moves between two states:
//!
//! ```text
//!   Available ── requests_used reaches limit ──► Exhausted
//!       ▲                                            │
//!       └──────── window rollover (lazy) ◄───────────┘
//! ```
//!
//! Rollover is checked only when the rotator considers the provider; there
//! is no timer.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Request allowance per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRateLimit", into = "RawRateLimit")]
pub enum RateLimit {
    /// At most `n` requests per window. `PerWindow(0)` never grants a slot.
    PerWindow(u32),
    /// No limit (the local fallback, or a self-hosted provider).
    Unbounded,
}

impl RateLimit {
    /// Whether one more request fits after `used` requests.
    pub fn allows(&self, used: u32) -> bool {
        match self {
            RateLimit::PerWindow(limit) => used < *limit,
            RateLimit::Unbounded => true,
        }
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimit::PerWindow(n) => write!(f, "{n}/window"),
            RateLimit::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// Wire form: an integer, or the string `"unbounded"`.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawRateLimit {
    Count(u32),
    Word(String),
}

impl TryFrom<RawRateLimit> for RateLimit {
    type Error = String;

    fn try_from(raw: RawRateLimit) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawRateLimit::Count(n) => Ok(RateLimit::PerWindow(n)),
            RawRateLimit::Word(w) if w.eq_ignore_ascii_case("unbounded") => {
                Ok(RateLimit::Unbounded)
            }
            RawRateLimit::Word(w) => Err(format!(
                "invalid rate limit {w:?}: expected a request count or \"unbounded\""
            )),
        }
    }
}

impl From<RateLimit> for RawRateLimit {
    fn from(limit: RateLimit) -> Self {
        match limit {
            RateLimit::PerWindow(n) => RawRateLimit::Count(n),
            RateLimit::Unbounded => RawRateLimit::Word("unbounded".to_string()),
        }
    }
}

/// Usage counter for one provider in the current window.
#[derive(Debug, Clone)]
pub struct ProviderBudget {
    provider_name: String,
    requests_used: u32,
    requests_limit: RateLimit,
    window_start: Instant,
}

impl ProviderBudget {
    pub fn new(provider_name: impl Into<String>, limit: RateLimit, now: Instant) -> Self {
        Self {
            provider_name: provider_name.into(),
            requests_used: 0,
            requests_limit: limit,
            window_start: now,
        }
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub fn requests_used(&self) -> u32 {
        self.requests_used
    }

    pub fn requests_limit(&self) -> RateLimit {
        self.requests_limit
    }

    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    /// Reset the counter if the window has gone stale.
    ///
    /// `window_start` advances by a whole number of windows, so it stays
    /// aligned to the original start and never lands in the future.
    /// Returns whether a rollover happened.
    pub fn roll_over(&mut self, now: Instant, window: Duration) -> bool {
        let elapsed = now.saturating_duration_since(self.window_start);
        if window.is_zero() || elapsed < window {
            return false;
        }
        let windows = elapsed.as_nanos() / window.as_nanos();
        let windows = u32::try_from(windows).unwrap_or(u32::MAX);
        self.window_start += window.saturating_mul(windows);
        self.requests_used = 0;
        true
    }

    /// Whether a request would be granted right now (ignoring rollover).
    pub fn is_available(&self) -> bool {
        self.requests_limit.allows(self.requests_used)
    }

    /// Charge one request if budget remains.
    pub fn try_acquire(&mut self) -> bool {
        if !self.is_available() {
            return false;
        }
        self.requests_used = self.requests_used.saturating_add(1);
        true
    }

    /// Point-in-time view, treating a stale window as already rolled over.
    pub fn snapshot(&self, now: Instant, window: Duration) -> BudgetSnapshot {
        let elapsed = now.saturating_duration_since(self.window_start);
        let (requests_used, resets_in) = if elapsed >= window {
            (0, window)
        } else {
            (self.requests_used, window - elapsed)
        };
        BudgetSnapshot {
            provider: self.provider_name.clone(),
            requests_used,
            requests_limit: self.requests_limit,
            resets_in_secs: resets_in.as_secs_f64(),
        }
    }
}

/// Serializable budget view for monitoring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetSnapshot {
    pub provider: String,
    pub requests_used: u32,
    pub requests_limit: RateLimit,
    pub resets_in_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn acquire_until_exhausted() {
        let mut budget = ProviderBudget::new("p", RateLimit::PerWindow(2), Instant::now());
        assert!(budget.try_acquire());
        assert!(budget.try_acquire());
        assert!(!budget.try_acquire());
        assert_eq!(budget.requests_used(), 2);
    }

    #[test]
    fn zero_limit_never_available() {
        let mut budget = ProviderBudget::new("p", RateLimit::PerWindow(0), Instant::now());
        assert!(!budget.try_acquire());
        assert_eq!(budget.requests_used(), 0);
    }

    #[test]
    fn unbounded_always_available() {
        let mut budget = ProviderBudget::new("local", RateLimit::Unbounded, Instant::now());
        for _ in 0..1_000 {
            assert!(budget.try_acquire());
        }
    }

    #[test]
    fn rollover_waits_for_full_window() {
        let start = Instant::now();
        let mut budget = ProviderBudget::new("p", RateLimit::PerWindow(1), start);
        assert!(budget.try_acquire());
        assert!(!budget.roll_over(start + Duration::from_secs(59), WINDOW));
        assert!(!budget.is_available());
        assert!(budget.roll_over(start + WINDOW, WINDOW));
        assert!(budget.is_available());
        assert_eq!(budget.window_start(), start + WINDOW);
    }

    #[test]
    fn rollover_skips_whole_idle_windows() {
        let start = Instant::now();
        let mut budget = ProviderBudget::new("p", RateLimit::PerWindow(1), start);
        budget.try_acquire();
        assert!(budget.roll_over(start + Duration::from_secs(150), WINDOW));
        assert_eq!(budget.window_start(), start + Duration::from_secs(120));
    }

    #[test]
    fn snapshot_reports_stale_window_as_reset() {
        let start = Instant::now();
        let mut budget = ProviderBudget::new("p", RateLimit::PerWindow(3), start);
        budget.try_acquire();
        let fresh = budget.snapshot(start + Duration::from_secs(10), WINDOW);
        assert_eq!(fresh.requests_used, 1);
        assert_eq!(fresh.resets_in_secs, 50.0);
        let stale = budget.snapshot(start + Duration::from_secs(70), WINDOW);
        assert_eq!(stale.requests_used, 0);
    }

    #[test]
    fn rate_limit_deserializes_count_or_unbounded() {
        let n: RateLimit = serde_json::from_str("60").unwrap();
        assert_eq!(n, RateLimit::PerWindow(60));
        let u: RateLimit = serde_json::from_str("\"unbounded\"").unwrap();
        assert_eq!(u, RateLimit::Unbounded);
        assert!(serde_json::from_str::<RateLimit>("\"lots\"").is_err());
        assert_eq!(serde_json::to_string(&u).unwrap(), "\"unbounded\"");
    }
}
