//! Round-robin provider rotation with per-window budgets and local fallback.
//!
//! The [`ProviderRotator`] keeps providers in configured order and a cursor
//! into that order. Each selection starts at the cursor, skips providers
//! whose budget is spent, charges the first one with room, and moves the
//! cursor just past it. Consecutive requests therefore spread across
//! providers instead of draining the first one.
//!
//! # Dispatch chain
//!
//! ```text
//! dispatch(prompt)
//!     │
//!     ▼
//! select (cursor → first provider with budget) ──► none left ──┐
//!     │                                                        │
//!     ▼                                                        │
//! issue upstream (outside lock, bounded by timeout)            │
//!     │ ok ──► Completion { origin: Remote }                   │
//!     │ error                                                  │
//!     ▼                                                        │
//! select next untried provider with budget ──► none left ──────┤
//!                                                              ▼
//!                                  local fallback ──► Completion { origin: LocalFallback }
//! ```
//!
//! Each remote provider is tried at most once per dispatch. Provider errors
//! are logged and counted, never returned: `dispatch` always yields a
//! completion.
//!
//! # Concurrency
//!
//! Budgets and the cursor live behind one `parking_lot::Mutex`. The lock
//! covers the rollover check and the read-check-increment of a single budget,
//! so two concurrent callers can never both take the last slot. Upstream
//! calls never run under the lock.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, instrument, warn};

use super::budget::{BudgetSnapshot, ProviderBudget, RateLimit};
use super::local::TemplateResponder;
use super::traits::CompletionProvider;
use crate::telemetry;
use crate::{MimirError, Result};

/// Default rotation window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Default bound on a single upstream call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timing configuration for the rotator.
///
/// ```rust
/// # use mimir::RotationConfig;
/// # use std::time::Duration;
/// let config = RotationConfig::new()
///     .window(Duration::from_secs(60))
///     .request_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct RotationConfig {
    /// Length of a budget window. Default: 60s.
    pub window: Duration,
    /// Bound on each upstream call. Default: 30s.
    pub request_timeout: Duration,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl RotationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the budget window length.
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Set the per-call upstream timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Provider picked by [`ProviderRotator::select_provider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// A remote provider, with its position in rotation order.
    Remote { index: usize, name: String },
    /// The local fallback responder.
    Local { name: String },
}

impl Selection {
    pub fn name(&self) -> &str {
        match self {
            Selection::Remote { name, .. } | Selection::Local { name } => name,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Selection::Local { .. })
    }
}

/// Whether a completion came from a real provider or the local fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseOrigin {
    Remote,
    LocalFallback,
}

/// Result of [`ProviderRotator::dispatch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    /// Name of the provider that produced `text`.
    pub provider: String,
    pub origin: ResponseOrigin,
    /// Providers that were tried and failed before this answer, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_providers: Vec<String>,
}

impl Completion {
    pub fn is_fallback(&self) -> bool {
        self.origin == ResponseOrigin::LocalFallback
    }
}

struct RotationState {
    budgets: Vec<ProviderBudget>,
    current_index: usize,
}

/// Rate-limited round-robin over remote providers with a local fallback.
pub struct ProviderRotator {
    providers: Vec<Arc<dyn CompletionProvider>>,
    local: Arc<dyn CompletionProvider>,
    config: RotationConfig,
    state: Mutex<RotationState>,
}

impl ProviderRotator {
    /// Create a rotator over `providers` (rotation order = vec order).
    ///
    /// Fails with `Configuration` on duplicate names, a local fallback
    /// named like a remote provider, or a zero window/timeout.
    pub fn new(
        providers: Vec<(Arc<dyn CompletionProvider>, RateLimit)>,
        local: Arc<dyn CompletionProvider>,
        config: RotationConfig,
    ) -> Result<Self> {
        if config.window.is_zero() {
            return Err(MimirError::Configuration(
                "window_duration_seconds must be greater than zero".to_string(),
            ));
        }
        if config.request_timeout.is_zero() {
            return Err(MimirError::Configuration(
                "request timeout must be greater than zero".to_string(),
            ));
        }

        let now = Instant::now();
        let mut budgets: Vec<ProviderBudget> = Vec::with_capacity(providers.len());
        let mut clients = Vec::with_capacity(providers.len());
        for (provider, limit) in providers {
            let name = provider.name();
            if budgets.iter().any(|b| b.provider_name() == name) {
                return Err(MimirError::Configuration(format!(
                    "provider '{name}' is configured more than once"
                )));
            }
            if name == local.name() {
                return Err(MimirError::Configuration(format!(
                    "provider '{name}' has the same name as the local fallback"
                )));
            }
            budgets.push(ProviderBudget::new(name, limit, now));
            clients.push(provider);
        }

        Ok(Self {
            providers: clients,
            local,
            config,
            state: Mutex::new(RotationState {
                budgets,
                current_index: 0,
            }),
        })
    }

    /// Rotator with no remote providers and the default template responder.
    pub fn local_only() -> Self {
        Self {
            providers: Vec::new(),
            local: Arc::new(TemplateResponder::new()),
            config: RotationConfig::default(),
            state: Mutex::new(RotationState {
                budgets: Vec::new(),
                current_index: 0,
            }),
        }
    }

    pub fn config(&self) -> &RotationConfig {
        &self.config
    }

    /// Remote provider names in rotation order.
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Name of the local fallback responder.
    pub fn local_name(&self) -> &str {
        self.local.name()
    }

    /// Provider the next selection will consider first, if any remote exists.
    pub fn next_provider(&self) -> Option<String> {
        let state = self.state.lock();
        state
            .budgets
            .get(state.current_index)
            .map(|b| b.provider_name().to_string())
    }

    /// Budget views for every remote provider, in rotation order.
    pub fn budgets(&self) -> Vec<BudgetSnapshot> {
        let now = Instant::now();
        self.state
            .lock()
            .budgets
            .iter()
            .map(|b| b.snapshot(now, self.config.window))
            .collect()
    }

    /// Pick the next provider with remaining budget and charge it one request.
    ///
    /// Returns the local fallback (charging nothing) when every remote
    /// provider is exhausted for its current window.
    pub fn select_provider(&self) -> Selection {
        let tried = vec![false; self.providers.len()];
        match self.acquire(&tried) {
            Some(index) => Selection::Remote {
                index,
                name: self.providers[index].name().to_string(),
            },
            None => Selection::Local {
                name: self.local.name().to_string(),
            },
        }
    }

    /// Send `prompt` through the rotation chain. Never fails.
    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    pub async fn dispatch(&self, prompt: &str) -> Completion {
        let timeout = self.config.request_timeout;
        let mut tried = vec![false; self.providers.len()];
        let mut failed_providers = Vec::new();

        while let Some(index) = self.acquire(&tried) {
            tried[index] = true;
            let provider = &self.providers[index];
            let name = provider.name();
            debug!(provider = name, "dispatching to provider");

            let start = Instant::now();
            let result = match tokio::time::timeout(timeout, provider.issue(prompt, timeout)).await
            {
                Ok(result) => result,
                Err(_) => Err(MimirError::Timeout(timeout)),
            };

            match result {
                Ok(text) => {
                    Self::record_request(name, start, true);
                    return Completion {
                        text,
                        provider: name.to_string(),
                        origin: ResponseOrigin::Remote,
                        failed_providers,
                    };
                }
                Err(e) => {
                    Self::record_request(name, start, false);
                    if e.is_provider_failure() {
                        warn!(provider = name, kind = e.kind(), error = %e, "provider failed, rotating to next");
                    } else {
                        error!(provider = name, kind = e.kind(), error = %e, "unexpected provider error, rotating to next");
                    }
                    failed_providers.push(name.to_string());
                }
            }
        }

        let reason = if failed_providers.is_empty() {
            "exhausted"
        } else {
            "failed"
        };
        metrics::counter!(telemetry::FALLBACK_TOTAL, "reason" => reason).increment(1);
        if !self.providers.is_empty() {
            warn!(reason, "no remote provider answered, using local fallback");
        }

        Completion {
            text: self.issue_local(prompt).await,
            provider: self.local.name().to_string(),
            origin: ResponseOrigin::LocalFallback,
            failed_providers,
        }
    }

    /// Charge the first untried provider with budget, starting at the cursor.
    fn acquire(&self, tried: &[bool]) -> Option<usize> {
        if self.providers.is_empty() {
            return None;
        }

        let now = Instant::now();
        let mut exhausted = Vec::new();
        let mut rolled = Vec::new();
        let mut granted = None;
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let n = state.budgets.len();
            for offset in 0..n {
                let index = (state.current_index + offset) % n;
                if tried[index] {
                    continue;
                }
                let budget = &mut state.budgets[index];
                if budget.roll_over(now, self.config.window) {
                    rolled.push(index);
                }
                if budget.try_acquire() {
                    state.current_index = (index + 1) % n;
                    granted = Some(index);
                    break;
                }
                exhausted.push(index);
            }
        }

        for index in rolled {
            debug!(provider = self.providers[index].name(), "budget window rolled over");
        }
        for index in exhausted {
            let name = self.providers[index].name();
            debug!(provider = name, "provider budget exhausted for this window");
            metrics::counter!(telemetry::PROVIDER_EXHAUSTED_TOTAL, "provider" => name.to_owned())
                .increment(1);
        }
        granted
    }

    /// Ask the local responder, with a built-in template as the last word.
    async fn issue_local(&self, prompt: &str) -> String {
        let timeout = self.config.request_timeout;
        let start = Instant::now();
        match tokio::time::timeout(timeout, self.local.issue(prompt, timeout)).await {
            Ok(Ok(text)) => {
                Self::record_request(self.local.name(), start, true);
                text
            }
            Ok(Err(e)) => {
                Self::record_request(self.local.name(), start, false);
                error!(provider = self.local.name(), error = %e, "local fallback failed, using built-in template");
                TemplateResponder::new().render(prompt)
            }
            Err(_) => {
                Self::record_request(self.local.name(), start, false);
                error!(provider = self.local.name(), "local fallback timed out, using built-in template");
                TemplateResponder::new().render(prompt)
            }
        }
    }

    /// Record request outcome metrics (counter + histogram).
    fn record_request(provider: &str, start: Instant, ok: bool) {
        let status = if ok { "ok" } else { "error" };
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "provider" => provider.to_owned(),
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
            "provider" => provider.to_owned(),
        )
        .record(start.elapsed().as_secs_f64());
    }
}
