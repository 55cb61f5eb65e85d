//! Builder for configuring gateway instances

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::Gateway;
use crate::cache::{CacheConfig, FingerprintCache};
use crate::providers::{
    CompletionProvider, GeminiClient, OpenAiCompatClient, ProviderRotator, RateLimit,
    RotationConfig, TemplateResponder,
};
use crate::{MimirError, Result};

/// Gemini free-tier requests per minute.
pub const GEMINI_DEFAULT_LIMIT: RateLimit = RateLimit::PerWindow(60);
/// Groq free-tier requests per minute.
pub const GROQ_DEFAULT_LIMIT: RateLimit = RateLimit::PerWindow(30);
/// xAI Grok requests per minute.
pub const GROK_DEFAULT_LIMIT: RateLimit = RateLimit::PerWindow(100);

/// Main entry point for creating gateway instances.
pub struct Mimir;

impl Mimir {
    /// Create a new builder for a gateway caching values of type `V`.
    pub fn builder<V>() -> MimirBuilder<V> {
        MimirBuilder::new()
    }
}

/// Builder for configuring gateway instances.
///
/// ```rust
/// # use mimir::{Mimir, RateLimit};
/// let gateway = Mimir::builder::<String>()
///     .gemini("gemini-key")
///     .groq("groq-key")
///     .rate_limit("groq", RateLimit::PerWindow(10))
///     .max_cache_size(1_000)
///     .build()
///     .unwrap();
/// assert_eq!(gateway.rotator().provider_names(), vec!["gemini", "groq"]);
/// ```
pub struct MimirBuilder<V> {
    providers: Vec<(Arc<dyn CompletionProvider>, RateLimit)>,
    rate_limits: HashMap<String, RateLimit>,
    provider_order: Option<Vec<String>>,
    local: Option<Arc<dyn CompletionProvider>>,
    cache: CacheConfig,
    rotation: RotationConfig,
    cache_fallback_responses: bool,
    _value: PhantomData<fn() -> V>,
}

impl<V> MimirBuilder<V> {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            rate_limits: HashMap::new(),
            provider_order: None,
            local: None,
            cache: CacheConfig::default(),
            rotation: RotationConfig::default(),
            cache_fallback_responses: false,
            _value: PhantomData,
        }
    }

    /// Add a provider with its per-window limit (appended to rotation order).
    pub fn provider(mut self, provider: Arc<dyn CompletionProvider>, limit: RateLimit) -> Self {
        self.providers.push((provider, limit));
        self
    }

    /// Add Google Gemini (default limit: 60 per window).
    pub fn gemini(self, api_key: impl Into<String>) -> Self {
        self.provider(Arc::new(GeminiClient::new(api_key)), GEMINI_DEFAULT_LIMIT)
    }

    /// Add Groq (default limit: 30 per window).
    pub fn groq(self, api_key: impl Into<String>) -> Self {
        self.provider(Arc::new(OpenAiCompatClient::groq(api_key)), GROQ_DEFAULT_LIMIT)
    }

    /// Add xAI Grok (default limit: 100 per window).
    pub fn grok(self, api_key: impl Into<String>) -> Self {
        self.provider(Arc::new(OpenAiCompatClient::grok(api_key)), GROK_DEFAULT_LIMIT)
    }

    /// Override the limit of an already-added provider.
    pub fn rate_limit(mut self, provider: impl Into<String>, limit: RateLimit) -> Self {
        self.rate_limits.insert(provider.into(), limit);
        self
    }

    /// Set the rotation order by provider name.
    ///
    /// Every listed name must be an added provider. Added providers not
    /// listed are appended after the listed ones.
    pub fn provider_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.provider_order = Some(order.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the default [`TemplateResponder`] fallback.
    ///
    /// The replacement must never fail; if it does, the rotator still
    /// answers with the built-in template.
    pub fn local_fallback(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.local = Some(provider);
        self
    }

    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    /// Maximum number of cached entries (default: 10,000).
    pub fn max_cache_size(mut self, n: usize) -> Self {
        self.cache.max_size = n;
        self
    }

    pub fn rotation(mut self, config: RotationConfig) -> Self {
        self.rotation = config;
        self
    }

    /// Budget window length (default: 60s).
    pub fn window(mut self, window: Duration) -> Self {
        self.rotation.window = window;
        self
    }

    /// Bound on each upstream call (default: 30s).
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.rotation.request_timeout = timeout;
        self
    }

    /// Whether answers from the local fallback are cached (default: false).
    pub fn cache_fallback_responses(mut self, enabled: bool) -> Self {
        self.cache_fallback_responses = enabled;
        self
    }

    /// Validate configuration and build the gateway.
    ///
    /// All configuration errors surface here, never at request time.
    pub fn build(self) -> Result<Gateway<V>>
    where
        V: Clone + Send + Sync,
    {
        let mut providers = self.providers;

        for name in self.rate_limits.keys() {
            if !providers.iter().any(|(p, _)| p.name() == name) {
                return Err(MimirError::Configuration(format!(
                    "rate limit given for unknown provider '{name}'"
                )));
            }
        }
        for (provider, limit) in providers.iter_mut() {
            if let Some(over) = self.rate_limits.get(provider.name()) {
                *limit = *over;
            }
        }

        if let Some(order) = self.provider_order {
            providers = reorder(providers, &order)?;
        }

        if providers.is_empty() {
            warn!("no remote providers configured; every request will use the local fallback");
        }

        let local = self
            .local
            .unwrap_or_else(|| Arc::new(TemplateResponder::new()));
        let rotator = ProviderRotator::new(providers, local, self.rotation)?;
        let cache = FingerprintCache::new(&self.cache)?;
        Ok(Gateway::new(cache, rotator, self.cache_fallback_responses))
    }
}

impl<V> Default for MimirBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Put the named providers first, in the given order, then the rest.
fn reorder(
    mut providers: Vec<(Arc<dyn CompletionProvider>, RateLimit)>,
    order: &[String],
) -> Result<Vec<(Arc<dyn CompletionProvider>, RateLimit)>> {
    let mut ordered = Vec::with_capacity(providers.len());
    for name in order {
        let idx = providers
            .iter()
            .position(|(p, _)| p.name() == name)
            .ok_or_else(|| {
                MimirError::Configuration(format!(
                    "provider '{name}' is listed in provider_order but not configured"
                ))
            })?;
        ordered.push(providers.remove(idx));
    }
    ordered.extend(providers);
    Ok(ordered)
}
