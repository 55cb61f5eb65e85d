//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.mimir/config.toml` (user)
//! 3. `/etc/mimir/config.toml` (system)
//! 4. built-in defaults
//!
//! Secrets are loaded separately with mandatory permission checks:
//! 1. `~/.mimir/secrets.toml` (user, must be 0600)
//! 2. `/etc/mimir/secrets.toml` (system, must be 0600)
//!
//! with a fallback to `GEMINI_API_KEY`, `GROQ_API_KEY` and `GROK_API_KEY`.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::cache::DEFAULT_MAX_CACHE_SIZE;
use crate::gateway::{GEMINI_DEFAULT_LIMIT, GROK_DEFAULT_LIMIT, GROQ_DEFAULT_LIMIT, MimirBuilder};
use crate::providers::{GeminiClient, OpenAiCompatClient, RateLimit};
use crate::{MimirError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub rotation: RotationSection,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// `[cache]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    /// Maximum cached entries (default: 10,000).
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: usize,
    /// Cache answers produced by the local fallback (default: false).
    #[serde(default)]
    pub cache_fallback_responses: bool,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            max_cache_size: default_max_cache_size(),
            cache_fallback_responses: false,
        }
    }
}

fn default_max_cache_size() -> usize {
    DEFAULT_MAX_CACHE_SIZE
}

/// `[rotation]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RotationSection {
    /// Rotation order by provider name (default: gemini, groq, grok).
    #[serde(default = "default_provider_order")]
    pub provider_order: Vec<String>,
    /// Requests per window by provider name, or `"unbounded"`.
    #[serde(default)]
    pub per_provider_rate_limit: HashMap<String, RateLimit>,
    /// Budget window in seconds (default: 60).
    #[serde(default = "default_window")]
    pub window_duration_seconds: u64,
    /// Bound on each upstream call in seconds (default: 30).
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for RotationSection {
    fn default() -> Self {
        Self {
            provider_order: default_provider_order(),
            per_provider_rate_limit: HashMap::new(),
            window_duration_seconds: default_window(),
            request_timeout_secs: default_timeout(),
        }
    }
}

fn default_provider_order() -> Vec<String> {
    vec!["gemini".to_string(), "groq".to_string(), "grok".to_string()]
}

fn default_window() -> u64 {
    60
}

fn default_timeout() -> u64 {
    30
}

/// Provider configurations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub gemini: Option<ApiProviderConfig>,
    #[serde(default)]
    pub groq: Option<ApiProviderConfig>,
    #[serde(default)]
    pub grok: Option<ApiProviderConfig>,
}

/// API provider configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiProviderConfig {
    /// Model override.
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL override (proxies, testing).
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Secrets configuration (API keys).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub gemini: Option<ApiKeySecret>,
    #[serde(default)]
    pub groq: Option<ApiKeySecret>,
    #[serde(default)]
    pub grok: Option<ApiKeySecret>,
}

/// A single API key secret.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

/// Provider name → environment variable name mapping.
const PROVIDER_ENV_VARS: &[(&str, &str)] = &[
    ("gemini", "GEMINI_API_KEY"),
    ("groq", "GROQ_API_KEY"),
    ("grok", "GROK_API_KEY"),
];

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// An explicit path must exist. Without one, a missing user and system
    /// config yields the built-in defaults.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| MimirError::Configuration(format!("Failed to parse config: {e}")))
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MimirError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            MimirError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(MimirError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".mimir").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/mimir/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    /// Turn this configuration into a gateway builder.
    ///
    /// Providers in `provider_order` without an API key are skipped with a
    /// warning. Unknown provider names and rate limits for providers that
    /// are not in `provider_order` are configuration errors.
    pub fn builder<V>(&self, secrets: &Secrets) -> Result<MimirBuilder<V>> {
        let rotation = &self.rotation;
        for name in rotation.per_provider_rate_limit.keys() {
            if !rotation.provider_order.contains(name) {
                return Err(MimirError::Configuration(format!(
                    "rate limit given for provider '{name}' which is not in provider_order"
                )));
            }
        }

        let mut builder = MimirBuilder::new()
            .max_cache_size(self.cache.max_cache_size)
            .cache_fallback_responses(self.cache.cache_fallback_responses)
            .window(Duration::from_secs(rotation.window_duration_seconds))
            .request_timeout(Duration::from_secs(rotation.request_timeout_secs));

        for name in &rotation.provider_order {
            let Some(api_key) = secrets.api_key(name) else {
                if PROVIDER_ENV_VARS.iter().any(|(known, _)| *known == name.as_str()) {
                    warn!(provider = %name, "no API key found, provider skipped");
                    continue;
                }
                return Err(MimirError::Configuration(format!(
                    "unknown provider '{name}' in provider_order"
                )));
            };

            let limit = |default: RateLimit| {
                rotation
                    .per_provider_rate_limit
                    .get(name)
                    .copied()
                    .unwrap_or(default)
            };

            builder = match name.as_str() {
                "gemini" => {
                    let section = self.providers.gemini.clone().unwrap_or_default();
                    let mut client = match section.base_url {
                        Some(url) => GeminiClient::with_base_url(api_key, url),
                        None => GeminiClient::new(api_key),
                    };
                    if let Some(model) = section.model {
                        client = client.model(model);
                    }
                    builder.provider(Arc::new(client), limit(GEMINI_DEFAULT_LIMIT))
                }
                "groq" | "grok" => {
                    let (section, mut client, default_limit) = if name == "groq" {
                        (
                            self.providers.groq.clone(),
                            OpenAiCompatClient::groq(api_key),
                            GROQ_DEFAULT_LIMIT,
                        )
                    } else {
                        (
                            self.providers.grok.clone(),
                            OpenAiCompatClient::grok(api_key),
                            GROK_DEFAULT_LIMIT,
                        )
                    };
                    let section = section.unwrap_or_default();
                    if let Some(url) = section.base_url {
                        client = client.base_url(url);
                    }
                    if let Some(model) = section.model {
                        client = client.model(model);
                    }
                    builder.provider(Arc::new(client), limit(default_limit))
                }
                other => {
                    return Err(MimirError::Configuration(format!(
                        "unknown provider '{other}' in provider_order"
                    )));
                }
            };
        }

        Ok(builder)
    }
}

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Resolution order:
    /// 1. `~/.mimir/secrets.toml` (if exists, must be 0600)
    /// 2. `/etc/mimir/secrets.toml` (if exists, must be 0600)
    ///
    /// Returns empty secrets if no file exists (providers may use env vars).
    pub fn load() -> Result<Self> {
        // Try user secrets first
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".mimir").join("secrets.toml");
            if user_secrets.exists() {
                Self::check_permissions(&user_secrets)?;
                return Self::load_from_file(&user_secrets);
            }
        }

        // Try system secrets
        let system_secrets = PathBuf::from("/etc/mimir/secrets.toml");
        if system_secrets.exists() {
            Self::check_permissions(&system_secrets)?;
            return Self::load_from_file(&system_secrets);
        }

        // No secrets file, return empty (providers can fall back to env vars)
        Ok(Secrets::default())
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MimirError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            MimirError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            MimirError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        // Reject if group or other bits are set
        if mode & 0o077 != 0 {
            return Err(MimirError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// Get API key for a provider, falling back to the corresponding environment variable.
    pub fn api_key(&self, provider: &str) -> Option<String> {
        let from_file = match provider {
            "gemini" => self.gemini.as_ref(),
            "groq" => self.groq.as_ref(),
            "grok" => self.grok.as_ref(),
            _ => None,
        }
        .map(|s| s.api_key.clone());

        from_file.or_else(|| {
            PROVIDER_ENV_VARS
                .iter()
                .find(|(name, _)| *name == provider)
                .and_then(|(_, env_var)| std::env::var(env_var).ok())
                .filter(|key| !key.is_empty())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets(gemini: Option<&str>, groq: Option<&str>, grok: Option<&str>) -> Secrets {
        let wrap = |k: Option<&str>| {
            k.map(|api_key| ApiKeySecret {
                api_key: api_key.to_string(),
            })
        };
        Secrets {
            gemini: wrap(gemini),
            groq: wrap(groq),
            grok: wrap(grok),
        }
    }

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.cache.max_cache_size, 10_000);
        assert!(!config.cache.cache_fallback_responses);
        assert_eq!(config.rotation.window_duration_seconds, 60);
        assert_eq!(config.rotation.request_timeout_secs, 30);
        assert_eq!(config.rotation.provider_order, vec!["gemini", "groq", "grok"]);
    }

    #[test]
    fn parse_minimal_config() {
        let config = Config::from_toml_str(
            r#"
            [cache]
            max_cache_size = 50
        "#,
        )
        .unwrap();
        assert_eq!(config.cache.max_cache_size, 50);
        // Defaults preserved
        assert_eq!(config.rotation.window_duration_seconds, 60);
    }

    #[test]
    fn parse_full_config() {
        let config = Config::from_toml_str(
            r#"
            [cache]
            max_cache_size = 500
            cache_fallback_responses = true

            [rotation]
            provider_order = ["groq", "gemini"]
            window_duration_seconds = 30
            request_timeout_secs = 10

            [rotation.per_provider_rate_limit]
            gemini = 60
            groq = "unbounded"

            [providers.gemini]
            model = "gemini-1.5-flash"

            [providers.groq]
            base_url = "http://localhost:8080/v1"
        "#,
        )
        .unwrap();
        assert!(config.cache.cache_fallback_responses);
        assert_eq!(config.rotation.provider_order, vec!["groq", "gemini"]);
        assert_eq!(
            config.rotation.per_provider_rate_limit.get("groq"),
            Some(&RateLimit::Unbounded)
        );
        assert_eq!(
            config.rotation.per_provider_rate_limit.get("gemini"),
            Some(&RateLimit::PerWindow(60))
        );
        assert_eq!(
            config.providers.gemini.unwrap().model.as_deref(),
            Some("gemini-1.5-flash")
        );
    }

    #[test]
    fn invalid_rate_limit_is_parse_error() {
        let result = Config::from_toml_str(
            r#"
            [rotation.per_provider_rate_limit]
            gemini = "plenty"
        "#,
        );
        assert!(matches!(result, Err(MimirError::Configuration(_))));
    }

    #[test]
    fn parse_secrets() {
        let secrets: Secrets = toml::from_str(
            r#"
            [gemini]
            api_key = "gm-test-key"
        "#,
        )
        .unwrap();
        assert_eq!(secrets.gemini.unwrap().api_key, "gm-test-key");
        assert!(secrets.groq.is_none());
    }

    #[test]
    fn api_key_from_secrets() {
        let secrets = secrets(Some("from-file"), None, None);
        assert_eq!(secrets.api_key("gemini"), Some("from-file".to_string()));
        assert_eq!(secrets.api_key("nonexistent"), None);
    }

    #[test]
    fn config_not_found_returns_error() {
        let result = Config::load(Some(Path::new("/nonexistent/config.toml")));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Config file not found"));
    }

    #[test]
    fn builder_follows_provider_order() {
        let config = Config::from_toml_str(
            r#"
            [rotation]
            provider_order = ["grok", "gemini"]

            [rotation.per_provider_rate_limit]
            grok = 5
        "#,
        )
        .unwrap();
        let gateway = config
            .builder::<String>(&secrets(Some("g"), None, Some("x")))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(gateway.rotator().provider_names(), vec!["grok", "gemini"]);
        let budgets = gateway.rotator().budgets();
        assert_eq!(budgets[0].requests_limit, RateLimit::PerWindow(5));
        assert_eq!(budgets[1].requests_limit, GEMINI_DEFAULT_LIMIT);
    }

    #[test]
    fn builder_rejects_unknown_provider() {
        let config = Config::from_toml_str(
            r#"
            [rotation]
            provider_order = ["claude"]
        "#,
        )
        .unwrap();
        assert!(config.builder::<String>(&Secrets::default()).is_err());
    }

    #[test]
    fn builder_rejects_limit_outside_order() {
        let config = Config::from_toml_str(
            r#"
            [rotation]
            provider_order = ["gemini"]

            [rotation.per_provider_rate_limit]
            groq = 5
        "#,
        )
        .unwrap();
        assert!(config.builder::<String>(&Secrets::default()).is_err());
    }

    #[test]
    fn builder_zero_window_fails_at_build() {
        let config = Config::from_toml_str(
            r#"
            [rotation]
            provider_order = []
            window_duration_seconds = 0
        "#,
        )
        .unwrap();
        let result = config
            .builder::<String>(&Secrets::default())
            .unwrap()
            .build();
        assert!(matches!(result, Err(MimirError::Configuration(_))));
    }
}
