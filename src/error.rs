//! Mimir error types

use std::time::Duration;

/// Mimir error types
#[derive(Debug, thiserror::Error)]
pub enum MimirError {
    // Provider/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("provider timed out after {0:?}")]
    Timeout(Duration),

    #[error("empty response from provider")]
    EmptyResponse,

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Persistence errors
    #[error("storage error: {0}")]
    Storage(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl MimirError {
    /// Whether this error means "this provider could not answer, try the next one".
    ///
    /// Every transport-level or upstream failure qualifies. Storage and
    /// configuration errors never come out of a provider call and are
    /// excluded.
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            MimirError::Http(_)
                | MimirError::Api { .. }
                | MimirError::RateLimited { .. }
                | MimirError::AuthenticationFailed
                | MimirError::Timeout(_)
                | MimirError::EmptyResponse
                | MimirError::Json(_)
        )
    }

    /// Short, stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            MimirError::Http(_) => "http",
            MimirError::Api { .. } => "api",
            MimirError::RateLimited { .. } => "rate_limited",
            MimirError::AuthenticationFailed => "auth",
            MimirError::Timeout(_) => "timeout",
            MimirError::EmptyResponse => "empty",
            MimirError::Json(_) => "json",
            MimirError::Storage(_) => "storage",
            MimirError::Configuration(_) => "configuration",
        }
    }
}

impl From<reqwest::Error> for MimirError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest doesn't report which limit fired
            MimirError::Timeout(Duration::ZERO)
        } else if let Some(status) = err.status() {
            MimirError::Api {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            MimirError::Http(err.to_string())
        }
    }
}

/// Result type alias for Mimir operations
pub type Result<T> = std::result::Result<T, MimirError>;
