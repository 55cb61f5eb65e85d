//! The completion capability every provider implements.
//!
//! Remote API clients and the local fallback responder share one trait so
//! the rotator can treat them uniformly.
//!
//! # Failure semantics
//!
//! Remote providers report any transport problem, timeout or non-success
//! status as an error; the rotator logs it and moves on to the next provider.
//! The local fallback must never return an error.
//!
//! # Example
//!
//! ```ignore
//! #[async_trait]
//! impl CompletionProvider for EchoProvider {
//!     fn name(&self) -> &str { "echo" }
//!
//!     async fn issue(&self, prompt: &str, _timeout: Duration) -> Result<String> {
//!         Ok(prompt.to_string())
//!     }
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Provider of text completions for a single prompt.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name, used for rotation order, budgets, logging and metrics.
    fn name(&self) -> &str;

    /// Issue `prompt` upstream and return the completion text.
    ///
    /// `timeout` is the caller's bound for the whole call. Implementations
    /// should pass it to their HTTP client; the rotator enforces it
    /// independently as well.
    async fn issue(&self, prompt: &str, timeout: Duration) -> Result<String>;
}
