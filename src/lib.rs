//! Mimir - cached, rate-limit-aware gateway to free-tier LLM APIs
//!
//! Two pieces do the work:
//!
//! - a [`FingerprintCache`]: a strictly bounded LRU keyed by the SHA-256 of
//!   the normalized input, so repeated questions never reach a provider;
//! - a [`ProviderRotator`]: round-robin over remote providers, each with
//!   its own per-window request budget, falling back to a local responder
//!   that always answers.
//!
//! [`Gateway`] composes the two, and [`FactChecker`] builds claim
//! verification on top.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mimir::{FactChecker, Mimir, RateLimit};
//!
//! #[tokio::main]
//! async fn main() -> mimir::Result<()> {
//!     let gateway = Mimir::builder()
//!         .gemini("gemini-key")
//!         .grok("xai-key")
//!         .rate_limit("grok", RateLimit::PerWindow(50))
//!         .build()?;
//!
//!     let checker = FactChecker::new(Arc::new(gateway));
//!     let resolved = checker.check_claim("The Great Wall is visible from space").await;
//!     println!("{:?} via {:?}", resolved.value.verdict, resolved.origin);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod factcheck;
pub mod gateway;
pub mod providers;
pub mod telemetry;
mod version;

pub use error::{MimirError, Result};

pub use cache::{CacheConfig, CachePersistence, Fingerprint, FingerprintCache, JsonFileStore};
pub use config::{Config, Secrets};
pub use factcheck::{FactCheck, FactChecker, ResearchLead, Verdict};
pub use gateway::{Gateway, GatewayStats, Mimir, MimirBuilder, Origin, Resolved};
pub use providers::{
    BudgetSnapshot, Completion, CompletionProvider, GeminiClient, OpenAiCompatClient,
    ProviderRotator, RateLimit, ResponseOrigin, RotationConfig, Selection, TemplateResponder,
};
pub use version::{PKG_NAME, PKG_VERSION};
