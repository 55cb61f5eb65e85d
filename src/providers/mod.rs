//! Completion providers and the rotation that spreads load across them.
//!
//! - [`traits::CompletionProvider`]: the single capability every provider
//!   implements, including the local fallback.
//! - [`GeminiClient`], [`OpenAiCompatClient`]: HTTP clients for the
//!   upstream APIs.
//! - [`TemplateResponder`]: offline responder that never fails.
//! - [`ProviderRotator`]: round-robin selection with per-window budgets and
//!   a cascading fallback chain.

pub mod budget;
pub mod gemini;
mod http;
pub mod local;
pub mod openai_compat;
pub mod rotation;
pub mod traits;

pub use budget::{BudgetSnapshot, ProviderBudget, RateLimit};
pub use gemini::GeminiClient;
pub use local::{LOCAL_PROVIDER_NAME, TemplateResponder};
pub use openai_compat::OpenAiCompatClient;
pub use rotation::{
    Completion, DEFAULT_REQUEST_TIMEOUT, DEFAULT_WINDOW, ProviderRotator, ResponseOrigin,
    RotationConfig, Selection,
};
pub use traits::CompletionProvider;
