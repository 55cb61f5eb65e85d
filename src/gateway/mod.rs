//! Gateway implementations

mod builder;
mod orchestrator;

pub use builder::{
    GEMINI_DEFAULT_LIMIT, GROK_DEFAULT_LIMIT, GROQ_DEFAULT_LIMIT, Mimir, MimirBuilder,
};
pub use orchestrator::{Gateway, GatewayStats, Origin, Resolved};
