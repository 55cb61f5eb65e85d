//! Offline fallback responder.

use std::time::Duration;

use async_trait::async_trait;

use super::traits::CompletionProvider;
use crate::Result;

/// Name the default local responder reports.
pub const LOCAL_PROVIDER_NAME: &str = "local";

/// Number of prompt characters echoed back in the templated answer.
const PROMPT_PREVIEW_CHARS: usize = 100;

/// Rule-based responder that needs no network and never fails.
///
/// Answers `"[Local Analysis] Further research needed for: <prompt>..."`
/// with the prompt cut to its first 100 characters.
#[derive(Debug, Clone)]
pub struct TemplateResponder {
    name: String,
    prefix: String,
}

impl TemplateResponder {
    pub fn new() -> Self {
        Self {
            name: LOCAL_PROVIDER_NAME.to_string(),
            prefix: "[Local Analysis] Further research needed for:".to_string(),
        }
    }

    /// Override the text placed before the prompt preview.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Override the reported provider name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Render the templated answer for a prompt.
    pub fn render(&self, prompt: &str) -> String {
        let preview: String = prompt.chars().take(PROMPT_PREVIEW_CHARS).collect();
        format!("{} {preview}...", self.prefix)
    }
}

impl Default for TemplateResponder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionProvider for TemplateResponder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn issue(&self, prompt: &str, _timeout: Duration) -> Result<String> {
        Ok(self.render(prompt))
    }
}
