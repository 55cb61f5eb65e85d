//! Client for OpenAI-compatible `/chat/completions` endpoints.
//!
//! Groq and xAI both expose this API shape; [`OpenAiCompatClient::groq`]
//! and [`OpenAiCompatClient::grok`] preset their base URLs and models.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http::{check_status, map_transport};
use super::traits::CompletionProvider;
use crate::{MimirError, Result};

const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const GROK_BASE_URL: &str = "https://api.x.ai/v1";

/// Default Groq model.
pub const DEFAULT_GROQ_MODEL: &str = "llama-3.3-70b-versatile";

/// Default xAI model.
pub const DEFAULT_GROK_MODEL: &str = "grok-beta";

/// Client for an OpenAI-compatible chat completions API.
#[derive(Clone)]
pub struct OpenAiCompatClient {
    name: String,
    api_key: String,
    model: String,
    http: Client,
    base_url: String,
    max_tokens: Option<u32>,
}

impl OpenAiCompatClient {
    /// Create a client for any compatible endpoint.
    ///
    /// `base_url` is everything before `/chat/completions`.
    pub fn new(
        name: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            api_key: api_key.into(),
            model: model.into(),
            http: Client::new(),
            base_url: base_url.into(),
            max_tokens: None,
        }
    }

    /// Groq preset.
    pub fn groq(api_key: impl Into<String>) -> Self {
        Self::new("groq", api_key, GROQ_BASE_URL, DEFAULT_GROQ_MODEL).max_tokens(1500)
    }

    /// xAI Grok preset.
    pub fn grok(api_key: impl Into<String>) -> Self {
        Self::new("grok", api_key, GROK_BASE_URL, DEFAULT_GROK_MODEL)
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    /// Point the client at another base URL (for testing with wiremock).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn issue(&self, prompt: &str, timeout: Duration) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport(e, timeout))?;

        let response = check_status(response, &self.name).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| map_transport(e, timeout))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.is_empty())
            .ok_or(MimirError::EmptyResponse)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}
