//! Claim verification on top of the gateway.
//!
//! [`FactChecker`] is the main consumer of the cache + rotation core: claims
//! are fingerprinted, verified once through whichever provider has budget,
//! and served from cache afterwards. Model answers are free text that
//! usually embeds a JSON object; anything unparseable degrades to an
//! `Unverifiable` verdict carrying the raw answer as explanation.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use crate::gateway::{Gateway, Resolved};
use crate::providers::Completion;

const FACT_CHECK_PROMPT: &str = r#"You are a meticulous, fast fact-checker for a live conversation.

Analyze this claim and provide:
1. VERDICT: true, false, partially_true, or unverifiable
2. CONFIDENCE: 0.0 to 1.0
3. SOURCES: List 2-3 credible sources
4. EXPLANATION: Brief 2-3 sentence explanation

Claim to verify: {claim}

Respond in JSON format:
{
    "verdict": "...",
    "confidence": 0.0,
    "sources": ["...", "..."],
    "explanation": "..."
}"#;

const RESEARCH_PROMPT: &str = r#"You are a proactive research assistant monitoring a conversation.
Given this topic/statement, identify 3-5 interesting related facts that would add value to the discussion.

Topic: {topic}

Respond with a JSON array of facts:
[
    {"fact": "...", "relevance": "high/medium/low", "source_type": "academic/news/expert"},
    ...
]"#;

/// Confidence used when the answer carries none.
const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Characters of raw answer kept as explanation when parsing fails.
const RAW_EXPLANATION_CHARS: usize = 500;

/// Outcome of checking a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    True,
    False,
    PartiallyTrue,
    Unverifiable,
}

impl Verdict {
    /// Lenient parse: case-insensitive, accepts spaces/hyphens, anything
    /// unrecognized is `Unverifiable`.
    pub fn parse(s: &str) -> Self {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "true" => Verdict::True,
            "false" => Verdict::False,
            "partially_true" | "partly_true" | "mixed" => Verdict::PartiallyTrue,
            _ => Verdict::Unverifiable,
        }
    }
}

/// A verified claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactCheck {
    /// 12-hex-char identifier derived from the claim and check time.
    pub id: String,
    pub claim: String,
    pub verdict: Verdict,
    /// In `[0.0, 1.0]`.
    pub confidence: f64,
    pub sources: Vec<String>,
    pub explanation: String,
    /// Unix seconds.
    pub checked_at: u64,
    /// Provider whose answer this was built from.
    pub provider: String,
}

impl FactCheck {
    /// Build a fact check from a provider answer.
    pub fn from_completion(claim: &str, completion: &Completion) -> Self {
        let checked_at = unix_now();
        let parsed = extract_json_object(&completion.text)
            .and_then(|json| serde_json::from_str::<RawFactCheck>(json).ok());

        let (verdict, confidence, sources, explanation) = match parsed {
            Some(raw) => (
                raw.verdict
                    .as_deref()
                    .map(Verdict::parse)
                    .unwrap_or(Verdict::Unverifiable),
                raw.confidence
                    .as_ref()
                    .and_then(confidence_from_json)
                    .unwrap_or(DEFAULT_CONFIDENCE),
                raw.sources,
                raw.explanation.unwrap_or_default(),
            ),
            None => {
                debug!(provider = %completion.provider, "answer had no parseable JSON object");
                (
                    Verdict::Unverifiable,
                    DEFAULT_CONFIDENCE,
                    Vec::new(),
                    completion.text.chars().take(RAW_EXPLANATION_CHARS).collect(),
                )
            }
        };

        Self {
            id: fact_id(claim, checked_at),
            claim: claim.to_string(),
            verdict,
            confidence,
            sources,
            explanation,
            checked_at,
            provider: completion.provider.clone(),
        }
    }
}

/// A related fact suggested for a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchLead {
    pub fact: String,
    #[serde(default = "default_relevance")]
    pub relevance: String,
    #[serde(default = "default_source_type")]
    pub source_type: String,
}

fn default_relevance() -> String {
    "medium".to_string()
}

fn default_source_type() -> String {
    "pending".to_string()
}

impl ResearchLead {
    /// Placeholder returned when no usable leads could be parsed.
    pub fn placeholder() -> Self {
        Self {
            fact: "Research in progress...".to_string(),
            relevance: default_relevance(),
            source_type: default_source_type(),
        }
    }
}

/// Claim verification and topic research over a shared gateway.
#[derive(Clone)]
pub struct FactChecker {
    gateway: Arc<Gateway<FactCheck>>,
}

impl FactChecker {
    pub fn new(gateway: Arc<Gateway<FactCheck>>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Gateway<FactCheck> {
        &self.gateway
    }

    /// Verify a claim, serving repeated claims from cache.
    ///
    /// Claims that differ only in case or surrounding whitespace share a
    /// cache entry.
    #[instrument(skip(self, claim), fields(claim_len = claim.len()))]
    pub async fn check_claim(&self, claim: &str) -> Resolved<FactCheck> {
        let claim = claim.trim();
        let prompt = FACT_CHECK_PROMPT.replace("{claim}", claim);
        self.gateway
            .resolve(claim, &prompt, |completion| {
                FactCheck::from_completion(claim, completion)
            })
            .await
    }

    /// Suggest related facts for a topic. Not cached.
    #[instrument(skip(self, topic), fields(topic_len = topic.len()))]
    pub async fn proactive_research(&self, topic: &str) -> Vec<ResearchLead> {
        let prompt = RESEARCH_PROMPT.replace("{topic}", topic.trim());
        let completion = self.gateway.complete(&prompt).await;
        parse_research_leads(&completion.text)
    }
}

/// Parse the first JSON array of leads in an answer, or the placeholder.
pub fn parse_research_leads(text: &str) -> Vec<ResearchLead> {
    extract_json_array(text)
        .and_then(|json| serde_json::from_str::<Vec<ResearchLead>>(json).ok())
        .filter(|leads| !leads.is_empty())
        .unwrap_or_else(|| vec![ResearchLead::placeholder()])
}

#[derive(Deserialize)]
struct RawFactCheck {
    #[serde(default)]
    verdict: Option<String>,
    #[serde(default)]
    confidence: Option<serde_json::Value>,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    explanation: Option<String>,
}

/// Accept a number or a numeric string; clamp to `[0, 1]`.
fn confidence_from_json(value: &serde_json::Value) -> Option<f64> {
    let n = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then(|| n.clamp(0.0, 1.0))
}

/// Span from the first `{` to the last `}`.
fn extract_json_object(text: &str) -> Option<&str> {
    extract_span(text, '{', '}')
}

/// Span from the first `[` to the last `]`.
fn extract_json_array(text: &str) -> Option<&str> {
    extract_span(text, '[', ']')
}

fn extract_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (start < end).then(|| &text[start..=end])
}

fn fact_id(claim: &str, checked_at: u64) -> String {
    let digest = Sha256::new()
        .chain_update(claim.as_bytes())
        .chain_update(checked_at.to_le_bytes())
        .finalize();
    hex::encode(&digest[..6])
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ResponseOrigin;

    fn completion(text: &str) -> Completion {
        Completion {
            text: text.to_string(),
            provider: "gemini".to_string(),
            origin: ResponseOrigin::Remote,
            failed_providers: Vec::new(),
        }
    }

    #[test]
    fn verdict_parse_is_lenient() {
        assert_eq!(Verdict::parse("TRUE"), Verdict::True);
        assert_eq!(Verdict::parse(" false "), Verdict::False);
        assert_eq!(Verdict::parse("Partially True"), Verdict::PartiallyTrue);
        assert_eq!(Verdict::parse("partially-true"), Verdict::PartiallyTrue);
        assert_eq!(Verdict::parse("who knows"), Verdict::Unverifiable);
    }

    #[test]
    fn parses_json_wrapped_in_prose() {
        let text = r#"Sure! Here is my analysis:
```json
{"verdict": "false", "confidence": 0.92, "sources": ["NASA"], "explanation": "Rayleigh scattering."}
```"#;
        let fact = FactCheck::from_completion("the sky is green", &completion(text));
        assert_eq!(fact.verdict, Verdict::False);
        assert_eq!(fact.confidence, 0.92);
        assert_eq!(fact.sources, vec!["NASA"]);
        assert_eq!(fact.explanation, "Rayleigh scattering.");
        assert_eq!(fact.provider, "gemini");
        assert_eq!(fact.id.len(), 12);
    }

    #[test]
    fn unparseable_answer_is_unverifiable() {
        let long = "x".repeat(800);
        let fact = FactCheck::from_completion("claim", &completion(&long));
        assert_eq!(fact.verdict, Verdict::Unverifiable);
        assert_eq!(fact.confidence, DEFAULT_CONFIDENCE);
        assert!(fact.sources.is_empty());
        assert_eq!(fact.explanation.len(), RAW_EXPLANATION_CHARS);
    }

    #[test]
    fn invalid_json_falls_back_to_raw_text() {
        let fact = FactCheck::from_completion("claim", &completion("{not json}"));
        assert_eq!(fact.verdict, Verdict::Unverifiable);
        assert_eq!(fact.explanation, "{not json}");
    }

    #[test]
    fn confidence_is_clamped_and_accepts_strings() {
        let fact = FactCheck::from_completion(
            "c",
            &completion(r#"{"verdict":"true","confidence":"1.7"}"#),
        );
        assert_eq!(fact.confidence, 1.0);
        let fact = FactCheck::from_completion(
            "c",
            &completion(r#"{"verdict":"true","confidence":null}"#),
        );
        assert_eq!(fact.confidence, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn research_leads_parse_and_placeholder() {
        let leads = parse_research_leads(
            r#"Leads: [{"fact": "Octopuses have three hearts", "relevance": "high", "source_type": "academic"}]"#,
        );
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].relevance, "high");

        let fallback = parse_research_leads("[Local Analysis] Further research needed for: x...");
        assert_eq!(fallback, vec![ResearchLead::placeholder()]);
    }

    #[test]
    fn extract_span_requires_ordered_delimiters() {
        assert_eq!(extract_json_object("} {"), None);
        assert_eq!(extract_json_object("a {b} c"), Some("{b}"));
    }

    #[test]
    fn fact_id_is_twelve_lowercase_hex_chars() {
        let id = fact_id("Bananas are berries", 1_700_000_000);
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(id, fact_id("Bananas are berries", 1_700_000_000));
        assert_ne!(id, fact_id("Bananas are berries", 1_700_000_001));
    }
}
