//! Provider-based lead qualification.
//!
//! An [`OpenAiQualifier`] asks a chat-completion endpoint to analyze a
//! bounded page excerpt and return a JSON object. The response is
//! parsed defensively: code fences and surrounding prose are tolerated
//! by locating the outermost `{`...`}` span before deserializing.
//! Every failure maps to [`QualifyError`], which the orchestrator
//! treats as "keep the heuristic result."

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{QualifyError, QualifyResult};
use crate::traits::qualifier::{Qualification, Qualifier};

/// Max characters of page text sent to the provider.
pub const EXCERPT_LIMIT: usize = 10_000;

const SYSTEM_PROMPT: &str = "You are a B2B lead-qualification analyst. \
Given text from a company web page, respond with a single JSON object: \
{\"score\": 0-100, \"signals\": [string], \"notes\": string, \
\"industry\": string?, \"summary\": string?}. \
Score reflects buying intent and company quality. Respond with JSON only.";

/// Truncate page text to the provider excerpt bound on a char boundary.
pub fn bounded_excerpt(text: &str) -> &str {
    if text.len() <= EXCERPT_LIMIT {
        return text;
    }
    let mut end = EXCERPT_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Recover a JSON object from free-form provider output.
///
/// Handles fenced code blocks and prose around the object; returns the
/// outermost `{`...`}` span, or the trimmed input when none is found.
pub fn extract_json_span(response: &str) -> &str {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```") {
        let after_start = start + 3;
        // Skip the language identifier if present (e.g., "json\n")
        let content_start = trimmed[after_start..]
            .find('\n')
            .map(|i| after_start + i + 1)
            .unwrap_or(after_start);
        if let Some(end) = trimmed[content_start..].find("```") {
            return extract_json_span(&trimmed[content_start..content_start + end]);
        }
    }

    if let Some(obj_start) = trimmed.find('{') {
        if let Some(obj_end) = trimmed.rfind('}') {
            if obj_end > obj_start {
                return &trimmed[obj_start..=obj_end];
            }
        }
    }

    trimmed
}

/// Parse a provider response into a [`Qualification`].
pub fn parse_qualification(response: &str) -> QualifyResult<Qualification> {
    let span = extract_json_span(response);

    let raw: RawQualification = serde_json::from_str(span)
        .map_err(|e| QualifyError::MalformedResponse(e.to_string()))?;

    Ok(Qualification {
        score: raw.score.clamp(0.0, 100.0).round() as u8,
        signals: raw.signals,
        notes: raw.notes,
        industry: raw.industry,
        summary: raw.summary,
    })
}

/// Wire shape tolerant of float scores and missing fields.
#[derive(Debug, Deserialize)]
struct RawQualification {
    score: f64,
    #[serde(default)]
    signals: Vec<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    industry: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

/// OpenAI-backed qualifier.
#[derive(Clone)]
pub struct OpenAiQualifier {
    client: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl OpenAiQualifier {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to build HTTP client"),
            api_key: SecretString::from(api_key.into()),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    /// Create from the `OPENAI_API_KEY` environment variable.
    ///
    /// Returns `None` when unset: absence of a provider is not an
    /// error, qualification is simply skipped.
    pub fn from_env() -> Option<Self> {
        std::env::var("OPENAI_API_KEY").ok().map(Self::new)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    async fn chat(&self, user: String) -> QualifyResult<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user,
                },
            ],
            temperature: 0.0,
            max_tokens: 1024,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| QualifyError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(QualifyError::Provider(format!("HTTP {}: {}", status, body)));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| QualifyError::Provider(e.to_string()))?;

        chat.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| QualifyError::Provider("empty completion".to_string()))
    }
}

#[async_trait]
impl Qualifier for OpenAiQualifier {
    async fn qualify(&self, excerpt: &str, url: &str) -> QualifyResult<Qualification> {
        let prompt = format!("Source URL: {}\n\nPage text:\n{}", url, bounded_excerpt(excerpt));
        let response = self.chat(prompt).await?;
        parse_qualification(&response)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}
