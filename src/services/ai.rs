//! Generative AI client (Gemini `generateContent`) and reply parsing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::config::GeminiConfig;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum AiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid API key header")]
    InvalidApiKey,

    #[error("model returned no text")]
    EmptyResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self { Self { role: ChatRole::User, text: text.into() } }
}

/// Text generation seam; tests swap in a canned implementation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system: Option<&str>, turns: &[ChatTurn]) -> Result<String, AiError>;
}

#[derive(Clone)]
pub struct GeminiClient {
    inner: Arc<GeminiClientInner>,
}

struct GeminiClientInner {
    client: reqwest::Client,
    model: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<ChatRole>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Result<Self, AiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut key = HeaderValue::from_str(config.api_key.expose_secret()).map_err(|_| AiError::InvalidApiKey)?;
        key.set_sensitive(true);
        headers.insert("x-goog-api-key", key);

        let client = reqwest::Client::builder().default_headers(headers).timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { inner: Arc::new(GeminiClientInner { client, model: config.model.clone() }) })
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    #[instrument(skip(self, system, turns), fields(model = %self.inner.model, turns = turns.len()))]
    async fn generate(&self, system: Option<&str>, turns: &[ChatTurn]) -> Result<String, AiError> {
        let request = GenerateRequest {
            system_instruction: system.map(|text| Content { role: None, parts: vec![Part { text }] }),
            contents: turns
                .iter()
                .map(|t| Content { role: Some(t.role), parts: vec![Part { text: &t.text }] })
                .collect(),
            generation_config: GenerationConfig { temperature: 0.4, max_output_tokens: 1024 },
        };

        let url = format!("{GEMINI_API_BASE}/{}:generateContent", self.inner.model);
        let response = self.inner.client.post(url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AiError::Api { status: status.as_u16(), message });
        }

        let body: GenerateResponse = response.json().await?;
        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() { Err(AiError::EmptyResponse) } else { Ok(text) }
    }
}

/// Finds the first JSON array in a model reply, tolerating code fences and
/// surrounding prose. Returns `None` when no balanced array parses.
pub fn extract_json_array(reply: &str) -> Option<Vec<serde_json::Value>> {
    let bytes = reply.as_bytes();
    let mut start = 0;
    while let Some(offset) = reply[start..].find('[') {
        let open = start + offset;
        if let Some(close) = matching_bracket(bytes, open) {
            if let Ok(serde_json::Value::Array(items)) = serde_json::from_str(&reply[open..=close]) {
                return Some(items);
            }
        }
        start = open + 1;
    }
    None
}

/// Index of the `]` closing the `[` at `open`, skipping brackets inside strings.
fn matching_bracket(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 { return Some(i); }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_plain_array() {
        assert_eq!(extract_json_array(r#"["a", "b"]"#), Some(vec![json!("a"), json!("b")]));
    }

    #[test]
    fn test_extract_from_code_fence() {
        let reply = "Here you go:\n```json\n[\"p1\", \"p2\"]\n```\nEnjoy!";
        assert_eq!(extract_json_array(reply), Some(vec![json!("p1"), json!("p2")]));
    }

    #[test]
    fn test_extract_skips_non_json_brackets() {
        let reply = "Based on [your history] I suggest [\"x]y\", \"z\"] today";
        assert_eq!(extract_json_array(reply), Some(vec![json!("x]y"), json!("z")]));
    }

    #[test]
    fn test_extract_nested_objects() {
        let reply = r#"[{"id": "p1", "tags": ["a"]}]"#;
        assert_eq!(extract_json_array(reply), Some(vec![json!({"id": "p1", "tags": ["a"]})]));
    }

    #[test]
    fn test_extract_nothing() {
        assert_eq!(extract_json_array("I cannot help with that."), None);
        assert_eq!(extract_json_array("[unclosed"), None);
    }

    #[test]
    fn test_request_shape() {
        let turns = [ChatTurn::user("hello")];
        let request = GenerateRequest {
            system_instruction: Some(Content { role: None, parts: vec![Part { text: "be brief" }] }),
            contents: turns.iter().map(|t| Content { role: Some(t.role), parts: vec![Part { text: &t.text }] }).collect(),
            generation_config: GenerationConfig { temperature: 0.5, max_output_tokens: 10 },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 10);
    }
}
