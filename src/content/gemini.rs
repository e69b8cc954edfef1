//! Google Gemini text generation

use super::ContentError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One prompt-in, text-out call made with a specific credential
#[async_trait]
pub trait TextBackend: Send + Sync {
    async fn generate_text(&self, api_key: &str, prompt: &str) -> Result<String, ContentError>;

    fn model_id(&self) -> &str;
}

/// Gemini `generateContent` over HTTPS
pub struct GeminiBackend {
    client: Client,
    base_url: String,
    model_id: String,
    temperature: f32,
}

impl GeminiBackend {
    pub fn new(model_name: &str) -> Result<Self, ContentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ContentError::unknown(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{model_name}:generateContent"
            ),
            model_id: model_name.to_string(),
            temperature: 0.9,
        })
    }

    fn build_request(&self, prompt: &str) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: self.temperature,
            },
        }
    }

    fn extract_text(resp: GeminiResponse) -> Result<String, ContentError> {
        let candidate = resp
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ContentError::unknown("No candidates in response"))?;
        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(ContentError::unknown(format!(
                "Empty candidate (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }
        Ok(text)
    }
}

/// Map an HTTP failure to an error kind
fn classify(status: u16, message: &str) -> ContentError {
    match status {
        400 => ContentError::invalid_request(format!("Invalid request: {message}")),
        401 | 403 => ContentError::auth(format!("Authentication failed: {message}")),
        429 => ContentError::rate_limit(format!("Rate limit exceeded: {message}")),
        500..=599 => ContentError::server_error(format!("Server error: {message}")),
        _ => ContentError::unknown(format!("HTTP {status}: {message}")),
    }
}

#[async_trait]
impl TextBackend for GeminiBackend {
    async fn generate_text(&self, api_key: &str, prompt: &str) -> Result<String, ContentError> {
        let response = self
            .client
            .post(&self.base_url)
            .header("x-goog-api-key", api_key)
            .json(&self.build_request(prompt))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ContentError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    ContentError::network(format!("Connection failed: {e}"))
                } else {
                    ContentError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ContentError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<GeminiErrorResponse>(&body)
                .map_or(body, |r| r.error.message);
            return Err(classify(status.as_u16(), &message));
        }

        let parsed: GeminiResponse = serde_json::from_str(&body)
            .map_err(|e| ContentError::unknown(format!("Failed to parse response: {e}")))?;
        Self::extract_text(parsed)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// Gemini API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}
