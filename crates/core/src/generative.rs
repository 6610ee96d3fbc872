use crate::error::ServiceError;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-pro";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: 0.7,
            max_output_tokens: 800,
        }
    }
}

// Any text-in, text-out model. Implementations map every failure, transport
// or otherwise, into a `ServiceError` before returning.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(
        &self,
        credential: &SecretString,
        request: &GenerationRequest,
    ) -> Result<String, ServiceError>;
}

fn require_key(credential: &SecretString) -> Result<&str, ServiceError> {
    let key = credential.expose_secret();
    if key.trim().is_empty() {
        return Err(ServiceError::Auth("missing API key".to_string()));
    }
    Ok(key)
}

fn transport(err: reqwest::Error) -> ServiceError {
    ServiceError::Transport(err.to_string())
}

fn classify_status(status: StatusCode, body: &str) -> ServiceError {
    let detail = format!("{status}: {}", body.chars().take(200).collect::<String>());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ServiceError::Auth(detail),
        StatusCode::BAD_REQUEST if body.contains("API key") => ServiceError::Auth(detail),
        _ => ServiceError::Transport(detail),
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

/// Google Generative Language `generateContent` client.
pub struct GeminiClient {
    client: Client,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            model: model.into(),
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(
        &self,
        credential: &SecretString,
        request: &GenerationRequest,
    ) -> Result<String, ServiceError> {
        let key = require_key(credential)?;
        let body = serde_json::json!({
            "contents": [
                {
                    "parts": [
                        { "text": request.prompt }
                    ]
                }
            ],
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": request.max_output_tokens
            }
        });

        let resp = self
            .client
            .post(format!("{}/{}:generateContent", self.base_url, self.model))
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }

        let parsed = resp
            .json::<GeminiResponse>()
            .await
            .map_err(|e| ServiceError::Parse(e.to_string()))?;

        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| ServiceError::Parse("no candidates in response".to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: Message,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub content: String,
}

/// OpenAI chat completions client.
pub struct OpenAiClient {
    client: Client,
    model: String,
    url: String,
}

impl OpenAiClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            model: model.into(),
            url: OPENAI_CHAT_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl GenerativeModel for OpenAiClient {
    async fn generate(
        &self,
        credential: &SecretString,
        request: &GenerationRequest,
    ) -> Result<String, ServiceError> {
        let key = require_key(credential)?;
        let body = serde_json::json!({
            "model": self.model,
            "temperature": request.temperature,
            "max_tokens": request.max_output_tokens,
            "messages": [
                {
                    "role": "user",
                    "content": request.prompt
                }
            ]
        });

        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }

        let resp = resp
            .json::<LlmResponse>()
            .await
            .map_err(|e| ServiceError::Parse(e.to_string()))?;

        resp.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ServiceError::Parse("No response from LLM".to_string()))
    }
}

/// Stands in for a provider when running without network access. Every call
/// reports the capability as missing, so content always comes from the banks.
pub struct OfflineModel;

#[async_trait]
impl GenerativeModel for OfflineModel {
    async fn generate(
        &self,
        _credential: &SecretString,
        _request: &GenerationRequest,
    ) -> Result<String, ServiceError> {
        Err(ServiceError::CapabilityMissing)
    }
}
