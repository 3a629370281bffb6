//! Minimal model-agnostic chat-completions client.
//!
//! This crate provides the LLM backend contract for the intelligence core:
//! - A `Backend` trait exposing a single async completion operation
//! - A concrete `HttpBackend` for OpenAI-compatible endpoints (a local
//!   Ollama server by default)
//! - A typed error taxonomy the caller can branch retry policy on

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_BASE_URL: &str = "http://localhost:11434/v1";
const DEFAULT_MODEL: &str = "llama3.2";

/// Errors a completion call can produce.
///
/// The taxonomy matters more than the message: `Transient` and `RateLimited`
/// are retryable, `Auth` and `Invalid` are not.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Transient backend failure: {0}")]
    Transient(String),

    #[error("Rate limited{}", retry_after_suffix(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid request or response: {0}")]
    Invalid(String),
}

fn retry_after_suffix(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(", retry after {}s", d.as_secs()),
        None => String::new(),
    }
}

impl Error {
    /// Whether the retry policy may attempt this request again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient(_) | Error::RateLimited { .. })
    }
}

/// A completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: Option<String>,
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub deadline: Duration,
}

impl CompletionRequest {
    /// Create a request with the given system and user prompts.
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: None,
            system: system.into(),
            prompt: prompt.into(),
            temperature: 0.7,
            max_tokens: 800,
            deadline: Duration::from_secs(30),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

/// A successful completion.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub usage: Usage,
}

/// Token usage reported by the backend.
#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// The backend contract: one async completion operation.
///
/// The core is model-agnostic; anything that can turn a prompt pair into
/// text (or a typed error) within the deadline satisfies this.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, Error>;
}

/// HTTP backend for OpenAI-compatible chat-completions endpoints.
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpBackend {
    /// Create a backend against the given base URL (e.g. an Ollama server).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.into(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Create a backend from environment variables.
    ///
    /// Reads `LLM_API_BASE`, `LLM_API_KEY` and `LLM_MODEL`, defaulting to a
    /// local Ollama endpoint with no key.
    pub fn from_env() -> Self {
        let mut backend = Self::new(
            std::env::var("LLM_API_BASE").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        );
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            backend = backend.with_api_key(key);
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            backend = backend.with_model(model);
        }
        backend
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the default model for this backend.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(ref key) = self.api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {key}"))
                    .map_err(|e| Error::Invalid(format!("Invalid API key: {e}")))?,
            );
        }
        Ok(headers)
    }

    fn build_body(&self, request: &CompletionRequest) -> ApiRequest {
        ApiRequest {
            model: request.model.clone().unwrap_or_else(|| self.model.clone()),
            messages: vec![
                ApiMessage {
                    role: "system".to_string(),
                    content: request.system.clone(),
                },
                ApiMessage {
                    role: "user".to_string(),
                    content: request.prompt.clone(),
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: ResponseFormat {
                r#type: "json_object".to_string(),
            },
        }
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, Error> {
        let headers = self.build_headers()?;
        let body = self.build_body(&request);
        let deadline = request.deadline;

        let send = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .headers(headers)
            .json(&body)
            .send();

        let response = tokio::time::timeout(deadline, send)
            .await
            .map_err(|_| Error::Transient(format!("deadline of {deadline:?} exceeded")))?
            .map_err(|e| Error::Transient(format!("network error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                429 => Error::RateLimited { retry_after: None },
                401 | 403 => Error::Auth(message),
                500..=599 => Error::Transient(format!("status {status}: {message}")),
                _ => Error::Invalid(format!("status {status}: {message}")),
            });
        }

        let api: ApiResponse = tokio::time::timeout(deadline, response.json())
            .await
            .map_err(|_| Error::Transient(format!("deadline of {deadline:?} exceeded")))?
            .map_err(|e| Error::Invalid(format!("malformed response body: {e}")))?;

        let choice = api
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Invalid("response contained no choices".to_string()))?;

        Ok(Completion {
            text: choice.message.content,
            model: api.model,
            usage: Usage {
                prompt_tokens: api.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
                completion_tokens: api
                    .usage
                    .as_ref()
                    .map(|u| u.completion_tokens)
                    .unwrap_or(0),
            },
        })
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    temperature: f32,
    max_tokens: usize,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ApiChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_creation() {
        let backend = HttpBackend::new("http://localhost:11434/v1");
        assert_eq!(backend.model, DEFAULT_MODEL);
        assert!(backend.api_key.is_none());
    }

    #[test]
    fn test_backend_with_model() {
        let backend = HttpBackend::new("http://localhost:11434/v1").with_model("mistral");
        assert_eq!(backend.model, "mistral");
    }

    #[test]
    fn test_request_builder() {
        let request = CompletionRequest::new("You are a narrator.", "Describe a cave.")
            .with_temperature(0.4)
            .with_max_tokens(200)
            .with_deadline(Duration::from_secs(5));

        assert_eq!(request.temperature, 0.4);
        assert_eq!(request.max_tokens, 200);
        assert_eq!(request.deadline, Duration::from_secs(5));
        assert!(request.model.is_none());
    }

    #[test]
    fn test_error_retryability() {
        assert!(Error::Transient("timeout".into()).is_retryable());
        assert!(Error::RateLimited { retry_after: None }.is_retryable());
        assert!(!Error::Auth("bad key".into()).is_retryable());
        assert!(!Error::Invalid("garbage".into()).is_retryable());
    }

    #[test]
    fn test_body_shape() {
        let backend = HttpBackend::new("http://x").with_model("mistral");
        let body = backend.build_body(&CompletionRequest::new("sys", "user"));
        assert_eq!(body.model, "mistral");
        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[0].role, "system");
        assert_eq!(body.messages[1].role, "user");
        assert_eq!(body.response_format.r#type, "json_object");
    }
}
