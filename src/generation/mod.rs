//! Answer generation via hosted or local language models.
//!
//! Both adapters issue a single non-streaming HTTP request per call. Retries live in
//! [`RetryingGenerationClient`] so the adapters stay one-shot.

mod retry;

pub use retry::{RetryPolicy, RetryingGenerationClient};

use crate::config::{ApiKey, Config, GenerationProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const TEMPERATURE: f32 = 0.1;

/// Errors surfaced while generating an answer.
#[derive(Debug, Error)]
pub enum GenerationClientError {
    /// Provider requires a credential that was not configured.
    #[error("Generation provider credentials missing: {0}")]
    MissingCredentials(String),
    /// Provider could not be reached.
    #[error("Failed to reach generation provider: {0}")]
    Transport(String),
    /// Provider answered with a non-success status.
    #[error("Generation provider returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as returned by the provider.
        body: String,
    },
    /// Provider response could not be decoded or was empty.
    #[error("Malformed generation response: {0}")]
    InvalidResponse(String),
}

impl GenerationClientError {
    /// Whether repeating the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            Self::MissingCredentials(_) | Self::InvalidResponse(_) => false,
        }
    }
}

/// Prompt passed to the generation provider.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Standing instructions for the model.
    pub system: String,
    /// User turn carrying retrieved context and the question.
    pub prompt: String,
}

/// Interface implemented by generation providers.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Produce a completion for `request`.
    async fn complete(&self, request: GenerationRequest) -> Result<String, GenerationClientError>;
}

/// Build the configured generation client wrapped in the retry policy.
pub fn build_generation_client(
    config: &Config,
) -> Result<Arc<dyn GenerationClient>, GenerationClientError> {
    let timeout = Duration::from_secs(config.ask_timeout_secs);
    let policy = RetryPolicy::new(
        config.generation_max_attempts,
        Duration::from_millis(config.generation_backoff_ms),
    );
    let client: Arc<dyn GenerationClient> = match config.generation_provider {
        GenerationProvider::OpenAI => {
            let api_key = config.generation_api_key.clone().ok_or_else(|| {
                GenerationClientError::MissingCredentials("GENERATION_API_KEY is not set".into())
            })?;
            Arc::new(RetryingGenerationClient::new(
                OpenAiGenerationClient::new(
                    &config.generation_url,
                    &config.generation_model,
                    api_key,
                    timeout,
                )?,
                policy,
            ))
        }
        GenerationProvider::Ollama => Arc::new(RetryingGenerationClient::new(
            OllamaGenerationClient::new(&config.generation_url, &config.generation_model, timeout)?,
            policy,
        )),
    };
    tracing::info!(
        provider = ?config.generation_provider,
        model = %config.generation_model,
        max_attempts = config.generation_max_attempts,
        "Generation client initialized"
    );
    Ok(client)
}

fn build_http_client(timeout: Duration) -> Result<Client, GenerationClientError> {
    Client::builder()
        .user_agent("pdfqa/generate")
        .timeout(timeout)
        .build()
        .map_err(|error| {
            GenerationClientError::Transport(format!("failed to build HTTP client: {error}"))
        })
}

async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, GenerationClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GenerationClientError::Status {
        status: status.as_u16(),
        body,
    })
}

fn non_empty(answer: &str) -> Result<String, GenerationClientError> {
    let trimmed = answer.trim();
    if trimmed.is_empty() {
        Err(GenerationClientError::InvalidResponse(
            "provider returned an empty completion".into(),
        ))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Chat-completions adapter for OpenAI-compatible APIs.
pub struct OpenAiGenerationClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: ApiKey,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiGenerationClient {
    /// Build a client for `model` at `base_url`.
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: ApiKey,
        timeout: Duration,
    ) -> Result<Self, GenerationClientError> {
        Ok(Self {
            http: build_http_client(timeout)?,
            base_url: base_url.to_string(),
            model: model.to_string(),
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl GenerationClient for OpenAiGenerationClient {
    async fn complete(&self, request: GenerationRequest) -> Result<String, GenerationClientError> {
        let payload = json!({
            "model": self.model,
            "temperature": TEMPERATURE,
            "stream": false,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt }
            ]
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(self.api_key.expose())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationClientError::Transport(format!("{}: {error}", self.base_url))
            })?;
        let response = ensure_success(response).await?;

        let body: ChatCompletionResponse = response.json().await.map_err(|error| {
            GenerationClientError::InvalidResponse(format!("failed to decode completion: {error}"))
        })?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        non_empty(&content)
    }
}

/// Adapter for a local Ollama runtime (`POST /api/generate`).
pub struct OllamaGenerationClient {
    http: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

impl OllamaGenerationClient {
    /// Build a client for `model` at `base_url`.
    pub fn new(
        base_url: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, GenerationClientError> {
        Ok(Self {
            http: build_http_client(timeout)?,
            base_url: base_url.to_string(),
            model: model.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl GenerationClient for OllamaGenerationClient {
    async fn complete(&self, request: GenerationRequest) -> Result<String, GenerationClientError> {
        let payload = json!({
            "model": self.model,
            "system": request.system,
            "prompt": request.prompt,
            "stream": false,
            "options": { "temperature": TEMPERATURE }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationClientError::Transport(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;
        let response = ensure_success(response).await?;

        let body: OllamaResponse = response.json().await.map_err(|error| {
            GenerationClientError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;
        if !body.done {
            return Err(GenerationClientError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }
        non_empty(&body.response)
    }
}
