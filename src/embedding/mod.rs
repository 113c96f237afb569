//! Embedding client abstraction, HTTP adapters and the local hashing encoder.

mod selection;

pub use selection::{
    ActiveEmbedding, EmbeddingLoader, EmbeddingSelection, HttpEmbeddingLoader,
    select_embedding_capability,
};
pub(crate) use selection::fallback_from_config;

use crate::config::ApiKey;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider could not be reached or does not serve the requested model.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider response could not be decoded.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Identifier of the model producing the vectors.
    fn model_name(&self) -> &str;

    /// Produce an embedding vector for each supplied chunk of text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Deterministic local encoder hashing character trigrams into a fixed-width vector.
///
/// Needs no model download or network access, which makes it the substitute used in degraded
/// mode and a convenient embedding source for tests.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingClient {
    dimension: usize,
    name: String,
}

impl HashingEmbeddingClient {
    /// Construct an encoder producing vectors of `dimension` entries.
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            name: format!("hashing-trigram-{dimension}"),
        }
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];
        let chars: Vec<char> = text.to_lowercase().chars().collect();

        for window in chars.windows(3) {
            let mut hash = 0xcbf2_9ce4_8422_2325_u64;
            for ch in window {
                let mut buffer = [0_u8; 4];
                for byte in ch.encode_utf8(&mut buffer).bytes() {
                    hash ^= u64::from(byte);
                    hash = hash.wrapping_mul(0x0100_0000_01b3);
                }
            }
            embedding[(hash % self.dimension as u64) as usize] += 1.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();
        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashingEmbeddingClient {
    fn model_name(&self) -> &str {
        &self.name
    }

    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        Ok(texts.iter().map(|text| self.encode(text)).collect())
    }
}

fn build_http_client(purpose: &str) -> Result<Client, EmbeddingClientError> {
    Client::builder()
        .user_agent(format!("pdfqa/{purpose}"))
        .build()
        .map_err(|error| {
            EmbeddingClientError::ProviderUnavailable(format!(
                "failed to build HTTP client: {error}"
            ))
        })
}

async fn error_for_status(
    response: reqwest::Response,
    provider: &str,
) -> Result<reqwest::Response, EmbeddingClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND {
        Err(EmbeddingClientError::ProviderUnavailable(format!(
            "{provider} returned 404: {body}"
        )))
    } else {
        Err(EmbeddingClientError::GenerationFailed(format!(
            "{provider} returned {status}: {body}"
        )))
    }
}

/// Embedding adapter for a local Ollama runtime (`POST /api/embed`).
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbeddingClient {
    /// Build a client for `model` served at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, EmbeddingClientError> {
        Ok(Self {
            http: build_http_client("embed")?,
            base_url: base_url.into(),
            model: model.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let expected = texts.len();
        let response = self
            .http
            .post(self.endpoint())
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;
        let response = error_for_status(response, "Ollama").await?;

        let body: OllamaEmbedResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;
        if body.embeddings.len() != expected {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "expected {expected} embeddings, got {}",
                body.embeddings.len()
            )));
        }
        Ok(body.embeddings)
    }
}

/// Embedding adapter for OpenAI-compatible APIs (`POST /embeddings`).
pub struct OpenAiEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: Option<ApiKey>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingItem>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbeddingClient {
    /// Build a client for `model` served at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<ApiKey>,
    ) -> Result<Self, EmbeddingClientError> {
        Ok(Self {
            http: build_http_client("embed")?,
            base_url: base_url.into(),
            model: model.into(),
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let expected = texts.len();
        let mut request = self
            .http
            .post(self.endpoint())
            .json(&json!({ "model": self.model, "input": texts }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose());
        }
        let response = request.send().await.map_err(|error| {
            EmbeddingClientError::ProviderUnavailable(format!(
                "failed to reach embedding API at {}: {error}",
                self.base_url
            ))
        })?;
        let response = error_for_status(response, "Embedding API").await?;

        let mut body: OpenAiEmbeddingResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::InvalidResponse(format!(
                "failed to decode embedding response: {error}"
            ))
        })?;
        if body.data.len() != expected {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "expected {expected} embeddings, got {}",
                body.data.len()
            )));
        }
        body.data.sort_by_key(|item| item.index);
        Ok(body.data.into_iter().map(|item| item.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn hashing_encoder_is_deterministic_and_normalized() {
        let client = HashingEmbeddingClient::new(64);
        let vectors = client
            .generate_embeddings(vec!["The sky is blue.".into(), "The sky is blue.".into()])
            .await
            .expect("embeddings");

        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], vectors[1]);
        assert_eq!(vectors[0].len(), 64);
        let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert_eq!(client.model_name(), "hashing-trigram-64");
    }

    #[tokio::test]
    async fn hashing_encoder_prefers_overlapping_text() {
        let client = HashingEmbeddingClient::new(256);
        let vectors = client
            .generate_embeddings(vec![
                "What color is the sky?".into(),
                "The sky is blue.".into(),
                "Quarterly revenue grew by four percent.".into(),
            ])
            .await
            .expect("embeddings");

        assert!(cosine(&vectors[0], &vectors[1]) > cosine(&vectors[0], &vectors[2]));
    }

    #[tokio::test]
    async fn hashing_encoder_handles_short_input() {
        let client = HashingEmbeddingClient::new(8);
        let vectors = client.generate_embeddings(vec!["ab".into()]).await.expect("embeddings");
        assert!(vectors[0].iter().all(|value| *value == 0.0));
    }

    #[tokio::test]
    async fn ollama_client_returns_vectors_in_order() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/embed")
                    .json_body_partial(r#"{"model":"all-minilm"}"#);
                then.status(200)
                    .json_body(json!({ "embeddings": [[0.1, 0.2], [0.3, 0.4]] }));
            })
            .await;

        let client = OllamaEmbeddingClient::new(server.base_url(), "all-minilm").expect("client");
        let vectors = client
            .generate_embeddings(vec!["a".into(), "b".into()])
            .await
            .expect("embeddings");

        mock.assert_async().await;
        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }

    #[tokio::test]
    async fn ollama_missing_model_is_reported_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(404).body("model \"missing\" not found");
            })
            .await;

        let client = OllamaEmbeddingClient::new(server.base_url(), "missing").expect("client");
        let error = client
            .generate_embeddings(vec!["a".into()])
            .await
            .expect_err("missing model");

        assert!(matches!(
            error,
            EmbeddingClientError::ProviderUnavailable(message) if message.contains("404")
        ));
    }

    #[tokio::test]
    async fn openai_client_sorts_by_index_and_sends_key() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/embeddings")
                    .header("Authorization", "Bearer sk-embed");
                then.status(200).json_body(json!({
                    "data": [
                        { "index": 1, "embedding": [2.0] },
                        { "index": 0, "embedding": [1.0] }
                    ]
                }));
            })
            .await;

        let client = OpenAiEmbeddingClient::new(
            server.base_url(),
            "text-embedding-3-small",
            Some(ApiKey::new("sk-embed")),
        )
        .expect("client");
        let vectors = client
            .generate_embeddings(vec!["first".into(), "second".into()])
            .await
            .expect("embeddings");

        mock.assert_async().await;
        assert_eq!(vectors, vec![vec![1.0], vec![2.0]]);
    }

    #[tokio::test]
    async fn openai_count_mismatch_is_invalid_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(json!({ "data": [] }));
            })
            .await;

        let client = OpenAiEmbeddingClient::new(server.base_url(), "m", None).expect("client");
        let error = client
            .generate_embeddings(vec!["only".into()])
            .await
            .expect_err("mismatch");
        assert!(matches!(error, EmbeddingClientError::InvalidResponse(_)));
    }
}
