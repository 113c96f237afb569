//! Startup selection of the process-wide embedding capability.
//!
//! The configured models are tried in order exactly once. The outcome is a tagged
//! [`EmbeddingSelection`] carried by an [`ActiveEmbedding`] handle that request handlers
//! receive explicitly; nothing re-attempts selection per request. When every model fails the
//! service keeps running in degraded mode, and any substitute encoder is recorded in the
//! selection so the swap is visible in logs and the health endpoint.

use super::{
    EmbeddingClient, EmbeddingClientError, HashingEmbeddingClient, OllamaEmbeddingClient,
    OpenAiEmbeddingClient,
};
use crate::config::{ApiKey, Config, EmbeddingFallback, EmbeddingProvider};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

const CHECK_TEXT: &str = "embedding capability check";

/// Instantiates an embedding capability for a named model.
#[async_trait]
pub trait EmbeddingLoader: Send + Sync {
    /// Load `model`, failing when it cannot serve embeddings.
    async fn load(&self, model: &str) -> Result<Arc<dyn EmbeddingClient>, EmbeddingClientError>;
}

/// Loads models from the configured HTTP provider and verifies each with a trial embedding.
pub struct HttpEmbeddingLoader {
    provider: EmbeddingProvider,
    base_url: String,
    api_key: Option<ApiKey>,
}

impl HttpEmbeddingLoader {
    /// Build a loader targeting `provider` at `base_url`.
    pub fn new(
        provider: EmbeddingProvider,
        base_url: impl Into<String>,
        api_key: Option<ApiKey>,
    ) -> Self {
        Self {
            provider,
            base_url: base_url.into(),
            api_key,
        }
    }

    /// Build a loader from the embedding section of the configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.embedding_provider,
            config.embedding_url.clone(),
            config.embedding_api_key.clone(),
        )
    }
}

#[async_trait]
impl EmbeddingLoader for HttpEmbeddingLoader {
    async fn load(&self, model: &str) -> Result<Arc<dyn EmbeddingClient>, EmbeddingClientError> {
        let client: Arc<dyn EmbeddingClient> = match self.provider {
            EmbeddingProvider::Ollama => {
                Arc::new(OllamaEmbeddingClient::new(&self.base_url, model)?)
            }
            EmbeddingProvider::OpenAI => Arc::new(OpenAiEmbeddingClient::new(
                &self.base_url,
                model,
                self.api_key.clone(),
            )?),
        };

        let trial = client.generate_embeddings(vec![CHECK_TEXT.to_string()]).await?;
        match trial.first() {
            Some(vector) if !vector.is_empty() => Ok(client),
            _ => Err(EmbeddingClientError::InvalidResponse(format!(
                "model '{model}' returned an empty trial embedding"
            ))),
        }
    }
}

/// Which entry of the attempt list ended up active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingSelection {
    /// The first configured model loaded.
    Primary {
        /// Active model.
        model: String,
    },
    /// A later model in the attempt list loaded.
    Secondary {
        /// Active model.
        model: String,
        /// Zero-based position in the attempt list.
        position: usize,
    },
    /// No configured model loaded.
    Degraded {
        /// Models that were tried.
        attempted: Vec<String>,
        /// Last failure observed.
        reason: String,
        /// Encoder substituted for the configured models, if any.
        substitute: Option<String>,
    },
}

impl fmt::Display for EmbeddingSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary { model } => write!(f, "primary model {model}"),
            Self::Secondary { model, position } => {
                write!(f, "secondary model {model} (attempt {})", position + 1)
            }
            Self::Degraded {
                substitute: Some(substitute),
                ..
            } => write!(f, "degraded: substituted {substitute}"),
            Self::Degraded {
                substitute: None, ..
            } => f.write_str("degraded: no embedding available"),
        }
    }
}

/// Process-wide embedding capability chosen at startup.
#[derive(Clone)]
pub struct ActiveEmbedding {
    selection: EmbeddingSelection,
    client: Option<Arc<dyn EmbeddingClient>>,
}

impl ActiveEmbedding {
    /// Wrap an already constructed client as the primary capability.
    pub fn primary(client: Arc<dyn EmbeddingClient>) -> Self {
        Self {
            selection: EmbeddingSelection::Primary {
                model: client.model_name().to_string(),
            },
            client: Some(client),
        }
    }

    /// Selection outcome.
    pub fn selection(&self) -> &EmbeddingSelection {
        &self.selection
    }

    /// Client used for indexing, absent in degraded mode without a substitute.
    pub fn client(&self) -> Option<&Arc<dyn EmbeddingClient>> {
        self.client.as_ref()
    }

    /// Whether selection fell through to degraded mode.
    pub fn is_degraded(&self) -> bool {
        matches!(self.selection, EmbeddingSelection::Degraded { .. })
    }

    /// Human-readable description for health output.
    pub fn describe(&self) -> String {
        self.selection.to_string()
    }
}

impl fmt::Debug for ActiveEmbedding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveEmbedding")
            .field("selection", &self.selection)
            .field("client", &self.client.as_ref().map(|client| client.model_name()))
            .finish()
    }
}

/// Try each model in `specs` in order and return the first that loads.
///
/// Failures never abort startup. When every model fails, `fallback` (if any) becomes the
/// active client and the substitution is recorded in the returned selection.
pub async fn select_embedding_capability(
    specs: &[String],
    loader: &dyn EmbeddingLoader,
    fallback: Option<Arc<dyn EmbeddingClient>>,
) -> ActiveEmbedding {
    let mut last_error = String::from("no embedding models configured");

    for (position, model) in specs.iter().enumerate() {
        match loader.load(model).await {
            Ok(client) => {
                let selection = if position == 0 {
                    EmbeddingSelection::Primary {
                        model: model.clone(),
                    }
                } else {
                    EmbeddingSelection::Secondary {
                        model: model.clone(),
                        position,
                    }
                };
                tracing::info!(model = %model, position, "Embedding model selected");
                return ActiveEmbedding {
                    selection,
                    client: Some(client),
                };
            }
            Err(error) => {
                tracing::warn!(
                    model = %model,
                    position,
                    error = %error,
                    "Embedding model failed to load"
                );
                last_error = error.to_string();
            }
        }
    }

    let substitute = fallback.as_ref().map(|client| client.model_name().to_string());
    match &substitute {
        Some(name) => tracing::warn!(
            attempted = ?specs,
            substitute = %name,
            "No configured embedding model loaded; substituting local encoder"
        ),
        None => tracing::warn!(
            attempted = ?specs,
            "No configured embedding model loaded; questions will fail until restart"
        ),
    }

    ActiveEmbedding {
        selection: EmbeddingSelection::Degraded {
            attempted: specs.to_vec(),
            reason: last_error,
            substitute,
        },
        client: fallback,
    }
}

/// Resolve the degraded-mode substitute described by the configuration.
pub(crate) fn fallback_from_config(config: &Config) -> Option<Arc<dyn EmbeddingClient>> {
    match config.embedding_fallback {
        EmbeddingFallback::Hashing => Some(Arc::new(HashingEmbeddingClient::new(
            config.embedding_dimension,
        ))),
        EmbeddingFallback::None => None,
    }
}
