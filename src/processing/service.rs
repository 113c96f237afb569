//! Document service coordinating extraction, storage, indexing and answering.

use crate::{
    config::Config,
    embedding::{
        ActiveEmbedding, HttpEmbeddingLoader, fallback_from_config, select_embedding_capability,
    },
    extract::{extract_text_blocking, validate_upload},
    generation::{GenerationClient, build_generation_client},
    metrics::{MetricsSnapshot, ServiceMetrics},
    processing::{
        chunking::TextSplitter,
        index::{CachingIndexBuilder, FreshIndexBuilder, IndexBuilder},
        query::QueryEngine,
        types::{
            AskError, AskStage, HealthSnapshot, ServiceInitError, UploadError, UploadOutcome,
            UploadRequest, ValidationError,
        },
    },
    store::{DocumentId, DocumentStore, InMemoryDocumentStore, UploadArchive},
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Owns the document store, the active embedding capability and the answering pipeline.
///
/// Construct the service once near process start and share it through an `Arc`; every
/// HTTP handler reuses the same components.
pub struct DocumentService {
    store: Arc<dyn DocumentStore>,
    archive: Option<UploadArchive>,
    embedding: ActiveEmbedding,
    index_builder: Arc<dyn IndexBuilder>,
    query_engine: QueryEngine,
    ask_timeout: Duration,
    metrics: Arc<ServiceMetrics>,
}

/// Abstraction over the upload/ask pipeline used by the HTTP surface.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    /// Validate, extract and store an uploaded PDF.
    async fn upload(&self, request: UploadRequest) -> Result<UploadOutcome, UploadError>;

    /// Answer `question` about the document identified by `document_id`.
    async fn ask(&self, document_id: &str, question: &str) -> Result<String, AskError>;

    /// Identifiers of stored documents in upload order.
    async fn list_documents(&self) -> Vec<DocumentId>;

    /// Liveness information including the embedding mode.
    async fn health(&self) -> HealthSnapshot;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Pre-built collaborators for [`DocumentService::from_components`].
pub struct ServiceComponents {
    /// Store of record for extracted text.
    pub store: Arc<dyn DocumentStore>,
    /// Optional on-disk copy of uploaded bytes.
    pub archive: Option<UploadArchive>,
    /// Embedding capability chosen at startup.
    pub embedding: ActiveEmbedding,
    /// Answer generation provider.
    pub generation: Arc<dyn GenerationClient>,
    /// Chunker used by the index builder.
    pub splitter: TextSplitter,
    /// Chunks passed to generation per question.
    pub top_k: usize,
    /// Deadline for index build plus answering.
    pub ask_timeout: Duration,
    /// Memoise indexes per document content.
    pub index_cache: bool,
}

impl DocumentService {
    /// Build the service from configuration, probing embedding models and preparing the
    /// upload directory.
    pub async fn from_config(config: &Config) -> Result<Self, ServiceInitError> {
        let archive = UploadArchive::prepare(&config.upload_dir)
            .await
            .map_err(|source| ServiceInitError::UploadDir {
                path: config.upload_dir.clone(),
                source,
            })?;

        tracing::info!(
            provider = ?config.embedding_provider,
            models = ?config.embedding_models,
            "Selecting embedding model"
        );
        let loader = HttpEmbeddingLoader::from_config(config);
        let embedding = select_embedding_capability(
            &config.embedding_models,
            &loader,
            fallback_from_config(config),
        )
        .await;
        tracing::info!(embedding = %embedding.describe(), "Embedding capability ready");

        let generation = build_generation_client(config)?;
        let splitter = TextSplitter::new(
            config.text_splitter_chunk_size,
            config.text_splitter_chunk_overlap,
        )?;

        Ok(Self::from_components(ServiceComponents {
            store: Arc::new(InMemoryDocumentStore::new()),
            archive: Some(archive),
            embedding,
            generation,
            splitter,
            top_k: config.retrieval_top_k,
            ask_timeout: Duration::from_secs(config.ask_timeout_secs),
            index_cache: config.index_cache,
        }))
    }

    /// Assemble the service from already constructed parts.
    pub fn from_components(components: ServiceComponents) -> Self {
        let ServiceComponents {
            store,
            archive,
            embedding,
            generation,
            splitter,
            top_k,
            ask_timeout,
            index_cache,
        } = components;
        let metrics = Arc::new(ServiceMetrics::new());
        let fresh = FreshIndexBuilder::new(embedding.clone(), splitter, Arc::clone(&metrics));
        let index_builder: Arc<dyn IndexBuilder> = if index_cache {
            Arc::new(CachingIndexBuilder::new(fresh, Arc::clone(&metrics)))
        } else {
            Arc::new(fresh)
        };

        Self {
            store,
            archive,
            embedding,
            index_builder,
            query_engine: QueryEngine::new(generation, top_k),
            ask_timeout,
            metrics,
        }
    }

    /// Validate, extract and store an uploaded PDF.
    pub async fn upload(&self, request: UploadRequest) -> Result<UploadOutcome, UploadError> {
        let result = self.store_upload(request).await;
        match &result {
            Ok(outcome) => {
                self.metrics.record_upload();
                tracing::info!(
                    document_id = %outcome.document_id,
                    characters = outcome.characters,
                    "Document uploaded"
                );
            }
            Err(error) => {
                self.metrics.record_rejected_upload();
                tracing::warn!(error = %error, "Upload rejected");
            }
        }
        result
    }

    async fn store_upload(&self, request: UploadRequest) -> Result<UploadOutcome, UploadError> {
        let UploadRequest {
            filename,
            content_type,
            bytes,
        } = request;
        validate_upload(filename.as_deref(), content_type.as_deref())?;
        if bytes.is_empty() {
            return Err(ValidationError::EmptyFile.into());
        }

        let bytes: Arc<[u8]> = bytes.into();
        let text = extract_text_blocking(Arc::clone(&bytes)).await?;
        let characters = text.chars().count();
        let document_id = self.store.put(text).await;

        let archived_path = match &self.archive {
            Some(archive) => match archive.write(&document_id, &bytes).await {
                Ok(path) => Some(path),
                Err(error) => {
                    tracing::warn!(
                        document_id = %document_id,
                        dir = %archive.dir().display(),
                        error = %error,
                        "Failed to archive upload; document kept in memory only"
                    );
                    None
                }
            },
            None => None,
        };

        Ok(UploadOutcome {
            document_id,
            characters,
            archived_path,
        })
    }

    /// Answer `question` about the document identified by `document_id`.
    pub async fn ask(&self, document_id: &str, question: &str) -> Result<String, AskError> {
        let result = self.answer(document_id, question).await;
        match &result {
            Ok(_) => {
                self.metrics.record_answer();
                tracing::debug!(document_id, stage = %AskStage::Answered, "Ask stage");
            }
            Err(error) => {
                self.metrics.record_failed_question();
                tracing::warn!(
                    document_id,
                    stage = %error.failed_stage(),
                    error = %error,
                    "Question failed"
                );
            }
        }
        result
    }

    async fn answer(&self, document_id: &str, question: &str) -> Result<String, AskError> {
        tracing::debug!(document_id, stage = %AskStage::Received, "Ask stage");
        if document_id.trim().is_empty() {
            return Err(ValidationError::MissingField("document_id").into());
        }
        if question.trim().is_empty() {
            return Err(ValidationError::MissingField("question").into());
        }

        tracing::debug!(document_id, stage = %AskStage::DocumentLookup, "Ask stage");
        let not_found = || AskError::NotFound(document_id.trim().to_string());
        let id = DocumentId::parse(document_id).ok_or_else(not_found)?;
        let text = self.store.get(&id).await.ok_or_else(not_found)?;

        let mut reached = AskStage::IndexBuild;
        let pipeline = async {
            tracing::debug!(document_id = %id, stage = %reached, "Ask stage");
            let index = self.index_builder.build(&id, &text).await?;

            reached = AskStage::Retrieve;
            tracing::debug!(document_id = %id, stage = %reached, "Ask stage");
            let context = self.query_engine.retrieve(&index, question).await?;

            reached = AskStage::Generate;
            tracing::debug!(document_id = %id, stage = %reached, "Ask stage");
            let answer = self.query_engine.generate(question, &context).await?;
            Ok::<_, AskError>(answer)
        };

        let outcome = tokio::time::timeout(self.ask_timeout, pipeline).await;
        outcome.unwrap_or_else(|_| {
            Err(AskError::Timeout {
                seconds: self.ask_timeout.as_secs(),
                stage: reached,
            })
        })
    }

    /// Identifiers of stored documents in upload order.
    pub async fn list_documents(&self) -> Vec<DocumentId> {
        self.store.list().await
    }

    /// Liveness information including the embedding mode.
    pub async fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            message: "PDF question answering service is running",
            embedding: self.embedding.describe(),
            degraded: self.embedding.is_degraded(),
            documents: self.store.list().await.len(),
        }
    }

    /// Retrieve the current metrics snapshot for diagnostics.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl DocumentApi for DocumentService {
    async fn upload(&self, request: UploadRequest) -> Result<UploadOutcome, UploadError> {
        DocumentService::upload(self, request).await
    }

    async fn ask(&self, document_id: &str, question: &str) -> Result<String, AskError> {
        DocumentService::ask(self, document_id, question).await
    }

    async fn list_documents(&self) -> Vec<DocumentId> {
        DocumentService::list_documents(self).await
    }

    async fn health(&self) -> HealthSnapshot {
        DocumentService::health(self).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        DocumentService::metrics_snapshot(self)
    }
}
