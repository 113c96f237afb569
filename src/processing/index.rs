//! Ephemeral semantic indexes over a single document.
//!
//! [`FreshIndexBuilder`] rebuilds the index on every call, which is always consistent with
//! the stored text. [`CachingIndexBuilder`] wraps any builder and memoises results per
//! `(document, content hash)` so repeated questions skip chunking and embedding.

use super::chunking::TextSplitter;
use super::types::{ChunkingError, IndexBuildError};
use crate::{
    embedding::{ActiveEmbedding, EmbeddingClient, EmbeddingClientError},
    metrics::ServiceMetrics,
    store::DocumentId,
};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One chunk of document text with its embedding.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    /// Zero-based position of the chunk in the document.
    pub position: usize,
    /// Chunk text.
    pub text: String,
    /// Embedding of `text`.
    pub vector: Vec<f32>,
}

/// Chunk returned by retrieval, with its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    /// Zero-based position of the chunk in the document.
    pub position: usize,
    /// Chunk text.
    pub text: String,
    /// Cosine similarity to the query embedding.
    pub score: f32,
}

/// Brute-force vector index over one document's chunks.
///
/// The index keeps the embedding client that produced it so questions are embedded by the
/// same model as the chunks.
pub struct VectorIndex {
    document_id: DocumentId,
    chunks: Vec<IndexedChunk>,
    embedding: Arc<dyn EmbeddingClient>,
}

impl VectorIndex {
    /// Assemble an index from pre-embedded chunks.
    pub fn new(
        document_id: DocumentId,
        chunks: Vec<IndexedChunk>,
        embedding: Arc<dyn EmbeddingClient>,
    ) -> Self {
        Self {
            document_id,
            chunks,
            embedding,
        }
    }

    /// Document the index was built from.
    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Embed `text` with the model that built this index.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError> {
        self.embedding
            .generate_embeddings(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| {
                EmbeddingClientError::InvalidResponse("provider returned no query vector".into())
            })
    }

    /// Return up to `top_k` chunks ranked by cosine similarity, best first.
    ///
    /// Ties keep document order.
    pub fn top_k(&self, query: &[f32], top_k: usize) -> Vec<RetrievedChunk> {
        let mut scored: Vec<(f32, &IndexedChunk)> = self
            .chunks
            .iter()
            .map(|chunk| (cosine_similarity(query, &chunk.vector), chunk))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(top_k)
            .map(|(score, chunk)| RetrievedChunk {
                position: chunk.position,
                text: chunk.text.clone(),
                score,
            })
            .collect()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Builds a retrievable index from a document's full text.
#[async_trait]
pub trait IndexBuilder: Send + Sync {
    /// Chunk and embed `text`, the current contents of document `id`.
    async fn build(&self, id: &DocumentId, text: &str)
    -> Result<Arc<VectorIndex>, IndexBuildError>;
}

/// Builds a new index on every call.
pub struct FreshIndexBuilder {
    embedding: ActiveEmbedding,
    splitter: TextSplitter,
    metrics: Arc<ServiceMetrics>,
}

impl FreshIndexBuilder {
    /// Create a builder embedding with `embedding` and chunking with `splitter`.
    pub fn new(
        embedding: ActiveEmbedding,
        splitter: TextSplitter,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            embedding,
            splitter,
            metrics,
        }
    }
}

#[async_trait]
impl IndexBuilder for FreshIndexBuilder {
    async fn build(
        &self,
        id: &DocumentId,
        text: &str,
    ) -> Result<Arc<VectorIndex>, IndexBuildError> {
        if text.trim().is_empty() {
            return Err(IndexBuildError::EmptyDocument(*id));
        }
        let client = self
            .embedding
            .client()
            .cloned()
            .ok_or_else(|| IndexBuildError::EmbeddingUnavailable(self.embedding.describe()))?;

        let splitter = self.splitter.clone();
        let owned = text.to_owned();
        let texts = tokio::task::spawn_blocking(move || splitter.split(&owned))
            .await
            .map_err(|error| ChunkingError::Task(error.to_string()))?;
        if texts.is_empty() {
            return Err(IndexBuildError::EmptyDocument(*id));
        }
        let chunk_count = texts.len();
        tracing::debug!(
            document_id = %id,
            chunks = chunk_count,
            chunk_size = self.splitter.chunk_size(),
            model = client.model_name(),
            "Embedding document chunks"
        );

        let vectors = client.generate_embeddings(texts.clone()).await?;
        if vectors.len() != chunk_count {
            return Err(IndexBuildError::Embedding(EmbeddingClientError::InvalidResponse(
                format!("expected {chunk_count} vectors, got {}", vectors.len()),
            )));
        }

        let chunks = texts
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(position, (text, vector))| IndexedChunk {
                position,
                text,
                vector,
            })
            .collect();
        self.metrics.record_index_build(chunk_count as u64);
        Ok(Arc::new(VectorIndex::new(*id, chunks, client)))
    }
}

/// Memoises another builder's indexes keyed by document and content hash.
pub struct CachingIndexBuilder<B> {
    inner: B,
    cache: Mutex<HashMap<(DocumentId, String), Arc<VectorIndex>>>,
    metrics: Arc<ServiceMetrics>,
}

impl<B> CachingIndexBuilder<B> {
    /// Wrap `inner` with an unbounded cache.
    pub fn new(inner: B, metrics: Arc<ServiceMetrics>) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
            metrics,
        }
    }
}

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl<B> IndexBuilder for CachingIndexBuilder<B>
where
    B: IndexBuilder,
{
    async fn build(
        &self,
        id: &DocumentId,
        text: &str,
    ) -> Result<Arc<VectorIndex>, IndexBuildError> {
        let key = (*id, content_hash(text));
        if let Some(index) = self.cache.lock().await.get(&key).cloned() {
            self.metrics.record_cache_hit();
            tracing::debug!(document_id = %id, "Serving index from cache");
            return Ok(index);
        }

        let index = self.inner.build(id, text).await?;
        self.cache.lock().await.insert(key, Arc::clone(&index));
        Ok(index)
    }
}
