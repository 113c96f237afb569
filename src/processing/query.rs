//! Retrieval and answer generation over a built index.

use super::index::{RetrievedChunk, VectorIndex};
use super::types::QueryError;
use crate::generation::{GenerationClient, GenerationRequest};
use std::sync::Arc;

/// Standing instruction sent with every question.
pub const SYSTEM_PROMPT: &str = "You answer questions about a single uploaded document. \
Use only the provided context. If the context does not contain the answer, say that you \
do not know.";

/// Default number of chunks passed to the model.
pub const DEFAULT_TOP_K: usize = 3;

/// Render the user turn from retrieved context and the question.
pub fn render_prompt(question: &str, chunks: &[RetrievedChunk]) -> String {
    let context = chunks
        .iter()
        .map(|chunk| chunk.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Context information is below.\n\
         ---------------------\n\
         {context}\n\
         ---------------------\n\
         Given the context information and not prior knowledge, answer the question.\n\
         Question: {question}\n\
         Answer:"
    )
}

/// Answers questions against a [`VectorIndex`] with a generation provider.
#[derive(Clone)]
pub struct QueryEngine {
    generation: Arc<dyn GenerationClient>,
    top_k: usize,
}

impl QueryEngine {
    /// Build an engine passing `top_k` chunks (at least one) to `generation`.
    pub fn new(generation: Arc<dyn GenerationClient>, top_k: usize) -> Self {
        Self {
            generation,
            top_k: top_k.max(1),
        }
    }

    /// Number of chunks retrieved per question.
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Embed `question` and return the best matching chunks.
    pub async fn retrieve(
        &self,
        index: &VectorIndex,
        question: &str,
    ) -> Result<Vec<RetrievedChunk>, QueryError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::EmptyQuestion);
        }
        let query_vector = index.embed_query(question).await?;
        let hits = index.top_k(&query_vector, self.top_k);
        if hits.is_empty() {
            return Err(QueryError::EmptyRetrieval);
        }
        tracing::debug!(
            document_id = %index.document_id(),
            retrieved = hits.len(),
            best_score = hits[0].score,
            "Retrieved context"
        );
        Ok(hits)
    }

    /// Ask the generation provider to answer `question` from `context`.
    pub async fn generate(
        &self,
        question: &str,
        context: &[RetrievedChunk],
    ) -> Result<String, QueryError> {
        let request = GenerationRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: render_prompt(question.trim(), context),
        };
        let answer = self.generation.complete(request).await?;
        Ok(answer.trim().to_string())
    }

    /// Retrieve context for `question` and generate an answer.
    pub async fn query(&self, index: &VectorIndex, question: &str) -> Result<String, QueryError> {
        let context = self.retrieve(index, question).await?;
        self.generate(question, &context).await
    }
}
