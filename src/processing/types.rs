//! Core data types and error definitions for the upload and ask pipelines.

use crate::{
    embedding::EmbeddingClientError, extract::ExtractionError, generation::GenerationClientError,
    store::DocumentId,
};
use anyhow::Error as TokenizerError;
use serde::Serialize;
use std::{fmt, path::PathBuf};
use thiserror::Error;

/// Request-shape problems detected before any processing starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Upload carried no file name.
    #[error("Uploaded file has no file name.")]
    MissingFilename,
    /// Upload file name does not carry a `.pdf` extension.
    #[error("Only PDF files are allowed.")]
    NotPdf {
        /// File name supplied by the client.
        filename: String,
    },
    /// Upload declared a content type other than PDF.
    #[error("Unsupported content type '{0}'; only application/pdf is accepted.")]
    UnsupportedContentType(String),
    /// Upload body was empty.
    #[error("Uploaded file is empty.")]
    EmptyFile,
    /// A required request field was absent or blank.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    /// The request body could not be decoded.
    #[error("Malformed request: {0}")]
    Malformed(String),
}

/// Errors produced while turning raw text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Configuration requested an impossible token budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable.
    #[error("failed to initialize tokenizer '{encoding}': {source}")]
    Tokenizer {
        /// Encoding we attempted to load.
        encoding: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
    /// The blocking chunking task panicked or was cancelled.
    #[error("chunking task failed: {0}")]
    Task(String),
}

/// Failures while building the semantic index for one document.
#[derive(Debug, Error)]
pub enum IndexBuildError {
    /// Document text was empty or whitespace only.
    #[error("Document {0} contains no extractable text to index")]
    EmptyDocument(DocumentId),
    /// No embedding model is active (degraded mode without substitute).
    #[error("Embedding capability unavailable: {0}")]
    EmbeddingUnavailable(String),
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors for the chunks.
    #[error("Failed to embed document chunks: {0}")]
    Embedding(#[from] EmbeddingClientError),
}

/// Failures while retrieving context and generating an answer.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Question text was blank.
    #[error("Question must not be empty")]
    EmptyQuestion,
    /// Embedding provider failed to embed the question.
    #[error("Failed to embed question: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Index produced no context for the question.
    #[error("No relevant context was retrieved for the question")]
    EmptyRetrieval,
    /// Generation provider failed or returned nothing usable.
    #[error("Answer generation failed: {0}")]
    Generation(#[from] GenerationClientError),
}

/// Boundary error for the upload operation.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Request was rejected by the upload policy gate.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Bytes could not be parsed as a PDF.
    #[error("Failed to process PDF: {0}")]
    Extraction(#[from] ExtractionError),
}

/// Boundary error for the ask operation.
#[derive(Debug, Error)]
pub enum AskError {
    /// Request was missing a field.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The identifier does not reference a stored document.
    #[error("Invalid document ID: {0}")]
    NotFound(String),
    /// Index construction failed.
    #[error(transparent)]
    IndexBuild(#[from] IndexBuildError),
    /// Retrieval or generation failed.
    #[error(transparent)]
    Query(#[from] QueryError),
    /// Index build and answer generation exceeded the deadline.
    #[error("Answering timed out after {seconds}s during {stage}")]
    Timeout {
        /// Deadline that elapsed.
        seconds: u64,
        /// Stage that was running when the deadline elapsed.
        stage: AskStage,
    },
}

impl AskError {
    /// Pipeline stage at which the request failed.
    pub fn failed_stage(&self) -> AskStage {
        match self {
            Self::Validation(_) => AskStage::Received,
            Self::NotFound(_) => AskStage::DocumentLookup,
            Self::IndexBuild(_) => AskStage::IndexBuild,
            Self::Query(QueryError::Generation(_)) => AskStage::Generate,
            Self::Query(_) => AskStage::Retrieve,
            Self::Timeout { stage, .. } => *stage,
        }
    }
}

/// Progress of a single ask request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AskStage {
    /// Request accepted, fields not yet checked.
    Received,
    /// Resolving the document identifier.
    DocumentLookup,
    /// Chunking and embedding the document.
    IndexBuild,
    /// Ranking chunks against the question.
    Retrieve,
    /// Waiting for the generation provider.
    Generate,
    /// Answer produced.
    Answered,
}

impl fmt::Display for AskStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Received => "received",
            Self::DocumentLookup => "document_lookup",
            Self::IndexBuild => "index_build",
            Self::Retrieve => "retrieve",
            Self::Generate => "generate",
            Self::Answered => "answered",
        })
    }
}

/// Errors that prevent the service from starting.
#[derive(Debug, Error)]
pub enum ServiceInitError {
    /// Upload directory could not be created.
    #[error("Failed to prepare upload directory {path}: {source}")]
    UploadDir {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Text splitter could not be constructed.
    #[error(transparent)]
    Chunking(#[from] ChunkingError),
    /// Generation client could not be constructed.
    #[error("Failed to initialize generation client: {0}")]
    Generation(#[from] GenerationClientError),
}

/// File received by the upload operation.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    /// Client-supplied file name.
    pub filename: Option<String>,
    /// Client-declared content type.
    pub content_type: Option<String>,
    /// Raw file bytes.
    pub bytes: Vec<u8>,
}

/// Summary of a stored upload.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// Identifier assigned to the document.
    pub document_id: DocumentId,
    /// Number of characters extracted from the PDF.
    pub characters: usize,
    /// Location of the archived upload, when archiving succeeded.
    pub archived_path: Option<PathBuf>,
}

/// Liveness snapshot served by the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    /// Static status message.
    pub message: &'static str,
    /// Description of the active embedding capability.
    pub embedding: String,
    /// Whether the service runs in degraded embedding mode.
    pub degraded: bool,
    /// Documents currently stored.
    pub documents: usize,
}
