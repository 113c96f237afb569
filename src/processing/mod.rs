//! Question-answering pipeline: chunking, per-question indexing, retrieval and generation.

pub mod chunking;
pub mod index;
pub mod query;
mod service;
pub mod types;

pub use index::{CachingIndexBuilder, FreshIndexBuilder, IndexBuilder, RetrievedChunk, VectorIndex};
pub use query::QueryEngine;
pub use service::{DocumentApi, DocumentService, ServiceComponents};
pub use types::{
    AskError, AskStage, ChunkingError, HealthSnapshot, IndexBuildError, QueryError,
    ServiceInitError, UploadError, UploadOutcome, UploadRequest, ValidationError,
};
