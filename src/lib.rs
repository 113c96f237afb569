#![deny(missing_docs)]

//! Core library for the PDF question-answering service.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction, adapters and startup model selection.
pub mod embedding;
/// PDF text extraction and the upload policy gate.
pub mod extract;
/// Answer generation clients and retry policy.
pub mod generation;
/// Structured logging and tracing setup.
pub mod logging;
/// Upload and question counters.
pub mod metrics;
/// Chunking, indexing, retrieval and the upload/ask service.
pub mod processing;
/// In-memory document store and upload archive.
pub mod store;
