#![deny(missing_docs)]

//! Core library for the IDP document ingestion pipeline.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Structured-text extraction, page rendering, and image transcription.
pub mod extraction;
/// Text generation for GraphRAG answers.
pub mod generation;
/// Graph store integration (documents and chunks).
pub mod graph;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// Document processing pipeline and job orchestration.
pub mod processing;
/// Qdrant vector store integration.
pub mod qdrant;
/// Retrying HTTP client shared by upstream model services.
pub mod upstream;
