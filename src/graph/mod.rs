//! Graph store integration linking documents to their chunks.

pub mod neo4j;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use neo4j::Neo4jService;

/// Errors returned while interacting with the graph store.
#[derive(Debug, Error)]
pub enum GraphError {
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The server responded with an unexpected status code.
    #[error("Unexpected graph response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the server.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// A Cypher statement failed inside an otherwise successful response.
    #[error("Cypher error {code}: {message}")]
    Query {
        /// Neo4j status code.
        code: String,
        /// Error description.
        message: String,
    },
    /// A result row did not have the expected shape.
    #[error("Malformed graph row: {0}")]
    InvalidRow(String),
}

/// Document node written for each processed job.
#[derive(Debug, Clone, Serialize)]
pub struct GraphDocument {
    /// Job identifier; the node key.
    pub job_id: String,
    /// Original filename.
    pub filename: String,
    /// Stored input path.
    pub input_path: String,
    /// Extraction strategy that produced the text.
    pub route: String,
}

/// Chunk node linked to its document by `HAS_CHUNK`.
#[derive(Debug, Clone, Serialize)]
pub struct GraphChunk {
    /// Sequential chunk id within the job.
    pub chunk_id: usize,
    /// Chunk text.
    pub text: String,
    /// Vector-store point id, when upserted.
    pub qdrant_point_id: Option<String>,
    /// Source page number.
    pub page: u32,
    /// Start offset in the assembled text.
    pub start: usize,
    /// End offset in the assembled text.
    pub end: usize,
}

/// Chunk returned from a graph query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphHit {
    /// Filename of the owning document.
    pub filename: String,
    /// Chunk id within the owning job.
    pub chunk_id: usize,
    /// Chunk text.
    pub text: String,
    /// Vector-store point id, if recorded.
    #[serde(default)]
    pub qdrant_point_id: Option<String>,
}

/// Interface implemented by graph backends.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Merge the document node, its chunk nodes, and `HAS_CHUNK` edges.
    async fn upsert_document(
        &self,
        document: &GraphDocument,
        chunks: &[GraphChunk],
    ) -> Result<(), GraphError>;

    /// Chunks whose text contains `keyword`, case-insensitively.
    async fn find_by_keyword(&self, keyword: &str, limit: usize)
    -> Result<Vec<GraphHit>, GraphError>;

    /// First chunks of `filename`, or of the most recently created document.
    async fn fallback_top_chunks(
        &self,
        limit: usize,
        filename: Option<&str>,
    ) -> Result<Vec<GraphHit>, GraphError>;
}
