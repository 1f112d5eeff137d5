//! Shared types used by the Qdrant client and helpers.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned while interacting with Qdrant.
#[derive(Debug, Error)]
pub enum QdrantError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid Qdrant URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Qdrant responded with an unexpected status code.
    #[error("Unexpected Qdrant response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Qdrant.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Payload stored alongside each chunk vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkPayload {
    /// Owning job.
    pub job_id: String,
    /// Original filename of the document.
    pub filename: String,
    /// Job-level extraction strategy.
    pub route: String,
    /// Position of the chunk within the job.
    pub chunk_index: usize,
    /// Chunk id; equal to `chunk_index`.
    pub chunk_id: usize,
    /// Chunk text.
    pub text: String,
    /// Source page number.
    pub page: u32,
    /// Start offset in the assembled text.
    pub start: usize,
    /// End offset in the assembled text.
    pub end: usize,
    /// Strategy that produced the page text.
    pub used_route: String,
    /// OCR quality score of the page, if OCR ran.
    pub ocr_score: Option<f64>,
    /// SHA-256 of the chunk text.
    pub chunk_hash: String,
    /// RFC 3339 time of indexing.
    pub indexed_at: String,
}

/// Prepared point ready for upsert.
#[derive(Debug, Clone, Serialize)]
pub struct PointInsert {
    /// Deterministic point identifier.
    pub id: String,
    /// Embedding vector produced for the chunk.
    pub vector: Vec<f32>,
    /// Payload stored with the vector.
    pub payload: ChunkPayload,
}

/// Scored payload returned by Qdrant queries.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredPoint {
    /// Identifier assigned to the vector.
    pub id: String,
    /// Similarity score computed by Qdrant.
    pub score: f32,
    /// Optional payload associated with the vector.
    pub payload: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    pub(crate) result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

#[derive(Deserialize)]
pub(crate) struct QueryPoint {
    pub(crate) id: Value,
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}
