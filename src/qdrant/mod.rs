//! Qdrant vector store integration.

pub mod client;
pub mod payload;
pub mod types;

use async_trait::async_trait;

pub use client::QdrantService;
pub use payload::{compute_content_hash, point_id_for};
pub use types::{ChunkPayload, PointInsert, QdrantError, ScoredPoint};

/// Interface implemented by vector store backends.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the target collection when it does not exist yet.
    async fn ensure_collection(&self) -> Result<(), QdrantError>;

    /// Upsert points, returning their ids in input order.
    async fn upsert(&self, points: Vec<PointInsert>) -> Result<Vec<String>, QdrantError>;

    /// Nearest neighbours of `vector`, best first.
    async fn search(&self, vector: Vec<f32>, limit: usize) -> Result<Vec<ScoredPoint>, QdrantError>;
}
