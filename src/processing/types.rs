//! Core data types and error definitions for the processing pipeline.

use crate::{
    embedding::EmbeddingClientError,
    extraction::ExtractionError,
    generation::GenerationError,
    graph::{GraphError, GraphHit},
    processing::{lineage::LineageError, store::StoreError},
    qdrant::{QdrantError, ScoredPoint},
    upstream::UpstreamError,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Extraction method applied to a document or page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Per-page text from the document structure, with per-page fallback.
    Structured,
    /// Optical character recognition of an image.
    Ocr,
    /// Layout-aware markdown from a vision-language model.
    Vision,
}

impl Strategy {
    /// Wire name of the strategy.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Structured => "structured",
            Self::Ocr => "ocr",
            Self::Vision => "vision",
        }
    }

    /// Parse an explicit hint, accepting `docling` and `vlm` as aliases.
    pub fn from_hint(hint: &str) -> Option<Self> {
        match hint.trim().to_ascii_lowercase().as_str() {
            "structured" | "docling" => Some(Self::Structured),
            "ocr" => Some(Self::Ocr),
            "vision" | "vlm" => Some(Self::Vision),
            _ => None,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Submitted, not yet picked up.
    Queued,
    /// Being processed by the orchestrator.
    Running,
    /// Completed successfully.
    Finished,
    /// Stopped by a job-level fault.
    Failed,
}

impl JobStatus {
    /// Whether no further mutation may occur.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

/// Sub-stage label recorded while a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Choosing the extraction strategy.
    Route,
    /// Extracting text.
    Extract,
    /// Splitting text into chunks.
    Chunking,
    /// Requesting vectors.
    Embedding,
    /// Writing vectors.
    QdrantUpsert,
    /// Writing the document graph.
    Neo4j,
    /// Writing the lineage manifest.
    Lineage,
    /// Terminal success.
    Finished,
    /// Terminal failure.
    Failed,
}

/// One document-processing request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Opaque identifier generated at submission.
    pub job_id: String,
    /// Original filename.
    pub filename: String,
    /// Where the upload was stored.
    pub input_path: PathBuf,
    /// Optional strategy hint supplied by the caller.
    #[serde(default)]
    pub route_hint: Option<String>,
    /// Lifecycle state.
    pub status: JobStatus,
    /// Current sub-stage.
    #[serde(default)]
    pub stage: Option<Stage>,
    /// Strategy chosen by the router (possibly reclassified).
    #[serde(default)]
    pub route: Option<Strategy>,
    /// `"<Category>: <message>"` for failed jobs.
    #[serde(default)]
    pub error: Option<String>,
    /// Chunk count once finished.
    #[serde(default)]
    pub chunks: Option<usize>,
    /// Stored vector count once finished.
    #[serde(default)]
    pub qdrant_points: Option<usize>,
    /// Lineage manifest path once written.
    #[serde(default)]
    pub lineage_path: Option<PathBuf>,
    /// First 300 characters of the extracted text.
    #[serde(default)]
    pub text_preview: Option<String>,
    /// SHA-256 of the uploaded bytes.
    #[serde(default)]
    pub input_sha256: Option<String>,
    /// RFC 3339 submission time.
    pub created_at: String,
    /// RFC 3339 time of the last mutation.
    pub updated_at: String,
}

impl Job {
    /// Create a `queued` job record.
    pub fn queued(
        job_id: String,
        filename: String,
        input_path: PathBuf,
        route_hint: Option<String>,
        now: String,
    ) -> Self {
        Self {
            job_id,
            filename,
            input_path,
            route_hint,
            status: JobStatus::Queued,
            stage: None,
            route: None,
            error: None,
            chunks: None,
            qdrant_points: None,
            lineage_path: None,
            text_preview: None,
            input_sha256: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// One page's extraction outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageRecord {
    /// 1-based page number.
    pub page: u32,
    /// Final page text; kept out of the manifest since chunks carry the text.
    #[serde(skip)]
    pub text: String,
    /// Characters in the final text.
    pub text_chars: usize,
    /// Structured extraction yielded too little text.
    pub is_scanned: bool,
    /// Rendered page image, when one was produced.
    pub image: Option<PathBuf>,
    /// Strategy that produced the final text.
    pub used_route: Strategy,
    /// OCR quality score, when OCR ran.
    pub ocr_score: Option<f64>,
    /// Chunks derived from this page.
    pub chunk_ids: Vec<usize>,
}

/// Page-level section of the lineage manifest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageInfo {
    /// Number of pages.
    pub total_pages: usize,
    /// At least one page went through the scanned-page OCR path.
    pub scanned_pdf_detected: bool,
    /// Directory holding rendered page images.
    pub images_dir: Option<PathBuf>,
    /// Per-page records in page order.
    pub pages: Vec<PageRecord>,
}

/// One retrievable unit of text.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    /// Sequential id, unique within the job.
    pub chunk_id: usize,
    /// Source page number.
    pub page: u32,
    /// Byte offset of the chunk in the assembled text.
    pub start: usize,
    /// Byte offset one past the chunk end.
    pub end: usize,
    /// Chunk text.
    pub text: String,
    /// Vector-store point id, once upserted.
    pub qdrant_point_id: Option<String>,
    /// Strategy used for the source page.
    pub used_route: Strategy,
    /// OCR score of the source page.
    pub ocr_score: Option<f64>,
}

impl ChunkRecord {
    /// Byte length of the chunk text.
    pub fn text_len(&self) -> usize {
        self.text.len()
    }
}

/// Error categories recorded on failed jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Input file absent at processing time.
    InputMissing,
    /// Retryable upstream failure that persisted.
    UpstreamTransient,
    /// Non-retryable upstream failure.
    UpstreamPermanent,
    /// A collaborator returned data of the wrong shape.
    DataShapeMismatch,
    /// A required service URL or model is not configured.
    ConfigurationMissing,
    /// Local document parsing or rendering failed.
    Extraction,
    /// Job table or lineage persistence failed.
    Storage,
    /// Local filesystem failure.
    Io,
    /// The process stopped while the job was running.
    Interrupted,
}

impl ErrorCategory {
    /// Label written into job error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InputMissing => "InputMissing",
            Self::UpstreamTransient => "UpstreamTransient",
            Self::UpstreamPermanent => "UpstreamPermanent",
            Self::DataShapeMismatch => "DataShapeMismatch",
            Self::ConfigurationMissing => "ConfigurationMissing",
            Self::Extraction => "Extraction",
            Self::Storage => "Storage",
            Self::Io => "Io",
            Self::Interrupted => "Interrupted",
        }
    }

    fn of_upstream(error: &UpstreamError) -> Self {
        match error {
            UpstreamError::ConfigurationMissing(_) => Self::ConfigurationMissing,
            UpstreamError::InvalidResponse { .. } => Self::DataShapeMismatch,
            error if error.is_transient() => Self::UpstreamTransient,
            _ => Self::UpstreamPermanent,
        }
    }

    fn of_status(status: reqwest::StatusCode) -> Self {
        if status.is_server_error() {
            Self::UpstreamTransient
        } else {
            Self::UpstreamPermanent
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while turning text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible window.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
}

/// Job-level faults that transition a job to `failed`.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The stored input file no longer exists.
    #[error("input file not found: {0}")]
    InputMissing(PathBuf),
    /// Structured extraction failed.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// Whole-document OCR or vision extraction failed.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    /// Chunking failed.
    #[error(transparent)]
    Chunking(#[from] ChunkingError),
    /// The embedding service failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// The vector store failed.
    #[error(transparent)]
    Qdrant(#[from] QdrantError),
    /// The graph store failed.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// Writing the lineage manifest failed.
    #[error(transparent)]
    Lineage(#[from] LineageError),
    /// The job store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Local filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Taxonomy bucket of this fault.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InputMissing(_) => ErrorCategory::InputMissing,
            Self::Extraction(ExtractionError::Read { .. }) => ErrorCategory::Io,
            Self::Extraction(_) => ErrorCategory::Extraction,
            Self::Upstream(error) | Self::Embedding(EmbeddingClientError::Upstream(error)) => {
                ErrorCategory::of_upstream(error)
            }
            Self::Embedding(EmbeddingClientError::GenerationFailed(_)) => {
                ErrorCategory::DataShapeMismatch
            }
            Self::Chunking(_) => ErrorCategory::ConfigurationMissing,
            Self::Qdrant(QdrantError::InvalidUrl(_)) => ErrorCategory::ConfigurationMissing,
            Self::Qdrant(QdrantError::Http(_)) | Self::Graph(GraphError::Http(_)) => {
                ErrorCategory::UpstreamTransient
            }
            Self::Qdrant(QdrantError::UnexpectedStatus { status, .. })
            | Self::Graph(GraphError::UnexpectedStatus { status, .. }) => {
                ErrorCategory::of_status(*status)
            }
            Self::Graph(GraphError::Query { .. }) => ErrorCategory::UpstreamPermanent,
            Self::Graph(GraphError::InvalidRow(_)) => ErrorCategory::DataShapeMismatch,
            Self::Lineage(_) | Self::Store(_) => ErrorCategory::Storage,
            Self::Io(_) => ErrorCategory::Io,
        }
    }

    /// Message stored on the failed job.
    pub fn job_message(&self) -> String {
        format!("{}: {}", self.category(), self)
    }
}

/// Errors raised by search and GraphRAG queries.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The request was rejected before any collaborator was called.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// The embedding service failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Embedding provider returned no vector for the query.
    #[error("Embedding provider returned no vectors for the query")]
    EmptyEmbedding,
    /// The vector store failed.
    #[error(transparent)]
    Qdrant(#[from] QdrantError),
    /// The graph store failed.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// Answer generation failed.
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Job status snapshot returned to API callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusView {
    /// Job identifier.
    pub job_id: String,
    /// Lifecycle state.
    pub status: JobStatus,
    /// Current sub-stage.
    pub stage: Option<Stage>,
    /// Chosen strategy.
    pub route: Option<Strategy>,
    /// Original filename.
    pub filename: Option<String>,
    /// Failure description.
    pub error: Option<String>,
    /// Chunk count.
    pub chunks: Option<usize>,
    /// Stored vector count.
    pub qdrant_points: Option<usize>,
}

impl JobStatusView {
    /// Status reported for ids the store has never seen.
    pub fn not_found(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            status: JobStatus::Failed,
            stage: None,
            route: None,
            filename: None,
            error: Some("job_id not found".to_string()),
            chunks: None,
            qdrant_points: None,
        }
    }
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.job_id.clone(),
            status: job.status,
            stage: job.stage,
            route: job.route,
            filename: Some(job.filename.clone()),
            error: job.error.clone(),
            chunks: job.chunks,
            qdrant_points: job.qdrant_points,
        }
    }
}

/// Final artifact summary; a placeholder while the job is unfinished.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResultView {
    /// Job identifier.
    pub job_id: String,
    /// Strategy used.
    pub route: Strategy,
    /// Beginning of the extracted text.
    pub text_preview: String,
    /// Chunk count.
    pub chunks: usize,
    /// Stored vector count.
    pub qdrant_points: usize,
    /// Lineage manifest path, or empty.
    pub lineage_path: String,
}

/// Placeholder preview reported for unfinished jobs.
pub const NOT_FINISHED_PREVIEW: &str = "(not finished yet)";

impl JobResultView {
    /// Build the result view for `job_id`, whose record may be missing or unfinished.
    pub fn for_job(job_id: &str, job: Option<&Job>) -> Self {
        match job {
            Some(job) if job.status == JobStatus::Finished => Self {
                job_id: job.job_id.clone(),
                route: job.route.unwrap_or(Strategy::Structured),
                text_preview: job.text_preview.clone().unwrap_or_default(),
                chunks: job.chunks.unwrap_or(0),
                qdrant_points: job.qdrant_points.unwrap_or(0),
                lineage_path: display_path(job.lineage_path.as_ref()),
            },
            other => Self {
                job_id: job_id.to_string(),
                route: other.and_then(|job| job.route).unwrap_or(Strategy::Structured),
                text_preview: NOT_FINISHED_PREVIEW.to_string(),
                chunks: 0,
                qdrant_points: 0,
                lineage_path: display_path(other.and_then(|job| job.lineage_path.as_ref())),
            },
        }
    }
}

fn display_path(path: Option<&PathBuf>) -> String {
    path.map(|path| path.display().to_string())
        .unwrap_or_default()
}

/// Similarity search response.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    /// Query text as received.
    pub query: String,
    /// Ranked hits with payloads.
    pub hits: Vec<ScoredPoint>,
}

/// GraphRAG response.
#[derive(Debug, Clone, Serialize)]
pub struct GraphRagAnswer {
    /// Keyword that was searched.
    pub keyword: String,
    /// Whether the most-recent-document fallback supplied the hits.
    pub used_fallback: bool,
    /// Chunks used as context.
    pub hits: Vec<GraphHit>,
    /// Generated answer.
    pub answer: String,
}
