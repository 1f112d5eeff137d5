//! Lineage manifests: one self-describing JSON record per processed job.

use crate::processing::store::{StoreError, write_json_atomic};
use crate::processing::types::{ChunkRecord, PageInfo, Strategy};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;

/// Characters of chunk text kept in the manifest preview.
pub const PREVIEW_CHARS: usize = 200;

/// Errors raised while writing a manifest.
#[derive(Debug, Error)]
pub enum LineageError {
    /// The manifest file could not be written.
    #[error("failed to write lineage manifest {path}: {source}")]
    Write {
        /// Target path.
        path: PathBuf,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },
}

/// Chunk entry of a manifest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineageChunk {
    /// Sequential chunk id.
    pub chunk_id: usize,
    /// Vector-store point id, when the chunk was stored.
    pub qdrant_point_id: Option<String>,
    /// Source page.
    pub page: u32,
    /// Byte offset in the assembled text.
    pub start: usize,
    /// Byte offset one past the chunk end.
    pub end: usize,
    /// Byte length of the chunk text.
    pub text_len: usize,
    /// Leading characters of the chunk text.
    pub preview: String,
    /// Full chunk text, when enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Strategy used for the source page.
    pub used_route: Strategy,
    /// OCR score of the source page.
    pub ocr_score: Option<f64>,
}

impl LineageChunk {
    /// Project a chunk record into its manifest entry.
    pub fn from_record(record: &ChunkRecord, include_text: bool) -> Self {
        Self {
            chunk_id: record.chunk_id,
            qdrant_point_id: record.qdrant_point_id.clone(),
            page: record.page,
            start: record.start,
            end: record.end,
            text_len: record.text_len(),
            preview: preview(&record.text, PREVIEW_CHARS),
            text: include_text.then(|| record.text.clone()),
            used_route: record.used_route,
            ocr_score: record.ocr_score,
        }
    }
}

/// Durable record of one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineageManifest {
    /// Job identifier.
    pub job_id: String,
    /// Original filename.
    pub filename: String,
    /// Final strategy.
    pub route: Strategy,
    /// Stored upload path.
    pub input_path: PathBuf,
    /// SHA-256 of the uploaded bytes.
    pub input_sha256: Option<String>,
    /// Chunk window used.
    pub chunk_size: usize,
    /// Chunk overlap used.
    pub chunk_overlap: usize,
    /// Number of chunks.
    pub chunk_count: usize,
    /// Number of stored vectors.
    pub qdrant_points: usize,
    /// Wall-clock processing time, rounded to milliseconds.
    pub elapsed_sec: f64,
    /// Local `YYYY-MM-DD HH:MM:SS` creation time.
    pub created_at: String,
    /// Ordered chunk entries.
    pub chunks: Vec<LineageChunk>,
    /// Page-level decisions.
    pub page_info: PageInfo,
}

/// Writes manifests as `<dir>/<job_id>.json`.
#[derive(Debug, Clone)]
pub struct LineageWriter {
    dir: PathBuf,
    include_text: bool,
}

impl LineageWriter {
    /// Create a writer rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>, include_text: bool) -> Self {
        Self {
            dir: dir.into(),
            include_text,
        }
    }

    /// Whether chunk entries carry their full text.
    pub fn include_text(&self) -> bool {
        self.include_text
    }

    /// Manifest location for `job_id`.
    pub fn path_for(&self, job_id: &str) -> PathBuf {
        self.dir.join(format!("{job_id}.json"))
    }

    /// Persist `manifest` and return its path.
    pub async fn write(&self, manifest: &LineageManifest) -> Result<PathBuf, LineageError> {
        let path = self.path_for(&manifest.job_id);
        write_json_atomic(&path, manifest)
            .await
            .map_err(|source| LineageError::Write {
                path: path.clone(),
                source,
            })?;
        tracing::debug!(job_id = %manifest.job_id, path = %path.display(), chunks = manifest.chunk_count, "Lineage manifest written");
        Ok(path)
    }
}

fn preview(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Local wall-clock time formatted for manifests, falling back to UTC when the offset is unknown.
pub fn local_timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    ))
    .unwrap_or_default()
}

/// Round elapsed seconds to three decimals.
pub fn elapsed_seconds(started: std::time::Instant) -> f64 {
    (started.elapsed().as_secs_f64() * 1000.0).round() / 1000.0
}
