//! Collaborator contracts for turning input files into text.
//!
//! Three capabilities feed the pipeline: a structured-text extractor that returns per-page text,
//! a page renderer that rasterizes selected PDF pages, and image transcribers (OCR and vision
//! models) that turn image bytes into text or markdown.

pub mod pdf;
pub mod vision;

use crate::upstream::UpstreamError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use pdf::{PdfTextExtractor, PdftoppmRenderer};
pub use vision::{ChatImageClient, TranscriptionMode};

/// Errors raised by local extraction collaborators.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The document could not be read from disk.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Path that failed to load.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// The document could not be parsed.
    #[error("Failed to parse PDF {path}: {message}")]
    Parse {
        /// Path of the offending document.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },
    /// Rasterizing pages failed.
    #[error("Failed to render pages: {0}")]
    Render(String),
}

/// Text extracted from one page of a structured document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// 1-based page number.
    pub page: u32,
    /// Extracted text, trimmed.
    pub text: String,
}

/// Extracts per-page text from structured documents.
#[async_trait]
pub trait StructuredExtractor: Send + Sync {
    /// Return the document's pages in order.
    async fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, ExtractionError>;
}

/// Rasterizes selected pages of a PDF.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Render `pages` (1-based) into `out_dir`, returning the image written for each page.
    async fn render_pages(
        &self,
        pdf: &Path,
        out_dir: &Path,
        pages: &[u32],
        dpi: u32,
    ) -> Result<Vec<(u32, PathBuf)>, ExtractionError>;
}

/// Turns an image into text using a remote model.
#[async_trait]
pub trait ImageTranscriber: Send + Sync {
    /// Transcribe `image` of the given MIME type.
    async fn transcribe(&self, image: &[u8], mime: &str) -> Result<String, UpstreamError>;
}

/// Guess the MIME type forwarded with an image, defaulting to PNG.
pub fn image_mime_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first()
        .filter(|mime| mime.type_() == mime_guess::mime::IMAGE)
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_else(|| "image/png".to_string())
}
