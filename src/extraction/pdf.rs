//! Local PDF collaborators: `lopdf` text extraction and `pdftoppm` page rendering.

use super::{ExtractionError, PageRenderer, PageText, StructuredExtractor};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Per-page text extractor backed by `lopdf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    fn extract_blocking(path: &Path) -> Result<Vec<PageText>, ExtractionError> {
        let doc = lopdf::Document::load(path).map_err(|error| ExtractionError::Parse {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?;

        let mut pages = Vec::new();
        for (page_num, _) in doc.get_pages() {
            // Pages whose content stream cannot be decoded are kept as empty text so the
            // scanned-page path can still recover them from the rendered image.
            let text = match doc.extract_text(&[page_num]) {
                Ok(text) => text.trim().to_string(),
                Err(error) => {
                    tracing::debug!(page = page_num, error = %error, "Page text extraction failed");
                    String::new()
                }
            };
            pages.push(PageText {
                page: page_num,
                text,
            });
        }

        if pages.is_empty() {
            pages.push(PageText {
                page: 1,
                text: String::new(),
            });
        }
        Ok(pages)
    }
}

#[async_trait]
impl StructuredExtractor for PdfTextExtractor {
    async fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, ExtractionError> {
        let owned = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::extract_blocking(&owned))
            .await
            .map_err(|error| ExtractionError::Parse {
                path: path.to_path_buf(),
                message: format!("extraction task failed: {error}"),
            })?
    }
}

/// Page renderer that shells out to poppler's `pdftoppm`.
#[derive(Debug, Clone)]
pub struct PdftoppmRenderer {
    program: PathBuf,
}

impl PdftoppmRenderer {
    /// Use `pdftoppm` from `PATH`.
    pub fn new() -> Self {
        Self::with_program("pdftoppm")
    }

    /// Use a specific `pdftoppm` binary.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn render_one(
        &self,
        pdf: &Path,
        out_dir: &Path,
        page: u32,
        dpi: u32,
    ) -> Result<PathBuf, ExtractionError> {
        let prefix = out_dir.join(format!("page_{page}"));
        let page_arg = page.to_string();
        let output = Command::new(&self.program)
            .args(["-png", "-singlefile", "-r", &dpi.to_string()])
            .args(["-f", &page_arg, "-l", &page_arg])
            .arg(pdf)
            .arg(&prefix)
            .output()
            .await
            .map_err(|error| {
                ExtractionError::Render(format!(
                    "failed to run {}: {error}. Make sure poppler-utils is installed.",
                    self.program.display()
                ))
            })?;

        if !output.status.success() {
            return Err(ExtractionError::Render(format!(
                "pdftoppm failed on page {page}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let image = prefix.with_extension("png");
        if !image.exists() {
            return Err(ExtractionError::Render(format!(
                "rendered image missing for page {page}"
            )));
        }
        Ok(image)
    }
}

impl Default for PdftoppmRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageRenderer for PdftoppmRenderer {
    async fn render_pages(
        &self,
        pdf: &Path,
        out_dir: &Path,
        pages: &[u32],
        dpi: u32,
    ) -> Result<Vec<(u32, PathBuf)>, ExtractionError> {
        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(|error| {
                ExtractionError::Render(format!("cannot create {}: {error}", out_dir.display()))
            })?;

        let mut images = Vec::with_capacity(pages.len());
        for &page in pages {
            let image = self.render_one(pdf, out_dir, page, dpi).await?;
            images.push((page, image));
        }
        tracing::debug!(pdf = %pdf.display(), rendered = images.len(), dpi, "Rendered PDF pages");
        Ok(images)
    }
}
