//! Per-page extraction quality checks and OCR/vision escalation.
//!
//! Each page of a structured document starts from its baseline text. Pages that look like tables
//! are re-extracted by the vision model; pages with almost no text are treated as scanned and sent
//! through OCR, escalating to vision when the OCR output looks garbled or tabular. Every remote
//! call is fault-tolerant: a failure keeps the best text already available for that page.

use crate::extraction::{ImageTranscriber, image_mime_for};
use crate::processing::types::{PageRecord, Strategy};
use crate::upstream::UpstreamError;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;

/// Baseline text shorter than this (in characters) marks a page as scanned.
pub const MIN_TEXT_CHARS: usize = 20;
/// OCR output scoring below this is escalated to vision extraction.
pub const OCR_MIN_SCORE: f64 = 0.55;

const SHORT_OCR_CHARS: usize = 50;
const SHORT_OCR_SCORE: f64 = 0.1;

static COLUMN_GAP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("column gap pattern is valid"));

/// Whether `text` looks like a table whose column layout was flattened by text extraction.
///
/// Requires at least four non-blank lines, at least two lines with two or more runs of
/// multi-space alignment, and a digit ratio above 0.15.
pub fn looks_like_table(text: &str) -> bool {
    let text = text.trim();
    if text.is_empty() {
        return false;
    }

    let lines: Vec<&str> = text.lines().filter(|line| !line.trim().is_empty()).collect();
    if lines.len() < 4 {
        return false;
    }

    let columnar_lines = lines
        .iter()
        .filter(|line| COLUMN_GAP.find_iter(line).count() >= 2)
        .count();

    let total = text.chars().count();
    let digits = text.chars().filter(|&ch| is_decimal_digit(ch)).count();
    let digit_ratio = digits as f64 / total.max(1) as f64;

    columnar_lines >= 2 && digit_ratio > 0.15
}

/// ASCII or full-width decimal digit. Roman numerals and vulgar fractions do not count.
fn is_decimal_digit(ch: char) -> bool {
    ch.is_ascii_digit() || ('\u{FF10}'..='\u{FF19}').contains(&ch)
}

/// Score OCR output in `[0, 1]`; higher means fluent, non-garbled text.
///
/// `0.7 * (1 - bad_ratio) + 0.3 * min(1, 3 * cjk_ratio)`, where bad characters are U+FFFD and
/// control characters below U+0009. Empty text scores 0 and text under 50 characters scores 0.1.
pub fn assess_ocr_quality(text: &str) -> f64 {
    let text = text.trim();
    if text.is_empty() {
        return 0.0;
    }

    let total = text.chars().count();
    if total < SHORT_OCR_CHARS {
        return SHORT_OCR_SCORE;
    }

    let bad = text
        .chars()
        .filter(|&ch| ch == char::REPLACEMENT_CHARACTER || (ch as u32) < 9)
        .count();
    let cjk = text
        .chars()
        .filter(|ch| ('\u{4e00}'..='\u{9fff}').contains(ch))
        .count();

    let total = total as f64;
    let bad_ratio = bad as f64 / total;
    let cjk_ratio = cjk as f64 / total;
    let score = 0.7 * (1.0 - bad_ratio) + 0.3 * (cjk_ratio * 3.0).min(1.0);
    score.clamp(0.0, 1.0)
}

/// Whether a page with this baseline text needs a rendered image.
pub fn needs_image(base_text: &str) -> bool {
    let base_text = base_text.trim();
    base_text.chars().count() < MIN_TEXT_CHARS || looks_like_table(base_text)
}

fn round3(score: f64) -> f64 {
    (score * 1000.0).round() / 1000.0
}

/// Why a single page-level transcription did not produce text.
#[derive(Debug, Error)]
pub enum PageFault {
    /// The rendered image could not be read.
    #[error("failed to read page image: {0}")]
    Image(#[from] std::io::Error),
    /// The remote model failed.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Applies the per-page fallback policy using the supplied OCR and vision transcribers.
pub struct FallbackEngine<'a> {
    ocr: &'a dyn ImageTranscriber,
    vision: &'a dyn ImageTranscriber,
}

impl<'a> FallbackEngine<'a> {
    /// Create an engine over the given transcribers.
    pub fn new(ocr: &'a dyn ImageTranscriber, vision: &'a dyn ImageTranscriber) -> Self {
        Self { ocr, vision }
    }

    /// Decide the final text for one page.
    ///
    /// Never fails: OCR and vision faults degrade to the best text already available.
    pub async fn resolve_page(
        &self,
        page: u32,
        base_text: &str,
        image: Option<&Path>,
    ) -> PageRecord {
        let base_text = base_text.trim();
        let is_scanned = base_text.chars().count() < MIN_TEXT_CHARS;

        let mut text = base_text.to_string();
        let mut used_route = Strategy::Structured;
        let mut ocr_score = None;

        match image {
            Some(image) if looks_like_table(base_text) => {
                match transcribe_image(self.vision, image).await {
                    Ok(markdown) => {
                        tracing::debug!(page, "Table-like page re-extracted by vision model");
                        text = markdown;
                        used_route = Strategy::Vision;
                    }
                    Err(error) => {
                        tracing::warn!(page, error = %error, "Vision extraction failed; keeping baseline text");
                    }
                }
            }
            Some(image) if is_scanned => {
                let ocr_text = match transcribe_image(self.ocr, image).await {
                    Ok(ocr_text) => ocr_text,
                    Err(error) => {
                        tracing::warn!(page, error = %error, "OCR failed; treating page text as empty");
                        String::new()
                    }
                };
                let score = assess_ocr_quality(&ocr_text);
                ocr_score = Some(round3(score));

                if score < OCR_MIN_SCORE || looks_like_table(&ocr_text) {
                    tracing::debug!(page, score, "Escalating OCR output to vision model");
                    match transcribe_image(self.vision, image).await {
                        Ok(markdown) => {
                            text = markdown;
                            used_route = Strategy::Vision;
                        }
                        Err(error) => {
                            tracing::warn!(page, error = %error, "Vision extraction failed; keeping OCR text");
                            text = ocr_text;
                            used_route = Strategy::Ocr;
                        }
                    }
                } else {
                    text = ocr_text;
                    used_route = Strategy::Ocr;
                }
            }
            _ => {}
        }

        PageRecord {
            page,
            text_chars: text.chars().count(),
            text,
            is_scanned,
            image: image.map(Path::to_path_buf),
            used_route,
            ocr_score,
            chunk_ids: Vec::new(),
        }
    }
}

async fn transcribe_image(
    transcriber: &dyn ImageTranscriber,
    image: &Path,
) -> Result<String, PageFault> {
    let bytes = tokio::fs::read(image).await?;
    let text = transcriber
        .transcribe(&bytes, &image_mime_for(image))
        .await?;
    Ok(text.trim().to_string())
}
