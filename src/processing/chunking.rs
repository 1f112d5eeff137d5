//! Fixed-window chunking with offset recovery against the assembled document text.
//!
//! Windows are measured in characters. Offsets are byte offsets into the assembled full text so
//! callers can slice it directly.

use crate::processing::types::ChunkingError;

/// Characters of a chunk used to relocate it inside the page text.
pub const ANCHOR_CHARS: usize = 60;

/// Split `text` into overlapping windows of `chunk_size` characters.
///
/// The window advances by `chunk_size - overlap` characters (at least one). Each window is
/// trimmed and dropped when empty. Blank input yields no chunks.
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }

    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(idx, _)| idx)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = bounds.len() - 1;
    let step = chunk_size.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(char_count);
        let window = text[bounds[start]..bounds[end]].trim();
        if !window.is_empty() {
            chunks.push(window.to_string());
        }
        if end >= char_count {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

/// A chunk placed inside the assembled full text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedChunk {
    /// Chunk text.
    pub text: String,
    /// Byte offset in the full text.
    pub start: usize,
    /// Byte offset one past the chunk end.
    pub end: usize,
}

/// Recover the offsets of `chunks` produced from `full_text[page_start..page_end]`.
///
/// Each chunk's anchor (its first [`ANCHOR_CHARS`] characters) is searched inside the page slice
/// from a cursor that never moves backwards: the start of the previous chunk. The first anchor hit
/// whose full text matches wins; otherwise the first anchor hit, otherwise the cursor itself.
pub fn locate_chunks(
    full_text: &str,
    page_start: usize,
    page_end: usize,
    chunks: Vec<String>,
) -> Vec<LocatedChunk> {
    let page = &full_text[page_start..page_end];
    let mut cursor = 0;
    let mut located = Vec::with_capacity(chunks.len());

    for text in chunks {
        let (local_start, local_end) = locate_one(page, &text, cursor);
        cursor = local_start;
        located.push(LocatedChunk {
            text,
            start: page_start + local_start,
            end: page_start + local_end,
        });
    }

    located
}

fn locate_one(page: &str, chunk: &str, cursor: usize) -> (usize, usize) {
    let anchor = anchor_of(chunk);
    let haystack = &page[cursor..];

    let mut first_hit = None;
    for (offset, _) in haystack.match_indices(anchor) {
        let position = cursor + offset;
        if page[position..].starts_with(chunk) {
            return (position, position + chunk.len());
        }
        first_hit.get_or_insert(position);
    }

    let start = first_hit.unwrap_or(cursor);
    tracing::debug!(cursor, start, "Chunk text not found verbatim; using best-effort offset");
    clamp_span(page, start, chunk.len())
}

fn anchor_of(chunk: &str) -> &str {
    chunk
        .char_indices()
        .nth(ANCHOR_CHARS)
        .map(|(idx, _)| &chunk[..idx])
        .unwrap_or(chunk)
}

fn clamp_span(page: &str, start: usize, len: usize) -> (usize, usize) {
    let mut end = (start + len).min(page.len());
    while !page.is_char_boundary(end) {
        end -= 1;
    }
    if end > start {
        (start, end)
    } else {
        let start = page[..start]
            .char_indices()
            .next_back()
            .map(|(idx, _)| idx)
            .unwrap_or(0);
        (start, page.len().max(start))
    }
}
