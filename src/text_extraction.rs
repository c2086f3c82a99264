//! PDF text extraction and chunking.

use std::collections::HashSet;
use std::time::Instant;

use crate::log_performance;
use crate::models::DocumentChunk;

pub const CHUNK_WORDS: usize = 500;
pub const CHUNK_OVERLAP_WORDS: usize = 50;
pub const MAX_RELEVANT_CHUNKS: usize = 3;

const PDF_MAGIC: &[u8] = b"%PDF";

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("file is not a PDF")]
    NotPdf,

    #[error("could not read PDF: {0}")]
    Parse(String),

    #[error("PDF contains no extractable text")]
    NoText,
}

pub fn looks_like_pdf(data: &[u8]) -> bool {
    data.starts_with(PDF_MAGIC)
}

/// Extract the text of every page. CPU bound; run it off the async runtime.
pub fn extract_pdf_text(data: &[u8]) -> Result<String, ExtractionError> {
    if !looks_like_pdf(data) {
        return Err(ExtractionError::NotPdf);
    }

    let started = Instant::now();
    let text = pdf_extract::extract_text_from_mem(data)
        .map_err(|e| ExtractionError::Parse(e.to_string()))?;
    log_performance!(
        "pdf_extraction",
        duration_ms = started.elapsed().as_millis() as u64,
        bytes = data.len()
    );

    // pdf-extract separates pages with form feeds.
    let text = text.replace('\x0C', "\n");
    if text.trim().is_empty() {
        return Err(ExtractionError::NoText);
    }
    Ok(text)
}

/// Split `text` into overlapping windows of whitespace-separated words.
pub fn chunk_text(text: &str, chunk_words: usize, overlap_words: usize) -> Vec<DocumentChunk> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || chunk_words == 0 {
        return Vec::new();
    }

    let step = chunk_words.saturating_sub(overlap_words).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunk_words).min(words.len());
        chunks.push(DocumentChunk {
            chunk_index: chunks.len() as i64,
            content: words[start..end].join(" "),
        });
        if end == words.len() {
            break;
        }
        start += step;
    }
    chunks
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|term| term.chars().count() > 2)
        .map(str::to_lowercase)
        .collect()
}

/// Indices of the chunks sharing the most terms with `query`, best first.
///
/// Chunks with no shared term are never returned; ties keep document order.
pub fn relevant_chunks(chunks: &[DocumentChunk], query: &str, limit: usize) -> Vec<i64> {
    let query_terms = terms(query);
    if query_terms.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(usize, i64)> = chunks
        .iter()
        .map(|chunk| {
            let overlap = terms(&chunk.content).intersection(&query_terms).count();
            (overlap, chunk.chunk_index)
        })
        .filter(|(overlap, _)| *overlap > 0)
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    scored.into_iter().take(limit).map(|(_, index)| index).collect()
}
