//! Token-window chunking
//!
//! Splits a document into overlapping windows of whitespace-delimited words:
//! - windows are bounded by an estimated token budget
//! - consecutive windows share a suffix of at most `overlap_tokens`
//! - offsets are byte offsets into the document text
//! - chunk ids derive from the document id and offsets, so re-chunking
//!   unchanged text yields the same identities

mod boundaries;

pub use boundaries::*;

use crate::error::{Error, Result};
use crate::loader::Document;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A contiguous span of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub document_id: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub text: String,
    pub sequence_index: usize,
}

impl Chunk {
    /// Stable identity for a span of a document
    pub fn compute_id(document_id: &str, start: usize, end: usize) -> String {
        let key = format!("{}:{}:{}", document_id, start, end);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
    }

    /// Whether two chunks of the same document share any bytes
    pub fn overlaps(&self, other: &Chunk) -> bool {
        self.document_id == other.document_id
            && self.start_offset < other.end_offset
            && other.start_offset < self.end_offset
    }
}

/// Chunk a document into overlapping token windows
pub fn chunk_document(
    document: &Document,
    max_tokens: usize,
    overlap_tokens: usize,
) -> Result<Vec<Chunk>> {
    if max_tokens == 0 || overlap_tokens >= max_tokens {
        return Err(Error::Config(format!(
            "overlap_tokens ({}) must be < max_tokens ({})",
            overlap_tokens, max_tokens
        )));
    }

    let text = &document.raw_text;
    let words = word_spans(text);
    if words.is_empty() {
        return Err(Error::EmptyDocument(document.id.clone()));
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        // Always take at least one word; an oversized word stands alone
        let mut end = start;
        let mut cost = 0usize;
        while end < words.len() && (end == start || cost + words[end].cost <= max_tokens) {
            cost += words[end].cost;
            end += 1;
        }

        let start_offset = words[start].start;
        let end_offset = words[end - 1].end;
        chunks.push(Chunk {
            chunk_id: Chunk::compute_id(&document.id, start_offset, end_offset),
            document_id: document.id.clone(),
            start_offset,
            end_offset,
            text: text[start_offset..end_offset].to_string(),
            sequence_index: chunks.len(),
        });

        if end == words.len() {
            break;
        }

        let mut next = end;
        let mut shared = 0usize;
        while next > start + 1 && shared + words[next - 1].cost <= overlap_tokens {
            shared += words[next - 1].cost;
            next -= 1;
        }

        // Drop the overlap if the next uncovered word would not fit beside it
        if shared + words[end].cost > max_tokens {
            next = end;
        }

        start = next;
    }

    Ok(chunks)
}
