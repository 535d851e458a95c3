//! Context assembly for generation

use crate::index::ScoredEntry;
use crate::retrieve::RetrievalResult;
use serde::Serialize;

/// Provenance for one chunk placed in a context
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    /// Bracketed reference used in the prompt, e.g. `[1]`
    pub marker: String,
    pub document_id: String,
    pub title: String,
    pub source_path: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub score: f32,
}

impl Citation {
    pub fn from_hit(position: usize, hit: &ScoredEntry) -> Self {
        Self {
            marker: format!("[{}]", position),
            document_id: hit.entry.document_id.clone(),
            title: hit.entry.title.clone(),
            source_path: hit.entry.source_path.clone(),
            start_offset: hit.entry.start_offset,
            end_offset: hit.entry.end_offset,
            score: hit.score,
        }
    }
}

/// One included chunk with its citation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextPassage {
    pub text: String,
    pub citation: Citation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextPayload {
    pub query: String,
    pub passages: Vec<ContextPassage>,
}

impl ContextPayload {
    /// Summed chunk-text length in characters
    pub fn char_len(&self) -> usize {
        self.passages.iter().map(|p| p.text.chars().count()).sum()
    }

    pub fn citations(&self) -> impl Iterator<Item = &Citation> {
        self.passages.iter().map(|p| &p.citation)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AssembledContext {
    Context(ContextPayload),
    /// Nothing fit; carries the length of the smallest candidate, if any
    Empty { smallest_chunk: Option<usize> },
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        matches!(self, AssembledContext::Empty { .. })
    }

    pub fn payload(&self) -> Option<&ContextPayload> {
        match self {
            AssembledContext::Context(payload) => Some(payload),
            AssembledContext::Empty { .. } => None,
        }
    }
}

/// Pack hits in rank order until the next one would exceed
/// `max_context_length` characters. Chunks are never split.
pub fn assemble(query: &str, result: &RetrievalResult, max_context_length: usize) -> AssembledContext {
    let mut used = 0usize;
    let mut passages = Vec::new();

    for hit in &result.hits {
        let len = hit.entry.text.chars().count();
        if used + len > max_context_length {
            break;
        }
        used += len;
        passages.push(ContextPassage {
            text: hit.entry.text.clone(),
            citation: Citation::from_hit(passages.len() + 1, hit),
        });
    }

    if passages.is_empty() {
        let smallest_chunk = result.hits.iter().map(|h| h.entry.text.chars().count()).min();
        return AssembledContext::Empty { smallest_chunk };
    }

    AssembledContext::Context(ContextPayload {
        query: query.to_string(),
        passages,
    })
}
