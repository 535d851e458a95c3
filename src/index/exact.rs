//! Brute-force search over every live entry

use super::{
    cosine_similarity, rank_order, EntryMap, IndexEntry, MetadataFilter, NearestNeighbors,
    ScoredEntry,
};
use crate::embed::vector_norm;
use std::sync::Arc;

/// Exact cosine scan. Holds no state of its own; the entry map is the index.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactScan;

impl ExactScan {
    /// Score and rank `entries`, keeping the best `limit`
    pub fn rank<'a, I>(entries: I, query: &[f32], limit: usize, filter: Option<&MetadataFilter>) -> Vec<ScoredEntry>
    where
        I: IntoIterator<Item = &'a Arc<IndexEntry>>,
    {
        if limit == 0 {
            return Vec::new();
        }

        let query_norm = vector_norm(query);
        let mut scored: Vec<ScoredEntry> = entries
            .into_iter()
            .filter(|e| filter.map(|f| f.matches(e)).unwrap_or(true))
            .map(|e| ScoredEntry {
                score: cosine_similarity(query, query_norm, e),
                entry: Arc::clone(e),
            })
            .collect();

        scored.sort_by(rank_order);
        scored.truncate(limit);
        scored
    }
}

impl NearestNeighbors for ExactScan {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn search(
        &self,
        entries: &EntryMap,
        query: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Vec<ScoredEntry> {
        Self::rank(entries.values(), query, limit, filter)
    }

    fn insert(&mut self, _entry: &Arc<IndexEntry>) {}

    fn remove(&mut self, _chunk_id: &str) {}

    fn rebuild(&mut self, _entries: &EntryMap) {}

    fn clone_box(&self) -> Box<dyn NearestNeighbors> {
        Box::new(*self)
    }
}
