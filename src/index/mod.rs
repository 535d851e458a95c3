//! Vector index
//!
//! Persistent store of [`IndexEntry`] rows with pluggable nearest-neighbor
//! search:
//! - [`ExactScan`] scores every entry and is the reference ordering
//! - [`HnswGraph`] is approximate, re-scored exactly before ranking
//! - [`LocalIndex`] serves copy-on-write snapshots to readers while a single
//!   writer commits to SQLite and publishes the next snapshot

mod exact;
mod hnsw;
mod local;
mod schema;
mod store;

pub use exact::*;
pub use hnsw::*;
pub use local::*;
pub use schema::*;
pub use store::*;

use crate::chunk::Chunk;
use crate::embed::vector_norm;
use crate::error::Result;
use crate::loader::Document;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// On-disk layout version; bump when the entry schema changes
pub const INDEX_FORMAT_VERSION: i64 = 1;

/// Metadata key every entry carries
pub const DOCUMENT_ID_KEY: &str = "document_id";

/// An embedded chunk with denormalized provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk_id: String,
    pub document_id: String,
    pub title: String,
    pub source_path: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub sequence_index: usize,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
    pub vector: Vec<f32>,
    pub norm: f32,
}

impl IndexEntry {
    pub fn new(chunk: &Chunk, document: &Document, vector: Vec<f32>) -> Self {
        let mut metadata = document.tags.clone();
        metadata.insert(DOCUMENT_ID_KEY.to_string(), document.id.clone());
        let norm = vector_norm(&vector);

        Self {
            chunk_id: chunk.chunk_id.clone(),
            document_id: chunk.document_id.clone(),
            title: document.title.clone(),
            source_path: document.source_path.display().to_string(),
            start_offset: chunk.start_offset,
            end_offset: chunk.end_offset,
            sequence_index: chunk.sequence_index,
            text: chunk.text.clone(),
            metadata,
            vector,
            norm,
        }
    }

    /// Whether two entries cover intersecting bytes of the same document
    pub fn overlaps(&self, other: &IndexEntry) -> bool {
        self.document_id == other.document_id
            && self.start_offset < other.end_offset
            && other.start_offset < self.end_offset
    }
}

/// An entry with its similarity to a query
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub entry: Arc<IndexEntry>,
    pub score: f32,
}

/// Exact-match filter on entry metadata; every pair must match
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub equals: BTreeMap<String, String>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.equals.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.equals.is_empty()
    }

    pub fn matches(&self, entry: &IndexEntry) -> bool {
        self.equals
            .iter()
            .all(|(k, v)| entry.metadata.get(k).map(|m| m == v).unwrap_or(false))
    }
}

/// Describes what built an index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: i64,
    pub embedding_model: String,
    pub dimension: usize,
    pub created_at: String,
}

impl IndexManifest {
    pub fn new(embedding_model: &str, dimension: usize) -> Self {
        Self {
            format_version: INDEX_FORMAT_VERSION,
            embedding_model: embedding_model.to_string(),
            dimension,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Whether an index built under `self` can serve `expected`
    pub fn is_compatible_with(&self, expected: &IndexManifest) -> bool {
        self.format_version == expected.format_version
            && self.embedding_model == expected.embedding_model
            && self.dimension == expected.dimension
    }
}

/// Live entries keyed by chunk id
pub type EntryMap = HashMap<String, Arc<IndexEntry>>;

/// Cosine similarity against a stored entry, clamped to [-1, 1]
pub fn cosine_similarity(query: &[f32], query_norm: f32, entry: &IndexEntry) -> f32 {
    let denom = query_norm * entry.norm;
    if denom <= 0.0 {
        return 0.0;
    }
    let dot: f32 = query.iter().zip(entry.vector.iter()).map(|(a, b)| a * b).sum();
    (dot / denom).clamp(-1.0, 1.0)
}

/// Result ordering: score descending, then earlier chunk, then document id,
/// then chunk id. Total, so equal inputs always rank the same way.
pub fn rank_order(a: &ScoredEntry, b: &ScoredEntry) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.entry.sequence_index.cmp(&b.entry.sequence_index))
        .then_with(|| a.entry.document_id.cmp(&b.entry.document_id))
        .then_with(|| a.entry.chunk_id.cmp(&b.entry.chunk_id))
}

/// Nearest-neighbor capability shared by the exact and approximate paths
pub trait NearestNeighbors: Send + Sync {
    /// Short name for logs and status output
    fn name(&self) -> &'static str;

    /// Top `limit` live entries for `query`, ranked with [`rank_order`]
    fn search(
        &self,
        entries: &EntryMap,
        query: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Vec<ScoredEntry>;

    /// Make an entry searchable, replacing any previous version
    fn insert(&mut self, entry: &Arc<IndexEntry>);

    /// Stop returning an entry
    fn remove(&mut self, chunk_id: &str);

    /// Share of internal slots that are deleted and still occupy space
    fn tombstone_ratio(&self) -> f32 {
        0.0
    }

    /// Rebuild internal structures from the live entries
    fn rebuild(&mut self, entries: &EntryMap);

    fn clone_box(&self) -> Box<dyn NearestNeighbors>;
}

/// Persistent vector index contract
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace entries by chunk id. All or nothing.
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<()>;

    /// Remove entries; unknown ids are ignored. Returns how many were removed.
    async fn delete(&self, chunk_ids: &[String]) -> Result<usize>;

    /// Make `entries` the complete set of chunks for `document_id` in one
    /// commit: readers see either the previous version or this one. Chunks
    /// of the document missing from `entries` are removed; returns how many.
    async fn replace_document(&self, document_id: &str, entries: Vec<IndexEntry>) -> Result<usize>;

    /// At most `top_k` entries by cosine similarity, filter applied first
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredEntry>>;

    /// Number of live entries
    async fn size(&self) -> usize;

    /// Re-optimize the search structure without changing query results
    async fn rebuild(&self) -> Result<()>;

    /// Chunk ids stored for a document
    async fn chunk_ids_for_document(&self, document_id: &str) -> Vec<String>;

    fn manifest(&self) -> &IndexManifest;

    /// Name of the search structure answering queries
    fn search_name(&self) -> &'static str;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn entry(chunk_id: &str, document_id: &str, sequence_index: usize, vector: Vec<f32>) -> IndexEntry {
        let norm = vector_norm(&vector);
        let mut metadata = BTreeMap::new();
        metadata.insert(DOCUMENT_ID_KEY.to_string(), document_id.to_string());
        IndexEntry {
            chunk_id: chunk_id.to_string(),
            document_id: document_id.to_string(),
            title: document_id.to_string(),
            source_path: format!("/corpus/{}", document_id),
            start_offset: sequence_index * 10,
            end_offset: sequence_index * 10 + 8,
            sequence_index,
            text: format!("{} chunk {}", document_id, sequence_index),
            metadata,
            vector,
            norm,
        }
    }

    /// Deterministic pseudo-random unit-ish vectors
    pub fn random_vectors(count: usize, dimension: usize, seed: u64) -> Vec<Vec<f32>> {
        let mut state = seed;
        (0..count)
            .map(|_| {
                (0..dimension)
                    .map(|_| {
                        state = state
                            .wrapping_mul(6364136223846793005)
                            .wrapping_add(1442695040888963407);
                        ((state >> 33) as f32 / (1u64 << 31) as f32) - 0.5
                    })
                    .collect()
            })
            .collect()
    }
}
