//! Snapshot-isolated vector index with optional SQLite persistence

use super::{
    EntryMap, ExactScan, HnswGraph, HnswParams, IndexEntry, IndexManifest, IndexStore,
    MetadataFilter, NearestNeighbors, ScoredEntry, VectorIndex,
};
use crate::config::{Config, SearchMode};
use crate::embed::{create_embedder, vector_norm, MIN_NORM};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Search structure settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    pub mode: SearchMode,
    pub hnsw: HnswParams,
    /// Rebuild the graph once this share of its slots are tombstones
    pub rebuild_tombstone_ratio: f32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            mode: SearchMode::Hnsw,
            hnsw: HnswParams::default(),
            rebuild_tombstone_ratio: 0.25,
        }
    }
}

impl SearchParams {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            mode: config.index.search_mode()?,
            hnsw: HnswParams {
                m: config.index.hnsw_m,
                ef_construction: config.index.hnsw_ef_construction,
                ef_search: config.index.hnsw_ef_search,
            },
            rebuild_tombstone_ratio: config.index.rebuild_tombstone_ratio,
        })
    }

    fn build(&self, entries: &EntryMap) -> Box<dyn NearestNeighbors> {
        match self.mode {
            SearchMode::Exact => Box::new(ExactScan),
            SearchMode::Hnsw => Box::new(HnswGraph::build(self.hnsw, entries)),
        }
    }
}

/// Immutable view served to readers
struct Snapshot {
    entries: EntryMap,
    search: Box<dyn NearestNeighbors>,
}

impl Clone for Snapshot {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            search: self.search.clone_box(),
        }
    }
}

/// Vector index held in memory and, when opened from a path, mirrored to SQLite.
///
/// Readers clone the current snapshot pointer and never block writers.
/// Writers serialize on a mutex, commit to the store first, then publish a
/// new snapshot, so a failed commit leaves readers on the previous state.
pub struct LocalIndex {
    manifest: IndexManifest,
    params: SearchParams,
    current: RwLock<Arc<Snapshot>>,
    writer: Mutex<()>,
    store: Option<IndexStore>,
}

impl LocalIndex {
    /// Non-persistent index; each instance is isolated
    pub fn in_memory(embedding_model: &str, dimension: usize, params: SearchParams) -> Self {
        Self::from_parts(IndexManifest::new(embedding_model, dimension), params, EntryMap::new(), None)
    }

    /// Open the index stored at `path`, creating it when absent.
    ///
    /// Fails with `IndexVersionMismatch` when the stored manifest was written
    /// for a different model, dimension or format.
    pub async fn open(
        path: &Path,
        embedding_model: &str,
        dimension: usize,
        params: SearchParams,
    ) -> Result<Self> {
        let store = IndexStore::open(path).await?;
        let expected = IndexManifest::new(embedding_model, dimension);

        let manifest = match store.read_manifest().await? {
            Some(found) if found.is_compatible_with(&expected) => found,
            Some(found) => {
                return Err(Error::IndexVersionMismatch {
                    path: path.display().to_string(),
                    found_model: found.embedding_model,
                    found_dimension: found.dimension,
                    found_format: found.format_version,
                    expected_model: expected.embedding_model,
                    expected_dimension: expected.dimension,
                    expected_format: expected.format_version,
                });
            }
            None => {
                store.write_manifest(&expected).await?;
                expected
            }
        };

        let entries: EntryMap = store
            .load_entries()
            .await?
            .into_iter()
            .map(|e| (e.chunk_id.clone(), Arc::new(e)))
            .collect();

        info!(
            "Opened index {:?}: {} entries, model {}, dim {}",
            path,
            entries.len(),
            manifest.embedding_model,
            manifest.dimension
        );

        Ok(Self::from_parts(manifest, params, entries, Some(store)))
    }

    /// Open the index configured in `config`.
    ///
    /// The expected manifest comes from the configured embedder, so vectors
    /// written by one backend are never served to queries from another.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        Self::open(
            &config.paths.index_file,
            embedder.model_id(),
            embedder.dimension(),
            SearchParams::from_config(config)?,
        )
        .await
    }

    /// Reset the configured index for the configured embedder
    pub async fn reset_from_config(config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        Self::reset(
            &config.paths.index_file,
            embedder.model_id(),
            embedder.dimension(),
            SearchParams::from_config(config)?,
        )
        .await
    }

    /// Delete every stored entry and rewrite the manifest for a new model.
    /// Used when the embedding model changes and the index must be rebuilt.
    pub async fn reset(
        path: &Path,
        embedding_model: &str,
        dimension: usize,
        params: SearchParams,
    ) -> Result<Self> {
        let store = IndexStore::open(path).await?;
        store.clear().await?;
        let manifest = IndexManifest::new(embedding_model, dimension);
        store.write_manifest(&manifest).await?;
        Ok(Self::from_parts(manifest, params, EntryMap::new(), Some(store)))
    }

    fn from_parts(
        manifest: IndexManifest,
        params: SearchParams,
        entries: EntryMap,
        store: Option<IndexStore>,
    ) -> Self {
        let search = params.build(&entries);
        Self {
            manifest,
            params,
            current: RwLock::new(Arc::new(Snapshot { entries, search })),
            writer: Mutex::new(()),
            store,
        }
    }

    async fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&*self.current.read().await)
    }

    async fn publish(&self, snapshot: Snapshot) {
        *self.current.write().await = Arc::new(snapshot);
    }

    /// Recompute norms, validate every entry and collapse duplicate ids.
    /// Nothing is written when any entry is rejected.
    fn prepare(&self, entries: Vec<IndexEntry>) -> Result<Vec<IndexEntry>> {
        let mut entries = entries;
        for entry in &mut entries {
            entry.norm = vector_norm(&entry.vector);
            self.validate(entry)?;
        }

        // Last write wins for duplicate ids within one call
        let mut unique: HashMap<String, IndexEntry> = HashMap::with_capacity(entries.len());
        for entry in entries {
            unique.insert(entry.chunk_id.clone(), entry);
        }
        Ok(unique.into_values().collect())
    }

    fn validate(&self, entry: &IndexEntry) -> Result<()> {
        if entry.vector.len() != self.manifest.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.manifest.dimension,
                got: entry.vector.len(),
            });
        }
        if entry.norm < MIN_NORM || !entry.norm.is_finite() {
            return Err(Error::ZeroVector);
        }
        Ok(())
    }

    fn maybe_compact(&self, snapshot: &mut Snapshot) {
        let ratio = snapshot.search.tombstone_ratio();
        if ratio > self.params.rebuild_tombstone_ratio {
            debug!("Tombstone ratio {:.2}; rebuilding {}", ratio, snapshot.search.name());
            snapshot.search.rebuild(&snapshot.entries);
        }
    }
}

#[async_trait]
impl VectorIndex for LocalIndex {
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let entries = self.prepare(entries)?;

        let _guard = self.writer.lock().await;

        if let Some(store) = &self.store {
            store.write_entries(&entries, &[]).await?;
        }

        let mut next = (*self.snapshot().await).clone();
        for entry in entries {
            let entry = Arc::new(entry);
            next.search.insert(&entry);
            next.entries.insert(entry.chunk_id.clone(), entry);
        }
        self.maybe_compact(&mut next);

        debug!("Index now holds {} entries", next.entries.len());
        self.publish(next).await;
        Ok(())
    }

    async fn delete(&self, chunk_ids: &[String]) -> Result<usize> {
        if chunk_ids.is_empty() {
            return Ok(0);
        }

        let _guard = self.writer.lock().await;
        let current = self.snapshot().await;
        let present: Vec<String> = chunk_ids
            .iter()
            .filter(|id| current.entries.contains_key(*id))
            .cloned()
            .collect();

        if present.is_empty() {
            return Ok(0);
        }

        if let Some(store) = &self.store {
            store.write_entries(&[], &present).await?;
        }

        let mut next = (*current).clone();
        for chunk_id in &present {
            next.entries.remove(chunk_id);
            next.search.remove(chunk_id);
        }
        self.maybe_compact(&mut next);

        self.publish(next).await;
        Ok(present.len())
    }

    async fn replace_document(&self, document_id: &str, entries: Vec<IndexEntry>) -> Result<usize> {
        if let Some(stray) = entries.iter().find(|e| e.document_id != document_id) {
            return Err(Error::Other(format!(
                "Chunk {} belongs to {}, not {}",
                stray.chunk_id, stray.document_id, document_id
            )));
        }
        let entries = self.prepare(entries)?;
        let incoming: HashSet<&str> = entries.iter().map(|e| e.chunk_id.as_str()).collect();

        let _guard = self.writer.lock().await;
        let current = self.snapshot().await;
        let superseded: Vec<String> = current
            .entries
            .values()
            .filter(|e| e.document_id == document_id && !incoming.contains(e.chunk_id.as_str()))
            .map(|e| e.chunk_id.clone())
            .collect();

        if let Some(store) = &self.store {
            store.write_entries(&entries, &superseded).await?;
        }

        let mut next = (*current).clone();
        for chunk_id in &superseded {
            next.entries.remove(chunk_id);
            next.search.remove(chunk_id);
        }
        for entry in entries {
            let entry = Arc::new(entry);
            next.search.insert(&entry);
            next.entries.insert(entry.chunk_id.clone(), entry);
        }
        self.maybe_compact(&mut next);

        debug!(
            "Replaced {}: {} superseded, index holds {}",
            document_id,
            superseded.len(),
            next.entries.len()
        );
        self.publish(next).await;
        Ok(superseded.len())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredEntry>> {
        if vector.len() != self.manifest.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.manifest.dimension,
                got: vector.len(),
            });
        }
        if vector_norm(vector) < MIN_NORM {
            return Err(Error::ZeroVector);
        }

        let snapshot = self.snapshot().await;
        Ok(snapshot.search.search(&snapshot.entries, vector, top_k, filter))
    }

    async fn size(&self) -> usize {
        self.snapshot().await.entries.len()
    }

    async fn rebuild(&self) -> Result<()> {
        let _guard = self.writer.lock().await;
        let mut next = (*self.snapshot().await).clone();
        next.search = self.params.build(&next.entries);
        info!(
            "Rebuilt {} index over {} entries",
            next.search.name(),
            next.entries.len()
        );
        self.publish(next).await;
        Ok(())
    }

    async fn chunk_ids_for_document(&self, document_id: &str) -> Vec<String> {
        let snapshot = self.snapshot().await;
        let mut ids: Vec<(usize, String)> = snapshot
            .entries
            .values()
            .filter(|e| e.document_id == document_id)
            .map(|e| (e.sequence_index, e.chunk_id.clone()))
            .collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    fn search_name(&self) -> &'static str {
        match self.params.mode {
            SearchMode::Exact => "exact",
            SearchMode::Hnsw => "hnsw",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::test_support::{entry, random_vectors};
    use tempfile::TempDir;

    fn exact() -> SearchParams {
        SearchParams {
            mode: SearchMode::Exact,
            ..Default::default()
        }
    }

    fn sample(count: usize, dimension: usize) -> Vec<IndexEntry> {
        random_vectors(count, dimension, 21)
            .into_iter()
            .enumerate()
            .map(|(i, v)| entry(&format!("c{:03}", i), &format!("doc{}.txt", i % 4), i / 4, v))
            .collect()
    }

    #[tokio::test]
    async fn test_self_query_ranks_first() {
        for params in [exact(), SearchParams::default()] {
            let index = LocalIndex::in_memory("test", 8, params);
            let entries = sample(40, 8);
            index.upsert(entries.clone()).await.unwrap();

            for e in &entries {
                let hits = index.query(&e.vector, 3, None).await.unwrap();
                assert_eq!(hits[0].entry.chunk_id, e.chunk_id);
                assert!((hits[0].score - 1.0).abs() < 1e-5);
            }
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let index = LocalIndex::in_memory("test", 8, SearchParams::default());
        let entries = sample(10, 8);
        index.upsert(entries.clone()).await.unwrap();
        let before = index.query(&entries[0].vector, 5, None).await.unwrap();

        index.upsert(entries.clone()).await.unwrap();
        let after = index.query(&entries[0].vector, 5, None).await.unwrap();

        assert_eq!(index.size().await, 10);
        let ids = |hits: &[ScoredEntry]| hits.iter().map(|h| h.entry.chunk_id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&before), ids(&after));
    }

    #[tokio::test]
    async fn test_tie_break_is_stable() {
        for params in [exact(), SearchParams::default()] {
            let index = LocalIndex::in_memory("test", 2, params);
            let v = vec![1.0, 1.0];
            index
                .upsert(vec![
                    entry("k3", "b.txt", 1, v.clone()),
                    entry("k1", "b.txt", 0, v.clone()),
                    entry("k2", "a.txt", 1, v.clone()),
                ])
                .await
                .unwrap();

            for _ in 0..5 {
                let hits = index.query(&v, 3, None).await.unwrap();
                let ids: Vec<&str> = hits.iter().map(|h| h.entry.chunk_id.as_str()).collect();
                assert_eq!(ids, vec!["k1", "k2", "k3"], "{}", index.search_name());
            }
        }
    }

    #[tokio::test]
    async fn test_tie_break_holds_for_wide_tie_bands() {
        let v = vec![0.0, 1.0, 0.0, 1.0];
        // The same boilerplate clause repeated across many forms, wider than the beam
        let mut entries: Vec<IndexEntry> = (0..150)
            .map(|i| entry(&format!("form-{:03}", i), &format!("form-{:03}.txt", i), 2 + i % 20, v.clone()))
            .collect();
        entries.push(entry("k3", "b.txt", 1, v.clone()));
        entries.push(entry("k1", "b.txt", 0, v.clone()));
        entries.push(entry("k2", "a.txt", 1, v.clone()));

        let exact_index = LocalIndex::in_memory("test", 4, exact());
        let hnsw_index = LocalIndex::in_memory("test", 4, SearchParams::default());
        exact_index.upsert(entries.clone()).await.unwrap();
        hnsw_index.upsert(entries).await.unwrap();

        for k in [3, 10, 80] {
            let expected: Vec<String> = exact_index
                .query(&v, k, None)
                .await
                .unwrap()
                .iter()
                .map(|h| h.entry.chunk_id.clone())
                .collect();
            let got: Vec<String> = hnsw_index
                .query(&v, k, None)
                .await
                .unwrap()
                .iter()
                .map(|h| h.entry.chunk_id.clone())
                .collect();
            assert_eq!(got, expected, "k = {}", k);
            assert_eq!(&got[..3], &["k1", "k2", "k3"]);
        }
    }

    #[tokio::test]
    async fn test_replace_document_swaps_versions_in_one_step() {
        for params in [exact(), SearchParams::default()] {
            let index = LocalIndex::in_memory("test", 4, params);
            index
                .upsert(vec![entry("other", "other.txt", 0, vec![0.0, 0.0, 1.0, 0.0])])
                .await
                .unwrap();
            index
                .upsert(vec![
                    entry("fire-a0", "fire.txt", 0, vec![1.0, 0.0, 0.0, 0.0]),
                    entry("fire-a1", "fire.txt", 1, vec![1.0, 0.1, 0.0, 0.0]),
                ])
                .await
                .unwrap();

            let removed = index
                .replace_document(
                    "fire.txt",
                    vec![
                        entry("fire-a0", "fire.txt", 0, vec![1.0, 0.0, 0.0, 0.0]),
                        entry("fire-b1", "fire.txt", 1, vec![1.0, 0.2, 0.0, 0.0]),
                        entry("fire-b2", "fire.txt", 2, vec![1.0, 0.3, 0.0, 0.0]),
                    ],
                )
                .await
                .unwrap();

            assert_eq!(removed, 1);
            assert_eq!(
                index.chunk_ids_for_document("fire.txt").await,
                vec!["fire-a0", "fire-b1", "fire-b2"]
            );
            assert_eq!(index.size().await, 4);

            let err = index
                .replace_document("fire.txt", vec![entry("x", "other.txt", 0, vec![1.0, 0.0, 0.0, 0.0])])
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Other(_)));
            assert_eq!(index.size().await, 4);
        }
    }

    #[tokio::test]
    async fn test_readers_never_see_two_versions_of_a_document() {
        let index = Arc::new(LocalIndex::in_memory("test", 4, exact()));
        let old: Vec<IndexEntry> = (0..2)
            .map(|i| entry(&format!("old-{}", i), "fire.txt", i, vec![1.0, 0.0, 0.0, 0.0]))
            .collect();
        let new: Vec<IndexEntry> = (0..3)
            .map(|i| entry(&format!("new-{}", i), "fire.txt", i, vec![1.0, 0.1, 0.0, 0.0]))
            .collect();
        index.replace_document("fire.txt", old.clone()).await.unwrap();

        let writer = {
            let index = Arc::clone(&index);
            let (old, new) = (old.clone(), new.clone());
            tokio::spawn(async move {
                for i in 0..40 {
                    let version = if i % 2 == 0 { new.clone() } else { old.clone() };
                    index.replace_document("fire.txt", version).await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };

        let filter = MetadataFilter::new().with(crate::index::DOCUMENT_ID_KEY, "fire.txt");
        for _ in 0..80 {
            let hits = index.query(&[1.0, 0.0, 0.0, 0.0], 10, Some(&filter)).await.unwrap();
            let mut ids: Vec<String> = hits.iter().map(|h| h.entry.chunk_id.clone()).collect();
            ids.sort();
            let all_old = ids.iter().all(|id| id.starts_with("old-")) && ids.len() == 2;
            let all_new = ids.iter().all(|id| id.starts_with("new-")) && ids.len() == 3;
            assert!(all_old || all_new, "mixed versions: {:?}", ids);
            tokio::task::yield_now().await;
        }

        writer.await.unwrap();
        assert_eq!(index.chunk_ids_for_document("fire.txt").await, vec!["old-0", "old-1"]);
    }

    #[tokio::test]
    async fn test_delete_removes_everywhere() {
        let index = LocalIndex::in_memory("test", 8, SearchParams::default());
        let entries = sample(12, 8);
        index.upsert(entries.clone()).await.unwrap();

        let doomed = vec![entries[0].chunk_id.clone(), "never-stored".to_string()];
        assert_eq!(index.delete(&doomed).await.unwrap(), 1);
        assert_eq!(index.size().await, 11);

        let hits = index.query(&entries[0].vector, 12, None).await.unwrap();
        assert!(hits.iter().all(|h| h.entry.chunk_id != entries[0].chunk_id));
        assert_eq!(index.delete(&doomed).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rejected_upsert_leaves_index_unchanged() {
        let index = LocalIndex::in_memory("test", 3, exact());
        index
            .upsert(vec![entry("ok", "a.txt", 0, vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();

        let err = index
            .upsert(vec![
                entry("new", "a.txt", 1, vec![0.0, 1.0, 0.0]),
                entry("bad", "a.txt", 2, vec![1.0, 0.0]),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 3, got: 2 }));
        assert_eq!(index.size().await, 1);

        let err = index
            .upsert(vec![entry("zero", "a.txt", 3, vec![0.0, 0.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ZeroVector));
        assert_eq!(index.size().await, 1);
    }

    #[tokio::test]
    async fn test_query_validation() {
        let index = LocalIndex::in_memory("test", 3, exact());
        assert!(matches!(
            index.query(&[1.0, 0.0], 1, None).await,
            Err(Error::DimensionMismatch { .. })
        ));
        assert!(matches!(
            index.query(&[0.0, 0.0, 0.0], 1, None).await,
            Err(Error::ZeroVector)
        ));
        assert!(index.query(&[1.0, 0.0, 0.0], 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.db");
        let entries = sample(20, 8);

        {
            let index = LocalIndex::open(&path, "model-a", 8, SearchParams::default())
                .await
                .unwrap();
            index.upsert(entries.clone()).await.unwrap();
            index.delete(&[entries[5].chunk_id.clone()]).await.unwrap();
        }

        let reopened = LocalIndex::open(&path, "model-a", 8, SearchParams::default())
            .await
            .unwrap();
        assert_eq!(reopened.size().await, 19);
        let hits = reopened.query(&entries[3].vector, 1, None).await.unwrap();
        assert_eq!(hits[0].entry.chunk_id, entries[3].chunk_id);
        assert_eq!(
            reopened.chunk_ids_for_document("doc1.txt").await.len(),
            entries.iter().filter(|e| e.document_id == "doc1.txt").count() - 1
        );
    }

    #[tokio::test]
    async fn test_version_mismatch_on_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.db");
        LocalIndex::open(&path, "model-a", 8, exact()).await.unwrap();

        let err = LocalIndex::open(&path, "model-a", 16, exact()).await.err().unwrap();
        assert!(matches!(err, Error::IndexVersionMismatch { found_dimension: 8, .. }));
        assert!(err.is_fatal_to_ingest());

        let err = LocalIndex::open(&path, "model-b", 8, exact()).await.err().unwrap();
        assert!(matches!(err, Error::IndexVersionMismatch { .. }));

        let reset = LocalIndex::reset(&path, "model-b", 16, exact()).await.unwrap();
        assert_eq!(reset.manifest().dimension, 16);
        assert!(LocalIndex::open(&path, "model-b", 16, exact()).await.is_ok());
    }

    #[tokio::test]
    async fn test_backend_change_is_a_version_mismatch() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));

        let index = LocalIndex::from_config(&config).await.unwrap();
        assert_eq!(index.manifest().embedding_model, "hashing-v1/384");
        index
            .upsert(vec![entry("c1", "fire.txt", 0, vec![1.0; 384])])
            .await
            .unwrap();
        drop(index);

        // Same model name, different backend producing the vectors
        config.embedding.backend = "http".to_string();
        let err = LocalIndex::from_config(&config).await.err().unwrap();
        assert!(matches!(
            err,
            Error::IndexVersionMismatch { ref found_model, .. } if found_model == "hashing-v1/384"
        ));

        let reset = LocalIndex::reset_from_config(&config).await.unwrap();
        assert_eq!(reset.manifest().embedding_model, config.embedding.model);
        assert_eq!(reset.size().await, 0);
    }

    #[tokio::test]
    async fn test_rebuild_keeps_results() {
        let index = LocalIndex::in_memory("test", 8, SearchParams::default());
        let entries = sample(60, 8);
        index.upsert(entries.clone()).await.unwrap();
        let ids: Vec<String> = entries.iter().take(20).map(|e| e.chunk_id.clone()).collect();
        index.delete(&ids).await.unwrap();

        let before = index.query(&entries[30].vector, 5, None).await.unwrap();
        index.rebuild().await.unwrap();
        let after = index.query(&entries[30].vector, 5, None).await.unwrap();

        assert_eq!(before[0].entry.chunk_id, after[0].entry.chunk_id);
        assert_eq!(index.size().await, 40);
    }

    #[tokio::test]
    async fn test_readers_see_whole_snapshots() {
        let index = Arc::new(LocalIndex::in_memory("test", 4, exact()));
        let base = vec![1.0, 0.0, 0.0, 0.0];
        index.upsert(vec![entry("seed", "a.txt", 0, base.clone())]).await.unwrap();

        let writer = {
            let index = Arc::clone(&index);
            tokio::spawn(async move {
                for i in 0..50 {
                    let batch = vec![
                        entry(&format!("w{}-a", i), "w.txt", i * 2, vec![1.0, 0.1, 0.0, 0.0]),
                        entry(&format!("w{}-b", i), "w.txt", i * 2 + 1, vec![1.0, 0.0, 0.1, 0.0]),
                    ];
                    index.upsert(batch).await.unwrap();
                }
            })
        };

        for _ in 0..50 {
            let hits = index.query(&base, 200, None).await.unwrap();
            // Batches land whole: one seed plus an even number of writes
            assert_eq!(hits.len() % 2, 1);
            tokio::task::yield_now().await;
        }

        writer.await.unwrap();
        assert_eq!(index.size().await, 101);
    }
}
