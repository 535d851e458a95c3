//! Query-time retrieval
//!
//! Embeds the query, over-fetches from the index, then collapses chunks that
//! cover the same bytes of a document so the caller sees distinct passages.

use crate::config::Config;
use crate::embed::{with_timeout, Embedder};
use crate::error::{Error, Result};
use crate::index::{MetadataFilter, ScoredEntry, VectorIndex};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A retrieval request
#[derive(Debug, Clone)]
pub struct Query {
    pub raw_text: String,
    pub top_k: usize,
    pub filter: Option<MetadataFilter>,
}

impl Query {
    pub fn new(raw_text: impl Into<String>, top_k: usize) -> Self {
        Self {
            raw_text: raw_text.into(),
            top_k,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = if filter.is_empty() { None } else { Some(filter) };
        self
    }
}

/// Ranked hits for one query; empty means nothing relevant was found
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredEntry>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }
}

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    overfetch_factor: usize,
    min_score: f32,
    timeout: Duration,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            overfetch_factor: 3,
            min_score: f32::MIN,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self::new(embedder, index)
            .with_overfetch(config.query.overfetch_factor)
            .with_min_score(config.query.min_score)
            .with_timeout(config.embedding.timeout())
    }

    pub fn with_overfetch(mut self, factor: usize) -> Self {
        self.overfetch_factor = factor.max(1);
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retrieve up to `top_k` passages for `text`
    pub async fn retrieve(&self, text: &str, top_k: usize) -> Result<RetrievalResult> {
        self.retrieve_query(&Query::new(text, top_k)).await
    }

    /// Retrieve for a full query.
    ///
    /// Fails closed: if the embedder or the index cannot answer, the error is
    /// `RetrievalUnavailable` rather than an empty result. A query that
    /// embeds to the zero vector is the caller's problem and surfaces as
    /// `ZeroVector`.
    pub async fn retrieve_query(&self, query: &Query) -> Result<RetrievalResult> {
        if query.top_k == 0 {
            return Ok(RetrievalResult::default());
        }

        let vector = with_timeout(self.timeout, self.embedder.embed(&query.raw_text))
            .await
            .map_err(unavailable)?;

        let fetch = query.top_k.saturating_mul(self.overfetch_factor);
        let candidates = self
            .index
            .query(&vector, fetch, query.filter.as_ref())
            .await
            .map_err(unavailable)?;
        debug!("{} candidates for {:?}", candidates.len(), query.raw_text);

        let mut hits = collapse_overlaps(candidates);
        hits.retain(|h| h.score >= self.min_score);
        hits.truncate(query.top_k);

        Ok(RetrievalResult { hits })
    }
}

fn unavailable(err: Error) -> Error {
    match err {
        Error::ZeroVector => Error::ZeroVector,
        other => {
            warn!("Retrieval failed: {}", other);
            Error::RetrievalUnavailable(Box::new(other))
        }
    }
}

/// Keep the best-ranked hit among chunks that share bytes of one document.
/// Input must already be in rank order.
pub fn collapse_overlaps(ranked: Vec<ScoredEntry>) -> Vec<ScoredEntry> {
    let mut kept: Vec<ScoredEntry> = Vec::with_capacity(ranked.len());
    for hit in ranked {
        if kept.iter().any(|k| k.entry.overlaps(&hit.entry)) {
            continue;
        }
        kept.push(hit);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashingEmbedder;
    use crate::index::test_support::entry;
    use crate::index::{IndexEntry, LocalIndex, SearchParams};
    use async_trait::async_trait;

    struct DownEmbedder;

    #[async_trait]
    impl Embedder for DownEmbedder {
        async fn embed_batch(&self, _texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            Err(Error::EmbeddingUnavailable("connection refused".to_string()))
        }

        fn dimension(&self) -> usize {
            8
        }

        fn model_id(&self) -> &str {
            "down"
        }
    }

    struct StallingEmbedder;

    #[async_trait]
    impl Embedder for StallingEmbedder {
        async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(texts.iter().map(|_| vec![1.0; 8]).collect())
        }

        fn dimension(&self) -> usize {
            8
        }

        fn model_id(&self) -> &str {
            "stall"
        }
    }

    async fn indexed(embedder: &HashingEmbedder, texts: &[(&str, &str, usize, usize)]) -> Arc<LocalIndex> {
        let index = LocalIndex::in_memory("hash", 256, SearchParams::default());
        let mut entries = Vec::new();
        for (i, (doc, text, start, end)) in texts.iter().enumerate() {
            let mut e: IndexEntry = entry(&format!("c{}", i), doc, i, embedder.embed(text).await.unwrap());
            e.text = text.to_string();
            e.start_offset = *start;
            e.end_offset = *end;
            entries.push(e);
        }
        index.upsert(entries).await.unwrap();
        Arc::new(index)
    }

    #[tokio::test]
    async fn test_overlapping_chunks_collapse() {
        let embedder = HashingEmbedder::new(256);
        let index = indexed(
            &embedder,
            &[
                ("a.txt", "flood damage is excluded from coverage", 0, 40),
                ("a.txt", "excluded from coverage unless flood rider", 20, 60),
                ("b.txt", "flood rider adds coverage for flood damage", 0, 42),
            ],
        )
        .await;

        let retriever = Retriever::new(Arc::new(embedder), index);
        let result = retriever.retrieve("flood damage coverage", 5).await.unwrap();

        let a_hits = result.hits.iter().filter(|h| h.entry.document_id == "a.txt").count();
        assert_eq!(a_hits, 1);
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_min_score_and_top_k() {
        let embedder = HashingEmbedder::new(256);
        let index = indexed(
            &embedder,
            &[
                ("a.txt", "theft of personal property", 0, 26),
                ("b.txt", "theft of vehicles", 0, 17),
                ("c.txt", "earthquake deductible schedule", 0, 30),
            ],
        )
        .await;

        let retriever = Retriever::new(Arc::new(embedder), index).with_min_score(0.2);
        let result = retriever.retrieve("theft", 5).await.unwrap();
        assert_eq!(result.len(), 2);
        assert!(result.hits.iter().all(|h| h.score >= 0.2));

        let result = retriever.retrieve("theft", 1).await.unwrap();
        assert_eq!(result.len(), 1);
    }

    #[tokio::test]
    async fn test_filter_restricts_results() {
        let embedder = HashingEmbedder::new(256);
        let index = indexed(
            &embedder,
            &[("a.txt", "hail damage", 0, 11), ("b.txt", "hail damage roof", 0, 16)],
        )
        .await;
        let retriever = Retriever::new(Arc::new(embedder), index);

        let query = Query::new("hail damage", 5)
            .with_filter(MetadataFilter::new().with("document_id", "b.txt"));
        let result = retriever.retrieve_query(&query).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.hits[0].entry.document_id, "b.txt");
    }

    #[tokio::test]
    async fn test_empty_index_is_not_an_error() {
        let index = Arc::new(LocalIndex::in_memory("hash", 64, SearchParams::default()));
        let retriever = Retriever::new(Arc::new(HashingEmbedder::new(64)), index);
        assert!(retriever.retrieve("anything", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embedder_failure_fails_closed() {
        let index = Arc::new(LocalIndex::in_memory("down", 8, SearchParams::default()));
        let retriever = Retriever::new(Arc::new(DownEmbedder), index);

        let err = retriever.retrieve("fire", 3).await.unwrap_err();
        assert!(matches!(err, Error::RetrievalUnavailable(_)));
    }

    #[tokio::test]
    async fn test_embedder_timeout_is_retryable() {
        let index = Arc::new(LocalIndex::in_memory("stall", 8, SearchParams::default()));
        let retriever = Retriever::new(Arc::new(StallingEmbedder), index)
            .with_timeout(Duration::from_millis(20));

        let err = retriever.retrieve("fire", 3).await.unwrap_err();
        assert!(matches!(&err, Error::RetrievalUnavailable(cause) if matches!(**cause, Error::Timeout(20))));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_blank_query_is_caller_error() {
        let index = Arc::new(LocalIndex::in_memory("hash", 64, SearchParams::default()));
        let retriever = Retriever::new(Arc::new(HashingEmbedder::new(64)), index);
        assert!(matches!(
            retriever.retrieve("   ", 3).await,
            Err(Error::ZeroVector)
        ));
    }
}
