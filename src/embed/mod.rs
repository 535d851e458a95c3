//! Embedding generation
//!
//! This module provides an abstraction over embedding models with:
//! - A trait for different embedding backends
//! - A deterministic local hashing backend
//! - An HTTP embedding backend
//! - Ordered, concurrent batch processing with timeouts

mod hashing;
mod http_backend;

pub use hashing::*;
pub use http_backend::*;

use crate::config::{EmbeddingBackendKind, EmbeddingConfig};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Norms below this are treated as degenerate
pub const MIN_NORM: f32 = 1e-6;

/// Trait for embedding providers
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts. Output order matches input order; any
    /// failure fails the whole batch.
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(vec![text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::EmbeddingUnavailable("backend returned no embedding".to_string()))
    }

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model identifier
    fn model_id(&self) -> &str;
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match config.backend_kind()? {
        EmbeddingBackendKind::Hashing => Arc::new(HashingEmbedder::new(config.dimension)),
        EmbeddingBackendKind::Http => Arc::new(HttpEmbedder::new(config)?),
    };
    Ok(embedder)
}

/// L2 norm of a vector
pub fn vector_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|v| v * v).sum::<f32>().sqrt()
}

pub fn normalize_embedding(vector: &[f32]) -> Vec<f32> {
    let norm = vector_norm(vector);
    if norm == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|v| v / norm).collect()
}

/// Check a backend response against the request before anyone stores it
pub fn validate_embeddings(
    embeddings: &[Vec<f32>],
    expected_count: usize,
    dimension: usize,
) -> Result<()> {
    if embeddings.len() != expected_count {
        return Err(Error::EmbeddingUnavailable(format!(
            "backend returned {} embeddings for {} inputs",
            embeddings.len(),
            expected_count
        )));
    }

    for vector in embeddings {
        if vector.len() != dimension {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                got: vector.len(),
            });
        }
        if vector_norm(vector) < MIN_NORM {
            return Err(Error::ZeroVector);
        }
    }

    Ok(())
}

/// Run a future under a deadline, surfacing expiry as a retryable timeout
pub async fn with_timeout<T, F>(timeout: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(timeout.as_millis() as u64)),
    }
}

/// Embed texts in batches, `concurrency` batches at a time, preserving order
pub async fn embed_in_batches(
    embedder: &dyn Embedder,
    texts: Vec<String>,
    batch_size: usize,
    concurrency: usize,
    timeout: Duration,
) -> Result<Vec<Vec<f32>>> {
    let total = texts.len();
    let batches: Vec<Vec<String>> = texts
        .chunks(batch_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect();

    let results: Vec<Vec<Vec<f32>>> = futures::stream::iter(batches)
        .map(|batch| with_timeout(timeout, embedder.embed_batch(batch)))
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    let mut all_embeddings = Vec::with_capacity(total);
    for batch in results {
        all_embeddings.extend(batch);
    }

    Ok(all_embeddings)
}
