//! Deterministic feature-hashing embedder
//!
//! Maps normalized word unigrams into a fixed number of buckets with
//! blake3, then L2-normalizes. No model download, no network, identical
//! output on every machine. Useful as the default backend and in tests.

use super::{normalize_embedding, vector_norm, Embedder, MIN_NORM};
use crate::error::{Error, Result};
use async_trait::async_trait;
use unicode_segmentation::UnicodeSegmentation;

const STOPWORDS: &[&str] = &[
    "a", "about", "all", "also", "am", "an", "and", "any", "are", "as", "at", "be", "been", "but",
    "by", "can", "could", "did", "do", "does", "for", "from", "had", "has", "have", "how", "i",
    "if", "in", "into", "is", "it", "its", "me", "my", "of", "on", "or", "our", "shall", "should",
    "so", "than", "that", "the", "their", "them", "then", "there", "these", "they", "this",
    "those", "to", "up", "us", "was", "we", "were", "what", "when", "where", "which", "who",
    "whom", "why", "will", "with", "would", "you", "your",
];

/// Scheme tag recorded in index manifests; bump when `terms` or `bucket` change
pub const HASHING_SCHEME: &str = "hashing-v1";

/// Local embedder based on feature hashing
pub struct HashingEmbedder {
    model_id: String,
    dimension: usize,
}

impl HashingEmbedder {
    /// The model id is `hashing-v1/<dimension>`, so an index built with this
    /// backend never opens under a different backend or bucket count.
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            model_id: format!("{}/{}", HASHING_SCHEME, dimension),
            dimension,
        }
    }

    /// Embed one text synchronously
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];

        for term in terms(text) {
            vector[self.bucket(&term)] += 1.0;
        }

        if vector_norm(&vector) < MIN_NORM {
            return Err(Error::ZeroVector);
        }

        Ok(normalize_embedding(&vector))
    }

    fn bucket(&self, term: &str) -> usize {
        let hash = blake3::hash(term.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        (u64::from_le_bytes(bytes) % self.dimension as u64) as usize
    }
}

/// Lowercased, stemmed content words. Falls back to every word when the
/// text is all stopwords, and to raw whitespace runs when it has no words.
pub fn terms(text: &str) -> Vec<String> {
    let words: Vec<String> = text.unicode_words().map(|w| w.to_lowercase()).collect();

    if words.is_empty() {
        return text.split_whitespace().map(|w| w.to_lowercase()).collect();
    }

    let content: Vec<String> = words
        .iter()
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .map(|w| stem(w))
        .collect();

    if content.is_empty() {
        words.iter().map(|w| stem(w)).collect()
    } else {
        content
    }
}

/// Strip common plural suffixes
fn stem(word: &str) -> String {
    if word.chars().any(|c| c.is_ascii_digit()) {
        return word.to_string();
    }
    if word.len() > 4 && word.ends_with("ies") {
        return format!("{}y", &word[..word.len() - 3]);
    }
    if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") && !word.ends_with("us") {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_text(t)).collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
