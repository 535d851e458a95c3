//! Default values for configuration

/// Default embedding backend kind
pub fn default_embedding_backend() -> String {
    "hashing".to_string()
}

/// Default model requested from the http backend. The hashing backend
/// ignores it and stamps indexes with its own scheme id.
pub fn default_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

/// Default embedding dimension (all-MiniLM-L6-v2)
pub fn default_embedding_dimension() -> usize {
    384
}

/// Default embedding backend URL
pub fn default_embedding_url() -> String {
    std::env::var("POLICYRAG_EMBEDDING_URL").unwrap_or_else(|_| "http://127.0.0.1:7997".to_string())
}

/// Default batch size for embedding
pub fn default_embedding_batch_size() -> usize {
    32
}

/// Default number of embedding batches in flight
pub fn default_embedding_concurrency() -> usize {
    4
}

/// Default embedding call timeout
pub fn default_embedding_timeout() -> u64 {
    30
}

/// Default maximum tokens per chunk
pub fn default_chunk_max_tokens() -> usize {
    200
}

/// Default overlap tokens between consecutive chunks
pub fn default_chunk_overlap_tokens() -> usize {
    40
}

/// Default search structure
pub fn default_index_search() -> String {
    "hnsw".to_string()
}

/// Default HNSW neighbors per layer
pub fn default_hnsw_m() -> usize {
    16
}

/// Default HNSW construction beam width
pub fn default_hnsw_ef_construction() -> usize {
    100
}

/// Default HNSW query beam width
pub fn default_hnsw_ef_search() -> usize {
    64
}

/// Default share of deleted graph nodes that triggers a rebuild
pub fn default_rebuild_tombstone_ratio() -> f32 {
    0.25
}

/// Default number of results
pub fn default_query_k() -> usize {
    5
}

/// Default maximum results allowed
pub fn default_query_max_results() -> usize {
    50
}

/// Default over-fetch multiplier before overlap collapsing
pub fn default_query_overfetch_factor() -> usize {
    3
}

/// Default minimum similarity score
pub fn default_query_min_score() -> f32 {
    0.0
}

/// Default context budget in characters
pub fn default_context_max_chars() -> usize {
    6000
}

/// Generation is off unless configured
pub fn default_generator_enabled() -> bool {
    std::env::var("POLICYRAG_GENERATOR_URL").is_ok()
}

/// Default generator server URL
pub fn default_generator_url() -> String {
    std::env::var("POLICYRAG_GENERATOR_URL").unwrap_or_else(|_| "http://127.0.0.1:8080".to_string())
}

/// Default generator model name
pub fn default_generator_model() -> String {
    std::env::var("POLICYRAG_GENERATOR_MODEL").unwrap_or_else(|_| "llama".to_string())
}

/// Default generation timeout
pub fn default_generator_timeout() -> u64 {
    120
}

/// Default generation retries
pub fn default_generator_max_retries() -> u32 {
    1
}

/// Default sampling temperature
pub fn default_generator_temperature() -> f32 {
    0.2
}

/// Default number of documents processed concurrently during ingest
pub fn default_ingest_concurrency() -> usize {
    4
}

/// Default corpus file extensions
pub fn default_ingest_extensions() -> Vec<String> {
    vec!["txt".to_string(), "md".to_string()]
}
