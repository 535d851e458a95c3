//! Configuration management for policyrag
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Upper bound on generator retries; backoff doubles per attempt
pub const MAX_GENERATOR_RETRIES: u32 = 10;

/// Parse a service base URL so relative endpoints append to its path.
///
/// `http://host/v1` becomes `http://host/v1/`; without the trailing slash
/// `Url::join` would replace `v1` instead of extending it.
pub fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim())?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Embedding backend configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chunking configuration
    #[serde(default)]
    pub chunk: ChunkConfig,

    /// Vector index configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Query configuration
    #[serde(default)]
    pub query: QueryConfig,

    /// Context assembly configuration
    #[serde(default)]
    pub context: ContextConfig,

    /// Optional text generator
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Corpus ingestion configuration
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Embedding backend kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackendKind {
    /// Local deterministic feature hashing
    Hashing,
    /// Remote embedding server
    Http,
}

impl FromStr for EmbeddingBackendKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "hashing" | "hash" | "local" => Ok(Self::Hashing),
            "http" | "https" => Ok(Self::Http),
            _ => Err(Error::Config(format!(
                "Unsupported embedding backend '{}'; expected 'hashing' or 'http'",
                value
            ))),
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Backend kind ("hashing" or "http")
    #[serde(default = "default_embedding_backend")]
    pub backend: String,

    /// Model name/identifier, recorded in the index manifest
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Backend URL (http backend only)
    #[serde(default = "default_embedding_url")]
    pub url: String,

    /// Texts per embedding request
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// Batches in flight at once
    #[serde(default = "default_embedding_concurrency")]
    pub concurrency: usize,

    /// Per-call timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl EmbeddingConfig {
    pub fn backend_kind(&self) -> Result<EmbeddingBackendKind> {
        self.backend.parse()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Maximum model tokens per chunk
    #[serde(default = "default_chunk_max_tokens")]
    pub max_tokens: usize,

    /// Tokens shared by consecutive chunks
    #[serde(default = "default_chunk_overlap_tokens")]
    pub overlap_tokens: usize,
}

/// Nearest-neighbor search structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Exact,
    Hnsw,
}

impl FromStr for SearchMode {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "exact" | "flat" => Ok(Self::Exact),
            "hnsw" | "approximate" => Ok(Self::Hnsw),
            _ => Err(Error::Config(format!(
                "Unknown index.search '{}'; expected 'exact' or 'hnsw'",
                value
            ))),
        }
    }
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// "exact" or "hnsw"
    #[serde(default = "default_index_search")]
    pub search: String,

    /// HNSW neighbors per node per layer
    #[serde(default = "default_hnsw_m")]
    pub hnsw_m: usize,

    /// HNSW beam width while inserting
    #[serde(default = "default_hnsw_ef_construction")]
    pub hnsw_ef_construction: usize,

    /// HNSW beam width while querying
    #[serde(default = "default_hnsw_ef_search")]
    pub hnsw_ef_search: usize,

    /// Rebuild the graph once this share of its nodes are tombstones
    #[serde(default = "default_rebuild_tombstone_ratio")]
    pub rebuild_tombstone_ratio: f32,
}

impl IndexConfig {
    pub fn search_mode(&self) -> Result<SearchMode> {
        self.search.parse()
    }
}

/// Query configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Default number of results
    #[serde(default = "default_query_k")]
    pub default_k: usize,

    /// Maximum results allowed
    #[serde(default = "default_query_max_results")]
    pub max_results: usize,

    /// Candidates fetched per requested result before overlap collapsing
    #[serde(default = "default_query_overfetch_factor")]
    pub overfetch_factor: usize,

    /// Minimum cosine similarity (-1.0 - 1.0)
    #[serde(default = "default_query_min_score")]
    pub min_score: f32,
}

/// Context assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Budget for included chunk text, in characters
    #[serde(default = "default_context_max_chars")]
    pub max_context_chars: usize,
}

/// Generator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_generator_enabled")]
    pub enabled: bool,

    /// Base URL of a llama.cpp / Ollama compatible server
    #[serde(default = "default_generator_url")]
    pub url: String,

    #[serde(default = "default_generator_model")]
    pub model: String,

    #[serde(default = "default_generator_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_generator_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_generator_temperature")]
    pub temperature: f32,
}

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Documents processed concurrently
    #[serde(default = "default_ingest_concurrency")]
    pub concurrency: usize,

    /// File extensions considered part of the corpus
    #[serde(default = "default_ingest_extensions")]
    pub extensions: Vec<String>,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for policyrag data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to the document registry database
    pub db_file: PathBuf,

    /// Path to the vector index database
    pub index_file: PathBuf,
}

impl PathsConfig {
    fn under(base: PathBuf, config_file: PathBuf) -> Self {
        Self {
            config_file,
            db_file: base.join("metadata.db"),
            index_file: base.join("index.db"),
            base_dir: base,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: default_embedding_backend(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            url: default_embedding_url(),
            batch_size: default_embedding_batch_size(),
            concurrency: default_embedding_concurrency(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_chunk_max_tokens(),
            overlap_tokens: default_chunk_overlap_tokens(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            search: default_index_search(),
            hnsw_m: default_hnsw_m(),
            hnsw_ef_construction: default_hnsw_ef_construction(),
            hnsw_ef_search: default_hnsw_ef_search(),
            rebuild_tombstone_ratio: default_rebuild_tombstone_ratio(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_k: default_query_k(),
            max_results: default_query_max_results(),
            overfetch_factor: default_query_overfetch_factor(),
            min_score: default_query_min_score(),
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_chars: default_context_max_chars(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            enabled: default_generator_enabled(),
            url: default_generator_url(),
            model: default_generator_model(),
            timeout_secs: default_generator_timeout(),
            max_retries: default_generator_max_retries(),
            temperature: default_generator_temperature(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: default_ingest_concurrency(),
            extensions: default_ingest_extensions(),
        }
    }
}

impl Config {
    /// Get the default base directory for policyrag (~/.policyrag)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".policyrag")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        let config_file = base.join("config.toml");
        self.paths = PathsConfig::under(base, config_file);
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig::under(base, config_path.to_path_buf());

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Check if policyrag is initialized (config and registry exist)
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists() && self.paths.db_file.exists()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.embedding.backend_kind()?;
        self.index.search_mode()?;

        if self.embedding.dimension == 0 {
            return Err(Error::Config(
                "embedding.dimension must be at least 1".to_string(),
            ));
        }

        if self.embedding.batch_size == 0 {
            return Err(Error::Config(
                "embedding.batch_size must be at least 1".to_string(),
            ));
        }

        if self.embedding.concurrency == 0 || self.ingest.concurrency == 0 {
            return Err(Error::Config(
                "embedding.concurrency and ingest.concurrency must be at least 1".to_string(),
            ));
        }

        if self.chunk.max_tokens == 0 {
            return Err(Error::Config(
                "chunk.max_tokens must be at least 1".to_string(),
            ));
        }

        if self.chunk.overlap_tokens >= self.chunk.max_tokens {
            return Err(Error::Config(
                "chunk.overlap_tokens must be < chunk.max_tokens".to_string(),
            ));
        }

        if self.index.hnsw_m < 2 || self.index.hnsw_ef_search == 0 {
            return Err(Error::Config(
                "index.hnsw_m must be >= 2 and index.hnsw_ef_search >= 1".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.index.rebuild_tombstone_ratio) {
            return Err(Error::Config(
                "index.rebuild_tombstone_ratio must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.query.overfetch_factor == 0 {
            return Err(Error::Config(
                "query.overfetch_factor must be at least 1".to_string(),
            ));
        }

        if self.query.default_k == 0 || self.query.default_k > self.query.max_results {
            return Err(Error::Config(
                "query.default_k must be between 1 and query.max_results".to_string(),
            ));
        }

        if !(-1.0..=1.0).contains(&self.query.min_score) {
            return Err(Error::Config(
                "query.min_score must be between -1.0 and 1.0".to_string(),
            ));
        }

        if self.generator.max_retries > MAX_GENERATOR_RETRIES {
            return Err(Error::Config(format!(
                "generator.max_retries must be at most {}",
                MAX_GENERATOR_RETRIES
            )));
        }

        if self.ingest.extensions.is_empty() {
            return Err(Error::Config(
                "ingest.extensions must list at least one extension".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.embedding.dimension, 384);
        assert_eq!(config.query.default_k, 5);
        assert_eq!(config.index.search_mode().unwrap(), SearchMode::Hnsw);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.chunk.max_tokens = 120;
        config.index.search = "exact".to_string();

        config.save().unwrap();
        assert!(config.paths.config_file.exists());

        let loaded = Config::load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(loaded.chunk.max_tokens, 120);
        assert_eq!(loaded.index.search_mode().unwrap(), SearchMode::Exact);
        assert_eq!(loaded.paths.index_file, tmp.path().join("index.db"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[query]\ndefault_k = 3\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.query.default_k, 3);
        assert_eq!(config.query.overfetch_factor, 3);
        assert_eq!(config.chunk.overlap_tokens, 40);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.chunk.overlap_tokens = config.chunk.max_tokens;
        assert!(config.validate().is_err());

        config.chunk.overlap_tokens = 10;
        assert!(config.validate().is_ok());

        config.query.overfetch_factor = 0;
        assert!(config.validate().is_err());
        config.query.overfetch_factor = 2;

        config.query.min_score = 1.5;
        assert!(config.validate().is_err());
        config.query.min_score = -0.5;
        assert!(config.validate().is_ok());

        config.generator.max_retries = MAX_GENERATOR_RETRIES + 22;
        assert!(config.validate().is_err());
        config.generator.max_retries = MAX_GENERATOR_RETRIES;
        assert!(config.validate().is_ok());

        config.embedding.backend = "carrier-pigeon".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_base_url_keeps_path_prefix() {
        let url = parse_base_url("http://models.local/v1").unwrap();
        assert_eq!(url.join("embed").unwrap().as_str(), "http://models.local/v1/embed");

        let url = parse_base_url("http://models.local/v1/").unwrap();
        assert_eq!(url.join("embed").unwrap().as_str(), "http://models.local/v1/embed");

        let url = parse_base_url("http://127.0.0.1:11434").unwrap();
        assert_eq!(
            url.join("api/generate").unwrap().as_str(),
            "http://127.0.0.1:11434/api/generate"
        );

        assert!(parse_base_url("not a url").is_err());
    }

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!(
            "HTTP".parse::<EmbeddingBackendKind>().unwrap(),
            EmbeddingBackendKind::Http
        );
        assert_eq!(
            "hashing".parse::<EmbeddingBackendKind>().unwrap(),
            EmbeddingBackendKind::Hashing
        );
        assert!("onnx".parse::<EmbeddingBackendKind>().is_err());
    }
}
