//! Error types for policyrag

use thiserror::Error;

/// Main error type for policyrag operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Document has no content after normalization: {0}")]
    EmptyDocument(String),

    #[error("Embedding has zero norm")]
    ZeroVector,

    #[error("Embedding backend unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(#[source] Box<Error>),

    #[error(
        "Index at {path} was built with {found_model} (dim {found_dimension}, format {found_format}); \
         configured {expected_model} (dim {expected_dimension}, format {expected_format}). Rebuild the index."
    )]
    IndexVersionMismatch {
        path: String,
        found_model: String,
        found_dimension: usize,
        found_format: i64,
        expected_model: String,
        expected_dimension: usize,
        expected_format: i64,
    },

    #[error("Operation timed out after {0} ms")]
    Timeout(u64),

    #[error("Vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Not initialized: run 'policyrag init' first")]
    NotInitialized,

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout(_) => true,
            Error::EmbeddingUnavailable(_) => true,
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            Error::RetrievalUnavailable(cause) => cause.is_retryable(),
            _ => false,
        }
    }

    /// Errors that must abort an ingestion run instead of skipping one document.
    pub fn is_fatal_to_ingest(&self) -> bool {
        matches!(self, Error::IndexVersionMismatch { .. })
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

/// Result type alias for policyrag
pub type Result<T> = std::result::Result<T, Error>;
