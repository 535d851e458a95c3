//! SQLite schema definition

/// SQL schema for the metadata database
pub const SCHEMA_SQL: &str = r#"
-- Documents: one row per ingested corpus file
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    corpus_root TEXT NOT NULL,
    source_path TEXT NOT NULL,
    title TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    chunk_count INTEGER NOT NULL DEFAULT 0,
    tags_json TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Ingestion runs: tracking history
CREATE TABLE IF NOT EXISTS ingestion_runs (
    id TEXT PRIMARY KEY,
    corpus_root TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    status TEXT NOT NULL,
    docs_processed INTEGER DEFAULT 0,
    docs_skipped INTEGER DEFAULT 0,
    chunks_created INTEGER DEFAULT 0,
    chunks_deleted INTEGER DEFAULT 0,
    errors_json TEXT
);

CREATE INDEX IF NOT EXISTS idx_documents_root ON documents(corpus_root);
CREATE INDEX IF NOT EXISTS idx_runs_root ON ingestion_runs(corpus_root);
"#;
