//! SQLite schema for the persistent vector index

/// SQL schema for the index database
pub const INDEX_SCHEMA_SQL: &str = r#"
-- One row describing the model and layout that produced the vectors
CREATE TABLE IF NOT EXISTS index_manifest (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    format_version INTEGER NOT NULL,
    embedding_model TEXT NOT NULL,
    dimension INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

-- Entries: embedded chunks, vectors as little-endian f32 blobs
CREATE TABLE IF NOT EXISTS index_entries (
    chunk_id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL,
    title TEXT NOT NULL,
    source_path TEXT NOT NULL,
    start_offset INTEGER NOT NULL,
    end_offset INTEGER NOT NULL,
    sequence_index INTEGER NOT NULL,
    text TEXT NOT NULL,
    metadata_json TEXT NOT NULL,
    vector BLOB NOT NULL,
    norm REAL NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entries_document ON index_entries(document_id);
"#;
