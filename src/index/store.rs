//! SQLite persistence for index entries and the manifest

use super::{IndexEntry, IndexManifest, INDEX_SCHEMA_SQL};
use crate::error::{Error, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

#[derive(Debug, FromRow)]
struct ManifestRow {
    format_version: i64,
    embedding_model: String,
    dimension: i64,
    created_at: String,
}

#[derive(Debug, FromRow)]
struct EntryRow {
    chunk_id: String,
    document_id: String,
    title: String,
    source_path: String,
    start_offset: i64,
    end_offset: i64,
    sequence_index: i64,
    text: String,
    metadata_json: String,
    vector: Vec<u8>,
    norm: f64,
}

impl EntryRow {
    fn into_entry(self) -> Result<IndexEntry> {
        let metadata: BTreeMap<String, String> = serde_json::from_str(&self.metadata_json)?;
        Ok(IndexEntry {
            chunk_id: self.chunk_id,
            document_id: self.document_id,
            title: self.title,
            source_path: self.source_path,
            start_offset: self.start_offset as usize,
            end_offset: self.end_offset as usize,
            sequence_index: self.sequence_index as usize,
            text: self.text,
            metadata,
            vector: decode_vector(&self.vector)?,
            norm: self.norm as f32,
        })
    }
}

pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(Error::Other(format!(
            "Corrupt vector blob of {} bytes",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Index database handle
#[derive(Clone)]
pub struct IndexStore {
    pool: SqlitePool,
}

impl IndexStore {
    /// Open (creating if needed) the index database and its schema
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Opening index database at {:?}", path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::query(INDEX_SCHEMA_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn read_manifest(&self) -> Result<Option<IndexManifest>> {
        let row = sqlx::query_as::<_, ManifestRow>(
            "SELECT format_version, embedding_model, dimension, created_at FROM index_manifest WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| IndexManifest {
            format_version: r.format_version,
            embedding_model: r.embedding_model,
            dimension: r.dimension as usize,
            created_at: r.created_at,
        }))
    }

    pub async fn write_manifest(&self, manifest: &IndexManifest) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO index_manifest (id, format_version, embedding_model, dimension, created_at)
            VALUES (1, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                format_version = excluded.format_version,
                embedding_model = excluded.embedding_model,
                dimension = excluded.dimension,
                created_at = excluded.created_at
            "#,
        )
        .bind(manifest.format_version)
        .bind(&manifest.embedding_model)
        .bind(manifest.dimension as i64)
        .bind(&manifest.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load every stored entry
    pub async fn load_entries(&self) -> Result<Vec<IndexEntry>> {
        let rows = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT chunk_id, document_id, title, source_path, start_offset, end_offset,
                   sequence_index, text, metadata_json, vector, norm
            FROM index_entries
            ORDER BY chunk_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EntryRow::into_entry).collect()
    }

    /// Insert or replace `upserts` and delete `deletes` in one transaction.
    /// Either every change lands or none does.
    pub async fn write_entries(&self, upserts: &[IndexEntry], deletes: &[String]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for entry in upserts {
            sqlx::query(
                r#"
                INSERT INTO index_entries (
                    chunk_id, document_id, title, source_path, start_offset, end_offset,
                    sequence_index, text, metadata_json, vector, norm, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    document_id = excluded.document_id,
                    title = excluded.title,
                    source_path = excluded.source_path,
                    start_offset = excluded.start_offset,
                    end_offset = excluded.end_offset,
                    sequence_index = excluded.sequence_index,
                    text = excluded.text,
                    metadata_json = excluded.metadata_json,
                    vector = excluded.vector,
                    norm = excluded.norm,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&entry.chunk_id)
            .bind(&entry.document_id)
            .bind(&entry.title)
            .bind(&entry.source_path)
            .bind(entry.start_offset as i64)
            .bind(entry.end_offset as i64)
            .bind(entry.sequence_index as i64)
            .bind(&entry.text)
            .bind(serde_json::to_string(&entry.metadata)?)
            .bind(encode_vector(&entry.vector))
            .bind(entry.norm as f64)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        for chunk_id in deletes {
            sqlx::query("DELETE FROM index_entries WHERE chunk_id = ?")
                .bind(chunk_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!("Wrote {} entries, deleted {}", upserts.len(), deletes.len());
        Ok(())
    }

    pub async fn count_entries(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM index_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    /// Drop all entries and the manifest
    pub async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM index_entries").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM index_manifest").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}
