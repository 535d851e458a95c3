//! Metadata storage using SQLite
//!
//! This module tracks what has been ingested:
//! - Documents (hash, title, chunk count) used to skip unchanged files
//! - Ingestion runs (history and stats)

mod schema;

pub use schema::*;

use crate::config::Config;
use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Ingestion run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for RunStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(Error::Config(format!("Unknown run status: {}", s))),
        }
    }
}

/// Registry row for an ingested document
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub corpus_root: String,
    pub source_path: String,
    pub title: String,
    pub content_hash: String,
    pub chunk_count: i64,
    pub tags_json: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl DocumentRecord {
    pub fn new(corpus_root: &Path, document: &crate::loader::Document, chunk_count: usize) -> Self {
        let now = Utc::now().to_rfc3339();
        let tags_json = if document.tags.is_empty() {
            None
        } else {
            serde_json::to_string(&document.tags).ok()
        };

        Self {
            id: document.id.clone(),
            corpus_root: corpus_root.display().to_string(),
            source_path: document.source_path.display().to_string(),
            title: document.title.clone(),
            content_hash: document.content_hash.clone(),
            chunk_count: chunk_count as i64,
            tags_json,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn tags(&self) -> BTreeMap<String, String> {
        self.tags_json
            .as_ref()
            .and_then(|j| serde_json::from_str(j).ok())
            .unwrap_or_default()
    }
}

/// An ingestion run record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct IngestionRun {
    pub id: String,
    pub corpus_root: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub status: String,
    pub docs_processed: i64,
    pub docs_skipped: i64,
    pub chunks_created: i64,
    pub chunks_deleted: i64,
    pub errors_json: Option<String>,
}

impl IngestionRun {
    pub fn new(corpus_root: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            corpus_root,
            started_at: Utc::now().to_rfc3339(),
            completed_at: None,
            status: RunStatus::Running.to_string(),
            docs_processed: 0,
            docs_skipped: 0,
            chunks_created: 0,
            chunks_deleted: 0,
            errors_json: None,
        }
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors_json
            .as_ref()
            .and_then(|j| serde_json::from_str(j).ok())
            .unwrap_or_default()
    }
}

/// Counters recorded when a run finishes
#[derive(Debug, Clone, Default)]
pub struct RunTotals {
    pub docs_processed: usize,
    pub docs_skipped: usize,
    pub chunks_created: usize,
    pub chunks_deleted: usize,
    pub errors: Vec<String>,
}

/// Registry-wide statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryStats {
    pub documents: usize,
    pub chunks: usize,
    pub runs: usize,
}

/// Metadata database handle
#[derive(Clone)]
pub struct MetaDb {
    pool: SqlitePool,
}

impl MetaDb {
    /// Connect to the metadata database
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open(&config.paths.db_file).await
    }

    /// Connect to a database file directly
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type='table' AND name='documents'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(result.is_some())
    }

    // ===== Document Operations =====

    /// Insert or update a document, keeping its original creation time
    pub async fn upsert_document(&self, doc: &DocumentRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, corpus_root, source_path, title, content_hash, chunk_count, tags_json, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                corpus_root = excluded.corpus_root,
                source_path = excluded.source_path,
                title = excluded.title,
                content_hash = excluded.content_hash,
                chunk_count = excluded.chunk_count,
                tags_json = excluded.tags_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.corpus_root)
        .bind(&doc.source_path)
        .bind(&doc.title)
        .bind(&doc.content_hash)
        .bind(doc.chunk_count)
        .bind(&doc.tags_json)
        .bind(&doc.created_at)
        .bind(&doc.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get document by ID
    pub async fn get_document(&self, id: &str) -> Result<Option<DocumentRecord>> {
        let doc = sqlx::query_as::<_, DocumentRecord>("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(doc)
    }

    /// List documents ingested from a corpus directory
    pub async fn list_documents(&self, corpus_root: &str) -> Result<Vec<DocumentRecord>> {
        let docs = sqlx::query_as::<_, DocumentRecord>(
            "SELECT * FROM documents WHERE corpus_root = ? ORDER BY id",
        )
        .bind(corpus_root)
        .fetch_all(&self.pool)
        .await?;
        Ok(docs)
    }

    /// List every registered document
    pub async fn list_all_documents(&self) -> Result<Vec<DocumentRecord>> {
        let docs = sqlx::query_as::<_, DocumentRecord>("SELECT * FROM documents ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(docs)
    }

    /// Documents under `corpus_root` whose id is not in `seen_ids`
    pub async fn find_stale_documents(
        &self,
        corpus_root: &str,
        seen_ids: &HashSet<String>,
    ) -> Result<Vec<DocumentRecord>> {
        let docs = self.list_documents(corpus_root).await?;
        Ok(docs
            .into_iter()
            .filter(|d| !seen_ids.contains(&d.id))
            .collect())
    }

    /// Delete a document record. Returns whether it existed.
    pub async fn delete_document(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Forget every document so the next ingest re-embeds the corpus
    pub async fn clear_documents(&self) -> Result<usize> {
        let result = sqlx::query("DELETE FROM documents")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    // ===== Ingestion Run Operations =====

    /// Start a new ingestion run
    pub async fn start_ingestion_run(&self, corpus_root: &str) -> Result<IngestionRun> {
        let run = IngestionRun::new(corpus_root.to_string());
        sqlx::query(
            r#"
            INSERT INTO ingestion_runs (id, corpus_root, started_at, status, docs_processed, docs_skipped, chunks_created, chunks_deleted)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.corpus_root)
        .bind(&run.started_at)
        .bind(&run.status)
        .bind(run.docs_processed)
        .bind(run.docs_skipped)
        .bind(run.chunks_created)
        .bind(run.chunks_deleted)
        .execute(&self.pool)
        .await?;
        Ok(run)
    }

    /// Complete an ingestion run
    pub async fn complete_ingestion_run(
        &self,
        id: &str,
        status: RunStatus,
        totals: &RunTotals,
    ) -> Result<()> {
        let errors_json = if totals.errors.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&totals.errors)?)
        };

        sqlx::query(
            r#"
            UPDATE ingestion_runs SET
                completed_at = ?,
                status = ?,
                docs_processed = ?,
                docs_skipped = ?,
                chunks_created = ?,
                chunks_deleted = ?,
                errors_json = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(status.to_string())
        .bind(totals.docs_processed as i64)
        .bind(totals.docs_skipped as i64)
        .bind(totals.chunks_created as i64)
        .bind(totals.chunks_deleted as i64)
        .bind(errors_json)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent run across all corpora
    pub async fn get_latest_run(&self) -> Result<Option<IngestionRun>> {
        let run = sqlx::query_as::<_, IngestionRun>(
            "SELECT * FROM ingestion_runs ORDER BY started_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(run)
    }

    // ===== Statistics =====

    pub async fn get_stats(&self) -> Result<RegistryStats> {
        let (documents, chunks): (i64, Option<i64>) =
            sqlx::query_as("SELECT COUNT(*), SUM(chunk_count) FROM documents")
                .fetch_one(&self.pool)
                .await?;
        let runs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ingestion_runs")
            .fetch_one(&self.pool)
            .await?;

        Ok(RegistryStats {
            documents: documents as usize,
            chunks: chunks.unwrap_or(0) as usize,
            runs: runs as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::Document;
    use std::path::PathBuf;
    use tempfile::TempDir;

    async fn setup_test_db() -> (MetaDb, TempDir) {
        let tmp = TempDir::new().unwrap();
        let db = MetaDb::open(&tmp.path().join("metadata.db")).await.unwrap();
        db.init_schema().await.unwrap();
        (db, tmp)
    }

    fn record(id: &str, text: &str, chunks: usize) -> DocumentRecord {
        let doc = Document::from_text(id, PathBuf::from(format!("/corpus/{}", id)), text).unwrap();
        DocumentRecord::new(Path::new("/corpus"), &doc, chunks)
    }

    #[tokio::test]
    async fn test_schema_init() {
        let (db, _tmp) = setup_test_db().await;
        assert!(db.is_initialized().await.unwrap());
    }

    #[tokio::test]
    async fn test_document_upsert_keeps_created_at() {
        let (db, _tmp) = setup_test_db().await;

        let first = record("fire.txt", "Fire damage is covered.", 1);
        db.upsert_document(&first).await.unwrap();

        let mut second = record("fire.txt", "Fire and smoke damage are covered.", 2);
        second.created_at = "later".to_string();
        db.upsert_document(&second).await.unwrap();

        let stored = db.get_document("fire.txt").await.unwrap().unwrap();
        assert_eq!(stored.created_at, first.created_at);
        assert_eq!(stored.content_hash, second.content_hash);
        assert_eq!(stored.chunk_count, 2);
    }

    #[tokio::test]
    async fn test_stale_documents() {
        let (db, _tmp) = setup_test_db().await;
        db.upsert_document(&record("a.txt", "alpha", 1)).await.unwrap();
        db.upsert_document(&record("b.txt", "beta", 1)).await.unwrap();

        let seen: HashSet<String> = ["a.txt".to_string()].into_iter().collect();
        let stale = db.find_stale_documents("/corpus", &seen).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, "b.txt");

        assert!(db.delete_document("b.txt").await.unwrap());
        assert!(!db.delete_document("b.txt").await.unwrap());
        assert!(db.find_stale_documents("/other", &seen).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ingestion_run_lifecycle() {
        let (db, _tmp) = setup_test_db().await;
        assert!(db.get_latest_run().await.unwrap().is_none());

        let run = db.start_ingestion_run("/corpus").await.unwrap();
        let totals = RunTotals {
            docs_processed: 3,
            docs_skipped: 1,
            chunks_created: 7,
            chunks_deleted: 2,
            errors: vec!["empty.txt: no content".to_string()],
        };
        db.complete_ingestion_run(&run.id, RunStatus::Completed, &totals)
            .await
            .unwrap();

        let latest = db.get_latest_run().await.unwrap().unwrap();
        assert_eq!(latest.id, run.id);
        assert_eq!(latest.status.parse::<RunStatus>().unwrap(), RunStatus::Completed);
        assert_eq!(latest.chunks_created, 7);
        assert_eq!(latest.errors(), totals.errors);
        assert!(latest.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_stats() {
        let (db, _tmp) = setup_test_db().await;
        let empty = db.get_stats().await.unwrap();
        assert_eq!(empty.documents, 0);
        assert_eq!(empty.chunks, 0);

        db.upsert_document(&record("a.txt", "alpha", 2)).await.unwrap();
        db.upsert_document(&record("b.txt", "beta", 3)).await.unwrap();
        db.start_ingestion_run("/corpus").await.unwrap();

        let stats = db.get_stats().await.unwrap();
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.chunks, 5);
        assert_eq!(stats.runs, 1);
    }

    #[test]
    fn test_run_status_parse() {
        assert_eq!("FAILED".parse::<RunStatus>().unwrap(), RunStatus::Failed);
        assert!("paused".parse::<RunStatus>().is_err());
    }
}
