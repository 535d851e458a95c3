//! Ingest command implementation

use crate::chunk::chunk_document;
use crate::config::Config;
use crate::embed::{create_embedder, embed_in_batches, validate_embeddings, Embedder};
use crate::error::{Error, Result};
use crate::index::{IndexEntry, VectorIndex};
use crate::loader::{discover_files, document_id, load_file};
use crate::meta::{DocumentRecord, MetaDb, RunStatus, RunTotals};
use crate::progress::{advance_progress, finish_progress, start_progress_bar};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Statistics from an ingestion run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestStats {
    pub corpus_root: String,
    pub files_found: usize,
    pub docs_processed: usize,
    pub docs_unchanged: usize,
    pub docs_skipped: usize,
    pub docs_removed: usize,
    pub chunks_created: usize,
    pub chunks_deleted: usize,
    pub errors: Vec<String>,
}

enum FileOutcome {
    Indexed { chunks_created: usize, chunks_deleted: usize },
    Unchanged,
    Binary,
}

/// Ingest every supported file under `path`.
///
/// Unchanged documents are skipped by content hash, changed ones are
/// re-chunked and swapped in with a single index commit, and documents whose files
/// vanished from the directory are removed from the index and registry.
/// A failing document is logged and recorded; only errors that make the
/// whole index unusable abort the run.
pub async fn cmd_ingest_dir(
    config: &Config,
    db: &MetaDb,
    index: &Arc<dyn VectorIndex>,
    path: &Path,
) -> Result<IngestStats> {
    let root = path
        .canonicalize()
        .map_err(|e| Error::InvalidPath(format!("{}: {}", path.display(), e)))?;
    let root_str = root.display().to_string();
    info!("Ingesting directory: {}", root_str);

    let files = discover_files(&root, &config.ingest.extensions)?;
    let run = db.start_ingestion_run(&root_str).await?;
    let embedder = create_embedder(&config.embedding)?;

    let mut stats = IngestStats {
        corpus_root: root_str.clone(),
        files_found: files.len(),
        ..Default::default()
    };

    info!("Found {} files to process", files.len());

    let seen: HashSet<String> = files.iter().map(|f| document_id(&root, f)).collect();
    let progress = start_progress_bar(files.len(), "Indexing documents");

    let mut outcomes = futures::stream::iter(files.iter().cloned())
        .map(|file| {
            let root = root.clone();
            let embedder = Arc::clone(&embedder);
            async move {
                let outcome = process_file(config, db, index, embedder.as_ref(), &root, &file).await;
                (file, outcome)
            }
        })
        .buffer_unordered(config.ingest.concurrency.max(1));

    let mut fatal: Option<Error> = None;
    while let Some((file, outcome)) = outcomes.next().await {
        match outcome {
            Ok(FileOutcome::Indexed {
                chunks_created,
                chunks_deleted,
            }) => {
                stats.docs_processed += 1;
                stats.chunks_created += chunks_created;
                stats.chunks_deleted += chunks_deleted;
            }
            Ok(FileOutcome::Unchanged) => stats.docs_unchanged += 1,
            Ok(FileOutcome::Binary) => stats.docs_skipped += 1,
            Err(e) if e.is_fatal_to_ingest() => {
                fatal = Some(e);
                break;
            }
            Err(e) => {
                let error_msg = format!("{}: {}", file.display(), e);
                warn!("{}", error_msg);
                stats.errors.push(error_msg);
                stats.docs_skipped += 1;
            }
        }
        advance_progress(&progress);
    }

    if let Some(e) = fatal {
        finish_progress(progress, "Aborted");
        stats.errors.push(e.to_string());
        db.complete_ingestion_run(&run.id, RunStatus::Failed, &totals(&stats))
            .await?;
        return Err(e);
    }

    finish_progress(progress, "Documents indexed");

    let stale = db.find_stale_documents(&root_str, &seen).await?;
    for doc in stale {
        let chunk_ids = index.chunk_ids_for_document(&doc.id).await;
        stats.chunks_deleted += index.delete(&chunk_ids).await?;
        db.delete_document(&doc.id).await?;
        stats.docs_removed += 1;
        debug!("Removed vanished document {}", doc.id);
    }
    if stats.docs_removed > 0 {
        info!("Removed {} documents no longer in the corpus", stats.docs_removed);
    }

    stats.errors.sort();
    let status = if stats.errors.is_empty() {
        RunStatus::Completed
    } else {
        RunStatus::Failed
    };
    db.complete_ingestion_run(&run.id, status, &totals(&stats)).await?;

    info!(
        "Ingestion complete: {} docs indexed, {} unchanged, {} chunks created, {} chunks deleted",
        stats.docs_processed, stats.docs_unchanged, stats.chunks_created, stats.chunks_deleted
    );

    Ok(stats)
}

fn totals(stats: &IngestStats) -> RunTotals {
    RunTotals {
        docs_processed: stats.docs_processed,
        docs_skipped: stats.docs_skipped,
        chunks_created: stats.chunks_created,
        chunks_deleted: stats.chunks_deleted,
        errors: stats.errors.clone(),
    }
}

/// Load, chunk, embed and index a single file
async fn process_file(
    config: &Config,
    db: &MetaDb,
    index: &Arc<dyn VectorIndex>,
    embedder: &dyn Embedder,
    root: &Path,
    path: &Path,
) -> Result<FileOutcome> {
    debug!("Processing file: {}", path.display());

    let Some(document) = load_file(root, path)? else {
        return Ok(FileOutcome::Binary);
    };

    let previous_ids = index.chunk_ids_for_document(&document.id).await;
    if let Some(existing) = db.get_document(&document.id).await? {
        if existing.content_hash == document.content_hash && !previous_ids.is_empty() {
            debug!("Document unchanged: {}", document.id);
            return Ok(FileOutcome::Unchanged);
        }
    }

    let chunks = chunk_document(&document, config.chunk.max_tokens, config.chunk.overlap_tokens)?;
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = embed_in_batches(
        embedder,
        texts,
        config.embedding.batch_size,
        config.embedding.concurrency,
        config.embedding.timeout(),
    )
    .await?;
    validate_embeddings(&embeddings, chunks.len(), index.manifest().dimension)?;

    let entries: Vec<IndexEntry> = chunks
        .iter()
        .zip(embeddings)
        .map(|(chunk, vector)| IndexEntry::new(chunk, &document, vector))
        .collect();

    let chunks_deleted = index.replace_document(&document.id, entries).await?;

    db.upsert_document(&DocumentRecord::new(root, &document, chunks.len()))
        .await?;

    debug!(
        doc_id = %document.id,
        chunks = chunks.len(),
        superseded = chunks_deleted,
        "Indexed document"
    );

    Ok(FileOutcome::Indexed {
        chunks_created: chunks.len(),
        chunks_deleted,
    })
}

/// Print ingestion results to console
pub fn print_ingest_stats(stats: &IngestStats) {
    println!("\n✓ Directory ingestion complete");
    println!("  Corpus: {}", stats.corpus_root);
    println!("  Documents indexed: {}", stats.docs_processed);
    println!("  Documents unchanged: {}", stats.docs_unchanged);
    if stats.docs_removed > 0 {
        println!("  Documents removed: {}", stats.docs_removed);
    }
    println!("  Chunks created: {}", stats.chunks_created);
    println!("  Chunks deleted: {}", stats.chunks_deleted);

    if !stats.errors.is_empty() {
        println!("\n⚠ {} documents skipped:", stats.errors.len());
        for error in &stats.errors {
            println!("  {}", error);
        }
    }
}
