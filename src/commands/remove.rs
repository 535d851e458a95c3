//! Remove and rebuild commands

use crate::error::{Error, Result};
use crate::index::VectorIndex;
use crate::meta::MetaDb;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct RemoveStats {
    pub document_id: String,
    pub chunks_deleted: usize,
}

/// Delete every chunk of a document from the index and drop its registry row
pub async fn cmd_remove(
    db: &MetaDb,
    index: &Arc<dyn VectorIndex>,
    document_id: &str,
) -> Result<RemoveStats> {
    let chunk_ids = index.chunk_ids_for_document(document_id).await;
    let chunks_deleted = index.delete(&chunk_ids).await?;
    let registered = db.delete_document(document_id).await?;

    if chunks_deleted == 0 && !registered {
        return Err(Error::DocumentNotFound(document_id.to_string()));
    }

    info!("Removed {} ({} chunks)", document_id, chunks_deleted);
    Ok(RemoveStats {
        document_id: document_id.to_string(),
        chunks_deleted,
    })
}

pub fn print_remove_stats(stats: &RemoveStats) {
    println!("✓ Removed {}", stats.document_id);
    println!("  Chunks deleted: {}", stats.chunks_deleted);
}

#[derive(Debug, Clone, Serialize)]
pub struct RebuildStats {
    pub entries: usize,
    pub elapsed_ms: u128,
}

/// Rebuild the search structure from the live entries
pub async fn cmd_rebuild(index: &Arc<dyn VectorIndex>) -> Result<RebuildStats> {
    let started = Instant::now();
    index.rebuild().await?;

    Ok(RebuildStats {
        entries: index.size().await,
        elapsed_ms: started.elapsed().as_millis(),
    })
}

pub fn print_rebuild_stats(stats: &RebuildStats) {
    println!("\n🔄 Rebuild Complete\n");
    println!("Entries indexed: {}", stats.entries);
    println!("Elapsed: {} ms", stats.elapsed_ms);
}
