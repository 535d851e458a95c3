//! Status command implementation

use crate::config::Config;
use crate::error::Result;
use crate::index::{IndexManifest, VectorIndex};
use crate::meta::{IngestionRun, MetaDb, RegistryStats};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Status information
#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub index_path: String,
    pub embedding_backend: String,
    pub search: String,
    pub manifest: IndexManifest,
    pub index_entries: usize,
    pub registry: RegistryStats,
    pub last_run: Option<IngestionRun>,
    pub generator_enabled: bool,
}

/// Get system status
pub async fn cmd_status(
    config: &Config,
    db: &MetaDb,
    index: &Arc<dyn VectorIndex>,
) -> Result<StatusInfo> {
    info!("Getting status");

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        index_path: config.paths.index_file.display().to_string(),
        embedding_backend: config.embedding.backend.clone(),
        search: index.search_name().to_string(),
        manifest: index.manifest().clone(),
        index_entries: index.size().await,
        registry: db.get_stats().await?,
        last_run: db.get_latest_run().await?,
        generator_enabled: config.generator.enabled,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 policyrag Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Registry: {}", status.db_path);
    println!("\nIndex:");
    println!("  Path: {}", status.index_path);
    println!("  Search: {}", status.search);
    println!("  Format: v{}", status.manifest.format_version);
    println!(
        "  Model: {} ({} dims, {} backend)",
        status.manifest.embedding_model, status.manifest.dimension, status.embedding_backend
    );
    println!("  Entries: {}", status.index_entries);
    println!("\nRegistry Stats:");
    println!("  Documents: {}", status.registry.documents);
    println!("  Chunks: {}", status.registry.chunks);
    println!("  Ingestion runs: {}", status.registry.runs);

    if let Some(run) = &status.last_run {
        println!("\nLast Ingestion:");
        println!("  Corpus: {}", run.corpus_root);
        println!("  Started: {}", run.started_at);
        println!("  Status: {}", run.status);
        println!(
            "  Documents: {} indexed, {} skipped",
            run.docs_processed, run.docs_skipped
        );
    }

    println!(
        "\nGenerator: {}",
        if status.generator_enabled { "enabled" } else { "not configured" }
    );
}
