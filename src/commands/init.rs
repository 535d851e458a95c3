//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::index::{LocalIndex, VectorIndex};
use crate::meta::MetaDb;
use std::path::PathBuf;
use tracing::{info, warn};

/// Write a default config, create the registry and an empty index.
///
/// With `force`, an existing config is overwritten and an index built for a
/// different embedding model is reset; the registry forgets its documents so
/// the next ingest re-embeds everything.
pub async fn cmd_init(base_dir: Option<PathBuf>, force: bool) -> Result<Config> {
    let mut config = Config::default();
    config.init_paths(base_dir);

    if config.paths.config_file.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config.paths.config_file.display()
        )));
    }

    config.validate()?;
    config.save()?;

    let db = MetaDb::connect(&config).await?;
    db.init_schema().await?;
    info!("Created database at {:?}", config.paths.db_file);

    match LocalIndex::from_config(&config).await {
        Ok(index) => {
            info!(
                "Index ready at {:?} ({}, dim {})",
                config.paths.index_file,
                index.manifest().embedding_model,
                config.embedding.dimension
            );
        }
        Err(e @ Error::IndexVersionMismatch { .. }) if force => {
            warn!("{}", e);
            LocalIndex::reset_from_config(&config).await?;
            let cleared = db.clear_documents().await?;
            info!("Reset index; {} documents will be re-embedded on next ingest", cleared);
        }
        Err(e) => return Err(e),
    }

    Ok(config)
}
