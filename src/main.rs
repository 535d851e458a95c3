//! policyrag CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use policyrag::{
    commands::{
        cmd_ingest_dir, cmd_init, cmd_query, cmd_rebuild, cmd_remove, cmd_status, parse_tag,
        print_ingest_stats, print_query_response, print_rebuild_stats, print_remove_stats,
        print_status, QueryOptions,
    },
    config::Config,
    error::{Error, Result},
    index::{LocalIndex, VectorIndex},
    meta::MetaDb,
    progress::LogWriterFactory,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "policyrag")]
#[command(version, about = "Retrieval over an insurance policy corpus", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "POLICYRAG_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create configuration, registry and an empty index
    Init {
        /// Overwrite existing config and reset an incompatible index
        #[arg(long)]
        force: bool,
    },

    /// Ingest a directory of .txt/.md policy documents
    Ingest {
        /// Corpus directory
        path: PathBuf,
    },

    /// Retrieve passages for a question
    Query {
        /// The question
        query: String,

        /// Maximum number of results
        #[arg(short, long)]
        k: Option<usize>,

        /// Metadata filter, repeatable (e.g. --tag line=home)
        #[arg(long = "tag", value_name = "KEY=VALUE")]
        tags: Vec<String>,

        /// Generate an answer from the retrieved context
        #[arg(long)]
        generate: bool,

        /// Context budget in characters
        #[arg(long)]
        max_context: Option<usize>,
    },

    /// Remove a document and all its chunks
    Remove {
        /// Document id (path relative to the corpus root)
        document_id: String,
    },

    /// Show index and registry status
    Status,

    /// Rebuild the search structure from stored entries
    Rebuild,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory::default()))
        .with(filter)
        .init();

    // Handle init command specially (doesn't need existing config)
    if let Commands::Init { force } = cli.command {
        let base_dir = cli.config.as_deref().map(base_dir_for);
        let config = cmd_init(base_dir, force).await?;

        println!("✓ policyrag initialized successfully");
        println!("  Config: {}", config.paths.config_file.display());
        println!("  Index: {}", config.paths.index_file.display());
        println!("\nNext steps:");
        println!("  1. Edit the config file to choose an embedding backend");
        println!("  2. Ingest documents: policyrag ingest /path/to/policies");
        println!("  3. Ask a question: policyrag query \"What does the policy cover for fire?\"");
        return Ok(());
    }

    // Handle completions command (doesn't need config/db/index)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "policyrag", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let db = MetaDb::connect(&config).await?;
    db.init_schema().await?;
    let index: Arc<dyn VectorIndex> = Arc::new(LocalIndex::from_config(&config).await?);

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Ingest { path } => {
            let stats = cmd_ingest_dir(&config, &db, &index, &path).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_ingest_stats(&stats);
            }
        }

        Commands::Query {
            query,
            k,
            tags,
            generate,
            max_context,
        } => {
            let options = QueryOptions {
                k,
                tags: tags.iter().map(|t| parse_tag(t)).collect::<Result<Vec<_>>>()?,
                generate,
                max_context,
            };

            let response = cmd_query(&config, &index, &query, options).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_query_response(&response);
            }
        }

        Commands::Remove { document_id } => {
            let stats = cmd_remove(&db, &index, &document_id).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_remove_stats(&stats);
            }
        }

        Commands::Status => {
            let status = cmd_status(&config, &db, &index).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }

        Commands::Rebuild => {
            let stats = cmd_rebuild(&index).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_rebuild_stats(&stats);
            }
        }
    }

    Ok(())
}

/// A `--config` value names either a `.toml` file or its directory
fn base_dir_for(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|e| e == "toml") {
        path.parent()
            .map(PathBuf::from)
            .unwrap_or_else(Config::default_base_dir)
    } else {
        path.to_path_buf()
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(p) if p.extension().is_some_and(|e| e == "toml") => Config::load(p)?,
        Some(p) => Config::load_from(Some(p.to_path_buf()))?,
        None => Config::load_from(None)?,
    };

    if !config.paths.config_file.exists() {
        return Err(Error::NotInitialized);
    }

    Ok(config)
}
