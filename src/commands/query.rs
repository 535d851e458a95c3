//! Query command implementation

use crate::config::Config;
use crate::context::{assemble, AssembledContext, Citation};
use crate::embed::create_embedder;
use crate::error::{Error, Result};
use crate::generate::{create_generator, GenerationOutcome};
use crate::index::{MetadataFilter, VectorIndex};
use crate::retrieve::{Query, Retriever};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Query options
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Number of results to return
    pub k: Option<usize>,
    /// Exact-match metadata filters (`key=value`)
    pub tags: Vec<(String, String)>,
    /// Ask the configured generator for an answer
    pub generate: bool,
    /// Context budget override, in characters
    pub max_context: Option<usize>,
}

/// Parse a `key=value` filter argument
pub fn parse_tag(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(Error::Config(format!("Invalid tag filter '{}': expected key=value", raw))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextStatus {
    Included,
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    NotRequested,
    Generated,
    Unavailable,
}

/// One retrieved passage
#[derive(Debug, Clone, Serialize)]
pub struct QueryHit {
    pub text: String,
    pub citation: Citation,
    pub score: f32,
}

/// Query result for CLI display and JSON output
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub query: String,
    pub results: Vec<QueryHit>,
    pub context_status: ContextStatus,
    pub generation_status: GenerationStatus,
    pub generated_text: Option<String>,
    pub generation_note: Option<String>,
}

/// Execute a query: retrieve, assemble context, optionally generate.
///
/// Generation problems never fail the query; they come back as
/// `GenerationStatus::Unavailable` with a note next to the retrieved passages.
pub async fn cmd_query(
    config: &Config,
    index: &Arc<dyn VectorIndex>,
    query: &str,
    options: QueryOptions,
) -> Result<QueryResponse> {
    info!("Querying: {}", query);

    let k = options
        .k
        .unwrap_or(config.query.default_k)
        .min(config.query.max_results);
    let max_context = options.max_context.unwrap_or(config.context.max_context_chars);

    let filter = options
        .tags
        .into_iter()
        .fold(MetadataFilter::new(), |f, (key, value)| f.with(key, value));

    let embedder = create_embedder(&config.embedding)?;
    let retriever = Retriever::from_config(config, embedder, Arc::clone(index));
    let retrieved = retriever
        .retrieve_query(&Query::new(query, k).with_filter(filter))
        .await?;
    debug!("Retrieved {} passages", retrieved.len());

    let results: Vec<QueryHit> = retrieved
        .hits
        .iter()
        .enumerate()
        .map(|(i, hit)| QueryHit {
            text: hit.entry.text.clone(),
            citation: Citation::from_hit(i + 1, hit),
            score: hit.score,
        })
        .collect();

    let context = assemble(query, &retrieved, max_context);
    let context_status = match context {
        AssembledContext::Context(_) => ContextStatus::Included,
        AssembledContext::Empty { .. } => ContextStatus::Empty,
    };

    let (generation_status, generated_text, generation_note) = if !options.generate {
        (GenerationStatus::NotRequested, None, None)
    } else {
        match &context {
            AssembledContext::Context(payload) => {
                let generator = create_generator(&config.generator);
                match generator.generate(payload).await {
                    GenerationOutcome::Generated(text) => {
                        (GenerationStatus::Generated, Some(text), None)
                    }
                    GenerationOutcome::Unavailable(reason) => {
                        (GenerationStatus::Unavailable, None, Some(reason))
                    }
                }
            }
            AssembledContext::Empty { smallest_chunk } => {
                let note = match smallest_chunk {
                    Some(len) => format!(
                        "No retrieved passage fits the context budget of {} characters (smallest is {}).",
                        max_context, len
                    ),
                    None => "No relevant documents were found for this query.".to_string(),
                };
                (GenerationStatus::Unavailable, None, Some(note))
            }
        }
    };

    info!("Returning {} results", results.len());

    Ok(QueryResponse {
        query: query.to_string(),
        results,
        context_status,
        generation_status,
        generated_text,
        generation_note,
    })
}

/// Print query results to console
pub fn print_query_response(response: &QueryResponse) {
    println!("\n🔍 Query: {}\n", response.query);

    if let Some(text) = &response.generated_text {
        println!("{}\n", text);
    }
    if let Some(note) = &response.generation_note {
        println!("⚠ {}\n", note);
    }

    if response.results.is_empty() {
        println!("No relevant documents found.");
        return;
    }

    println!("Found {} results:\n", response.results.len());

    for r in &response.results {
        println!(
            "{} [score: {:.3}] {}",
            r.citation.marker, r.score, r.citation.document_id
        );
        println!("   Title: {}", r.citation.title);
        println!(
            "   Span: {}..{}",
            r.citation.start_offset, r.citation.end_offset
        );

        let preview: String = r.text.trim().chars().take(200).collect();
        let ellipsis = if r.text.trim().chars().count() > 200 { "..." } else { "" };
        println!("   {}{}\n", preview.replace('\n', " "), ellipsis);
    }
}
