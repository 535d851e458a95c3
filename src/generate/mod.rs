//! Optional answer generation
//!
//! The retrieval core never fails because of the generator. Missing
//! configuration, transport errors and timeouts all come back as
//! [`GenerationOutcome::Unavailable`] so callers can still show the
//! retrieved passages.

mod http_backend;
mod prompt;

pub use http_backend::*;
pub use prompt::*;

use crate::config::GeneratorConfig;
use crate::context::ContextPayload;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Shown when no generator is configured
pub const GENERATOR_NOT_CONFIGURED: &str = "LLM generator is not configured. The following \
documents were retrieved from the knowledge base based on your query.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum GenerationOutcome {
    Generated(String),
    /// Degraded mode; carries the reason shown to the user
    Unavailable(String),
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, payload: &ContextPayload) -> GenerationOutcome;

    fn name(&self) -> &str;
}

/// Stand-in used when generation is not configured
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    async fn generate(&self, _payload: &ContextPayload) -> GenerationOutcome {
        GenerationOutcome::Unavailable(GENERATOR_NOT_CONFIGURED.to_string())
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

/// Create a generator from configuration. A generator that cannot be
/// built degrades to [`DisabledGenerator`].
pub fn create_generator(config: &GeneratorConfig) -> Arc<dyn Generator> {
    if !config.enabled {
        return Arc::new(DisabledGenerator);
    }

    match HttpGenerator::new(config) {
        Ok(generator) => Arc::new(generator),
        Err(e) => {
            warn!("Generator disabled: {}", e);
            Arc::new(DisabledGenerator)
        }
    }
}
