//! policyrag: retrieval core for question answering over an insurance policy corpus
//!
//! Documents are loaded from a directory, split into overlapping token
//! windows, embedded, and stored in a persistent vector index. Queries are
//! answered with ranked, cited passages, optionally handed to a generator.

pub mod chunk;
pub mod commands;
pub mod config;
pub mod context;
pub mod embed;
pub mod error;
pub mod generate;
pub mod index;
pub mod loader;
pub mod meta;
pub mod progress;
pub mod retrieve;
