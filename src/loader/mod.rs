//! Corpus loading
//!
//! Walks a corpus directory and turns each supported file into a
//! [`Document`] with stable provenance:
//! - encoding and line-ending normalization
//! - optional front-matter (`title`, `tags`)
//! - a content hash used to skip unchanged documents on re-ingest

mod text;

pub use text::*;

use crate::error::{Error, Result};
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A source document with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Path relative to the corpus root, `/`-separated
    pub id: String,
    pub source_path: PathBuf,
    pub title: String,
    /// Normalized body text; chunk offsets index into this
    pub raw_text: String,
    pub content_hash: String,
    pub tags: BTreeMap<String, String>,
}

impl Document {
    /// Build a document from already-decoded text
    pub fn from_text(id: impl Into<String>, source_path: PathBuf, text: &str) -> Result<Self> {
        let id = id.into();
        let normalized = normalize_text(text.as_bytes());
        let (front, body) = split_front_matter(&normalized);
        let raw_text = body.trim().to_string();

        if raw_text.is_empty() {
            return Err(Error::EmptyDocument(id));
        }

        let title = front
            .title
            .unwrap_or_else(|| title_from_path(&source_path));
        let content_hash = compute_content_hash(&title, &front.tags, &raw_text);

        Ok(Self {
            id,
            source_path,
            title,
            raw_text,
            content_hash,
            tags: front.tags,
        })
    }
}

/// Blake3 over everything that ends up in an index entry
pub fn compute_content_hash(title: &str, tags: &BTreeMap<String, String>, text: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(title.as_bytes());
    hasher.update(&[0]);
    for (key, value) in tags {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(&[0]);
    }
    hasher.update(text.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Whether a path has one of the configured corpus extensions
pub fn has_supported_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Collect corpus files under `root`, sorted for deterministic runs
pub fn discover_files(root: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(Error::InvalidPath(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let mut files = Vec::new();
    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_exclude(true)
        .build();

    for entry in walker {
        match entry {
            Ok(e) if e.file_type().map(|t| t.is_file()).unwrap_or(false) => {
                let path = e.path().to_path_buf();
                if has_supported_extension(&path, extensions) {
                    files.push(path);
                } else {
                    debug!("Skipping unsupported file: {}", path.display());
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to read directory entry: {}", e),
        }
    }

    files.sort();

    if files.is_empty() {
        warn!(
            "No documents with extensions {:?} found in {}",
            extensions,
            root.display()
        );
    }

    Ok(files)
}

/// Load one file. Binary files yield `Ok(None)`.
pub fn load_file(root: &Path, path: &Path) -> Result<Option<Document>> {
    let data = std::fs::read(path)?;

    if is_binary_content(&data) {
        debug!("Skipping binary file: {}", path.display());
        return Ok(None);
    }

    let id = document_id(root, path);
    let text = normalize_text(&data);
    Document::from_text(id, path.to_path_buf(), &text).map(Some)
}
