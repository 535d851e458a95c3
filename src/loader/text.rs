//! Text normalization and front-matter handling

use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

static FRONT_MATTER: OnceLock<Regex> = OnceLock::new();

fn front_matter_regex() -> &'static Regex {
    FRONT_MATTER.get_or_init(|| {
        Regex::new(r"(?s)\A---[ \t]*\n(.*?)\n---[ \t]*(?:\n|\z)").expect("static regex")
    })
}

/// Check if content appears to be binary
pub fn is_binary_content(data: &[u8]) -> bool {
    // Null bytes in the first 8KB
    let check_len = std::cmp::min(data.len(), 8192);
    data[..check_len].iter().any(|&b| b == 0)
}

/// Decode bytes and normalize line endings. Internal whitespace is kept so
/// that chunk offsets stay meaningful against the stored text.
pub fn normalize_text(data: &[u8]) -> String {
    let decoded = String::from_utf8_lossy(data);
    let without_bom = decoded.strip_prefix('\u{feff}').unwrap_or(&decoded);
    without_bom.replace("\r\n", "\n").replace('\r', "\n")
}

/// Parsed front-matter block
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub tags: BTreeMap<String, String>,
}

/// Split a leading `---` block from the body.
///
/// Recognized keys: `title`, and `tags` as `key=value` pairs separated by
/// commas. Any other `key: value` line becomes a tag of its own.
pub fn split_front_matter(text: &str) -> (FrontMatter, &str) {
    let Some(caps) = front_matter_regex().captures(text) else {
        return (FrontMatter::default(), text);
    };

    let mut front = FrontMatter::default();
    let block = caps.get(1).map(|m| m.as_str()).unwrap_or_default();

    for line in block.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim().trim_matches('"');
        if key.is_empty() || value.is_empty() {
            continue;
        }

        match key.as_str() {
            "title" => front.title = Some(value.to_string()),
            "tags" => {
                for pair in value.split(',') {
                    if let Some((k, v)) = pair.split_once('=') {
                        let (k, v) = (k.trim(), v.trim());
                        if !k.is_empty() && !v.is_empty() {
                            front.tags.insert(k.to_string(), v.to_string());
                        }
                    }
                }
            }
            _ => {
                front.tags.insert(key, value.to_string());
            }
        }
    }

    let body_start = caps.get(0).map(|m| m.end()).unwrap_or(0);
    (front, &text[body_start..])
}

/// Turn a file stem like `fire_damage-policy` into `Fire Damage Policy`
pub fn title_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("untitled");

    stem.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stable document id: the path relative to the corpus root, `/`-separated
pub fn document_id(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
