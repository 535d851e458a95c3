//! Prompt construction

use crate::context::ContextPayload;

const INSTRUCTION: &str = "Using only the context provided, please generate a concise insurance \
policy document that addresses the user's query. Do not use any external knowledge. \
Refer to context passages by their bracketed markers.";

/// Build the grounded generation prompt for `payload`
pub fn build_prompt(payload: &ContextPayload) -> String {
    let mut prompt = String::with_capacity(payload.char_len() + 512);
    prompt.push_str(INSTRUCTION);
    prompt.push_str("\n\nContext:\n");

    for passage in &payload.passages {
        prompt.push_str(&format!(
            "- {} ({}): {}\n",
            passage.citation.marker,
            passage.citation.title,
            passage.text.trim()
        ));
    }

    prompt.push_str(&format!("\nQuery: {}\n\nGenerated Policy:", payload.query.trim()));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Citation, ContextPassage};

    #[test]
    fn test_prompt_layout() {
        let payload = ContextPayload {
            query: "What does the policy cover for fire?".to_string(),
            passages: vec![ContextPassage {
                text: "A policy covers fire damage up to $50,000.".to_string(),
                citation: Citation {
                    marker: "[1]".to_string(),
                    document_id: "fire.txt".to_string(),
                    title: "Fire".to_string(),
                    source_path: "/corpus/fire.txt".to_string(),
                    start_offset: 0,
                    end_offset: 42,
                    score: 0.8,
                },
            }],
        };

        let prompt = build_prompt(&payload);
        assert!(prompt.starts_with("Using only the context provided"));
        assert!(prompt.contains("- [1] (Fire): A policy covers fire damage up to $50,000.\n"));
        assert!(prompt.ends_with("Query: What does the policy cover for fire?\n\nGenerated Policy:"));
    }
}
