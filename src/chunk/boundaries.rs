//! Word boundary detection for chunking

/// Characters per model token used to estimate cost
pub const CHARS_PER_TOKEN: usize = 4;

/// A whitespace-delimited word with its byte span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordSpan {
    pub start: usize,
    pub end: usize,
    /// Estimated model tokens
    pub cost: usize,
}

/// Split text into maximal runs of non-whitespace characters
pub fn word_spans(text: &str) -> Vec<WordSpan> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    let mut chars = 0usize;

    for (pos, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                spans.push(WordSpan {
                    start: s,
                    end: pos,
                    cost: token_cost(chars),
                });
            }
            chars = 0;
        } else {
            if start.is_none() {
                start = Some(pos);
            }
            chars += 1;
        }
    }

    if let Some(s) = start {
        spans.push(WordSpan {
            start: s,
            end: text.len(),
            cost: token_cost(chars),
        });
    }

    spans
}

fn token_cost(chars: usize) -> usize {
    chars.div_ceil(CHARS_PER_TOKEN).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_spans() {
        let text = "  Fire\tdamage\n\ncovered ";
        let spans = word_spans(text);

        assert_eq!(spans.len(), 3);
        assert_eq!(&text[spans[0].start..spans[0].end], "Fire");
        assert_eq!(&text[spans[1].start..spans[1].end], "damage");
        assert_eq!(&text[spans[2].start..spans[2].end], "covered");
    }

    #[test]
    fn test_token_cost() {
        let spans = word_spans("a abcd abcde $50,000,000");
        let costs: Vec<usize> = spans.iter().map(|s| s.cost).collect();
        assert_eq!(costs, vec![1, 1, 2, 3]);
    }

    #[test]
    fn test_multibyte_spans_on_char_boundaries() {
        let text = "prime été déductible";
        for span in word_spans(text) {
            assert!(text.is_char_boundary(span.start));
            assert!(text.is_char_boundary(span.end));
        }
    }
}
