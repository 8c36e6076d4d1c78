//! Token counting for chunk sizing.
//!
//! Chunk size and overlap are measured in model-specific token units. A
//! [`Tokenizer`] reports the byte span of each token so chunkers can slice
//! the original text without re-encoding it.

use std::ops::Range;

/// Splits text into tokens, reporting each token's byte range in the input.
///
/// Ranges must be non-empty, non-overlapping, in ascending order, and lie on
/// `char` boundaries of the input.
pub trait Tokenizer: Send + Sync {
    /// Return the byte span of every token in `text`.
    fn tokenize(&self, text: &str) -> Vec<Range<usize>>;

    /// Count the tokens in `text`.
    fn count(&self, text: &str) -> usize {
        self.tokenize(text).len()
    }
}

/// One token per maximal run of non-whitespace characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Range<usize>> {
        let mut spans = Vec::new();
        let mut start = None;

        for (i, c) in text.char_indices() {
            match (c.is_whitespace(), start) {
                (true, Some(s)) => {
                    spans.push(s..i);
                    start = None;
                }
                (false, None) => start = Some(i),
                _ => {}
            }
        }
        if let Some(s) = start {
            spans.push(s..text.len());
        }

        spans
    }
}

/// One token per Unicode scalar value.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharTokenizer;

impl Tokenizer for CharTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Range<usize>> {
        text.char_indices().map(|(i, c)| i..i + c.len_utf8()).collect()
    }
}

/// A [`Tokenizer`] backed by a HuggingFace `tokenizer.json`.
///
/// This type is only available when the `hf-tokenizer` feature is enabled.
#[cfg(feature = "hf-tokenizer")]
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
}

#[cfg(feature = "hf-tokenizer")]
impl HfTokenizer {
    /// Load a tokenizer from a `tokenizer.json` file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::error::Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| crate::error::RagError::Config(format!("failed to load tokenizer: {e}")))?;
        Ok(Self { inner })
    }

    /// Load a tokenizer from the bytes of a `tokenizer.json` file.
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> crate::error::Result<Self> {
        let inner = tokenizers::Tokenizer::from_bytes(bytes)
            .map_err(|e| crate::error::RagError::Config(format!("failed to load tokenizer: {e}")))?;
        Ok(Self { inner })
    }
}

#[cfg(feature = "hf-tokenizer")]
impl Tokenizer for HfTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Range<usize>> {
        let encoding = match self.inner.encode(text, false) {
            Ok(encoding) => encoding,
            Err(e) => {
                tracing::warn!(error = %e, "tokenizer failed, treating text as empty");
                return Vec::new();
            }
        };

        // Sub-word pieces of one character can share offsets; keep each span once.
        let mut spans: Vec<Range<usize>> = Vec::with_capacity(encoding.len());
        for &(start, end) in encoding.get_offsets() {
            if start >= end || end > text.len() {
                continue;
            }
            if spans.last().is_some_and(|last| start < last.end) {
                continue;
            }
            if text.is_char_boundary(start) && text.is_char_boundary(end) {
                spans.push(start..end);
            }
        }
        spans
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_spans_skip_runs_of_blanks() {
        let text = "  Effective:\tMarch  2020\n";
        let spans = WhitespaceTokenizer.tokenize(text);
        let words: Vec<&str> = spans.iter().map(|r| &text[r.clone()]).collect();
        assert_eq!(words, ["Effective:", "March", "2020"]);
    }

    #[test]
    fn whitespace_handles_empty_and_blank() {
        assert!(WhitespaceTokenizer.tokenize("").is_empty());
        assert!(WhitespaceTokenizer.tokenize(" \n\t ").is_empty());
    }

    #[test]
    fn char_tokenizer_respects_multibyte() {
        let text = "né✓";
        let spans = CharTokenizer.tokenize(text);
        assert_eq!(spans.len(), 3);
        assert_eq!(&text[spans[2].clone()], "✓");
        assert_eq!(CharTokenizer.count(text), 3);
    }
}
