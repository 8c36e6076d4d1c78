//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`TokenChunker`], which
//! splits a document body into overlapping windows measured in tokens.

use std::sync::Arc;

use crate::document::{Document, Passage};
use crate::tokenizer::{Tokenizer, WhitespaceTokenizer};

/// A strategy for splitting documents into passages.
///
/// Implementations produce [`Passage`]s with text and metadata but no
/// embeddings. Embeddings are attached later by the index.
pub trait Chunker: Send + Sync {
    /// Split a document into passages.
    ///
    /// Returns an empty `Vec` if the document has no tokenizable text.
    fn chunk(&self, document: &Document) -> Vec<Passage>;
}

/// Splits text into windows of `chunk_size` tokens, consecutive windows
/// sharing exactly `chunk_overlap` tokens.
///
/// Passage IDs are generated as `{document_id}#{position}`. Each passage
/// inherits the parent document's metadata plus a `chunk_index` field. The
/// text of a passage is the slice of the body from its first token's start
/// to its last token's end, so original spacing inside a window is kept.
///
/// # Example
///
/// ```rust,ignore
/// use mqrag::TokenChunker;
///
/// let chunker = TokenChunker::new(800, 400);
/// let passages = chunker.chunk(&document);
/// ```
#[derive(Clone)]
pub struct TokenChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    tokenizer: Arc<dyn Tokenizer>,
}

impl std::fmt::Debug for TokenChunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenChunker")
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .finish_non_exhaustive()
    }
}

impl TokenChunker {
    /// Create a new `TokenChunker` counting whitespace-separated tokens.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of tokens per passage
    /// * `chunk_overlap`: number of tokens shared by consecutive passages
    ///
    /// A `chunk_size` of zero is treated as one. An overlap not smaller than
    /// the chunk size is clamped to `chunk_size - 1`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            tokenizer: Arc::new(WhitespaceTokenizer),
        }
    }

    /// Count tokens with a different tokenizer.
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    /// Maximum tokens per passage.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Tokens shared by consecutive passages.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Token index windows `[start, end)` covering `token_count` tokens.
    fn windows(&self, token_count: usize) -> Vec<(usize, usize)> {
        let step = self.chunk_size - self.chunk_overlap;
        let mut windows = Vec::new();
        let mut start = 0;

        while start < token_count {
            let end = (start + self.chunk_size).min(token_count);
            windows.push((start, end));
            if end == token_count {
                break;
            }
            start += step;
        }

        windows
    }
}

impl Chunker for TokenChunker {
    fn chunk(&self, document: &Document) -> Vec<Passage> {
        let text = document.text();
        let spans = self.tokenizer.tokenize(text);
        if spans.is_empty() {
            return Vec::new();
        }

        self.windows(spans.len())
            .into_iter()
            .enumerate()
            .map(|(position, (first, last))| {
                let body = &text[spans[first].start..spans[last - 1].end];
                Passage::from_document(document, position, body)
            })
            .collect()
    }
}
