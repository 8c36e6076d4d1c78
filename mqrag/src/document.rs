//! Data types for documents, passages, queries, and answers.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::metadata::{Metadata, MetadataValue};

/// Metadata key holding the human-readable source label of a document.
pub const SOURCE_KEY: &str = "source";

/// Metadata key added to every passage with its position in the document.
pub const CHUNK_INDEX_KEY: &str = "chunk_index";

/// A source document containing text content and metadata.
///
/// Documents are immutable once constructed; build them with
/// [`Document::new`] and [`Document::with_metadata`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    id: String,
    text: String,
    #[serde(default)]
    metadata: Metadata,
}

impl Document {
    /// Create a document with no metadata.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), metadata: Metadata::new() }
    }

    /// Attach a metadata entry, replacing any previous value for `key`.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Replace the whole metadata map.
    pub fn with_metadata_map(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Unique identifier for the document.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The text body of the document.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Metadata associated with the document.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

/// A segment of a [`Document`] produced by a [`Chunker`](crate::chunking::Chunker).
///
/// The embedding is empty until the passage passes through an
/// [`EmbeddingIndex`](crate::index::EmbeddingIndex).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passage {
    /// Unique identifier, `{document_id}#{position}`.
    pub id: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Zero-based position of the passage within its document.
    pub position: usize,
    /// The text content of the passage.
    pub text: String,
    /// Metadata inherited from the parent document plus `chunk_index`.
    pub metadata: Metadata,
    /// The vector embedding for this passage's text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
}

impl Passage {
    /// Create a passage of `document` at `position`, inheriting its metadata.
    pub fn from_document(document: &Document, position: usize, text: impl Into<String>) -> Self {
        let mut metadata = document.metadata().clone();
        metadata.insert(CHUNK_INDEX_KEY.to_string(), MetadataValue::from(position));
        Self {
            id: Self::make_id(document.id(), position),
            document_id: document.id().to_string(),
            position,
            text: text.into(),
            metadata,
            embedding: Vec::new(),
        }
    }

    /// Build the identifier for the passage at `position` of `document_id`.
    pub fn make_id(document_id: &str, position: usize) -> String {
        format!("{document_id}#{position}")
    }

    /// The source label: the `source` metadata string, or the document id.
    pub fn source(&self) -> &str {
        self.metadata.get(SOURCE_KEY).and_then(MetadataValue::as_str).unwrap_or(&self.document_id)
    }
}

/// A retrieved [`Passage`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    /// The retrieved passage.
    pub passage: Passage,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}

/// Order two scores best first. NaN ranks below every real score and the
/// two zeros compare equal.
pub fn by_descending_score(a: f32, b: f32) -> Ordering {
    let rank = |score: f32| match score {
        s if s.is_nan() => f32::NEG_INFINITY,
        s if s == 0.0 => 0.0,
        s => s,
    };
    rank(b).total_cmp(&rank(a))
}

/// A user question, or one of its reformulations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(String);

impl Query {
    /// Wrap question text.
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// The question text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Query {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Query {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The generated answer to one question. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    /// The generated text.
    pub text: String,
    /// The original question.
    pub question: Query,
    /// Every query that was searched (original and variants).
    pub queries: Vec<Query>,
    /// The merged passages the answer was conditioned on.
    pub sources: Vec<RetrievalResult>,
}
