//! Vector store trait for storing and searching passage embeddings.

use async_trait::async_trait;

use crate::document::{Passage, RetrievalResult};
use crate::error::Result;

/// A storage backend for passage embeddings with similarity search.
///
/// Implementations manage named collections of [`Passage`]s and support
/// upserting, deleting, and searching by vector similarity. A passage and its
/// vector are written together: concurrent searches see either the old entry
/// or the new one, never a mix.
///
/// # Example
///
/// ```rust,ignore
/// use mqrag::{VectorStore, InMemoryVectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("docs", 384).await?;
/// store.upsert("docs", &passages).await?;
/// let results = store.search("docs", &query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Create a named collection. No-op if it already exists.
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    /// Delete a named collection and all its data.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Upsert passages into a collection. Passages must have embeddings set.
    ///
    /// A passage whose id is already stored replaces the previous entry.
    async fn upsert(&self, collection: &str, passages: &[Passage]) -> Result<()>;

    /// Delete passages by their IDs from a collection.
    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()>;

    /// Delete every passage belonging to `document_id`.
    async fn delete_document(&self, collection: &str, document_id: &str) -> Result<()>;

    /// Search for the `top_k` most similar passages to the given embedding.
    ///
    /// Returns results ordered by descending similarity score.
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>>;

    /// Number of passages stored in a collection.
    async fn count(&self, collection: &str) -> Result<usize>;
}
