//! The embedding index service handle.
//!
//! [`EmbeddingIndex`] pairs an [`EmbeddingProvider`] with a [`VectorStore`]
//! collection and exposes the text-level contract the rest of the pipeline
//! needs: `upsert(passages)` and `search(query_text, k)`. It is constructed
//! explicitly, opened before use, and shared by reference (`Arc`) between
//! ingestion and query flows.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info};

use crate::document::{Passage, RetrievalResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// A searchable index of passage embeddings stored in one collection.
///
/// Every failure of the embedding backend or the store surfaces as
/// [`RagError::IndexUnavailable`]; the index never reports an empty success
/// in place of an error.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use mqrag::{EmbeddingIndex, InMemoryVectorStore};
///
/// let index = EmbeddingIndex::new(embedder, Arc::new(InMemoryVectorStore::new()), "policies");
/// index.open().await?;
/// index.upsert(&passages).await?;
/// let hits = index.search("remote work eligibility", 4).await?;
/// index.close();
/// ```
pub struct EmbeddingIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    collection: String,
    open: AtomicBool,
}

impl std::fmt::Debug for EmbeddingIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingIndex")
            .field("embedder", &self.embedder.name())
            .field("store", &self.store.name())
            .field("collection", &self.collection)
            .field("open", &self.is_open())
            .finish()
    }
}

impl EmbeddingIndex {
    /// Create a closed handle over `collection`.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
    ) -> Self {
        Self { embedder, store, collection: collection.into(), open: AtomicBool::new(false) }
    }

    /// The collection this handle reads and writes.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The embedding provider used for passages and queries.
    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// The underlying vector store.
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Create the collection if needed and mark the handle open.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexUnavailable`] if the store cannot create the collection.
    pub async fn open(&self) -> Result<()> {
        let dimensions = self.embedder.dimensions();
        self.store.create_collection(&self.collection, dimensions).await.map_err(|e| {
            error!(collection = %self.collection, error = %e, "failed to open index");
            self.unavailable(format!("failed to create collection '{}': {e}", self.collection))
        })?;
        self.open.store(true, Ordering::Release);
        info!(collection = %self.collection, dimensions, "index opened");
        Ok(())
    }

    /// Mark the handle closed. Stored data is kept.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            info!(collection = %self.collection, "index closed");
        }
    }

    /// Whether [`open`](Self::open) has succeeded and the handle is not closed.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Delete the collection and close the handle.
    pub async fn destroy(&self) -> Result<()> {
        self.close();
        self.store.delete_collection(&self.collection).await.map_err(|e| {
            error!(collection = %self.collection, error = %e, "failed to delete collection");
            self.unavailable(format!("failed to delete collection '{}': {e}", self.collection))
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(RagError::Pipeline(format!("index '{}' is not open", self.collection)))
        }
    }

    fn unavailable(&self, message: String) -> RagError {
        RagError::index(self.store.name(), message)
    }

    /// Embed `passages` and store them, replacing entries with the same id.
    ///
    /// Returns the passages with their embeddings attached.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexUnavailable`] if embedding or storage fails,
    /// and [`RagError::Pipeline`] if the handle is not open.
    pub async fn upsert(&self, passages: &[Passage]) -> Result<Vec<Passage>> {
        self.ensure_open()?;
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = passages.iter().map(|p| p.text.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await.map_err(|e| {
            error!(collection = %self.collection, error = %e, "embedding failed during upsert");
            self.unavailable(format!("embedding failed: {e}"))
        })?;

        if embeddings.len() != passages.len() {
            return Err(self.unavailable(format!(
                "embedding provider returned {} vectors for {} passages",
                embeddings.len(),
                passages.len()
            )));
        }

        let embedded: Vec<Passage> = passages
            .iter()
            .cloned()
            .zip(embeddings)
            .map(|(mut passage, embedding)| {
                passage.embedding = embedding;
                passage
            })
            .collect();

        self.store.upsert(&self.collection, &embedded).await.map_err(|e| {
            error!(collection = %self.collection, error = %e, "upsert failed");
            self.unavailable(format!("upsert failed: {e}"))
        })?;

        debug!(collection = %self.collection, count = embedded.len(), "upserted passages");
        Ok(embedded)
    }

    /// Replace every stored passage of `document_id` with `passages`.
    ///
    /// # Errors
    ///
    /// Same as [`upsert`](Self::upsert).
    pub async fn replace_document(
        &self,
        document_id: &str,
        passages: &[Passage],
    ) -> Result<Vec<Passage>> {
        self.ensure_open()?;
        self.store.delete_document(&self.collection, document_id).await.map_err(|e| {
            error!(collection = %self.collection, document_id, error = %e, "delete failed");
            self.unavailable(format!("failed to delete document '{document_id}': {e}"))
        })?;
        self.upsert(passages).await
    }

    /// Return up to `k` passages most similar to `query_text`, best first.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexUnavailable`] if embedding or search fails,
    /// and [`RagError::Pipeline`] if the handle is not open.
    pub async fn search(&self, query_text: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        self.ensure_open()?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(query_text).await.map_err(|e| {
            error!(error = %e, "embedding failed during search");
            self.unavailable(format!("query embedding failed: {e}"))
        })?;

        let results = self.store.search(&self.collection, &embedding, k).await.map_err(|e| {
            error!(collection = %self.collection, error = %e, "vector store search failed");
            self.unavailable(format!("search failed in collection '{}': {e}", self.collection))
        })?;

        debug!(collection = %self.collection, k, hits = results.len(), "search completed");
        Ok(results)
    }

    /// Number of passages currently stored.
    pub async fn len(&self) -> Result<usize> {
        self.ensure_open()?;
        self.store
            .count(&self.collection)
            .await
            .map_err(|e| self.unavailable(format!("count failed: {e}")))
    }

    /// Whether the collection holds no passages.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
