//! In-memory vector store using cosine similarity.
//!
//! This module provides [`InMemoryVectorStore`], a vector store backed by a
//! `HashMap` protected by a `tokio::sync::RwLock`. It is suitable for
//! development, testing, and small corpora.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{Passage, RetrievalResult, by_descending_score};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

const BACKEND: &str = "InMemory";

/// A stored passage and the order in which its id was first inserted.
#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    passage: Passage,
}

#[derive(Debug, Default)]
struct Collection {
    dimensions: usize,
    next_seq: u64,
    entries: HashMap<String, Entry>,
}

/// An in-memory vector store using cosine similarity for search.
///
/// Collections are stored as nested `HashMap`s: collection name → passage ID
/// → entry. Each entry keeps the passage together with its vector, so a
/// search holding the read lock can never observe a half-written passage.
///
/// Ties in score are broken by insertion order. Re-upserting an existing id
/// replaces the passage but keeps its original position, which makes repeated
/// ingestion of the same passages ranking-neutral.
///
/// # Example
///
/// ```rust,ignore
/// use mqrag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("docs", 384).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(collection: &str) -> RagError {
    RagError::index(BACKEND, format!("collection '{collection}' does not exist"))
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections
            .entry(name.to_string())
            .or_insert_with(|| Collection { dimensions, ..Default::default() });
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.remove(name);
        Ok(())
    }

    async fn upsert(&self, collection: &str, passages: &[Passage]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| missing(collection))?;

        // Validate the whole batch before touching the collection.
        if let Some(bad) = passages
            .iter()
            .find(|p| store.dimensions != 0 && p.embedding.len() != store.dimensions)
        {
            return Err(RagError::index(
                BACKEND,
                format!(
                    "passage '{}' has {} dimensions, collection '{collection}' expects {}",
                    bad.id,
                    bad.embedding.len(),
                    store.dimensions
                ),
            ));
        }

        for passage in passages {
            match store.entries.get_mut(&passage.id) {
                Some(entry) => entry.passage = passage.clone(),
                None => {
                    let seq = store.next_seq;
                    store.next_seq += 1;
                    store.entries.insert(passage.id.clone(), Entry { seq, passage: passage.clone() });
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        for id in ids {
            store.entries.remove(*id);
        }
        Ok(())
    }

    async fn delete_document(&self, collection: &str, document_id: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        store.entries.retain(|_, entry| entry.passage.document_id != document_id);
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;

        let mut scored: Vec<(u64, f32, &Passage)> = store
            .entries
            .values()
            .map(|entry| {
                (entry.seq, cosine_similarity(&entry.passage.embedding, embedding), &entry.passage)
            })
            .collect();

        scored.sort_by(|a, b| by_descending_score(a.1, b.1).then(a.0.cmp(&b.0)));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(_, score, passage)| RetrievalResult { passage: passage.clone(), score })
            .collect())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(store.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    fn passage(doc: &str, position: usize, embedding: Vec<f32>) -> Passage {
        let mut p = Passage::from_document(&Document::new(doc, "text"), position, "text");
        p.embedding = embedding;
        p
    }

    #[tokio::test]
    async fn ties_are_broken_by_insertion_order() {
        let store = InMemoryVectorStore::new();
        store.create_collection("c", 2).await.unwrap();
        store
            .upsert(
                "c",
                &[
                    passage("b", 0, vec![1.0, 0.0]),
                    passage("a", 0, vec![2.0, 0.0]),
                    passage("c", 0, vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let results = store.search("c", &[1.0, 0.0], 10).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.passage.id.as_str()).collect();
        assert_eq!(ids, ["b#0", "a#0", "c#0"]);
    }

    #[tokio::test]
    async fn overwrite_keeps_original_position() {
        let store = InMemoryVectorStore::new();
        store.create_collection("c", 2).await.unwrap();
        store.upsert("c", &[passage("x", 0, vec![1.0, 0.0])]).await.unwrap();
        store.upsert("c", &[passage("y", 0, vec![1.0, 0.0])]).await.unwrap();
        store.upsert("c", &[passage("x", 0, vec![3.0, 0.0])]).await.unwrap();

        assert_eq!(store.count("c").await.unwrap(), 2);
        let results = store.search("c", &[1.0, 0.0], 10).await.unwrap();
        assert_eq!(results[0].passage.id, "x#0");
        assert_eq!(results[0].passage.embedding, vec![3.0, 0.0]);
    }

    #[tokio::test]
    async fn nan_scores_rank_last() {
        let store = InMemoryVectorStore::new();
        store.create_collection("c", 2).await.unwrap();
        store
            .upsert(
                "c",
                &[
                    passage("nan", 0, vec![f32::NAN, 0.0]),
                    passage("far", 0, vec![-1.0, 0.0]),
                    passage("near", 0, vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let results = store.search("c", &[1.0, 0.0], 10).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.passage.id.as_str()).collect();
        assert_eq!(ids, ["near#0", "far#0", "nan#0"]);
    }

    #[tokio::test]
    async fn dimension_mismatch_rejects_whole_batch() {
        let store = InMemoryVectorStore::new();
        store.create_collection("c", 2).await.unwrap();
        let err = store
            .upsert("c", &[passage("ok", 0, vec![1.0, 0.0]), passage("bad", 0, vec![1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::IndexUnavailable { .. }));
        assert_eq!(store.count("c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_document_removes_all_its_passages() {
        let store = InMemoryVectorStore::new();
        store.create_collection("c", 2).await.unwrap();
        store
            .upsert(
                "c",
                &[
                    passage("a", 0, vec![1.0, 0.0]),
                    passage("a", 1, vec![0.0, 1.0]),
                    passage("b", 0, vec![1.0, 1.0]),
                ],
            )
            .await
            .unwrap();
        store.delete_document("c", "a").await.unwrap();
        assert_eq!(store.count("c").await.unwrap(), 1);

        store.delete("c", &["b#0"]).await.unwrap();
        assert_eq!(store.count("c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_collection_is_an_index_error() {
        let store = InMemoryVectorStore::new();
        let err = store.search("nope", &[1.0], 1).await.unwrap_err();
        assert!(matches!(err, RagError::IndexUnavailable { .. }));
    }
}
