//! Multi-query retrieval: fan out, merge, deduplicate, rank.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use tracing::{debug, error, info};

use crate::document::{Query, RetrievalResult, by_descending_score};
use crate::error::{RagError, Result};
use crate::expansion::ExpandedQuerySet;
use crate::index::EmbeddingIndex;

/// Searches the index once per expanded query and fuses the results.
///
/// Searches run concurrently. The merged set contains each passage once,
/// with the highest score any query gave it, ordered by descending score.
/// Equal scores keep the order in which passages were first discovered
/// (query order, then rank within a query), so a set with a single query
/// reproduces that query's own ranking.
///
/// Dropping the future returned by [`retrieve`](Self::retrieve) cancels
/// every in-flight search.
///
/// # Example
///
/// ```rust,ignore
/// use mqrag::MultiQueryRetriever;
///
/// let retriever = MultiQueryRetriever::new(index).per_query_k(4).max_results(Some(8));
/// let merged = retriever.retrieve(&expanded).await?;
/// ```
#[derive(Debug, Clone)]
pub struct MultiQueryRetriever {
    index: Arc<EmbeddingIndex>,
    per_query_k: usize,
    max_results: Option<usize>,
    similarity_threshold: f32,
    search_timeout: Option<Duration>,
}

impl MultiQueryRetriever {
    /// Create a retriever returning up to four results per query.
    pub fn new(index: Arc<EmbeddingIndex>) -> Self {
        Self {
            index,
            per_query_k: 4,
            max_results: None,
            similarity_threshold: f32::NEG_INFINITY,
            search_timeout: None,
        }
    }

    /// Cap on results requested for each individual query.
    pub fn per_query_k(mut self, k: usize) -> Self {
        self.per_query_k = k;
        self
    }

    /// Cap on the merged result count. `None` keeps everything.
    pub fn max_results(mut self, max: Option<usize>) -> Self {
        self.max_results = max;
        self
    }

    /// Drop merged results scoring below `threshold`.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Deadline for each individual search.
    pub fn search_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.search_timeout = timeout;
        self
    }

    /// The index every query is searched against.
    pub fn index(&self) -> &Arc<EmbeddingIndex> {
        &self.index
    }

    async fn search_one(&self, query: &Query) -> Result<Vec<RetrievalResult>> {
        let search = self.index.search(query.as_str(), self.per_query_k);
        match self.search_timeout {
            Some(limit) => tokio::time::timeout(limit, search).await.map_err(|_| {
                error!(query = %query, ?limit, "search timed out");
                RagError::Timeout { stage: "search".to_string(), after: limit }
            })?,
            None => search.await,
        }
    }

    /// Retrieve and fuse results for every query in `queries`.
    ///
    /// # Errors
    ///
    /// Fails as soon as any individual search fails; no partial result set
    /// is returned.
    pub async fn retrieve(&self, queries: &ExpandedQuerySet) -> Result<Vec<RetrievalResult>> {
        let queries = queries.queries();
        let per_query = try_join_all(queries.iter().map(|q| self.search_one(q))).await?;

        let found: usize = per_query.iter().map(Vec::len).sum();
        let merged = merge_results(per_query);
        let merged = self.finish(merged);

        info!(queries = queries.len(), found, merged = merged.len(), "retrieval completed");
        Ok(merged)
    }

    fn finish(&self, merged: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
        let threshold = self.similarity_threshold;
        let mut results: Vec<RetrievalResult> =
            merged.into_iter().filter(|r| r.score >= threshold).collect();
        if let Some(max) = self.max_results {
            results.truncate(max);
        }
        results
    }
}

/// Merge per-query result lists, keeping each passage once at its best score.
///
/// Output is sorted by descending score; ties keep first-discovery order.
pub fn merge_results(per_query: Vec<Vec<RetrievalResult>>) -> Vec<RetrievalResult> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<RetrievalResult> = Vec::new();

    for result in per_query.into_iter().flatten() {
        match slots.entry(result.passage.id.clone()) {
            Entry::Occupied(slot) => {
                let kept = &mut merged[*slot.get()];
                if by_descending_score(result.score, kept.score).is_lt() {
                    kept.score = result.score;
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(merged.len());
                merged.push(result);
            }
        }
    }

    // Stable sort: ties keep discovery order.
    merged.sort_by(|a, b| by_descending_score(a.score, b.score));
    debug!(unique = merged.len(), "merged retrieval results");
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, Passage};

    fn hit(doc: &str, score: f32) -> RetrievalResult {
        RetrievalResult {
            passage: Passage::from_document(&Document::new(doc, ""), 0, doc),
            score,
        }
    }

    fn ids(results: &[RetrievalResult]) -> Vec<&str> {
        results.iter().map(|r| r.passage.document_id.as_str()).collect()
    }

    #[test]
    fn merge_keeps_highest_score_once() {
        let merged = merge_results(vec![
            vec![hit("a", 0.9), hit("b", 0.5)],
            vec![hit("b", 0.95), hit("c", 0.2)],
            vec![hit("a", 0.1)],
        ]);
        assert_eq!(ids(&merged), ["b", "a", "c"]);
        assert_eq!(merged[0].score, 0.95);
        assert_eq!(merged[1].score, 0.9);
    }

    #[test]
    fn ties_keep_discovery_order() {
        let merged =
            merge_results(vec![vec![hit("x", 0.5), hit("y", 0.5)], vec![hit("z", 0.5)]]);
        assert_eq!(ids(&merged), ["x", "y", "z"]);
    }

    #[test]
    fn single_query_is_passed_through() {
        let single = vec![hit("a", 0.9), hit("b", 0.7), hit("c", 0.7)];
        assert_eq!(merge_results(vec![single.clone()]), single);
    }

    #[test]
    fn nan_scores_sort_last_and_lose_to_real_scores() {
        let merged = merge_results(vec![
            vec![hit("a", f32::NAN), hit("b", 0.2)],
            vec![hit("c", f32::NAN), hit("a", -0.5)],
        ]);
        assert_eq!(ids(&merged), ["b", "a", "c"]);
        assert_eq!(merged[1].score, -0.5);
        assert!(merged[2].score.is_nan());
    }

    #[test]
    fn empty_input_merges_to_empty() {
        assert!(merge_results(Vec::new()).is_empty());
        assert!(merge_results(vec![Vec::new(), Vec::new()]).is_empty());
    }
}
