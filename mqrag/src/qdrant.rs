//! Qdrant vector store backend.
//!
//! Provides [`QdrantVectorStore`] which implements [`VectorStore`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//!
//! This module is only available when the `qdrant` feature is enabled.
//!
//! # Example
//!
//! ```rust,ignore
//! use mqrag::qdrant::QdrantVectorStore;
//!
//! let store = QdrantVectorStore::new("http://localhost:6334")?;
//! store.create_collection("docs", 1536).await?;
//! ```

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    PointId, PointStruct, PointsIdsList, SearchPointsBuilder, UpsertPointsBuilder,
    Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::{Map, Value as JsonValue, json};
use tracing::debug;
use uuid::Uuid;

use crate::document::{Passage, RetrievalResult};
use crate::error::{RagError, Result};
use crate::metadata::{Metadata, MetadataValue};
use crate::vectorstore::VectorStore;

const BACKEND: &str = "qdrant";

/// A [`VectorStore`] backed by [Qdrant](https://qdrant.tech/).
///
/// Collections use cosine distance. Qdrant point ids must be integers or
/// UUIDs, so each passage id is mapped to a name-based UUID (v5) and the
/// passage id itself travels in the payload alongside text, document id,
/// position, and metadata.
pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    /// Create a new Qdrant vector store connecting to the given URL.
    pub fn new(url: &str) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(Self::map_err)?;
        Ok(Self { client })
    }

    /// Create a store from `QDRANT_URL` (default `http://localhost:6334`) and
    /// the optional `QDRANT_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let url =
            std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://localhost:6334".to_string());
        let mut builder = Qdrant::from_url(&url);
        if let Ok(key) = std::env::var("QDRANT_API_KEY") {
            builder = builder.api_key(key);
        }
        let client = builder.build().map_err(Self::map_err)?;
        Ok(Self { client })
    }

    /// Create a new Qdrant vector store from an existing client.
    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }

    fn map_err(e: qdrant_client::QdrantError) -> RagError {
        RagError::index(BACKEND, e.to_string())
    }

    /// Point id used for a passage id.
    pub fn point_id(passage_id: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, passage_id.as_bytes()).to_string()
    }

    fn payload(passage: &Passage) -> Result<Payload> {
        let metadata = serde_json::to_value(&passage.metadata)
            .map_err(|e| RagError::index(BACKEND, format!("failed to encode metadata: {e}")))?;
        let payload = json!({
            "passage_id": passage.id,
            "document_id": passage.document_id,
            "position": passage.position,
            "text": passage.text,
            "metadata": metadata,
        });
        Payload::try_from(payload)
            .map_err(|e| RagError::index(BACKEND, format!("failed to build payload: {e}")))
    }

    fn passage_from_payload(
        payload: &std::collections::HashMap<String, QdrantValue>,
    ) -> Option<Passage> {
        let string = |key: &str| match payload.get(key).and_then(|v| v.kind.as_ref()) {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        };

        let position = match payload.get("position").and_then(|v| v.kind.as_ref()) {
            Some(Kind::IntegerValue(n)) => usize::try_from(*n).ok()?,
            Some(Kind::DoubleValue(n)) => *n as usize,
            _ => 0,
        };

        let metadata: Metadata = match payload.get("metadata").map(to_json) {
            Some(JsonValue::Object(fields)) => fields
                .iter()
                .filter_map(|(k, v)| MetadataValue::from_json(v).map(|v| (k.clone(), v)))
                .collect(),
            _ => Metadata::new(),
        };

        Some(Passage {
            id: string("passage_id")?,
            document_id: string("document_id")?,
            position,
            text: string("text").unwrap_or_default(),
            metadata,
            embedding: Vec::new(),
        })
    }
}

/// Convert a Qdrant payload value to JSON.
fn to_json(value: &QdrantValue) -> JsonValue {
    match &value.kind {
        Some(Kind::BoolValue(b)) => JsonValue::Bool(*b),
        Some(Kind::IntegerValue(n)) => JsonValue::from(*n),
        Some(Kind::DoubleValue(n)) => JsonValue::from(*n),
        Some(Kind::StringValue(s)) => JsonValue::String(s.clone()),
        Some(Kind::ListValue(list)) => JsonValue::Array(list.values.iter().map(to_json).collect()),
        Some(Kind::StructValue(s)) => JsonValue::Object(
            s.fields.iter().map(|(k, v)| (k.clone(), to_json(v))).collect::<Map<_, _>>(),
        ),
        Some(Kind::NullValue(_)) | None => JsonValue::Null,
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let exists = self.client.collection_exists(name).await.map_err(Self::map_err)?;
        if exists {
            debug!(collection = name, "qdrant collection already exists, skipping creation");
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(dimensions as u64, Distance::Cosine)),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection = name, dimensions, "created qdrant collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.client.delete_collection(name).await.map_err(Self::map_err)?;
        debug!(collection = name, "deleted qdrant collection");
        Ok(())
    }

    async fn upsert(&self, collection: &str, passages: &[Passage]) -> Result<()> {
        if passages.is_empty() {
            return Ok(());
        }

        let points = passages
            .iter()
            .map(|passage| {
                Ok(PointStruct::new(
                    Self::point_id(&passage.id),
                    passage.embedding.clone(),
                    Self::payload(passage)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(Self::map_err)?;

        debug!(collection, count = passages.len(), "upserted passages to qdrant");
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let point_ids: Vec<PointId> = ids.iter().map(|id| Self::point_id(id).into()).collect();

        self.client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(PointsIdsList { ids: point_ids })
                    .wait(true),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection, count = ids.len(), "deleted points from qdrant");
        Ok(())
    }

    async fn delete_document(&self, collection: &str, document_id: &str) -> Result<()> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(Filter::must([Condition::matches(
                        "document_id",
                        document_id.to_string(),
                    )]))
                    .wait(true),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection, document_id, "deleted document points from qdrant");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, embedding.to_vec(), top_k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(Self::map_err)?;

        let results = response
            .result
            .into_iter()
            .filter_map(|scored| {
                let passage = Self::passage_from_payload(&scored.payload);
                if passage.is_none() {
                    debug!(collection, "skipping qdrant point without passage payload");
                }
                passage.map(|passage| RetrievalResult { passage, score: scored.score })
            })
            .collect();

        Ok(results)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let response = self
            .client
            .count(CountPointsBuilder::new(collection).exact(true))
            .await
            .map_err(Self::map_err)?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    #[test]
    fn point_ids_are_stable_uuids() {
        let a = QdrantVectorStore::point_id("wfh#0");
        assert_eq!(a, QdrantVectorStore::point_id("wfh#0"));
        assert_ne!(a, QdrantVectorStore::point_id("wfh#1"));
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn payload_round_trips_passage_fields() {
        let doc = Document::new("wfh", "body")
            .with_metadata("source", "Work From Home Policy")
            .with_metadata("tags", vec!["hr".to_string()]);
        let passage = Passage::from_document(&doc, 3, "body");

        let payload = QdrantVectorStore::payload(&passage).unwrap();
        let map: std::collections::HashMap<String, QdrantValue> = payload.into();
        let restored = QdrantVectorStore::passage_from_payload(&map).unwrap();

        assert_eq!(restored.id, "wfh#3");
        assert_eq!(restored.position, 3);
        assert_eq!(restored.source(), "Work From Home Policy");
        assert_eq!(restored.metadata, passage.metadata);
    }
}
