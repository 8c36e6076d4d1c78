//! Pipeline orchestrator.
//!
//! The [`RagPipeline`] ties ingestion (chunk → embed → store) to the query
//! path (expand → retrieve → assemble → generate) over one shared
//! [`EmbeddingIndex`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mqrag::{EmbeddingIndex, InMemoryVectorStore, RagConfig, RagPipeline};
//!
//! let index = Arc::new(EmbeddingIndex::new(embedder, Arc::new(InMemoryVectorStore::new()), "docs"));
//! index.open().await?;
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .index(index)
//!     .language_model(model)
//!     .build()?;
//!
//! pipeline.ingest(&documents).await?;
//! let answer = pipeline.ask("what is the nasa sales team?").await?;
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{Instrument, error, info, info_span, warn};

use crate::chunking::{Chunker, TokenChunker};
use crate::config::RagConfig;
use crate::context::ContextAssembler;
use crate::document::{Answer, Document, Query};
use crate::error::{RagError, Result};
use crate::expansion::{
    ExpandedQuerySet, ExpansionOutcome, LlmQueryExpander, NoExpansion, QueryExpander,
};
use crate::generation::AnswerGenerator;
use crate::index::EmbeddingIndex;
use crate::llm::LanguageModel;
use crate::retriever::MultiQueryRetriever;
use crate::stage::{
    AssembleStage, ExpandStage, GenerateStage, RetrieveStage, Retrieved, run_stage,
};

/// Outcome of [`RagPipeline::ingest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Ids of documents whose passages were indexed, in input order.
    pub indexed: Vec<String>,
    /// Ids of documents that produced no passages.
    pub skipped: Vec<String>,
    /// Total passages written.
    pub passages: usize,
}

/// The question-answering pipeline. Construct one via [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    index: Arc<EmbeddingIndex>,
    chunker: Arc<dyn Chunker>,
    expand: ExpandStage,
    retrieve: RetrieveStage,
    assemble: AssembleStage,
    generate: GenerateStage,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return the shared index handle.
    pub fn index(&self) -> &Arc<EmbeddingIndex> {
        &self.index
    }

    /// Chunk each document and upsert its passages.
    ///
    /// Documents that produce no passages (blank bodies) are recorded in
    /// [`IngestReport::skipped`] and do not stop the batch.
    ///
    /// # Errors
    ///
    /// Returns the index error on the first document whose passages cannot
    /// be stored; documents before it stay indexed.
    pub async fn ingest(&self, documents: &[Document]) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        for document in documents {
            let passages = self.chunker.chunk(document);
            if passages.is_empty() {
                warn!(document.id = %document.id(), "document produced no passages, skipping");
                report.skipped.push(document.id().to_string());
                continue;
            }

            let stored = self.index.upsert(&passages).await.map_err(|e| {
                error!(document.id = %document.id(), error = %e, "upsert failed during ingestion");
                e
            })?;

            info!(document.id = %document.id(), passage_count = stored.len(), "ingested document");
            report.passages += stored.len();
            report.indexed.push(document.id().to_string());
        }

        info!(
            indexed = report.indexed.len(),
            skipped = report.skipped.len(),
            passages = report.passages,
            "ingestion completed"
        );
        Ok(report)
    }

    /// Expand and retrieve without generating an answer.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexUnavailable`] if any search fails and
    /// [`RagError::Timeout`] if retrieval exceeds its deadline. A late
    /// expansion degrades to the original question instead.
    pub async fn retrieve(&self, question: impl Into<Query>) -> Result<Retrieved> {
        let question = question.into();
        let span = info_span!("retrieve", question = %question);
        self.expand_and_retrieve(question).instrument(span).await
    }

    async fn expand_and_retrieve(&self, question: Query) -> Result<Retrieved> {
        let limit = self.config.stage_timeout();
        // A late expander counts as a failed expansion, not a failed request.
        let expanded = match run_stage(&self.expand, question.clone(), limit).await {
            Ok(expanded) => expanded,
            Err(RagError::Timeout { after, .. }) => {
                warn!(?after, "query expansion timed out, searching the original question");
                ExpandedQuerySet::original_only(
                    question,
                    ExpansionOutcome::Degraded { reason: format!("expansion timed out after {after:?}") },
                )
            }
            Err(e) => return Err(e),
        };
        run_stage(&self.retrieve, expanded, limit).await
    }

    /// Answer `question` from the indexed passages.
    ///
    /// Runs every stage under the stage deadline and the whole call under the
    /// request deadline. The language model is called once for expansion
    /// (when enabled) and exactly once for the answer. Dropping the returned
    /// future cancels any in-flight work.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexUnavailable`] if retrieval fails,
    /// [`RagError::Generation`] if the model fails or answers blank, and
    /// [`RagError::Timeout`] if a deadline passes. No partial answer is
    /// produced.
    pub async fn ask(&self, question: impl Into<Query>) -> Result<Answer> {
        let question = question.into();
        let span = info_span!("ask", question = %question);
        let run = self.answer(question).instrument(span);

        match self.config.request_timeout() {
            Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
                error!(?limit, "request timed out");
                RagError::Timeout { stage: "request".to_string(), after: limit }
            })?,
            None => run.await,
        }
    }

    async fn answer(&self, question: Query) -> Result<Answer> {
        let limit = self.config.stage_timeout();
        let retrieved = self.expand_and_retrieve(question).await?;
        let context = run_stage(&self.assemble, retrieved, limit).await?;
        let answer = run_stage(&self.generate, context, limit).await?;

        info!(
            queries = answer.queries.len(),
            sources = answer.sources.len(),
            answer_len = answer.text.len(),
            "question answered"
        );
        Ok(answer)
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `index` is required. A `language_model` is required unless both an
/// `expander` and an `answer_generator` are supplied. Everything else
/// defaults from the [`RagConfig`].
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(RagConfig::builder().num_variants(3).max_results(8).build()?)
///     .index(index)
///     .language_model(model)
///     .context_assembler(ContextAssembler::new().with_separator("\n---\n"))  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    index: Option<Arc<EmbeddingIndex>>,
    chunker: Option<Arc<dyn Chunker>>,
    expander: Option<Arc<dyn QueryExpander>>,
    language_model: Option<Arc<dyn LanguageModel>>,
    context_assembler: Option<ContextAssembler>,
    answer_generator: Option<AnswerGenerator>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration. Defaults to [`RagConfig::default()`].
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the shared index handle.
    pub fn index(mut self, index: Arc<EmbeddingIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Override the default [`TokenChunker`].
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Override the default expander.
    pub fn expander(mut self, expander: Arc<dyn QueryExpander>) -> Self {
        self.expander = Some(expander);
        self
    }

    /// Set the model used for expansion and answering.
    pub fn language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.language_model = Some(model);
        self
    }

    /// Override the default [`ContextAssembler`].
    pub fn context_assembler(mut self, assembler: ContextAssembler) -> Self {
        self.context_assembler = Some(assembler);
        self
    }

    /// Override the default answer generator.
    pub fn answer_generator(mut self, generator: AnswerGenerator) -> Self {
        self.answer_generator = Some(generator);
        self
    }

    /// Build the [`RagPipeline`], validating the configuration and the
    /// required parts.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the configuration is invalid, the
    /// index is missing, or no language model is available for a stage that
    /// needs one.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let index = self
            .index
            .ok_or_else(|| RagError::Config("index is required".to_string()))?;
        let model = self.language_model;
        let missing_model = |part: &str| {
            RagError::Config(format!("language_model is required when no {part} is supplied"))
        };

        let chunker: Arc<dyn Chunker> = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(TokenChunker::new(config.chunk_size, config.chunk_overlap)),
        };

        let expander: Arc<dyn QueryExpander> = match (self.expander, &model) {
            (Some(expander), _) => expander,
            (None, _) if config.num_variants == 0 => Arc::new(NoExpansion),
            (None, Some(model)) => Arc::new(
                LlmQueryExpander::new(Arc::clone(model))
                    .with_params(config.expansion)
                    .num_variants(config.num_variants)
                    .min_variants(config.min_variants)
                    .include_original(config.include_original)
                    .timeout(config.stage_timeout()),
            ),
            (None, None) => return Err(missing_model("expander")),
        };

        let generator = match (self.answer_generator, model) {
            (Some(generator), _) => generator,
            (None, Some(model)) => AnswerGenerator::new(model).with_params(config.answer),
            (None, None) => return Err(missing_model("answer_generator")),
        };

        let mut retriever = MultiQueryRetriever::new(Arc::clone(&index))
            .per_query_k(config.per_query_k)
            .max_results(config.max_results)
            .search_timeout(config.stage_timeout());
        if let Some(threshold) = config.similarity_threshold {
            retriever = retriever.similarity_threshold(threshold);
        }

        Ok(RagPipeline {
            index,
            chunker,
            expand: ExpandStage::new(expander),
            retrieve: RetrieveStage::new(retriever),
            assemble: AssembleStage::new(self.context_assembler.unwrap_or_default()),
            generate: GenerateStage::new(Arc::new(generator)),
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inmemory::InMemoryVectorStore;
    use crate::testing::{HashEmbeddingProvider, ScriptedLanguageModel};

    fn index() -> Arc<EmbeddingIndex> {
        Arc::new(EmbeddingIndex::new(
            Arc::new(HashEmbeddingProvider::new(128)),
            Arc::new(InMemoryVectorStore::new()),
            "test",
        ))
    }

    #[test]
    fn build_requires_index_and_model() {
        let err = RagPipeline::builder().build().err().unwrap();
        assert!(err.to_string().contains("index"));

        let err = RagPipeline::builder().index(index()).build().err().unwrap();
        assert!(matches!(err, RagError::Config(_)));

        let model = Arc::new(ScriptedLanguageModel::new());
        assert!(RagPipeline::builder().index(index()).language_model(model).build().is_ok());
    }

    #[test]
    fn build_rejects_invalid_config() {
        let mut config = RagConfig::default();
        config.chunk_overlap = config.chunk_size;
        let model = Arc::new(ScriptedLanguageModel::new());
        let result =
            RagPipeline::builder().config(config).index(index()).language_model(model).build();
        assert!(matches!(result, Err(RagError::Config(_))));
    }

    #[tokio::test]
    async fn ingest_skips_blank_documents() {
        let index = index();
        index.open().await.unwrap();
        let model = Arc::new(ScriptedLanguageModel::new());
        let pipeline =
            RagPipeline::builder().index(index.clone()).language_model(model).build().unwrap();

        let report = pipeline
            .ingest(&[Document::new("a", "remote work policy"), Document::new("blank", "  \n ")])
            .await
            .unwrap();

        assert_eq!(report.indexed, ["a"]);
        assert_eq!(report.skipped, ["blank"]);
        assert_eq!(report.passages, 1);
        assert_eq!(index.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ingest_on_closed_index_fails() {
        let model = Arc::new(ScriptedLanguageModel::new());
        let pipeline = RagPipeline::builder().index(index()).language_model(model).build().unwrap();
        let err = pipeline.ingest(&[Document::new("a", "text")]).await.unwrap_err();
        assert!(matches!(err, RagError::Pipeline(_)));
    }
}
