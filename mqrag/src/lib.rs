//! # mqrag
//!
//! Multi-query retrieval-augmented question answering.
//!
//! Documents are split into overlapping token windows, embedded, and stored
//! in a vector index. At query time a language model paraphrases the
//! question, every paraphrase is searched concurrently, the hits are merged
//! (each passage once, at its best score) and the resulting context is handed
//! back to the model together with the original question.
//!
//! ## Features
//!
//! - **Token chunking** with exact overlap and pluggable tokenizers
//! - **Typed metadata** on documents and passages
//! - **Query expansion** that degrades to the original question instead of failing
//! - **Concurrent multi-query retrieval** with deterministic merge order
//! - **Explicit stages** with typed hand-off values and per-stage deadlines
//! - **Backends**: in-memory store (default), Qdrant (`qdrant`), OpenAI
//!   embeddings and chat (`openai`), HuggingFace tokenizers (`hf-tokenizer`)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mqrag::testing::{HashEmbeddingProvider, ScriptedLanguageModel};
//! use mqrag::{Document, EmbeddingIndex, InMemoryVectorStore, RagPipeline};
//!
//! #[tokio::main]
//! async fn main() -> mqrag::Result<()> {
//!     let index = Arc::new(EmbeddingIndex::new(
//!         Arc::new(HashEmbeddingProvider::new(256)),
//!         Arc::new(InMemoryVectorStore::new()),
//!         "policies",
//!     ));
//!     index.open().await?;
//!
//!     let model = Arc::new(ScriptedLanguageModel::new().with_fallback("..."));
//!     let pipeline = RagPipeline::builder().index(index).language_model(model).build()?;
//!
//!     pipeline.ingest(&[Document::new("wfh", "Employees may work remotely ...")]).await?;
//!     let answer = pipeline.ask("who can work from home?").await?;
//!     println!("{}", answer.text);
//!     Ok(())
//! }
//! ```

pub mod chunking;
pub mod config;
pub mod context;
pub mod document;
pub mod embedding;
pub mod error;
pub mod expansion;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod inmemory;
pub mod llm;
pub mod metadata;
#[cfg(feature = "openai")]
pub mod openai;
pub mod pipeline;
#[cfg(feature = "qdrant")]
pub mod qdrant;
pub mod retriever;
pub mod stage;
pub mod telemetry;
pub mod template;
pub mod testing;
pub mod tokenizer;
pub mod vectorstore;

pub use chunking::{Chunker, TokenChunker};
pub use config::{RagConfig, RagConfigBuilder};
pub use context::ContextAssembler;
pub use document::{Answer, Document, Passage, Query, RetrievalResult};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use expansion::{
    ExpandedQuerySet, ExpansionOutcome, LlmQueryExpander, NoExpansion, QueryExpander,
};
pub use generation::AnswerGenerator;
pub use index::EmbeddingIndex;
pub use ingest::{LoadReport, RecordLoader};
pub use inmemory::InMemoryVectorStore;
pub use llm::{GenerationParams, GenerationRequest, LanguageModel};
pub use metadata::{Metadata, MetadataValue};
#[cfg(feature = "openai")]
pub use openai::{OpenAIChatModel, OpenAIEmbeddingProvider};
pub use pipeline::{IngestReport, RagPipeline, RagPipelineBuilder};
#[cfg(feature = "qdrant")]
pub use qdrant::QdrantVectorStore;
pub use retriever::MultiQueryRetriever;
pub use stage::{AssembleStage, AssembledContext, ExpandStage, GenerateStage, RetrieveStage, Retrieved, Stage};
pub use template::PromptTemplate;
#[cfg(feature = "hf-tokenizer")]
pub use tokenizer::HfTokenizer;
pub use tokenizer::{CharTokenizer, Tokenizer, WhitespaceTokenizer};
pub use vectorstore::VectorStore;
