//! Composable query-time stages.
//!
//! Each stage consumes the previous stage's output:
//!
//! ```text
//! Query ─expand→ ExpandedQuerySet ─retrieve→ Retrieved ─assemble→ AssembledContext ─generate→ Answer
//! ```
//!
//! Stages can be run and tested on their own; [`RagPipeline`](crate::RagPipeline)
//! chains them with deadlines.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{Instrument, error, info_span};

use crate::context::ContextAssembler;
use crate::document::{Answer, Query, RetrievalResult};
use crate::error::{RagError, Result};
use crate::expansion::{ExpandedQuerySet, QueryExpander};
use crate::generation::AnswerGenerator;
use crate::retriever::MultiQueryRetriever;

/// One step of the query path with a typed input and output.
#[async_trait]
pub trait Stage: Send + Sync {
    type Input: Send + 'static;
    type Output: Send + 'static;

    /// Short name used in spans and timeout errors.
    fn name(&self) -> &'static str;

    async fn run(&self, input: Self::Input) -> Result<Self::Output>;
}

/// Run `stage` inside a span, bounded by `limit` when one is given.
///
/// # Errors
///
/// Returns [`RagError::Timeout`] naming the stage if the deadline passes;
/// the stage's own future is dropped at that point.
pub async fn run_stage<S: Stage + ?Sized>(
    stage: &S,
    input: S::Input,
    limit: Option<Duration>,
) -> Result<S::Output> {
    let name = stage.name();
    let run = stage.run(input).instrument(info_span!("stage", name));
    match limit {
        Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
            error!(stage = name, ?limit, "stage timed out");
            RagError::Timeout { stage: name.to_string(), after: limit }
        })?,
        None => run.await,
    }
}

/// Merged retrieval results for an expanded question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Retrieved {
    pub queries: ExpandedQuerySet,
    pub results: Vec<RetrievalResult>,
}

impl Retrieved {
    /// The question as the user asked it.
    pub fn question(&self) -> &Query {
        &self.queries.original
    }
}

/// The prompt-ready context together with the passages it was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    pub queries: ExpandedQuerySet,
    pub sources: Vec<RetrievalResult>,
    pub text: String,
}

/// `Query → ExpandedQuerySet`.
pub struct ExpandStage {
    expander: Arc<dyn QueryExpander>,
}

impl ExpandStage {
    /// Wrap an expander.
    pub fn new(expander: Arc<dyn QueryExpander>) -> Self {
        Self { expander }
    }
}

#[async_trait]
impl Stage for ExpandStage {
    type Input = Query;
    type Output = ExpandedQuerySet;

    fn name(&self) -> &'static str {
        "expand"
    }

    async fn run(&self, question: Query) -> Result<ExpandedQuerySet> {
        Ok(self.expander.expand(&question).await)
    }
}

/// `ExpandedQuerySet → Retrieved`.
pub struct RetrieveStage {
    retriever: MultiQueryRetriever,
}

impl RetrieveStage {
    /// Wrap a configured retriever.
    pub fn new(retriever: MultiQueryRetriever) -> Self {
        Self { retriever }
    }

    /// The wrapped retriever.
    pub fn retriever(&self) -> &MultiQueryRetriever {
        &self.retriever
    }
}

#[async_trait]
impl Stage for RetrieveStage {
    type Input = ExpandedQuerySet;
    type Output = Retrieved;

    fn name(&self) -> &'static str {
        "retrieve"
    }

    async fn run(&self, queries: ExpandedQuerySet) -> Result<Retrieved> {
        let results = self.retriever.retrieve(&queries).await?;
        Ok(Retrieved { queries, results })
    }
}

/// `Retrieved → AssembledContext`.
pub struct AssembleStage {
    assembler: ContextAssembler,
}

impl AssembleStage {
    /// Wrap a context assembler.
    pub fn new(assembler: ContextAssembler) -> Self {
        Self { assembler }
    }
}

#[async_trait]
impl Stage for AssembleStage {
    type Input = Retrieved;
    type Output = AssembledContext;

    fn name(&self) -> &'static str {
        "assemble"
    }

    async fn run(&self, retrieved: Retrieved) -> Result<AssembledContext> {
        let text = self.assembler.assemble(&retrieved.results);
        Ok(AssembledContext { queries: retrieved.queries, sources: retrieved.results, text })
    }
}

/// `AssembledContext → Answer`. Makes exactly one model call.
pub struct GenerateStage {
    generator: Arc<AnswerGenerator>,
}

impl GenerateStage {
    /// Wrap a shared answer generator.
    pub fn new(generator: Arc<AnswerGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Stage for GenerateStage {
    type Input = AssembledContext;
    type Output = Answer;

    fn name(&self) -> &'static str {
        "generate"
    }

    async fn run(&self, context: AssembledContext) -> Result<Answer> {
        let question = context.queries.original.clone();
        let text = self.generator.generate(&context.text, &question).await?;
        let queries = context.queries.queries().into_iter().cloned().collect();
        Ok(Answer { text, question, queries, sources: context.sources })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, Passage};
    use crate::expansion::{ExpansionOutcome, NoExpansion};
    use crate::testing::ScriptedLanguageModel;

    struct Sleepy;

    #[async_trait]
    impl Stage for Sleepy {
        type Input = ();
        type Output = ();

        fn name(&self) -> &'static str {
            "sleepy"
        }

        async fn run(&self, _input: ()) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    fn retrieved(question: &str, texts: &[&str]) -> Retrieved {
        let doc = Document::new("d", "");
        Retrieved {
            queries: ExpandedQuerySet::original_only(
                Query::new(question),
                ExpansionOutcome::NotRequested,
            ),
            results: texts
                .iter()
                .enumerate()
                .map(|(i, t)| RetrievalResult {
                    passage: Passage::from_document(&doc, i, *t),
                    score: 1.0 - i as f32 * 0.1,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn expand_stage_wraps_the_expander() {
        let set = ExpandStage::new(Arc::new(NoExpansion)).run(Query::new("q")).await.unwrap();
        assert_eq!(set.queries(), [&Query::new("q")]);
    }

    #[tokio::test]
    async fn assemble_then_generate_hand_off_typed_values() {
        let context =
            AssembleStage::new(ContextAssembler::new()).run(retrieved("q?", &["one", "two"])).await;
        let context = context.unwrap();
        assert_eq!(context.sources.len(), 2);
        assert!(context.text.contains("CONTENT: one\n\nSOURCE: d\nCONTENT: two"));

        let model = Arc::new(ScriptedLanguageModel::new().reply("the answer"));
        let generator = Arc::new(AnswerGenerator::new(model.clone()));
        let answer = GenerateStage::new(generator).run(context).await.unwrap();

        assert_eq!(answer.text, "the answer");
        assert_eq!(answer.question, Query::new("q?"));
        assert_eq!(answer.queries, [Query::new("q?")]);
        assert_eq!(answer.sources.len(), 2);
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stage_enforces_the_deadline() {
        let err = run_stage(&Sleepy, (), Some(Duration::from_millis(50))).await.unwrap_err();
        match err {
            RagError::Timeout { stage, after } => {
                assert_eq!(stage, "sleepy");
                assert_eq!(after, Duration::from_millis(50));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
