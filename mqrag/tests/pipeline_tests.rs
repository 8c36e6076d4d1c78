//! End-to-end tests of ingestion and question answering with deterministic
//! mock services.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mqrag::config::RagConfig;
use mqrag::document::{Document, Query, SOURCE_KEY};
use mqrag::embedding::EmbeddingProvider;
use mqrag::error::{RagError, Result};
use mqrag::expansion::{ExpansionOutcome, LlmQueryExpander};
use mqrag::index::EmbeddingIndex;
use mqrag::inmemory::InMemoryVectorStore;
use mqrag::llm::{GenerationRequest, LanguageModel};
use mqrag::pipeline::RagPipeline;
use mqrag::testing::{FailingEmbeddingProvider, HashEmbeddingProvider, ScriptedLanguageModel};

const WFH_POLICY: &str = "Effective: March 2020
Purpose: This policy describes how employees may work from home during the office closure.
Eligibility: All employees whose duties can be performed remotely are eligible. Managers \
confirm eligibility with each team member.
Equipment: The company provides a laptop and reimburses internet costs up to 50 dollars per month.
Working hours: Core hours are 10am to 3pm in the employee's local time zone.
Security: Company data must only be accessed over the VPN.
Questions and Concerns: Contact your HR business partner with any questions about this policy.";

const SALES_TEAM: &str = "The NASA sales team is a group of account managers who sell launch \
services, satellite data subscriptions and research partnerships to commercial customers. The \
sales team is led by the head of commercial partnerships.";

const TRAVEL_POLICY: &str = "Travel expenses must be approved by a manager before booking. \
Economy class is required for flights under six hours.";

fn corpus() -> Vec<Document> {
    vec![
        Document::new("wfh-policy", WFH_POLICY)
            .with_metadata(SOURCE_KEY, "Work From Home Policy")
            .with_metadata("category", "hr"),
        Document::new("sales-team", SALES_TEAM).with_metadata(SOURCE_KEY, "Sales Org Chart"),
        Document::new("travel-policy", TRAVEL_POLICY).with_metadata(SOURCE_KEY, "Travel Policy"),
    ]
}

async fn open_index() -> Arc<EmbeddingIndex> {
    let index = Arc::new(EmbeddingIndex::new(
        Arc::new(HashEmbeddingProvider::new(256)),
        Arc::new(InMemoryVectorStore::new()),
        "policies",
    ));
    index.open().await.unwrap();
    index
}

#[tokio::test]
async fn policy_document_is_one_passage_addressable_by_source() {
    let index = open_index().await;
    let model = Arc::new(ScriptedLanguageModel::new());
    let pipeline = RagPipeline::builder()
        .config(RagConfig::builder().chunk_size(800).chunk_overlap(400).build().unwrap())
        .index(Arc::clone(&index))
        .language_model(model)
        .build()
        .unwrap();

    let report = pipeline.ingest(&corpus()[..1]).await.unwrap();
    assert_eq!(report.passages, 1);
    assert_eq!(report.indexed, ["wfh-policy"]);
    assert_eq!(index.len().await.unwrap(), 1);

    let hits = index.search("work from home eligibility", 1).await.unwrap();
    let passage = &hits[0].passage;
    assert_eq!(passage.source(), "Work From Home Policy");
    assert!(passage.text.starts_with("Effective: March 2020"));
    assert!(passage.text.ends_with("questions about this policy."));
}

#[tokio::test]
async fn nasa_question_expands_retrieves_and_answers_once() {
    let index = open_index().await;
    let model = Arc::new(
        ScriptedLanguageModel::new()
            .reply(
                "1. Who is on the NASA sales team?\n\
                 2. What does the sales team at NASA sell?\n\
                 3. Who leads NASA's commercial sales team?",
            )
            .reply("The NASA sales team sells launch services and data subscriptions."),
    );
    let pipeline = RagPipeline::builder()
        .index(index)
        .language_model(model.clone())
        .build()
        .unwrap();
    pipeline.ingest(&corpus()).await.unwrap();

    let answer = pipeline.ask("what is the nasa sales team?").await.unwrap();

    assert_eq!(answer.text, "The NASA sales team sells launch services and data subscriptions.");
    assert_eq!(answer.queries.len(), 4);
    assert_eq!(answer.queries[0].as_str(), "what is the nasa sales team?");
    assert!(!answer.sources.is_empty());
    assert_eq!(answer.sources[0].passage.source(), "Sales Org Chart");

    // One expansion call and exactly one answer call.
    assert_eq!(model.call_count(), 2);
    let prompt = &model.requests()[1].prompt;
    for source in &answer.sources {
        let block = format!("SOURCE: {}\nCONTENT: {}", source.passage.source(), source.passage.text);
        assert!(prompt.contains(&block), "context is missing {}", source.passage.id);
    }
    assert!(prompt.ends_with("Question: what is the nasa sales team?"));
}

#[tokio::test]
async fn failed_expansion_answers_from_the_original_question() {
    let index = open_index().await;
    let model = Arc::new(ScriptedLanguageModel::new().fail("503 overloaded").reply("answer"));
    let pipeline =
        RagPipeline::builder().index(Arc::clone(&index)).language_model(model.clone()).build().unwrap();
    pipeline.ingest(&corpus()).await.unwrap();

    let retrieved = pipeline.retrieve("who approves travel expenses?").await.unwrap();
    assert!(matches!(retrieved.queries.outcome, ExpansionOutcome::Degraded { .. }));
    let single = index
        .search("who approves travel expenses?", pipeline.config().per_query_k)
        .await
        .unwrap();
    assert_eq!(retrieved.results, single);

    let answer = pipeline.ask("who approves travel expenses?").await;
    // The second scripted reply was consumed by `ask`'s expansion attempt,
    // so the answer call has nothing left to return.
    assert!(matches!(answer, Err(RagError::Generation { .. })));
}

#[tokio::test]
async fn index_failure_aborts_the_request_before_generation() {
    let index = Arc::new(EmbeddingIndex::new(
        Arc::new(FailingEmbeddingProvider::new(8)),
        Arc::new(InMemoryVectorStore::new()),
        "broken",
    ));
    index.open().await.unwrap();
    let model = Arc::new(ScriptedLanguageModel::new().reply("a?\nb?\nc?").with_fallback("unused"));
    let pipeline = RagPipeline::builder().index(index).language_model(model.clone()).build().unwrap();

    let err = pipeline.ask("anything").await.unwrap_err();
    assert!(matches!(err, RagError::IndexUnavailable { .. }));
    assert!(err.is_service_failure());
    assert_eq!(model.call_count(), 1);

    let err = pipeline.ingest(&corpus()).await.unwrap_err();
    assert!(matches!(err, RagError::IndexUnavailable { .. }));
}

#[tokio::test]
async fn empty_answer_is_a_generation_failure() {
    let index = open_index().await;
    let model = Arc::new(ScriptedLanguageModel::new().reply(" \n\t"));
    let pipeline = RagPipeline::builder()
        .config(RagConfig::builder().num_variants(0).build().unwrap())
        .index(index)
        .language_model(model.clone())
        .build()
        .unwrap();
    pipeline.ingest(&corpus()).await.unwrap();

    let err = pipeline.ask("what is the nasa sales team?").await.unwrap_err();
    assert!(matches!(err, RagError::Generation { .. }));
    assert_eq!(model.call_count(), 1);
}

#[tokio::test]
async fn disabled_expansion_searches_the_question_alone() {
    let index = open_index().await;
    let model = Arc::new(ScriptedLanguageModel::new().reply("Managers approve travel."));
    let pipeline = RagPipeline::builder()
        .config(RagConfig::builder().num_variants(0).max_results(2).build().unwrap())
        .index(index)
        .language_model(model.clone())
        .build()
        .unwrap();
    pipeline.ingest(&corpus()).await.unwrap();

    let answer = pipeline.ask("who approves travel expenses?").await.unwrap();
    assert_eq!(answer.queries.len(), 1);
    assert!(answer.sources.len() <= 2);
    assert_eq!(answer.sources[0].passage.source(), "Travel Policy");
    assert_eq!(model.call_count(), 1);
}

/// A model that never answers in time.
struct StalledModel;

#[async_trait]
impl LanguageModel for StalledModel {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn generate(&self, _request: GenerationRequest) -> Result<String> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok("too late".to_string())
    }
}

#[tokio::test(start_paused = true)]
async fn slow_generation_hits_the_stage_deadline() {
    let index = open_index().await;
    let pipeline = RagPipeline::builder()
        .config(
            RagConfig::builder()
                .num_variants(0)
                .stage_timeout(Some(Duration::from_secs(5)))
                .request_timeout(None)
                .build()
                .unwrap(),
        )
        .index(index)
        .language_model(Arc::new(StalledModel))
        .build()
        .unwrap();
    pipeline.ingest(&corpus()).await.unwrap();

    match pipeline.ask("what is the nasa sales team?").await {
        Err(RagError::Timeout { stage, after }) => {
            assert_eq!(stage, "generate");
            assert_eq!(after, Duration::from_secs(5));
        }
        other => panic!("expected a stage timeout, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn request_deadline_covers_all_stages() {
    let index = open_index().await;
    let pipeline = RagPipeline::builder()
        .config(
            RagConfig::builder()
                .stage_timeout(None)
                .request_timeout(Some(Duration::from_secs(10)))
                .build()
                .unwrap(),
        )
        .index(index)
        .language_model(Arc::new(StalledModel))
        .build()
        .unwrap();

    let err = pipeline.ask("anything").await.unwrap_err();
    assert!(matches!(err, RagError::Timeout { ref stage, .. } if stage == "request"));
}

#[tokio::test(start_paused = true)]
async fn late_expansion_answers_from_the_original_question() {
    let index = open_index().await;
    let answer_model = Arc::new(ScriptedLanguageModel::new().reply("Managers approve travel."));
    let pipeline = RagPipeline::builder()
        .config(
            RagConfig::builder()
                .stage_timeout(Some(Duration::from_secs(5)))
                .request_timeout(None)
                .build()
                .unwrap(),
        )
        .index(index)
        .expander(Arc::new(LlmQueryExpander::new(Arc::new(StalledModel))))
        .language_model(answer_model.clone())
        .build()
        .unwrap();
    pipeline.ingest(&corpus()).await.unwrap();

    let answer = pipeline.ask("who approves travel expenses?").await.unwrap();
    assert_eq!(answer.text, "Managers approve travel.");
    assert_eq!(answer.queries, [Query::new("who approves travel expenses?")]);
    assert_eq!(answer.sources[0].passage.source(), "Travel Policy");
    assert_eq!(answer_model.call_count(), 1);

    let retrieved = pipeline.retrieve("who approves travel expenses?").await.unwrap();
    assert!(retrieved.queries.is_degraded());
}

/// Maps questions to `[1, 0]` and everything else to a vector pointing the
/// opposite way, so every stored passage scores negative.
struct OpposedEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for OpposedEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(if text.ends_with('?') { vec![1.0, 0.0] } else { vec![-1.0, 0.1] })
    }

    fn dimensions(&self) -> usize {
        2
    }
}

#[tokio::test]
async fn default_config_keeps_negative_similarity_hits() {
    let index = Arc::new(EmbeddingIndex::new(
        Arc::new(OpposedEmbeddingProvider),
        Arc::new(InMemoryVectorStore::new()),
        "opposed",
    ));
    index.open().await.unwrap();
    let model = Arc::new(ScriptedLanguageModel::new().fail("503 overloaded"));
    let pipeline =
        RagPipeline::builder().index(Arc::clone(&index)).language_model(model).build().unwrap();
    pipeline.ingest(&corpus()[2..]).await.unwrap();

    let single = index.search("who approves travel expenses?", 4).await.unwrap();
    assert_eq!(single.len(), 1);
    assert!(single[0].score < 0.0);

    let retrieved = pipeline.retrieve("who approves travel expenses?").await.unwrap();
    assert!(retrieved.queries.is_degraded());
    assert_eq!(retrieved.results, single);
}
