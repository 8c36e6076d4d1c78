//! # Policy Q&A Example
//!
//! Loads a small JSON Lines feed of company documents, indexes it, and asks
//! a question through the full multi-query pipeline.
//!
//! Uses `InMemoryVectorStore`, `HashEmbeddingProvider`, and a
//! `ScriptedLanguageModel` so it runs with **zero API keys**.
//!
//! Run: `cargo run -p mqrag --example policy_qa`

use std::sync::Arc;

use mqrag::testing::{HashEmbeddingProvider, ScriptedLanguageModel};
use mqrag::{EmbeddingIndex, InMemoryVectorStore, RagConfig, RagPipeline, RecordLoader};

const FEED: &str = r#"{"id": "wfh-policy", "source": "Work From Home Policy", "category": "hr", "effective": "2020-03-16T00:00:00Z", "content": "Effective: March 2020\nPurpose: Employees whose duties can be performed remotely may work from home while the office is closed.\nEquipment: The company provides a laptop and reimburses internet costs.\nQuestions and Concerns: Contact your HR business partner."}
{"id": "sales-team", "source": "Sales Org Chart", "tags": ["sales", "org"], "content": "The NASA sales team is a group of account managers who sell launch services, satellite data subscriptions and research partnerships to commercial customers."}
{"id": "travel-policy", "source": "Travel Policy", "content": "Travel expenses must be approved by a manager before booking."}
{"id": "draft", "source": "Drafts", "content": "   "}
"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mqrag::telemetry::init_tracing();

    // -- 1. Load the feed ---------------------------------------------------
    // The blank "draft" record is reported and skipped; loading continues.
    let loaded = RecordLoader::new("company-docs").load_str(FEED);
    println!("Loaded {} document(s), skipped {}", loaded.documents.len(), loaded.skipped());
    for error in &loaded.errors {
        println!("  skipped: {error}");
    }

    // -- 2. Open the index ----------------------------------------------------
    let index = Arc::new(EmbeddingIndex::new(
        Arc::new(HashEmbeddingProvider::new(256)),
        Arc::new(InMemoryVectorStore::new()),
        "company_docs",
    ));
    index.open().await?;

    // -- 3. Build the pipeline ------------------------------------------------
    // The scripted model first returns three paraphrases, then the answer.
    let model = Arc::new(
        ScriptedLanguageModel::new()
            .reply(
                "1. Who is on the NASA sales team?\n\
                 2. What does the sales team at NASA sell?\n\
                 3. Which NASA team sells to commercial customers?",
            )
            .reply("The NASA sales team is a group of account managers selling launch services."),
    );
    let config = RagConfig::builder().chunk_size(800).chunk_overlap(400).num_variants(3).build()?;
    let pipeline =
        RagPipeline::builder().config(config).index(Arc::clone(&index)).language_model(model).build()?;

    // -- 4. Ingest --------------------------------------------------------------
    let report = pipeline.ingest(&loaded.documents).await?;
    println!("Indexed {} passage(s) from {:?}", report.passages, report.indexed);

    // -- 5. Ask -----------------------------------------------------------------
    let answer = pipeline.ask("what is the nasa sales team?").await?;

    println!("\nSearched queries:");
    for query in &answer.queries {
        println!("  - {query}");
    }
    println!("\nSources:");
    for (i, source) in answer.sources.iter().enumerate() {
        let preview: String = source.passage.text.chars().take(60).collect();
        println!("  {}. [score={:.4}] {} | {preview}", i + 1, source.score, source.passage.source());
    }
    println!("\nAnswer: {}", answer.text);

    index.close();
    Ok(())
}
