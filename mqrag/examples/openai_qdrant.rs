//! # OpenAI + Qdrant Example
//!
//! The same multi-query pipeline against real services: OpenAI for
//! embeddings, paraphrases and the answer, Qdrant for storage.
//!
//! Requires `OPENAI_API_KEY` and a reachable Qdrant (`QDRANT_URL`, default
//! `http://localhost:6334`; optional `QDRANT_API_KEY`). Values may come from
//! a `.env` file.
//!
//! Run: `cargo run -p mqrag --example openai_qdrant --features openai,qdrant -- docs.jsonl`

use std::sync::Arc;

use mqrag::{
    EmbeddingIndex, OpenAIChatModel, OpenAIEmbeddingProvider, QdrantVectorStore, RagConfig,
    RagPipeline, RecordLoader,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    mqrag::telemetry::init_tracing();

    let feed = std::env::args().nth(1).unwrap_or_else(|| "docs.jsonl".to_string());
    let question =
        std::env::args().nth(2).unwrap_or_else(|| "what is the nasa sales team?".to_string());

    let loaded = RecordLoader::new("docs").load_path(&feed)?;
    println!("Loaded {} document(s) from {feed}, skipped {}", loaded.documents.len(), loaded.skipped());

    let embedder = Arc::new(OpenAIEmbeddingProvider::from_env()?.with_model("text-embedding-3-small"));
    let store = Arc::new(QdrantVectorStore::from_env()?);
    let index = Arc::new(EmbeddingIndex::new(embedder, store, "mqrag_docs"));
    index.open().await?;

    let model = Arc::new(OpenAIChatModel::from_env()?.with_model("gpt-4o-mini"));
    let pipeline = RagPipeline::builder()
        .config(RagConfig::builder().max_results(8).build()?)
        .index(Arc::clone(&index))
        .language_model(model)
        .build()?;

    let report = pipeline.ingest(&loaded.documents).await?;
    println!("Indexed {} passage(s)", report.passages);

    let answer = pipeline.ask(question.as_str()).await?;
    println!("\nQueries:");
    for query in &answer.queries {
        println!("  - {query}");
    }
    println!("\nSources:");
    for source in &answer.sources {
        println!("  [score={:.4}] {}", source.score, source.passage.source());
    }
    println!("\nAnswer: {}", answer.text);

    index.close();
    Ok(())
}
