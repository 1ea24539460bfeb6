use std::path::Path;
use std::sync::Arc;

use lorebase_core::{BatchQueryRunner, QueryAgent};
use lorebase_llm::mock::MockProvider;
use lorebase_llm::provider::embed_batch_fn;
use lorebase_memory::document::{
    AutoConfirm, IngestError, IngestMode, IngestOptions, IngestionPipeline, InputType,
    LoaderOptions, SplitterConfig, TextSplitter, loader_for,
};
use lorebase_memory::{IndexError, VectorIndex};
use lorebase_tools::RetrievalExecutor;
use serde_json::Value;
use tokio::io::BufReader;

fn text_pipeline(embedder: &MockProvider) -> IngestionPipeline {
    IngestionPipeline::new(
        loader_for(InputType::Text, LoaderOptions::default()).unwrap(),
        TextSplitter::new(SplitterConfig {
            chunk_size: 80,
            chunk_overlap: 0,
            strategy: InputType::Text.split_strategy(),
        }),
        embed_batch_fn(embedder),
        IngestOptions::default(),
    )
}

const CAPITALS: &str = "Paris is the capital of France.\n\nBerlin is the capital of Germany.";

fn write_corpus(dir: &Path) -> Vec<std::path::PathBuf> {
    let capitals = dir.join("capitals.txt");
    std::fs::write(&capitals, CAPITALS).unwrap();
    let rivers = dir.join("rivers.txt");
    std::fs::write(&rivers, "The Danube flows through Vienna.").unwrap();
    vec![capitals, rivers]
}

#[tokio::test]
async fn ingest_then_answer_batch() {
    let dir = tempfile::tempdir().unwrap();
    let sources = write_corpus(dir.path());
    let index_path = dir.path().join("kb");
    let embedder = MockProvider::default();

    let report = text_pipeline(&embedder)
        .run(IngestMode::Create, &index_path, sources, &AutoConfirm)
        .await
        .unwrap();
    assert!(report.is_clean());
    assert_eq!(report.sources_ok, 2);

    let index = VectorIndex::load(&index_path).await.unwrap();
    assert_eq!(index.len(), report.chunks_indexed);

    let tools = RetrievalExecutor::new(
        "geography",
        "Facts about European cities",
        Arc::new(index),
        embed_batch_fn(&embedder),
    )
    .with_k(2);

    // Each file fits in one chunk, so the exact text is its own nearest neighbour.
    let hits = tools.retrieve(CAPITALS).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk.content, CAPITALS);

    let chat = MockProvider::with_responses(vec![
        "Let me look.\n```tool_call\n{\"tool_id\": \"geography\", \"params\": {\"query\": \"capital of France\"}}\n```".into(),
        "Final Answer: Paris".into(),
        "Final Answer: Vienna".into(),
    ]);
    let runner = BatchQueryRunner::new(QueryAgent::new(chat, tools));

    let input = "{\"id\": 1, \"input\": \"What is the capital of France?\"}\n\
                 {\"id\": 2, \"query\": \"Which city is on the Danube?\"}\n";
    let mut out = Vec::new();
    let summary = runner
        .run(BufReader::new(input.as_bytes()), &mut out)
        .await
        .unwrap();
    assert_eq!(summary.total, 2);
    assert!(summary.is_clean());

    let records: Vec<Value> = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(records[0]["id"], 1);
    assert_eq!(records[0]["output"], "Paris");
    assert_eq!(records[0]["intermediate_steps"][0]["tool"], "geography");
    assert_eq!(records[1]["output"], "Vienna");
    assert_eq!(records[1]["status"], "ok");
}

#[tokio::test]
async fn append_to_missing_index_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let sources = write_corpus(dir.path());
    let index_path = dir.path().join("missing");
    let embedder = MockProvider::default();

    let err = text_pipeline(&embedder)
        .run(IngestMode::Append, &index_path, sources, &AutoConfirm)
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Index(IndexError::NotFound { .. })));
    assert!(!index_path.exists());
    assert_eq!(embedder.embed_calls(), 0);
}
