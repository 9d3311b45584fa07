use std::sync::Arc;

use quarry_llm::EmbeddingProvider;
use quarry_llm::mock::MockEmbedder;
use quarry_memory::document::{
    ChunkStatistics, Chunker, ChunkerConfig, TiktokenCounter, UNKNOWN,
};
use quarry_memory::{InMemoryVectorIndex, VectorIndex};

const REPORT: &str = "\
ANNUAL REPORT

1. Introduction

This report covers renewable generation across all regions.

2.1 Solar Output

Solar output rose sharply in the second half of the year.
";

fn chunker(config: ChunkerConfig) -> Chunker {
    Chunker::new(config, Arc::new(TiktokenCounter::cl100k().unwrap())).unwrap()
}

#[tokio::test]
async fn directory_is_chunked_with_section_metadata() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("report.md"), REPORT).unwrap();
    std::fs::write(dir.path().join("notes.txt"), "Short note about wind").unwrap();
    std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

    let out = chunker(ChunkerConfig::default())
        .chunk_directory(dir.path())
        .await
        .unwrap();

    assert_eq!(out.files_processed, 2);
    assert!(out.failures.is_empty());
    let indices: Vec<_> = out.chunks.iter().map(|c| c.metadata.chunk_index).collect();
    assert_eq!(indices, (0..out.chunks.len()).collect::<Vec<_>>());

    let notes = &out.chunks[0];
    assert_eq!(notes.metadata.source_file, "notes.txt");
    assert_eq!(notes.metadata.section, UNKNOWN);

    let solar = out
        .chunks
        .iter()
        .find(|c| c.text.starts_with("Solar output"))
        .unwrap();
    assert_eq!(solar.metadata.source_file, "report.md");
    assert_eq!(solar.metadata.section, "2.1");
    assert_eq!(solar.metadata.heading, "2.1 Solar Output");
    assert!(solar.metadata.token_count > 0);

    let stats = ChunkStatistics::from_chunks(&out.chunks);
    assert_eq!(stats.files, ["notes.txt", "report.md"]);
    assert_eq!(stats.total_chunks, out.chunks.len());
}

#[tokio::test]
async fn oversized_paragraph_respects_chunk_size() {
    let dir = tempfile::tempdir().unwrap();
    let long = "Wind turbines convert kinetic energy into electricity. ".repeat(200);
    std::fs::write(dir.path().join("long.txt"), &long).unwrap();

    let config = ChunkerConfig {
        chunk_size: 64,
        chunk_overlap: 8,
        ..ChunkerConfig::default()
    };
    let out = chunker(config).chunk_directory(dir.path()).await.unwrap();

    assert!(out.chunks.len() > 1);
    assert!(out.chunks.iter().all(|c| c.metadata.token_count <= 64));
}

#[tokio::test]
async fn chunks_round_trip_through_in_memory_index() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("report.md"), REPORT).unwrap();
    let out = chunker(ChunkerConfig::default())
        .chunk_directory(dir.path())
        .await
        .unwrap();

    let embedder = MockEmbedder::new(32);
    let texts: Vec<String> = out.chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed_batch(&texts, 2).await.unwrap();

    let index = InMemoryVectorIndex::new("rag_doc_it");
    index.create_index(embedder.dimension()).await.unwrap();
    index.add(&out.chunks, &vectors, 100).await.unwrap();

    let query = embedder.embed("solar output").await.unwrap();
    let results = index.search(query, 1, None).await.unwrap();
    assert_eq!(results[0].metadata.section, "2.1");
}
