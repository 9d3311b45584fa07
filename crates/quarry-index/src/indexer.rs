//! Indexing orchestrator: load → chunk → embed → store.

use std::path::Path;
use std::sync::Arc;

use quarry_llm::EmbeddingProvider;
use quarry_memory::document::{ChunkStatistics, Chunker, FileFailure};
use quarry_memory::{VectorIndex, estimate_tokens};

use crate::error::Result;

/// Texts per embedding request and points per index write.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Summary of an indexing run.
#[derive(Debug, Default)]
pub struct IndexReport {
    pub files_processed: usize,
    pub chunks_indexed: usize,
    pub failures: Vec<FileFailure>,
    pub statistics: ChunkStatistics,
    /// chars/4 estimate of the text sent to the embedding service.
    pub embedding_tokens: usize,
    pub duration_ms: u64,
}

pub struct Indexer<E> {
    chunker: Chunker,
    embedder: Arc<E>,
    index: Arc<dyn VectorIndex>,
    batch_size: usize,
}

impl<E> std::fmt::Debug for Indexer<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexer")
            .field("chunker", &self.chunker)
            .field("index", &self.index.name())
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl<E: EmbeddingProvider> Indexer<E> {
    #[must_use]
    pub fn new(chunker: Chunker, embedder: Arc<E>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            chunker,
            embedder,
            index,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// Index a single file or every supported file directly inside a directory.
    ///
    /// The index is created even when nothing was chunked, so later queries
    /// see an empty index rather than a missing one. Chunk numbering continues
    /// after the points already in the index, so repeated loads into one job
    /// never reuse a point id.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` cannot be read, a single file fails to load,
    /// or embedding or index writes fail. Individual files in a directory that
    /// fail to load are reported in `failures` instead.
    pub async fn index_path(&self, path: &Path) -> Result<IndexReport> {
        let start = std::time::Instant::now();
        let mut report = IndexReport::default();

        let is_dir = tokio::fs::metadata(path).await?.is_dir();
        self.index.create_index(self.embedder.dimension()).await?;
        let first_index = self.index.count().await?;

        let chunks = if is_dir {
            let out = self.chunker.chunk_directory_from(path, first_index).await?;
            report.files_processed = out.files_processed;
            report.failures = out.failures;
            out.chunks
        } else {
            let chunks = self.chunker.load_file(path, first_index).await?;
            report.files_processed = 1;
            chunks
        };
        report.statistics = ChunkStatistics::from_chunks(&chunks);

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        report.embedding_tokens = texts.iter().map(|t| estimate_tokens(t)).sum();
        tracing::info!(
            chunks = chunks.len(),
            files = report.files_processed,
            provider = self.embedder.name(),
            "embedding chunks"
        );
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed_batch(&texts, self.batch_size).await?
        };

        report.chunks_indexed = self.index.add(&chunks, &vectors, self.batch_size).await?;

        report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        tracing::info!(
            index = self.index.name(),
            chunks = report.chunks_indexed,
            files = report.files_processed,
            failed = report.failures.len(),
            duration_ms = report.duration_ms,
            "indexing finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use quarry_llm::mock::MockEmbedder;
    use quarry_memory::InMemoryVectorIndex;
    use quarry_memory::document::{ChunkerConfig, TokenCounter};

    use super::*;
    use crate::error::IndexError;

    struct WordCounter;

    impl TokenCounter for WordCounter {
        fn encode(&self, text: &str) -> Vec<u32> {
            (0..text.split_whitespace().count())
                .map(|i| u32::try_from(i).unwrap())
                .collect()
        }

        fn decode(&self, tokens: &[u32]) -> String {
            vec!["w"; tokens.len()].join(" ")
        }
    }

    fn indexer(embedder: MockEmbedder, index: Arc<InMemoryVectorIndex>) -> Indexer<MockEmbedder> {
        let chunker = Chunker::new(ChunkerConfig::default(), Arc::new(WordCounter)).unwrap();
        Indexer::new(chunker, Arc::new(embedder), index).with_batch_size(2)
    }

    #[tokio::test]
    async fn indexes_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "First paragraph here.\n\nSecond one.").unwrap();
        std::fs::write(dir.path().join("b.md"), "Another file entirely.").unwrap();

        let index = Arc::new(InMemoryVectorIndex::new("rag_test"));
        let report = indexer(MockEmbedder::new(8), index.clone())
            .index_path(dir.path())
            .await
            .unwrap();

        assert_eq!(report.files_processed, 2);
        assert_eq!(report.chunks_indexed, 3);
        assert_eq!(report.statistics.files, ["a.txt", "b.md"]);
        assert!(report.embedding_tokens > 0);
        assert_eq!(index.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn same_file_name_in_two_loads_keeps_both() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(
            first.path().join("notes.md"),
            "Alpha paragraph one.\n\nAlpha paragraph two.",
        )
        .unwrap();
        std::fs::write(second.path().join("notes.md"), "Beta paragraph only.").unwrap();

        let index = Arc::new(InMemoryVectorIndex::new("rag_two_loads"));
        let indexer = indexer(MockEmbedder::new(8), index.clone());
        indexer.index_path(first.path()).await.unwrap();
        let report = indexer.index_path(second.path()).await.unwrap();

        assert_eq!(report.chunks_indexed, 1);
        assert_eq!(index.count().await.unwrap(), 3);
        let hits = index.search(vec![1.0; 8], 10, None).await.unwrap();
        let mut indices: Vec<usize> = hits.iter().map(|h| h.metadata.chunk_index).collect();
        indices.sort_unstable();
        assert_eq!(indices, [0, 1, 2]);
        assert!(hits.iter().any(|h| h.text == "Alpha paragraph one."));
        assert!(hits.iter().any(|h| h.text == "Beta paragraph only."));
    }

    #[tokio::test]
    async fn empty_directory_still_creates_index() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(InMemoryVectorIndex::new("rag_empty"));
        let report = indexer(MockEmbedder::new(8), index.clone())
            .index_path(dir.path())
            .await
            .unwrap();
        assert_eq!(report.chunks_indexed, 0);
        assert!(index.search(vec![0.0; 8], 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "Some text.").unwrap();
        let index = Arc::new(InMemoryVectorIndex::new("rag_fail"));
        let err = indexer(MockEmbedder::failing(8), index.clone())
            .index_path(dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Llm(_)));
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unsupported_single_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        let index = Arc::new(InMemoryVectorIndex::new("rag_bin"));
        let err = indexer(MockEmbedder::new(8), index)
            .index_path(&path)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Document(_)));
    }
}
