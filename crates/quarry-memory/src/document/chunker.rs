use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::heading::{extract_section_number, is_heading};
use super::loader::{DocumentLoader, TextLoader, extension_of};
use super::tokenizer::TokenCounter;
use super::types::{Chunk, ChunkMetadata, Document, Paragraph, UNKNOWN};
use super::DocumentError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Attach the current section number to chunks.
    pub preserve_metadata: bool,
    /// Attach the current heading text to chunks.
    pub include_section_headers: bool,
    pub include_page_numbers: bool,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 150,
            preserve_metadata: true,
            include_section_headers: true,
            include_page_numbers: true,
        }
    }
}

impl ChunkerConfig {
    /// # Errors
    ///
    /// Returns `DocumentError::InvalidConfig` if the window cannot advance.
    pub fn validate(&self) -> Result<(), DocumentError> {
        if self.chunk_size == 0 {
            return Err(DocumentError::InvalidConfig(
                "chunk_size must be greater than zero".into(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(DocumentError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Token ranges of a sliding window over `len` tokens.
///
/// Each window holds at most `size` tokens and starts `size - overlap` tokens
/// after the previous one. The last window ends exactly at `len`.
#[must_use]
pub fn token_windows(len: usize, size: usize, overlap: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let size = size.max(1);
    let step = size.saturating_sub(overlap).max(1);
    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(len);
        windows.push(start..end);
        if end == len {
            break;
        }
        start += step;
    }
    windows
}

/// Per-file load failure inside a directory load.
#[derive(Debug, Clone)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct DirectoryChunks {
    pub chunks: Vec<Chunk>,
    pub files_processed: usize,
    pub failures: Vec<FileFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChunkStatistics {
    pub total_chunks: usize,
    pub total_tokens: usize,
    pub avg_tokens_per_chunk: usize,
    /// Distinct sources, sorted.
    pub files: Vec<String>,
}

impl ChunkStatistics {
    #[must_use]
    pub fn from_chunks(chunks: &[Chunk]) -> Self {
        let total_tokens: usize = chunks.iter().map(|c| c.metadata.token_count).sum();
        let mut files: Vec<String> = chunks
            .iter()
            .map(|c| c.metadata.source_file.clone())
            .collect();
        files.sort();
        files.dedup();
        Self {
            total_chunks: chunks.len(),
            total_tokens,
            avg_tokens_per_chunk: total_tokens.checked_div(chunks.len()).unwrap_or(0),
            files,
        }
    }
}

/// Metadata-aware chunker.
///
/// Walks paragraphs in order, tracks the current section and heading, and
/// splits oversized paragraphs into overlapping token windows.
pub struct Chunker {
    config: ChunkerConfig,
    counter: Arc<dyn TokenCounter>,
    loaders: Vec<Box<dyn DocumentLoader>>,
}

impl std::fmt::Debug for Chunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunker")
            .field("config", &self.config)
            .field("loaders", &self.loaders.len())
            .finish_non_exhaustive()
    }
}

impl Chunker {
    /// Create a chunker with the plain-text loader registered.
    ///
    /// # Errors
    ///
    /// Returns `DocumentError::InvalidConfig` if `config` fails validation.
    pub fn new(
        config: ChunkerConfig,
        counter: Arc<dyn TokenCounter>,
    ) -> Result<Self, DocumentError> {
        config.validate()?;
        Ok(Self {
            config,
            counter,
            loaders: vec![Box::new(TextLoader::default())],
        })
    }

    #[must_use]
    pub fn with_loader(mut self, loader: Box<dyn DocumentLoader>) -> Self {
        self.loaders.push(loader);
        self
    }

    #[must_use]
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    #[must_use]
    pub fn token_counter(&self) -> &Arc<dyn TokenCounter> {
        &self.counter
    }

    fn loader_for(&self, path: &Path) -> Option<&dyn DocumentLoader> {
        let ext = extension_of(path);
        self.loaders
            .iter()
            .rev()
            .find(|l| l.supported_extensions().contains(&ext.as_str()))
            .map(|l| &**l)
    }

    #[must_use]
    pub fn is_supported(&self, path: &Path) -> bool {
        self.loader_for(path).is_some()
    }

    /// Split one paragraph into `(text, token_count)` pieces.
    ///
    /// Paragraphs within `chunk_size` come back verbatim.
    #[must_use]
    pub fn split_paragraph(&self, text: &str) -> Vec<(String, usize)> {
        let tokens = self.counter.encode(text);
        if tokens.len() <= self.config.chunk_size {
            return vec![(text.to_owned(), tokens.len())];
        }
        token_windows(tokens.len(), self.config.chunk_size, self.config.chunk_overlap)
            .into_iter()
            .map(|w| {
                let window = &tokens[w];
                (self.counter.decode(window), window.len())
            })
            .collect()
    }

    /// Chunk an ordered list of paragraphs from `source`.
    ///
    /// `first_index` is the `chunk_index` given to the first emitted chunk, so
    /// indices keep increasing across the documents of one load.
    #[must_use]
    pub fn chunk_paragraphs(
        &self,
        source: &str,
        paragraphs: &[Paragraph],
        first_index: usize,
    ) -> Vec<Chunk> {
        let mut section = UNKNOWN.to_owned();
        let mut heading = UNKNOWN.to_owned();
        let mut next_index = first_index;
        let mut chunks = Vec::new();

        for para in paragraphs {
            let text = para.text.trim();
            if text.is_empty() {
                continue;
            }

            if is_heading(text) {
                heading = text.to_owned();
                section = extract_section_number(text);
            }

            let page_number = if self.config.include_page_numbers {
                para.page_number
            } else {
                None
            };

            for (piece, token_count) in self.split_paragraph(text) {
                chunks.push(Chunk {
                    text: piece,
                    metadata: ChunkMetadata {
                        source_file: source.to_owned(),
                        section: if self.config.preserve_metadata {
                            section.clone()
                        } else {
                            UNKNOWN.to_owned()
                        },
                        heading: if self.config.include_section_headers {
                            heading.clone()
                        } else {
                            UNKNOWN.to_owned()
                        },
                        chunk_index: next_index,
                        page_number,
                        token_count,
                        created_at: Utc::now(),
                        merged: false,
                        attribution: None,
                    },
                });
                next_index += 1;
            }
        }

        chunks
    }

    #[must_use]
    pub fn chunk_document(&self, document: &Document, first_index: usize) -> Vec<Chunk> {
        self.chunk_paragraphs(&document.source, &document.paragraphs, first_index)
    }

    /// Load and chunk a single file.
    ///
    /// # Errors
    ///
    /// Returns `DocumentError::UnsupportedFormat` for an extension no loader
    /// handles, or the loader's error. No chunks are returned on failure.
    pub async fn load_file(
        &self,
        path: &Path,
        first_index: usize,
    ) -> Result<Vec<Chunk>, DocumentError> {
        let loader = self.loader_for(path).ok_or_else(|| {
            DocumentError::UnsupportedFormat(format!(
                "{} (extension {:?})",
                path.display(),
                extension_of(path)
            ))
        })?;
        let document = loader.load(path).await?;
        let chunks = self.chunk_document(&document, first_index);
        tracing::debug!(
            source = %document.source,
            paragraphs = document.paragraphs.len(),
            chunks = chunks.len(),
            "document chunked"
        );
        Ok(chunks)
    }

    /// Chunk every supported file directly inside `dir`, in file-name order.
    ///
    /// A file that fails to load is recorded in `failures` and skipped; the
    /// remaining files are still processed.
    ///
    /// # Errors
    ///
    /// Returns an IO error if `dir` itself cannot be read.
    pub async fn chunk_directory(&self, dir: &Path) -> Result<DirectoryChunks, DocumentError> {
        self.chunk_directory_from(dir, 0).await
    }

    /// [`Chunker::chunk_directory`] with `chunk_index` numbering starting at
    /// `first_index`, for appending to an index that already holds chunks.
    ///
    /// # Errors
    ///
    /// Returns an IO error if `dir` itself cannot be read.
    pub async fn chunk_directory_from(
        &self,
        dir: &Path,
        first_index: usize,
    ) -> Result<DirectoryChunks, DocumentError> {
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && self.is_supported(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut out = DirectoryChunks::default();
        for path in paths {
            match self.load_file(&path, first_index + out.chunks.len()).await {
                Ok(chunks) => {
                    out.chunks.extend(chunks);
                    out.files_processed += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to load document");
                    out.failures.push(FileFailure {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            dir = %dir.display(),
            files = out.files_processed,
            failed = out.failures.len(),
            chunks = out.chunks.len(),
            "directory chunked"
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    /// One token per character, so windows are easy to reason about.
    struct CharCounter;

    impl TokenCounter for CharCounter {
        fn encode(&self, text: &str) -> Vec<u32> {
            text.chars().map(u32::from).collect()
        }

        fn decode(&self, tokens: &[u32]) -> String {
            tokens
                .iter()
                .map(|&t| char::from_u32(t).unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect()
        }
    }

    fn chunker(chunk_size: usize, chunk_overlap: usize) -> Chunker {
        Chunker::new(
            ChunkerConfig {
                chunk_size,
                chunk_overlap,
                ..ChunkerConfig::default()
            },
            Arc::new(CharCounter),
        )
        .unwrap()
    }

    fn paras(texts: &[&str]) -> Vec<Paragraph> {
        texts.iter().map(|t| Paragraph::new(*t)).collect()
    }

    #[test]
    fn default_config_values() {
        let c = ChunkerConfig::default();
        assert_eq!(c.chunk_size, 800);
        assert_eq!(c.chunk_overlap, 150);
        assert!(c.preserve_metadata && c.include_section_headers && c.include_page_numbers);
    }

    #[test]
    fn overlap_not_smaller_than_size_is_rejected() {
        let config = ChunkerConfig {
            chunk_size: 10,
            chunk_overlap: 10,
            ..ChunkerConfig::default()
        };
        assert!(matches!(
            Chunker::new(config, Arc::new(CharCounter)),
            Err(DocumentError::InvalidConfig(_))
        ));
    }

    #[test]
    fn windows_cover_and_overlap() {
        assert_eq!(token_windows(10, 4, 1), vec![0..4, 3..7, 6..10]);
        assert_eq!(token_windows(11, 4, 1), vec![0..4, 3..7, 6..10, 9..11]);
        assert_eq!(token_windows(3, 4, 1), vec![0..3]);
        assert!(token_windows(0, 4, 1).is_empty());
    }

    #[test]
    fn headings_set_section_and_heading() {
        let c = chunker(100, 10);
        let chunks = c.chunk_paragraphs(
            "plan.txt",
            &paras(&[
                "Opening remarks are here.",
                "2.1 Market Overview",
                "The market is large.",
                "RISKS",
                "Supply is constrained.",
            ]),
            0,
        );

        let meta: Vec<_> = chunks
            .iter()
            .map(|c| (c.metadata.section.as_str(), c.metadata.heading.as_str()))
            .collect();
        assert_eq!(
            meta,
            [
                (UNKNOWN, UNKNOWN),
                ("2.1", "2.1 Market Overview"),
                ("2.1", "2.1 Market Overview"),
                (UNKNOWN, "RISKS"),
                (UNKNOWN, "RISKS"),
            ]
        );
    }

    #[test]
    fn blank_paragraphs_are_skipped_and_indices_are_sequential() {
        let c = chunker(100, 10);
        let chunks = c.chunk_paragraphs("a.txt", &paras(&["One.", "   ", "", "Two."]), 7);
        let idx: Vec<_> = chunks.iter().map(|c| c.metadata.chunk_index).collect();
        assert_eq!(idx, [7, 8]);
    }

    #[test]
    fn long_paragraph_is_windowed() {
        let c = chunker(4, 1);
        let chunks = c.chunk_paragraphs("a.txt", &paras(&["abcdefghij."]), 0);
        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["abcd", "defg", "ghij", "j."]);
        assert!(chunks.iter().all(|c| c.metadata.token_count <= 4));
        assert_eq!(chunks[3].metadata.token_count, 2);
    }

    #[test]
    fn metadata_flags_are_honored() {
        let c = Chunker::new(
            ChunkerConfig {
                preserve_metadata: false,
                include_section_headers: false,
                include_page_numbers: false,
                ..ChunkerConfig::default()
            },
            Arc::new(CharCounter),
        )
        .unwrap();
        let chunks = c.chunk_paragraphs(
            "a.txt",
            &[Paragraph::new("3 Costs").on_page(2), Paragraph::new("Body.").on_page(2)],
            0,
        );
        assert_eq!(chunks.len(), 2);
        for chunk in &chunks {
            assert_eq!(chunk.metadata.section, UNKNOWN);
            assert_eq!(chunk.metadata.heading, UNKNOWN);
            assert_eq!(chunk.metadata.page_number, None);
        }
    }

    #[test]
    fn page_numbers_are_kept_by_default() {
        let c = chunker(100, 10);
        let chunks = c.chunk_paragraphs("a.txt", &[Paragraph::new("Body.").on_page(5)], 0);
        assert_eq!(chunks[0].metadata.page_number, Some(5));
    }

    #[test]
    fn statistics_summarize_chunks() {
        let c = chunker(100, 10);
        let mut chunks = c.chunk_paragraphs("b.txt", &paras(&["abcd.", "ef."]), 0);
        chunks.extend(c.chunk_paragraphs("a.txt", &paras(&["ghijkl."]), 2));
        let stats = ChunkStatistics::from_chunks(&chunks);
        assert_eq!(stats.total_chunks, 3);
        assert_eq!(stats.total_tokens, 5 + 3 + 7);
        assert_eq!(stats.avg_tokens_per_chunk, 5);
        assert_eq!(stats.files, ["a.txt", "b.txt"]);
    }

    #[test]
    fn statistics_of_nothing() {
        let stats = ChunkStatistics::from_chunks(&[]);
        assert_eq!(stats.total_chunks, 0);
        assert_eq!(stats.avg_tokens_per_chunk, 0);
        assert!(stats.files.is_empty());
    }

    #[tokio::test]
    async fn unsupported_extension_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("sheet.xlsx");
        std::fs::write(&file, "binary").unwrap();

        let result = chunker(100, 10).load_file(&file, 0).await;
        assert!(matches!(result, Err(DocumentError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn directory_load_continues_past_failures() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "Alpha one.\n\nAlpha two.").unwrap();
        std::fs::write(dir.path().join("b.md"), [0xff, 0xfe, 0x00]).unwrap();
        std::fs::write(dir.path().join("c.txt"), "Gamma.").unwrap();
        std::fs::write(dir.path().join("ignored.bin"), "x").unwrap();

        let out = chunker(100, 10).chunk_directory(dir.path()).await.unwrap();
        assert_eq!(out.files_processed, 2);
        assert_eq!(out.failures.len(), 1);
        assert!(out.failures[0].path.ends_with("b.md"));

        let idx: Vec<_> = out.chunks.iter().map(|c| c.metadata.chunk_index).collect();
        assert_eq!(idx, [0, 1, 2]);
        assert_eq!(out.chunks[2].metadata.source_file, "c.txt");
    }

    #[tokio::test]
    async fn directory_numbering_starts_at_offset() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "Alpha one.\n\nAlpha two.").unwrap();
        std::fs::write(dir.path().join("b.txt"), "Beta.").unwrap();

        let out = chunker(100, 10)
            .chunk_directory_from(dir.path(), 5)
            .await
            .unwrap();
        let idx: Vec<_> = out.chunks.iter().map(|c| c.metadata.chunk_index).collect();
        assert_eq!(idx, [5, 6, 7]);
    }

    proptest! {
        #[test]
        fn windows_reconstruct_tokens(len in 1usize..2_000, size in 2usize..300, overlap_frac in 0.0f64..0.95) {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
            let overlap = ((size as f64) * overlap_frac) as usize;
            let overlap = overlap.min(size - 1);
            let windows = token_windows(len, size, overlap);

            prop_assert_eq!(windows[0].start, 0);
            prop_assert_eq!(windows.last().unwrap().end, len);
            for w in &windows {
                prop_assert!(w.len() <= size);
                prop_assert!(!w.is_empty());
            }
            for pair in windows.windows(2) {
                // consecutive windows share exactly `overlap` tokens
                prop_assert_eq!(pair[0].end - pair[1].start, overlap);
            }
        }

        #[test]
        fn chunk_text_drops_overlap_to_rebuild_paragraph(text in "[a-z ]{1,400}", size in 2usize..50) {
            let overlap = size / 3;
            let c = chunker(size, overlap);
            let pieces = c.split_paragraph(&text);
            let mut rebuilt = pieces[0].0.clone();
            for (piece, _) in &pieces[1..] {
                rebuilt.extend(piece.chars().skip(overlap));
            }
            prop_assert_eq!(rebuilt, text);
        }
    }
}
