//! Vector index double with canned results.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::document::Chunk;
use crate::vector_index::{BoxFuture, RetrievalResult, SearchFilter, VectorIndex, VectorIndexError};

/// Returns a fixed result list from every search, ignoring the query.
#[derive(Debug, Clone, Default)]
pub struct MockVectorIndex {
    pub results: Vec<RetrievalResult>,
    pub fail: bool,
    searches: Arc<AtomicUsize>,
}

impl MockVectorIndex {
    #[must_use]
    pub fn with_results(results: Vec<RetrievalResult>) -> Self {
        Self {
            results,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    fn respond(&self, k: usize) -> Result<Vec<RetrievalResult>, VectorIndexError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(VectorIndexError::MissingIndex("mock".into()));
        }
        Ok(self.results.iter().take(k).cloned().collect())
    }
}

impl VectorIndex for MockVectorIndex {
    fn name(&self) -> &str {
        "mock"
    }

    fn create_index(&self, _dimension: usize) -> BoxFuture<'_, Result<(), VectorIndexError>> {
        Box::pin(async { Ok(()) })
    }

    fn add<'a>(
        &'a self,
        chunks: &'a [Chunk],
        _vectors: &'a [Vec<f32>],
        _batch_size: usize,
    ) -> BoxFuture<'a, Result<usize, VectorIndexError>> {
        Box::pin(async move { Ok(chunks.len()) })
    }

    fn search(
        &self,
        _query_vector: Vec<f32>,
        k: usize,
        _filter: Option<SearchFilter>,
    ) -> BoxFuture<'_, Result<Vec<RetrievalResult>, VectorIndexError>> {
        Box::pin(async move { self.respond(k) })
    }

    fn keyword_search<'a>(
        &'a self,
        _query_vector: &'a [f32],
        _query_text: &'a str,
        _k: usize,
    ) -> BoxFuture<'a, Result<Vec<RetrievalResult>, VectorIndexError>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn count(&self) -> BoxFuture<'_, Result<usize, VectorIndexError>> {
        Box::pin(async move { Ok(self.results.len()) })
    }

    fn delete_index(&self) -> BoxFuture<'_, Result<(), VectorIndexError>> {
        Box::pin(async { Ok(()) })
    }
}
