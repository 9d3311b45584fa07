//! Test-only embedding and reranker doubles.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::LlmError;
use crate::provider::{EmbeddingProvider, Reranker};
use crate::rerank::{TermOverlapReranker, terms};

/// Deterministic embedder.
///
/// Texts registered with [`MockEmbedder::with_vector`] return that vector.
/// Anything else is embedded as a normalized bag of hashed terms, so texts
/// sharing words have positive cosine similarity.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    pub dimension: usize,
    pub fail: bool,
    vectors: HashMap<String, Vec<f32>>,
    calls: Arc<AtomicUsize>,
}

impl MockEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fail: false,
            vectors: HashMap::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn failing(dimension: usize) -> Self {
        Self {
            fail: true,
            ..Self::new(dimension)
        }
    }

    #[must_use]
    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.into(), vector);
        self
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hashed(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0_f32; self.dimension];
        if self.dimension == 0 {
            return v;
        }
        for term in terms(text) {
            let h = blake3::hash(term.as_bytes());
            let bytes = h.as_bytes();
            let bucket = usize::from(u16::from_le_bytes([bytes[0], bytes[1]])) % self.dimension;
            v[bucket] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(LlmError::Other("mock embedding error".into()));
        }
        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.hashed(text)))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Reranker double that records invocations.
///
/// Returns `scores` verbatim when set, otherwise falls back to term overlap.
#[derive(Debug, Clone, Default)]
pub struct MockReranker {
    pub scores: Option<Vec<f32>>,
    pub fail: bool,
    calls: Arc<AtomicUsize>,
}

impl MockReranker {
    #[must_use]
    pub fn with_scores(scores: Vec<f32>) -> Self {
        Self {
            scores: Some(scores),
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
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Reranker for MockReranker {
    async fn score(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(LlmError::Other("mock rerank error".into()));
        }
        match &self.scores {
            Some(scores) => Ok(scores.clone()),
            None => TermOverlapReranker.score(query, candidates).await,
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
