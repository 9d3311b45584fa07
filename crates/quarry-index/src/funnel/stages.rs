//! The four funnel stages as [`Step`]s.

use std::sync::Arc;

use quarry_llm::{EmbeddingProvider, Reranker};
use quarry_memory::{RetrievalResult, VectorIndex};

use super::assembly::{apply_rerank_scores, assemble, filter_by_threshold};
use super::step::Step;
use crate::config::RetrievalConfig;
use crate::context::AssembledContext;
use crate::error::IndexError;

/// Working list handed between stages, together with the query that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidates {
    pub query: String,
    pub results: Vec<RetrievalResult>,
}

fn similarity_range(results: &[RetrievalResult]) -> Option<(f32, f32)> {
    results.iter().map(|r| r.similarity).fold(None, |acc, s| {
        Some(acc.map_or((s, s), |(lo, hi): (f32, f32)| (lo.min(s), hi.max(s))))
    })
}

/// Stage 1: embed the query and pull the `k` nearest chunks.
pub struct BroadRecall<E> {
    embedder: Arc<E>,
    index: Arc<dyn VectorIndex>,
    k: usize,
    hybrid: bool,
}

impl<E> BroadRecall<E> {
    #[must_use]
    pub fn new(embedder: Arc<E>, index: Arc<dyn VectorIndex>, k: usize, hybrid: bool) -> Self {
        Self {
            embedder,
            index,
            k,
            hybrid,
        }
    }
}

impl<E: EmbeddingProvider> Step for BroadRecall<E> {
    type Input = String;
    type Output = Candidates;

    async fn run(&self, query: String) -> Result<Candidates, IndexError> {
        let vector = self.embedder.embed(&query).await?;
        let results = if self.hybrid {
            self.index.hybrid_search(vector, &query, self.k).await?
        } else {
            self.index.search(vector, self.k, None).await?
        };
        tracing::info!(
            index = self.index.name(),
            k = self.k,
            hybrid = self.hybrid,
            candidates = results.len(),
            "broad recall"
        );
        Ok(Candidates { query, results })
    }
}

/// Stage 2: drop candidates below the similarity threshold.
pub struct RelevanceFilter {
    threshold: f32,
}

impl RelevanceFilter {
    #[must_use]
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Step for RelevanceFilter {
    type Input = Candidates;
    type Output = Candidates;

    async fn run(&self, input: Candidates) -> Result<Candidates, IndexError> {
        let before = input.results.len();
        let results = filter_by_threshold(input.results, self.threshold);
        let range = similarity_range(&results);
        tracing::info!(
            threshold = self.threshold,
            input = before,
            output = results.len(),
            removed = before - results.len(),
            min_similarity = range.map(|r| r.0),
            max_similarity = range.map(|r| r.1),
            "relevance filter"
        );
        Ok(Candidates {
            query: input.query,
            results,
        })
    }
}

/// Stage 3: cross-encoder rerank and cut to `top_k`.
pub struct Rerank<R> {
    reranker: Arc<R>,
    top_k: usize,
}

impl<R> Rerank<R> {
    #[must_use]
    pub fn new(reranker: Arc<R>, top_k: usize) -> Self {
        Self { reranker, top_k }
    }
}

impl<R: Reranker> Step for Rerank<R> {
    type Input = Candidates;
    type Output = Candidates;

    async fn run(&self, input: Candidates) -> Result<Candidates, IndexError> {
        if input.results.is_empty() {
            tracing::debug!("nothing to rerank");
            return Ok(input);
        }
        let before = input.results.len();
        let texts: Vec<String> = input.results.iter().map(|r| r.text.clone()).collect();
        let scores = self.reranker.score(&input.query, &texts).await?;
        let results = apply_rerank_scores(input.results, &scores, self.top_k)?;
        tracing::info!(
            reranker = self.reranker.name(),
            input = before,
            output = results.len(),
            top_score = results.first().and_then(|r| r.rerank_score),
            "rerank"
        );
        Ok(Candidates {
            query: input.query,
            results,
        })
    }
}

/// Stage 4: build the final context string.
pub struct ContextAssembly {
    config: RetrievalConfig,
}

impl ContextAssembly {
    #[must_use]
    pub fn new(config: RetrievalConfig) -> Self {
        Self { config }
    }
}

impl Step for ContextAssembly {
    type Input = Candidates;
    type Output = AssembledContext;

    async fn run(&self, input: Candidates) -> Result<AssembledContext, IndexError> {
        Ok(assemble(input.results, &self.config))
    }
}
