//! Four-stage retrieval: broad recall, relevance filtering, reranking, and
//! context assembly, composed as a typed [`Pipeline`].

pub mod assembly;
pub mod builder;
pub mod refine;
pub mod stages;
pub mod step;

use std::sync::Arc;
use std::time::Instant;

use quarry_llm::{EmbeddingProvider, Reranker};
use quarry_memory::VectorIndex;

pub use assembly::{
    apply_rerank_scores, assemble, attribution, deduplicate, filter_by_threshold, merge_adjacent,
};
pub use builder::Pipeline;
pub use refine::{Refinement, RefinementStrategy, SinglePass};
pub use stages::{BroadRecall, Candidates, ContextAssembly, RelevanceFilter, Rerank};
pub use step::Step;

use self::builder::{Chain, Start};
use crate::config::RetrievalConfig;
use crate::context::AssembledContext;
use crate::error::Result;

/// Token count of the full-document context the funnel replaces.
pub const FULL_CONTEXT_TOKENS: usize = 150_000;

type FunnelPipeline<E, R> = Pipeline<
    Chain<Chain<Chain<Start<BroadRecall<E>>, RelevanceFilter>, Rerank<R>>, ContextAssembly>,
>;

/// Percentage of [`FULL_CONTEXT_TOKENS`] not sent to the model.
#[must_use]
pub fn token_savings_percent(total_tokens: usize) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let ratio = total_tokens as f64 / FULL_CONTEXT_TOKENS as f64;
    (1.0 - ratio) * 100.0
}

pub struct RetrievalFunnel<E, R> {
    pipeline: FunnelPipeline<E, R>,
    config: RetrievalConfig,
    strategy: Box<dyn RefinementStrategy>,
}

impl<E, R> std::fmt::Debug for RetrievalFunnel<E, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalFunnel")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<E: EmbeddingProvider, R: Reranker> RetrievalFunnel<E, R> {
    /// # Errors
    ///
    /// Returns `IndexError::InvalidConfig` if `config` fails validation.
    pub fn new(
        embedder: Arc<E>,
        reranker: Arc<R>,
        index: Arc<dyn VectorIndex>,
        config: RetrievalConfig,
    ) -> Result<Self> {
        config.validate()?;
        let pipeline = Pipeline::start(BroadRecall::new(
            embedder,
            index,
            config.stage1_top_k,
            config.hybrid_search,
        ))
        .step(RelevanceFilter::new(config.similarity_threshold))
        .step(Rerank::new(reranker, config.stage3_top_k))
        .step(ContextAssembly::new(config.clone()));

        Ok(Self {
            pipeline,
            config,
            strategy: Box::new(SinglePass),
        })
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: impl RefinementStrategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    #[must_use]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Run the four stages once for `query`, without timing.
    ///
    /// # Errors
    ///
    /// Returns the first service error; no partial context is produced.
    pub async fn run_once(&self, query: &str) -> Result<AssembledContext> {
        self.pipeline.run(query.to_owned()).await
    }

    /// Retrieve context for `query`, refining while the strategy asks to and
    /// `max_rounds` allows. The last round's context is returned.
    ///
    /// # Errors
    ///
    /// Returns the first service error; no partial context is produced.
    pub async fn retrieve(&self, query: &str) -> Result<AssembledContext> {
        let start = Instant::now();
        let mut query = query.to_owned();
        let mut round = 1;

        let mut context = loop {
            let context = self.run_once(&query).await?;
            match self.strategy.next(round, &query, &context) {
                Refinement::Continue { query: next } if round < self.config.max_rounds => {
                    tracing::info!(round, next_query = %next, "refining query");
                    query = next;
                    round += 1;
                }
                _ => break context,
            }
        };

        context.retrieval_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        tracing::info!(
            rounds = round,
            chunks = context.num_chunks(),
            total_tokens = context.total_tokens,
            elapsed_ms = context.retrieval_time_ms,
            token_savings_pct = token_savings_percent(context.total_tokens),
            "retrieval complete"
        );
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn savings_against_full_context() {
        assert!((token_savings_percent(15_000) - 90.0).abs() < 1e-9);
        assert!((token_savings_percent(0) - 100.0).abs() < 1e-9);
    }
}
