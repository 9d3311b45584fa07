use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Embedding price in USD per one million input tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmbeddingPricing {
    pub usd_per_million_tokens: f64,
}

#[derive(Debug, Default)]
struct CostState {
    embedding_usd: f64,
    embedding_tokens: u64,
    rerank_calls: u64,
    reranked_candidates: u64,
}

/// Snapshot of everything recorded so far.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CostSummary {
    pub embedding_usd: f64,
    pub embedding_tokens: u64,
    pub rerank_calls: u64,
    pub reranked_candidates: u64,
}

/// Running spend for one process. Clones share the same totals.
#[derive(Debug, Clone)]
pub struct CostTracker {
    pricing: HashMap<String, EmbeddingPricing>,
    state: Arc<Mutex<CostState>>,
}

fn default_pricing() -> HashMap<String, EmbeddingPricing> {
    let mut m = HashMap::new();
    m.insert(
        "text-embedding-3-large".into(),
        EmbeddingPricing {
            usd_per_million_tokens: 0.13,
        },
    );
    m.insert(
        "text-embedding-3-small".into(),
        EmbeddingPricing {
            usd_per_million_tokens: 0.02,
        },
    );
    m.insert(
        "text-embedding-ada-002".into(),
        EmbeddingPricing {
            usd_per_million_tokens: 0.10,
        },
    );
    m
}

impl Default for CostTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CostTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pricing: default_pricing(),
            state: Arc::new(Mutex::new(CostState::default())),
        }
    }

    #[must_use]
    pub fn with_pricing(mut self, model: &str, pricing: EmbeddingPricing) -> Self {
        self.pricing.insert(model.to_owned(), pricing);
        self
    }

    /// Price of `tokens` embedding tokens for `model`. Unknown models are free.
    #[must_use]
    pub fn embedding_cost(&self, model: &str, tokens: usize) -> f64 {
        let rate = self
            .pricing
            .get(model)
            .map_or(0.0, |p| p.usd_per_million_tokens);
        #[allow(clippy::cast_precision_loss)]
        let cost = tokens as f64 / 1_000_000.0 * rate;
        cost
    }

    /// Record embedding usage and return the cost of this call in USD.
    pub fn record_embedding(&self, model: &str, tokens: usize) -> f64 {
        let cost = self.embedding_cost(model, tokens);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.embedding_usd += cost;
        state.embedding_tokens += u64::try_from(tokens).unwrap_or(u64::MAX);
        cost
    }

    pub fn record_rerank(&self, candidates: usize) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.rerank_calls += 1;
        state.reranked_candidates += u64::try_from(candidates).unwrap_or(u64::MAX);
    }

    #[must_use]
    pub fn current_spend(&self) -> f64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .embedding_usd
    }

    #[must_use]
    pub fn summary(&self) -> CostSummary {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        CostSummary {
            embedding_usd: state.embedding_usd,
            embedding_tokens: state.embedding_tokens,
            rerank_calls: state.rerank_calls,
            reranked_candidates: state.reranked_candidates,
        }
    }
}
