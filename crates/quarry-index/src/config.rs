use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

/// Knobs for the four funnel stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Candidates fetched by broad recall.
    pub stage1_top_k: usize,
    /// Minimum similarity kept by relevance filtering, inclusive.
    pub similarity_threshold: f32,
    /// Candidates kept after reranking.
    pub stage3_top_k: usize,
    pub reranker_model: String,
    pub max_context_tokens: usize,
    pub enable_deduplication: bool,
    pub enable_chunk_merging: bool,
    pub enable_source_attribution: bool,
    /// Fuse vector and keyword search in broad recall.
    pub hybrid_search: bool,
    /// Upper bound on refinement rounds per query.
    pub max_rounds: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            stage1_top_k: 50,
            similarity_threshold: 0.75,
            stage3_top_k: 15,
            reranker_model: "cross-encoder/ms-marco-MiniLM-L-12-v2".into(),
            max_context_tokens: 15_000,
            enable_deduplication: true,
            enable_chunk_merging: true,
            enable_source_attribution: true,
            hybrid_search: false,
            max_rounds: 1,
        }
    }
}

impl RetrievalConfig {
    /// # Errors
    ///
    /// Returns `IndexError::InvalidConfig` for a zero `k`, a threshold outside
    /// `[0, 1]`, or zero rounds.
    pub fn validate(&self) -> Result<()> {
        if self.stage1_top_k == 0 || self.stage3_top_k == 0 {
            return Err(IndexError::InvalidConfig(
                "stage1_top_k and stage3_top_k must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(IndexError::InvalidConfig(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.max_rounds == 0 {
            return Err(IndexError::InvalidConfig("max_rounds must be at least 1".into()));
        }
        Ok(())
    }
}
