use quarry_memory::RetrievalResult;
use serde::{Deserialize, Serialize};

/// Final output of one query: prompt-ready text plus provenance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    pub context: String,
    pub chunks: Vec<RetrievalResult>,
    pub total_tokens: usize,
    pub sources: Vec<String>,
    pub retrieval_time_ms: f64,
}

impl AssembledContext {
    #[must_use]
    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
