use crate::error::LlmError;
#[cfg(feature = "mock")]
use crate::mock::MockReranker;
use crate::provider::Reranker;
use crate::rerank::{HttpReranker, TermOverlapReranker};

/// Reranker chosen at runtime from configuration.
#[derive(Debug)]
pub enum AnyReranker {
    Http(HttpReranker),
    TermOverlap(TermOverlapReranker),
    #[cfg(feature = "mock")]
    Mock(MockReranker),
}

impl Reranker for AnyReranker {
    async fn score(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>, LlmError> {
        match self {
            Self::Http(r) => r.score(query, candidates).await,
            Self::TermOverlap(r) => r.score(query, candidates).await,
            #[cfg(feature = "mock")]
            Self::Mock(r) => r.score(query, candidates).await,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Http(r) => r.name(),
            Self::TermOverlap(r) => r.name(),
            #[cfg(feature = "mock")]
            Self::Mock(r) => r.name(),
        }
    }
}
