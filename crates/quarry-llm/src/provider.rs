use std::future::Future;

use crate::error::LlmError;

/// Text-to-vector service.
///
/// Implementations are injected into the indexer and the retrieval funnel;
/// nothing in the workspace holds a process-wide client.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// Returns an error if the service call fails or returns a vector of the wrong size.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send;

    /// Embed many texts, issuing at most `batch_size` texts per request.
    ///
    /// The output has one vector per input, in input order. The default
    /// implementation embeds texts one at a time.
    ///
    /// # Errors
    ///
    /// Returns the first service error encountered; no partial output is returned.
    fn embed_batch(
        &self,
        texts: &[String],
        batch_size: usize,
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, LlmError>> + Send {
        let _ = batch_size;
        async move {
            let mut out = Vec::with_capacity(texts.len());
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }
    }

    /// Fixed output dimension for this deployment.
    fn dimension(&self) -> usize;

    fn name(&self) -> &'static str;
}

/// Cross-encoder relevance scorer. Stateless per call.
pub trait Reranker: Send + Sync {
    /// Score each candidate text against `query`.
    ///
    /// The returned vector has exactly one score per candidate, in candidate order.
    ///
    /// # Errors
    ///
    /// Returns an error if the service call fails or the score count does not match.
    fn score(
        &self,
        query: &str,
        candidates: &[String],
    ) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send;

    fn name(&self) -> &'static str;
}

/// Reject vectors that do not match the configured dimension.
///
/// # Errors
///
/// Returns `LlmError::DimensionMismatch` on the first vector of the wrong size.
pub fn check_dimensions(vectors: &[Vec<f32>], expected: usize) -> Result<(), LlmError> {
    match vectors.iter().find(|v| v.len() != expected) {
        Some(v) => Err(LlmError::DimensionMismatch {
            expected,
            actual: v.len(),
        }),
        None => Ok(()),
    }
}
