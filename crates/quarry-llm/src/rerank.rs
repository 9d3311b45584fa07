//! Cross-encoder reranker clients.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::http::{build_client, normalize_base_url};
use crate::provider::Reranker;
use crate::retry::send_with_retry;

const PROVIDER: &str = "rerank";
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Client for a Cohere/Jina-compatible `POST {base}/rerank` endpoint.
///
/// Responses may be `{"results": [...]}` or a bare `[{"index", "score"}]` array.
pub struct HttpReranker {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    max_retries: u32,
}

impl fmt::Debug for HttpReranker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpReranker")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl HttpReranker {
    /// # Errors
    ///
    /// Returns `LlmError::Http` if the HTTP client cannot be built.
    pub fn new(
        base_url: String,
        model: String,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            client: build_client(request_timeout)?,
            base_url: normalize_base_url(base_url),
            model,
            api_key,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

impl Reranker for HttpReranker {
    async fn score(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>, LlmError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let body = RerankRequest {
            model: &self.model,
            query,
            documents: candidates,
            top_n: candidates.len(),
        };
        let url = format!("{}/rerank", self.base_url);

        let response = send_with_retry(PROVIDER, self.max_retries, || {
            let mut req = self.client.post(&url).json(&body);
            if let Some(key) = &self.api_key {
                req = req.header("Authorization", format!("Bearer {key}"));
            }
            req.send()
        })
        .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            tracing::error!(%status, body = %text, "rerank API error");
            return Err(LlmError::Status {
                provider: PROVIDER,
                status,
            });
        }

        let resp: RerankResponse = serde_json::from_str(&text)?;
        scatter_scores(resp.results(), candidates.len())
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }
}

/// Place `(index, score)` pairs back into candidate order.
fn scatter_scores(results: &[RerankResult], expected: usize) -> Result<Vec<f32>, LlmError> {
    let mismatch = || LlmError::ScoreCountMismatch {
        expected,
        actual: results.len(),
    };
    if results.len() != expected {
        return Err(mismatch());
    }
    let mut scores = vec![0.0_f32; expected];
    let mut seen = HashSet::with_capacity(expected);
    for r in results {
        if r.index >= expected || !seen.insert(r.index) {
            return Err(mismatch());
        }
        scores[r.index] = r.relevance_score;
    }
    Ok(scores)
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RerankResponse {
    Wrapped { results: Vec<RerankResult> },
    Bare(Vec<RerankResult>),
}

impl RerankResponse {
    fn results(&self) -> &[RerankResult] {
        match self {
            Self::Wrapped { results } | Self::Bare(results) => results,
        }
    }
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    #[serde(alias = "score")]
    relevance_score: f32,
}

/// Lexical reranker: fraction of distinct query terms present in the candidate.
///
/// Needs no network access. Scores lie in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TermOverlapReranker;

impl TermOverlapReranker {
    #[must_use]
    pub fn score_one(query_terms: &HashSet<String>, candidate: &str) -> f32 {
        if query_terms.is_empty() {
            return 0.0;
        }
        let doc_terms = terms(candidate);
        let hits = query_terms.iter().filter(|t| doc_terms.contains(*t)).count();
        #[allow(clippy::cast_precision_loss)]
        let score = hits as f32 / query_terms.len() as f32;
        score
    }
}

impl Reranker for TermOverlapReranker {
    async fn score(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>, LlmError> {
        let query_terms = terms(query);
        Ok(candidates
            .iter()
            .map(|c| Self::score_one(&query_terms, c))
            .collect())
    }

    fn name(&self) -> &'static str {
        "term-overlap"
    }
}

/// Lower-cased alphanumeric terms of `text`.
#[must_use]
pub fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}
