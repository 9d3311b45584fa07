use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::http::{build_client, normalize_base_url};
use crate::provider::{EmbeddingProvider, check_dimensions};
use crate::retry::send_with_retry;

const PROVIDER: &str = "openai";
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbeddings {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    max_retries: u32,
}

impl fmt::Debug for OpenAiEmbeddings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiEmbeddings")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl OpenAiEmbeddings {
    /// # Errors
    ///
    /// Returns `LlmError::Http` if the HTTP client cannot be built.
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        dimensions: usize,
        request_timeout: Duration,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            client: build_client(request_timeout)?,
            api_key,
            base_url: normalize_base_url(base_url),
            model,
            dimensions,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn request(&self, input: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let body = EmbeddingRequest {
            input,
            model: &self.model,
            dimensions: self.dimensions,
        };
        let url = format!("{}/embeddings", self.base_url);

        let response = send_with_retry(PROVIDER, self.max_retries, || {
            self.client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
        })
        .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            tracing::error!(%status, body = %text, "embedding API error");
            return Err(LlmError::Status {
                provider: PROVIDER,
                status,
            });
        }

        let mut resp: EmbeddingResponse = serde_json::from_str(&text)?;
        if resp.data.len() != input.len() {
            return Err(LlmError::EmptyResponse { provider: PROVIDER });
        }
        resp.data.sort_by_key(|d| d.index);
        let vectors: Vec<Vec<f32>> = resp.data.into_iter().map(|d| d.embedding).collect();
        check_dimensions(&vectors, self.dimensions)?;
        Ok(vectors)
    }
}

impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.request(&[text.to_owned()])
            .await?
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse { provider: PROVIDER })
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        batch_size: usize,
    ) -> Result<Vec<Vec<f32>>, LlmError> {
        let batch_size = batch_size.max(1);
        let total_batches = texts.len().div_ceil(batch_size);
        let mut out = Vec::with_capacity(texts.len());
        for (i, batch) in texts.chunks(batch_size).enumerate() {
            tracing::debug!(batch = i + 1, total_batches, size = batch.len(), "embedding batch");
            out.extend(self.request(batch).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client(base_url: &str, dimensions: usize) -> OpenAiEmbeddings {
        OpenAiEmbeddings::new(
            "sk-test-key".into(),
            base_url.into(),
            "text-embedding-3-large".into(),
            dimensions,
            Duration::from_secs(5),
        )
        .unwrap()
        .with_max_retries(0)
    }

    #[test]
    fn new_trims_trailing_slash() {
        let p = client("https://api.openai.com/v1/", 3072);
        assert_eq!(p.base_url, "https://api.openai.com/v1");
        assert_eq!(p.dimension(), 3072);
        assert_eq!(p.model(), "text-embedding-3-large");
    }

    #[test]
    fn debug_redacts_api_key() {
        let dbg = format!("{:?}", client("http://localhost", 3));
        assert!(!dbg.contains("sk-test-key"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn request_serialization() {
        let input = vec!["hello world".to_owned()];
        let body = EmbeddingRequest {
            input: &input,
            model: "text-embedding-3-large",
            dimensions: 3072,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"input\":[\"hello world\"]"));
        assert!(json.contains("\"dimensions\":3072"));
    }

    #[tokio::test]
    async fn embed_posts_to_embeddings_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("authorization", "Bearer sk-test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "text-embedding-3-large",
                "dimensions": 3
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"index": 0, "embedding": [0.1, 0.2, 0.3]}]
            })))
            .mount(&server)
            .await;

        let v = client(&server.uri(), 3).embed("hello").await.unwrap();
        assert_eq!(v, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn embed_batch_splits_requests_and_restores_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(serde_json::json!({"input": ["a", "b"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"index": 1, "embedding": [2.0, 2.0]},
                    {"index": 0, "embedding": [1.0, 1.0]}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(serde_json::json!({"input": ["c"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"index": 0, "embedding": [3.0, 3.0]}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let texts = vec!["a".to_owned(), "b".to_owned(), "c".to_owned()];
        let out = client(&server.uri(), 2).embed_batch(&texts, 2).await.unwrap();
        assert_eq!(out, vec![vec![1.0, 1.0], vec![2.0, 2.0], vec![3.0, 3.0]]);
    }

    #[tokio::test]
    async fn wrong_dimension_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"index": 0, "embedding": [0.1, 0.2]}]
            })))
            .mount(&server)
            .await;

        let err = client(&server.uri(), 3).embed("x").await.unwrap_err();
        assert!(matches!(
            err,
            LlmError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn error_status_is_propagated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let err = client(&server.uri(), 3).embed("x").await.unwrap_err();
        assert!(matches!(err, LlmError::Status { status, .. } if status == 401));
    }

    #[tokio::test]
    async fn embed_unreachable_endpoint_errors() {
        let p = client("http://127.0.0.1:1", 3);
        assert!(p.embed("test").await.is_err());
    }
}
