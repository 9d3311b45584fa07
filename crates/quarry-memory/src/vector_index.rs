use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::document::{Chunk, ChunkMetadata};
use crate::fusion::reciprocal_rank_fusion;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, thiserror::Error)]
pub enum VectorIndexError {
    #[error("Qdrant error: {0}")]
    Qdrant(#[from] Box<qdrant_client::QdrantError>),

    #[error("index {0} does not exist")]
    MissingIndex(String),

    #[error("vector dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("length mismatch: {chunks} chunks but {vectors} vectors")]
    LengthMismatch { chunks: usize, vectors: usize },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("malformed point {id}: {reason}")]
    MalformedPoint { id: String, reason: String },
}

/// One candidate flowing through the retrieval funnel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Cosine-compatible similarity in `[0, 1]`.
    pub similarity: f32,
    pub rank: Option<usize>,
    pub rerank_score: Option<f32>,
    /// Reciprocal-rank-fusion score, set by hybrid search only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fusion_score: Option<f32>,
}

impl RetrievalResult {
    #[must_use]
    pub fn from_chunk(chunk: Chunk, similarity: f32) -> Self {
        Self {
            id: chunk.id(),
            text: chunk.text,
            metadata: chunk.metadata,
            similarity: clamp_similarity(similarity),
            rank: None,
            rerank_score: None,
            fusion_score: None,
        }
    }

    /// Recorded token count, or `len / 4` when none was recorded.
    #[must_use]
    pub fn token_count(&self) -> usize {
        if self.metadata.token_count == 0 && !self.text.is_empty() {
            self.text.len() / 4
        } else {
            self.metadata.token_count
        }
    }
}

/// Map a raw cosine score into `[0, 1]`; anti-correlated vectors score zero.
#[must_use]
pub fn clamp_similarity(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Exact-match metadata filter. Unset fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    pub source_file: Option<String>,
    pub section: Option<String>,
    pub heading: Option<String>,
}

impl SearchFilter {
    #[must_use]
    pub fn source(source_file: impl Into<String>) -> Self {
        Self {
            source_file: Some(source_file.into()),
            ..Self::default()
        }
    }

    /// `(payload field, expected value)` pairs for every set field.
    #[must_use]
    pub fn conditions(&self) -> Vec<(&'static str, &str)> {
        [
            ("source_file", self.source_file.as_deref()),
            ("section", self.section.as_deref()),
            ("heading", self.heading.as_deref()),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.map(|v| (field, v)))
        .collect()
    }

    #[must_use]
    pub fn matches(&self, meta: &ChunkMetadata) -> bool {
        self.source_file
            .as_deref()
            .is_none_or(|v| v == meta.source_file)
            && self.section.as_deref().is_none_or(|v| v == meta.section)
            && self.heading.as_deref().is_none_or(|v| v == meta.heading)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub index_name: String,
    pub document_count: usize,
}

/// Index name for a job: `{prefix}_{job_id}`, lower-cased.
#[must_use]
pub fn index_name(prefix: &str, job_id: &str) -> String {
    format!("{prefix}_{job_id}").to_lowercase()
}

/// k-NN search service holding chunk vectors and metadata for one job.
pub trait VectorIndex: Send + Sync {
    fn name(&self) -> &str;

    /// Create the index for vectors of `dimension`. A no-op when it already exists.
    fn create_index(&self, dimension: usize) -> BoxFuture<'_, Result<(), VectorIndexError>>;

    /// Store `chunks[i]` with `vectors[i]`, writing at most `batch_size` points per call.
    ///
    /// Returns the number of points written.
    fn add<'a>(
        &'a self,
        chunks: &'a [Chunk],
        vectors: &'a [Vec<f32>],
        batch_size: usize,
    ) -> BoxFuture<'a, Result<usize, VectorIndexError>>;

    /// Nearest neighbours of `query_vector`, best first.
    fn search(
        &self,
        query_vector: Vec<f32>,
        k: usize,
        filter: Option<SearchFilter>,
    ) -> BoxFuture<'_, Result<Vec<RetrievalResult>, VectorIndexError>>;

    /// Chunks containing any term of `query_text`, best match first.
    ///
    /// `similarity` is still the cosine score against `query_vector`, so hits
    /// remain comparable with vector results.
    fn keyword_search<'a>(
        &'a self,
        query_vector: &'a [f32],
        query_text: &'a str,
        k: usize,
    ) -> BoxFuture<'a, Result<Vec<RetrievalResult>, VectorIndexError>>;

    /// Vector and keyword results merged by reciprocal rank fusion.
    fn hybrid_search<'a>(
        &'a self,
        query_vector: Vec<f32>,
        query_text: &'a str,
        k: usize,
    ) -> BoxFuture<'a, Result<Vec<RetrievalResult>, VectorIndexError>> {
        Box::pin(async move {
            let keyword = self.keyword_search(&query_vector, query_text, k).await?;
            let vector = self.search(query_vector, k, None).await?;
            Ok(reciprocal_rank_fusion(&[vector, keyword], k))
        })
    }

    fn count(&self) -> BoxFuture<'_, Result<usize, VectorIndexError>>;

    fn delete_index(&self) -> BoxFuture<'_, Result<(), VectorIndexError>>;

    fn stats(&self) -> BoxFuture<'_, Result<IndexStats, VectorIndexError>> {
        Box::pin(async move {
            Ok(IndexStats {
                index_name: self.name().to_owned(),
                document_count: self.count().await?,
            })
        })
    }
}
