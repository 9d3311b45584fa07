//! Qdrant-backed [`VectorIndex`], one collection per job.

use std::collections::HashMap;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    Distance, FieldType, Filter, PointStruct, ScoredPoint, SearchPointsBuilder,
    UpsertPointsBuilder, VectorParamsBuilder, value::Kind,
};
use serde::{Deserialize, Serialize};

use crate::document::{Chunk, ChunkMetadata};
use crate::in_memory_index::{rank_keyword_hits, term_hits};
use crate::vector_index::{BoxFuture, RetrievalResult, SearchFilter, VectorIndex, VectorIndexError};

/// Keyword candidates fetched per requested result before term ranking.
const KEYWORD_OVERSAMPLE: usize = 4;

/// Flat point payload: chunk text beside its metadata.
#[derive(Serialize, Deserialize)]
struct StoredChunk {
    text: String,
    #[serde(flatten)]
    metadata: ChunkMetadata,
}

#[derive(Clone)]
pub struct QdrantVectorIndex {
    client: Qdrant,
    collection: String,
}

impl std::fmt::Debug for QdrantVectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantVectorIndex")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl QdrantVectorIndex {
    /// Connect to Qdrant at `url` for the collection `collection`.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built from the URL.
    pub fn new(url: &str, collection: impl Into<String>) -> Result<Self, VectorIndexError> {
        let client = Qdrant::from_url(url).build().map_err(Box::new)?;
        Ok(Self::with_client(client, collection))
    }

    #[must_use]
    pub fn with_client(client: Qdrant, collection: impl Into<String>) -> Self {
        Self {
            client,
            collection: collection.into(),
        }
    }

    async fn exists(&self) -> Result<bool, VectorIndexError> {
        Ok(self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(Box::new)?)
    }

    async fn search_points(
        &self,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<Filter>,
    ) -> Result<Vec<ScoredPoint>, VectorIndexError> {
        let mut builder =
            SearchPointsBuilder::new(&self.collection, vector, limit as u64).with_payload(true);
        if let Some(f) = filter {
            builder = builder.filter(f);
        }
        let response = self.client.search_points(builder).await.map_err(Box::new)?;
        Ok(response.result)
    }
}

fn chunk_to_point(chunk: &Chunk, vector: &[f32]) -> Result<PointStruct, VectorIndexError> {
    let stored = StoredChunk {
        text: chunk.text.clone(),
        metadata: chunk.metadata.clone(),
    };
    let payload: HashMap<String, qdrant_client::qdrant::Value> =
        serde_json::from_value(serde_json::to_value(stored)?)?;
    Ok(PointStruct::new(chunk.id(), vector.to_vec(), payload))
}

fn filter_to_qdrant(filter: &SearchFilter) -> Option<Filter> {
    let conditions: Vec<Condition> = filter
        .conditions()
        .into_iter()
        .map(|(field, value)| Condition::matches(field, value.to_owned()))
        .collect();
    (!conditions.is_empty()).then(|| Filter::must(conditions))
}

fn scored_point_to_result(point: ScoredPoint) -> Result<RetrievalResult, VectorIndexError> {
    let payload: serde_json::Map<String, serde_json::Value> = point
        .payload
        .into_iter()
        .filter_map(|(k, v)| {
            let json_val = match v.kind? {
                Kind::StringValue(s) => serde_json::Value::String(s),
                Kind::IntegerValue(i) => serde_json::Value::Number(i.into()),
                Kind::DoubleValue(d) => {
                    serde_json::Number::from_f64(d).map(serde_json::Value::Number)?
                }
                Kind::BoolValue(b) => serde_json::Value::Bool(b),
                _ => return None,
            };
            Some((k, json_val))
        })
        .collect();

    let id = match point.id.and_then(|pid| pid.point_id_options) {
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u)) => u,
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    };

    let stored: StoredChunk = serde_json::from_value(serde_json::Value::Object(payload))
        .map_err(|e| VectorIndexError::MalformedPoint {
            id: id.clone(),
            reason: e.to_string(),
        })?;
    let chunk = Chunk {
        text: stored.text,
        metadata: stored.metadata,
    };
    let mut result = RetrievalResult::from_chunk(chunk, point.score);
    if !id.is_empty() {
        result.id = id;
    }
    Ok(result)
}

impl VectorIndex for QdrantVectorIndex {
    fn name(&self) -> &str {
        &self.collection
    }

    fn create_index(&self, dimension: usize) -> BoxFuture<'_, Result<(), VectorIndexError>> {
        Box::pin(async move {
            if self.exists().await? {
                tracing::debug!(collection = %self.collection, "collection already exists");
                return Ok(());
            }
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection).vectors_config(
                        VectorParamsBuilder::new(dimension as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(Box::new)?;
            self.client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    &self.collection,
                    "text",
                    FieldType::Text,
                ))
                .await
                .map_err(Box::new)?;
            for field in ["source_file", "section", "heading"] {
                self.client
                    .create_field_index(CreateFieldIndexCollectionBuilder::new(
                        &self.collection,
                        field,
                        FieldType::Keyword,
                    ))
                    .await
                    .map_err(Box::new)?;
            }
            tracing::info!(collection = %self.collection, dimension, "created collection");
            Ok(())
        })
    }

    fn add<'a>(
        &'a self,
        chunks: &'a [Chunk],
        vectors: &'a [Vec<f32>],
        batch_size: usize,
    ) -> BoxFuture<'a, Result<usize, VectorIndexError>> {
        Box::pin(async move {
            if chunks.len() != vectors.len() {
                return Err(VectorIndexError::LengthMismatch {
                    chunks: chunks.len(),
                    vectors: vectors.len(),
                });
            }
            if !self.exists().await? {
                return Err(VectorIndexError::MissingIndex(self.collection.clone()));
            }

            let mut written = 0;
            let size = batch_size.max(1);
            for (batch_chunks, batch_vectors) in chunks.chunks(size).zip(vectors.chunks(size)) {
                let points = batch_chunks
                    .iter()
                    .zip(batch_vectors)
                    .map(|(c, v)| chunk_to_point(c, v))
                    .collect::<Result<Vec<_>, _>>()?;
                self.client
                    .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
                    .await
                    .map_err(Box::new)?;
                written += batch_chunks.len();
                tracing::debug!(collection = %self.collection, written, "indexed batch");
            }
            Ok(written)
        })
    }

    fn search(
        &self,
        query_vector: Vec<f32>,
        k: usize,
        filter: Option<SearchFilter>,
    ) -> BoxFuture<'_, Result<Vec<RetrievalResult>, VectorIndexError>> {
        Box::pin(async move {
            let qdrant_filter = filter.as_ref().and_then(filter_to_qdrant);
            self.search_points(query_vector, k, qdrant_filter)
                .await?
                .into_iter()
                .map(scored_point_to_result)
                .collect()
        })
    }

    fn keyword_search<'a>(
        &'a self,
        query_vector: &'a [f32],
        query_text: &'a str,
        k: usize,
    ) -> BoxFuture<'a, Result<Vec<RetrievalResult>, VectorIndexError>> {
        Box::pin(async move {
            let query_terms = quarry_llm::rerank::terms(query_text);
            if query_terms.is_empty() {
                return Ok(Vec::new());
            }
            let conditions: Vec<Condition> = query_terms
                .iter()
                .map(|t| Condition::matches_text("text", t.clone()))
                .collect();
            let points = self
                .search_points(
                    query_vector.to_vec(),
                    k.saturating_mul(KEYWORD_OVERSAMPLE),
                    Some(Filter::should(conditions)),
                )
                .await?;

            let hits = points
                .into_iter()
                .map(|p| {
                    let result = scored_point_to_result(p)?;
                    Ok((term_hits(&query_terms, &result.text), result))
                })
                .collect::<Result<Vec<_>, VectorIndexError>>()?;
            Ok(rank_keyword_hits(hits, k))
        })
    }

    fn count(&self) -> BoxFuture<'_, Result<usize, VectorIndexError>> {
        Box::pin(async move {
            if !self.exists().await? {
                return Ok(0);
            }
            let response = self
                .client
                .count(CountPointsBuilder::new(&self.collection).exact(true))
                .await
                .map_err(Box::new)?;
            Ok(response
                .result
                .map_or(0, |r| usize::try_from(r.count).unwrap_or(usize::MAX)))
        })
    }

    fn delete_index(&self) -> BoxFuture<'_, Result<(), VectorIndexError>> {
        Box::pin(async move {
            if !self.exists().await? {
                return Ok(());
            }
            self.client
                .delete_collection(&self.collection)
                .await
                .map_err(Box::new)?;
            tracing::info!(collection = %self.collection, "deleted collection");
            Ok(())
        })
    }
}
