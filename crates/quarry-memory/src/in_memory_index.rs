use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use quarry_llm::rerank::terms;

use crate::document::Chunk;
use crate::vector_index::{BoxFuture, RetrievalResult, SearchFilter, VectorIndex, VectorIndexError};

struct StoredPoint {
    chunk: Chunk,
    vector: Vec<f32>,
}

struct IndexState {
    dimension: usize,
    points: Vec<StoredPoint>,
    positions: HashMap<String, usize>,
}

/// Exact k-NN over an in-process point list. Used for tests and single-shot runs.
pub struct InMemoryVectorIndex {
    name: String,
    state: RwLock<Option<IndexState>>,
}

impl InMemoryVectorIndex {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(None),
        }
    }

    fn missing(&self) -> VectorIndexError {
        VectorIndexError::MissingIndex(self.name.clone())
    }
}

impl std::fmt::Debug for InMemoryVectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorIndex")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Number of distinct query terms present in `text`.
pub(crate) fn term_hits(query_terms: &HashSet<String>, text: &str) -> usize {
    let doc = terms(text);
    query_terms.iter().filter(|t| doc.contains(*t)).count()
}

/// Order keyword hits by matched term count, then similarity, and keep `k`.
pub(crate) fn rank_keyword_hits(
    mut hits: Vec<(usize, RetrievalResult)>,
    k: usize,
) -> Vec<RetrievalResult> {
    hits.sort_by(|(ha, a), (hb, b)| {
        hb.cmp(ha).then(
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal),
        )
    });
    hits.into_iter().take(k).map(|(_, r)| r).collect()
}

impl VectorIndex for InMemoryVectorIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_index(&self, dimension: usize) -> BoxFuture<'_, Result<(), VectorIndexError>> {
        Box::pin(async move {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            match state.as_ref() {
                Some(existing) if existing.dimension != dimension => {
                    Err(VectorIndexError::DimensionMismatch {
                        expected: existing.dimension,
                        actual: dimension,
                    })
                }
                Some(_) => Ok(()),
                None => {
                    *state = Some(IndexState {
                        dimension,
                        points: Vec::new(),
                        positions: HashMap::new(),
                    });
                    Ok(())
                }
            }
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
            let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let state = guard.as_mut().ok_or_else(|| self.missing())?;
            if let Some(bad) = vectors.iter().find(|v| v.len() != state.dimension) {
                return Err(VectorIndexError::DimensionMismatch {
                    expected: state.dimension,
                    actual: bad.len(),
                });
            }

            let mut written = 0;
            for (batch_chunks, batch_vectors) in chunks
                .chunks(batch_size.max(1))
                .zip(vectors.chunks(batch_size.max(1)))
            {
                for (chunk, vector) in batch_chunks.iter().zip(batch_vectors) {
                    let point = StoredPoint {
                        chunk: chunk.clone(),
                        vector: vector.clone(),
                    };
                    let id = chunk.id();
                    if let Some(&pos) = state.positions.get(&id) {
                        state.points[pos] = point;
                    } else {
                        state.positions.insert(id, state.points.len());
                        state.points.push(point);
                    }
                }
                written += batch_chunks.len();
                tracing::debug!(index = %self.name, written, "indexed batch");
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
            let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
            let state = guard.as_ref().ok_or_else(|| self.missing())?;
            if query_vector.len() != state.dimension {
                return Err(VectorIndexError::DimensionMismatch {
                    expected: state.dimension,
                    actual: query_vector.len(),
                });
            }

            let mut scored: Vec<(usize, f32)> = state
                .points
                .iter()
                .enumerate()
                .filter(|(_, p)| {
                    filter
                        .as_ref()
                        .is_none_or(|f| f.matches(&p.chunk.metadata))
                })
                .map(|(i, p)| (i, cosine_similarity(&query_vector, &p.vector)))
                .collect();
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(k);

            Ok(scored
                .into_iter()
                .map(|(i, score)| {
                    RetrievalResult::from_chunk(state.points[i].chunk.clone(), score)
                })
                .collect())
        })
    }

    fn keyword_search<'a>(
        &'a self,
        query_vector: &'a [f32],
        query_text: &'a str,
        k: usize,
    ) -> BoxFuture<'a, Result<Vec<RetrievalResult>, VectorIndexError>> {
        Box::pin(async move {
            let query_terms = terms(query_text);
            let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
            let state = guard.as_ref().ok_or_else(|| self.missing())?;
            if query_terms.is_empty() {
                return Ok(Vec::new());
            }

            let hits = state
                .points
                .iter()
                .filter_map(|p| {
                    let hits = term_hits(&query_terms, &p.chunk.text);
                    (hits > 0).then(|| {
                        let score = cosine_similarity(query_vector, &p.vector);
                        (hits, RetrievalResult::from_chunk(p.chunk.clone(), score))
                    })
                })
                .collect();
            Ok(rank_keyword_hits(hits, k))
        })
    }

    fn count(&self) -> BoxFuture<'_, Result<usize, VectorIndexError>> {
        Box::pin(async move {
            let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
            Ok(guard.as_ref().map_or(0, |s| s.points.len()))
        })
    }

    fn delete_index(&self) -> BoxFuture<'_, Result<(), VectorIndexError>> {
        Box::pin(async move {
            let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if guard.take().is_some() {
                tracing::info!(index = %self.name, "deleted index");
            }
            Ok(())
        })
    }
}
