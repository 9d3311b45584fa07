//! Bounded FIFO cache in front of an [`EmbeddingProvider`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use crate::error::LlmError;
use crate::provider::EmbeddingProvider;

pub const DEFAULT_CACHE_SIZE: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub max_size: usize,
    pub hit_rate: f64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<blake3::Hash, Vec<f32>>,
    order: VecDeque<blake3::Hash>,
    hits: u64,
    misses: u64,
}

impl CacheState {
    fn get(&mut self, key: &blake3::Hash) -> Option<Vec<f32>> {
        if let Some(v) = self.entries.get(key) {
            self.hits += 1;
            Some(v.clone())
        } else {
            self.misses += 1;
            None
        }
    }

    fn insert(&mut self, key: blake3::Hash, vector: Vec<f32>, max_size: usize) {
        if max_size == 0 || self.entries.contains_key(&key) {
            return;
        }
        while self.entries.len() >= max_size {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
        self.entries.insert(key, vector);
        self.order.push_back(key);
    }
}

/// Embedding provider decorator that remembers vectors by content hash.
///
/// Eviction is first-in-first-out once `max_size` entries are held.
#[derive(Debug)]
pub struct CachedEmbeddings<E> {
    inner: E,
    max_size: usize,
    state: Mutex<CacheState>,
}

impl<E> CachedEmbeddings<E> {
    #[must_use]
    pub fn new(inner: E, max_size: usize) -> Self {
        Self {
            inner,
            max_size,
            state: Mutex::new(CacheState::default()),
        }
    }

    #[must_use]
    pub fn inner(&self) -> &E {
        &self.inner
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let total = state.hits + state.misses;
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if total == 0 {
            0.0
        } else {
            state.hits as f64 / total as f64
        };
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            size: state.entries.len(),
            max_size: self.max_size,
            hit_rate,
        }
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = CacheState::default();
    }

    fn lookup(&self, key: &blake3::Hash) -> Option<Vec<f32>> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
    }

    fn store(&self, key: blake3::Hash, vector: Vec<f32>) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, vector, self.max_size);
    }
}

fn cache_key(text: &str) -> blake3::Hash {
    blake3::hash(text.as_bytes())
}

impl<E: EmbeddingProvider> EmbeddingProvider for CachedEmbeddings<E> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let key = cache_key(text);
        if let Some(v) = self.lookup(&key) {
            return Ok(v);
        }
        let vector = self.inner.embed(text).await?;
        self.store(key, vector.clone());
        Ok(vector)
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        batch_size: usize,
    ) -> Result<Vec<Vec<f32>>, LlmError> {
        let keys: Vec<blake3::Hash> = texts.iter().map(|t| cache_key(t)).collect();
        let mut out: Vec<Option<Vec<f32>>> = keys.iter().map(|k| self.lookup(k)).collect();

        let missing: Vec<usize> = (0..texts.len()).filter(|&i| out[i].is_none()).collect();
        if !missing.is_empty() {
            let to_embed: Vec<String> = missing.iter().map(|&i| texts[i].clone()).collect();
            let fresh = self.inner.embed_batch(&to_embed, batch_size).await?;
            if fresh.len() != missing.len() {
                return Err(LlmError::EmptyResponse {
                    provider: self.inner.name(),
                });
            }
            for (i, vector) in missing.into_iter().zip(fresh) {
                self.store(keys[i], vector.clone());
                out[i] = Some(vector);
            }
        }

        tracing::debug!(total = texts.len(), "embedding batch served through cache");
        out.into_iter()
            .map(|v| {
                v.ok_or(LlmError::EmptyResponse {
                    provider: self.inner.name(),
                })
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    impl EmbeddingProvider for Counting {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            #[allow(clippy::cast_precision_loss)]
            Ok(vec![text.len() as f32])
        }

        fn dimension(&self) -> usize {
            1
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    #[tokio::test]
    async fn repeated_text_hits_cache() {
        let cached = CachedEmbeddings::new(Counting::default(), 10);
        assert_eq!(cached.embed("abc").await.unwrap(), vec![3.0]);
        assert_eq!(cached.embed("abc").await.unwrap(), vec![3.0]);
        assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 1);

        let stats = cached.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn eviction_is_first_in_first_out() {
        let cached = CachedEmbeddings::new(Counting::default(), 2);
        cached.embed("a").await.unwrap();
        cached.embed("bb").await.unwrap();
        cached.embed("a").await.unwrap();
        cached.embed("ccc").await.unwrap();
        // "a" was inserted first, so it is gone even though it was read last.
        cached.embed("a").await.unwrap();
        assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 4);
        assert_eq!(cached.stats().size, 2);
    }

    #[tokio::test]
    async fn batch_only_embeds_misses() {
        let cached = CachedEmbeddings::new(Counting::default(), 10);
        cached.embed("bb").await.unwrap();

        let texts = vec!["a".to_owned(), "bb".to_owned(), "ccc".to_owned()];
        let out = cached.embed_batch(&texts, 10).await.unwrap();
        assert_eq!(out, vec![vec![1.0], vec![2.0], vec![3.0]]);
        assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_capacity_never_stores() {
        let cached = CachedEmbeddings::new(Counting::default(), 0);
        cached.embed("a").await.unwrap();
        cached.embed("a").await.unwrap();
        assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 2);
        assert_eq!(cached.stats().size, 0);
    }

    #[tokio::test]
    async fn clear_resets_entries_and_counters() {
        let cached = CachedEmbeddings::new(Counting::default(), 10);
        cached.embed("a").await.unwrap();
        cached.clear();
        let stats = cached.stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.misses, 0);
    }
}
