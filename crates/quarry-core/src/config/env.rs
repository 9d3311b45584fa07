use super::Config;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_services();
        self.apply_env_overrides_pipeline();
        self.apply_env_overrides_secrets();
    }

    fn apply_env_overrides_services(&mut self) {
        if let Ok(v) = std::env::var("QUARRY_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Ok(v) = std::env::var("QUARRY_EMBEDDING_BASE_URL") {
            self.embedding.base_url = v;
        }
        if let Ok(v) = std::env::var("QUARRY_EMBEDDING_DIMENSIONS") {
            if let Ok(dimensions) = v.parse::<usize>() {
                self.embedding.dimensions = dimensions;
            } else {
                tracing::warn!("ignoring invalid QUARRY_EMBEDDING_DIMENSIONS value: {v}");
            }
        }
        if let Ok(v) = std::env::var("QUARRY_EMBEDDING_BATCH_SIZE")
            && let Ok(batch_size) = v.parse::<usize>()
        {
            self.embedding.batch_size = batch_size;
        }
        if let Ok(v) = std::env::var("QUARRY_RERANKER_URL") {
            self.reranker.url = v;
        }
        if let Ok(v) = std::env::var("QUARRY_RERANKER_MODEL") {
            self.retrieval.reranker_model = v;
        }
        if let Ok(v) = std::env::var("QUARRY_QDRANT_URL") {
            self.vector_store.qdrant_url = v;
        }
        if let Ok(v) = std::env::var("QUARRY_INDEX_PREFIX") {
            self.vector_store.index_prefix = v;
        }
    }

    fn apply_env_overrides_pipeline(&mut self) {
        if let Ok(v) = std::env::var("QUARRY_CHUNK_SIZE")
            && let Ok(size) = v.parse::<usize>()
        {
            self.chunking.chunk_size = size;
        }
        if let Ok(v) = std::env::var("QUARRY_CHUNK_OVERLAP")
            && let Ok(overlap) = v.parse::<usize>()
        {
            self.chunking.chunk_overlap = overlap;
        }
        if let Ok(v) = std::env::var("QUARRY_STAGE1_TOP_K")
            && let Ok(k) = v.parse::<usize>()
        {
            self.retrieval.stage1_top_k = k;
        }
        if let Ok(v) = std::env::var("QUARRY_SIMILARITY_THRESHOLD") {
            match v.parse::<f32>() {
                Ok(threshold) if (0.0..=1.0).contains(&threshold) => {
                    self.retrieval.similarity_threshold = threshold;
                }
                _ => tracing::warn!("ignoring invalid QUARRY_SIMILARITY_THRESHOLD value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("QUARRY_STAGE3_TOP_K")
            && let Ok(k) = v.parse::<usize>()
        {
            self.retrieval.stage3_top_k = k;
        }
        if let Ok(v) = std::env::var("QUARRY_MAX_CONTEXT_TOKENS")
            && let Ok(tokens) = v.parse::<usize>()
        {
            self.retrieval.max_context_tokens = tokens;
        }
        if let Ok(v) = std::env::var("QUARRY_BUDGET_LIMIT")
            && let Ok(limit) = v.parse::<f64>()
        {
            self.job_memory.budget_limit = limit;
        }
        if let Ok(v) = std::env::var("QUARRY_TIME_LIMIT_HOURS")
            && let Ok(hours) = v.parse::<f64>()
        {
            self.job_memory.time_limit_hours = hours;
        }
    }

    fn apply_env_overrides_secrets(&mut self) {
        if let Some(key) = std::env::var("QUARRY_OPENAI_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .ok()
            .filter(|k| !k.is_empty())
        {
            self.secrets.openai_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("QUARRY_RERANKER_API_KEY")
            && !key.is_empty()
        {
            self.secrets.reranker_api_key = Some(key);
        }
    }
}
