use quarry_index::RetrievalConfig;
use quarry_memory::document::ChunkerConfig;
use quarry_memory::job::JobMemoryConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub reranker: RerankerConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub chunking: ChunkerConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub job_memory: JobMemoryConfig,
    #[serde(skip)]
    pub secrets: ResolvedSecrets,
}

fn default_embedding_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_embedding_model() -> String {
    "text-embedding-3-large".into()
}

fn default_embedding_dimensions() -> usize {
    3072
}

fn default_batch_size() -> usize {
    100
}

fn default_embedding_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_cache_size() -> usize {
    10_000
}

/// OpenAI-compatible embedding endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,
    /// Texts per embedding request and points per index write.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Entries kept by the in-process embedding cache. Zero disables it.
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_embedding_base_url(),
            model: default_embedding_model(),
            dimensions: default_embedding_dimensions(),
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_max_retries(),
            cache_size: default_cache_size(),
        }
    }
}

/// Reranker backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankerKind {
    /// Cross-encoder served over HTTP (`POST {url}/rerank`).
    #[default]
    Http,
    /// Local term-overlap scorer; needs no service.
    TermOverlap,
}

impl RerankerKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::TermOverlap => "term_overlap",
        }
    }
}

impl std::fmt::Display for RerankerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_reranker_url() -> String {
    "http://localhost:8080".into()
}

fn default_reranker_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RerankerConfig {
    #[serde(default)]
    pub provider: RerankerKind,
    #[serde(default = "default_reranker_url")]
    pub url: String,
    #[serde(default = "default_reranker_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            provider: RerankerKind::default(),
            url: default_reranker_url(),
            timeout_secs: default_reranker_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// Process-local index; lost on exit.
    #[default]
    Memory,
    Qdrant,
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".into()
}

fn default_index_prefix() -> String {
    "rag_job".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub backend: VectorBackend,
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
    /// Per-job indexes are named `{index_prefix}_{job_id}`.
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::default(),
            qdrant_url: default_qdrant_url(),
            index_prefix: default_index_prefix(),
        }
    }
}

/// Credentials resolved from the environment. Never serialized.
#[derive(Default)]
pub struct ResolvedSecrets {
    pub openai_api_key: Option<String>,
    pub reranker_api_key: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<redacted>"))
            .field(
                "reranker_api_key",
                &self.reranker_api_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_serialize_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let back: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(back.embedding.model, config.embedding.model);
        assert_eq!(back.reranker.provider, config.reranker.provider);
        assert_eq!(back.vector_store.backend, config.vector_store.backend);
        assert_eq!(back.chunking, config.chunking);
        assert_eq!(back.retrieval, config.retrieval);
        assert_eq!(back.job_memory, config.job_memory);
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.embedding.dimensions, 3072);
        assert_eq!(config.vector_store.index_prefix, "rag_job");
        assert_eq!(config.retrieval.stage1_top_k, 50);
        assert_eq!(config.chunking.chunk_size, 800);
    }

    #[test]
    fn secrets_are_not_serialized() {
        let mut config = Config::default();
        config.secrets.openai_api_key = Some("sk-secret".into());
        let toml_str = toml::to_string(&config).unwrap();
        assert!(!toml_str.contains("sk-secret"));
        assert!(!format!("{:?}", config.secrets).contains("sk-secret"));
    }

    #[test]
    fn reranker_kind_parses_snake_case() {
        let cfg: RerankerConfig = toml::from_str(r#"provider = "term_overlap""#).unwrap();
        assert_eq!(cfg.provider, RerankerKind::TermOverlap);
        assert_eq!(cfg.provider.to_string(), "term_overlap");
        assert_eq!(cfg.url, "http://localhost:8080");
    }

    #[test]
    fn config_default_snapshot() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        insta::assert_snapshot!(toml_str, @r#"
        [embedding]
        base_url = "https://api.openai.com/v1"
        model = "text-embedding-3-large"
        dimensions = 3072
        batch_size = 100
        timeout_secs = 60
        max_retries = 3
        cache_size = 10000

        [reranker]
        provider = "http"
        url = "http://localhost:8080"
        timeout_secs = 30
        max_retries = 3

        [vector_store]
        backend = "memory"
        qdrant_url = "http://localhost:6334"
        index_prefix = "rag_job"

        [chunking]
        chunk_size = 800
        chunk_overlap = 150
        preserve_metadata = true
        include_section_headers = true
        include_page_numbers = true

        [retrieval]
        stage1_top_k = 50
        similarity_threshold = 0.75
        stage3_top_k = 15
        reranker_model = "cross-encoder/ms-marco-MiniLM-L-12-v2"
        max_context_tokens = 15000
        enable_deduplication = true
        enable_chunk_merging = true
        enable_source_attribution = true
        hybrid_search = false
        max_rounds = 1

        [job_memory]
        max_memory_tokens = 2000
        enable_compression = true
        retain_key_findings = true
        retain_cost_tracking = true
        budget_limit = 200.0
        time_limit_hours = 12.0
        "#);
    }
}
