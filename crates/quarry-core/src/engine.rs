//! Dependency-injection root: builds every service from [`Config`] and
//! records indexing and query progress in the job memory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use quarry_index::{AssembledContext, IndexReport, Indexer, RetrievalFunnel};
use quarry_llm::{
    AnyReranker, CachedEmbeddings, EmbeddingProvider, HttpReranker, LlmError, OpenAiEmbeddings,
    Reranker, TermOverlapReranker,
};
use quarry_memory::document::{Chunker, TiktokenCounter};
use quarry_memory::job::{JobMemoryManager, SharedJobMemory};
use quarry_memory::{
    InMemoryVectorIndex, QdrantVectorIndex, VectorIndex, estimate_tokens, index_name,
};
use serde_json::{Map, Value, json};

use crate::config::{Config, RerankerKind, VectorBackend};
use crate::cost::CostTracker;

/// Quality score recorded for a finished indexing stage.
const INDEXING_QUALITY: f64 = 95.0;
const LISTED_FILES: usize = 3;

/// Reranker decorator that counts calls in the [`CostTracker`].
#[derive(Debug)]
pub struct MeteredReranker<R> {
    inner: R,
    costs: CostTracker,
}

impl<R> MeteredReranker<R> {
    #[must_use]
    pub fn new(inner: R, costs: CostTracker) -> Self {
        Self { inner, costs }
    }

    #[must_use]
    pub fn inner(&self) -> &R {
        &self.inner
    }
}

impl<R: Reranker> Reranker for MeteredReranker<R> {
    async fn score(&self, query: &str, candidates: &[String]) -> Result<Vec<f32>, LlmError> {
        self.costs.record_rerank(candidates.len());
        self.inner.score(query, candidates).await
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

/// Engine wired to the production embedding and reranker clients.
pub type DefaultEngine = Engine<CachedEmbeddings<OpenAiEmbeddings>, AnyReranker>;

pub struct Engine<E, R> {
    indexer: Indexer<E>,
    funnel: RetrievalFunnel<E, MeteredReranker<R>>,
    index: Arc<dyn VectorIndex>,
    memory: SharedJobMemory,
    costs: CostTracker,
    job_id: String,
    embedding_model: String,
}

impl<E, R> std::fmt::Debug for Engine<E, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("job_id", &self.job_id)
            .field("index", &self.index.name())
            .field("embedding_model", &self.embedding_model)
            .finish_non_exhaustive()
    }
}

impl DefaultEngine {
    /// Build the OpenAI embedder, the configured reranker and vector index,
    /// and a fresh job memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the API key is
    /// missing, or a client cannot be constructed.
    pub fn from_config(config: &Config, job_id: Option<String>) -> anyhow::Result<Self> {
        config.validate()?;

        let api_key = config
            .secrets
            .openai_api_key
            .clone()
            .context("no embedding API key: set QUARRY_OPENAI_API_KEY or OPENAI_API_KEY")?;
        let embedder = OpenAiEmbeddings::new(
            api_key,
            config.embedding.base_url.clone(),
            config.embedding.model.clone(),
            config.embedding.dimensions,
            Duration::from_secs(config.embedding.timeout_secs),
        )
        .context("failed to build embedding client")?
        .with_max_retries(config.embedding.max_retries);
        let embedder = CachedEmbeddings::new(embedder, config.embedding.cache_size);

        let reranker = match config.reranker.provider {
            RerankerKind::Http => AnyReranker::Http(
                HttpReranker::new(
                    config.reranker.url.clone(),
                    config.retrieval.reranker_model.clone(),
                    config.secrets.reranker_api_key.clone(),
                    Duration::from_secs(config.reranker.timeout_secs),
                )
                .context("failed to build reranker client")?
                .with_max_retries(config.reranker.max_retries),
            ),
            RerankerKind::TermOverlap => AnyReranker::TermOverlap(TermOverlapReranker),
        };

        let manager = JobMemoryManager::new(job_id, config.job_memory.clone());
        let name = index_name(&config.vector_store.index_prefix, manager.job_id());
        let index: Arc<dyn VectorIndex> = match config.vector_store.backend {
            VectorBackend::Memory => Arc::new(InMemoryVectorIndex::new(name)),
            VectorBackend::Qdrant => Arc::new(
                QdrantVectorIndex::new(&config.vector_store.qdrant_url, name)
                    .context("failed to connect to qdrant")?,
            ),
        };

        Self::new(config, embedder, reranker, index, manager)
    }
}

impl<E: EmbeddingProvider, R: Reranker> Engine<E, R> {
    /// Wire already-built services together.
    ///
    /// # Errors
    ///
    /// Returns an error if the tokenizer cannot load or the chunking or
    /// retrieval sections are invalid.
    pub fn new(
        config: &Config,
        embedder: E,
        reranker: R,
        index: Arc<dyn VectorIndex>,
        memory: JobMemoryManager,
    ) -> anyhow::Result<Self> {
        let costs = CostTracker::new();
        let embedder = Arc::new(embedder);

        let counter = TiktokenCounter::cl100k().context("failed to load tokenizer")?;
        let chunker = Chunker::new(config.chunking.clone(), Arc::new(counter))
            .context("invalid [chunking] section")?;
        let indexer = Indexer::new(chunker, Arc::clone(&embedder), Arc::clone(&index))
            .with_batch_size(config.embedding.batch_size);

        let funnel = RetrievalFunnel::new(
            embedder,
            Arc::new(MeteredReranker::new(reranker, costs.clone())),
            Arc::clone(&index),
            config.retrieval.clone(),
        )
        .context("invalid [retrieval] section")?;

        tracing::info!(
            job_id = memory.job_id(),
            index = index.name(),
            embedding_model = %config.embedding.model,
            "engine ready"
        );

        Ok(Self {
            indexer,
            funnel,
            index,
            job_id: memory.job_id().to_owned(),
            memory: SharedJobMemory::new(memory),
            costs,
            embedding_model: config.embedding.model.clone(),
        })
    }

    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    #[must_use]
    pub fn memory(&self) -> &SharedJobMemory {
        &self.memory
    }

    #[must_use]
    pub fn costs(&self) -> &CostTracker {
        &self.costs
    }

    #[must_use]
    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// `job_memory_{job_id}.json` in the working directory.
    #[must_use]
    pub fn default_memory_path(&self) -> PathBuf {
        PathBuf::from(format!("job_memory_{}.json", self.job_id()))
    }

    /// Chunk, embed and store `path`, then record stage 0 in the job memory.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing could be loaded or any service call fails.
    /// Files in a directory that fail to load are recorded as gaps instead.
    pub async fn index_path(&self, path: &Path) -> anyhow::Result<IndexReport> {
        let report = self
            .indexer
            .index_path(path)
            .await
            .with_context(|| format!("failed to index {}", path.display()))?;

        if report.chunks_indexed == 0 {
            anyhow::bail!("no documents loaded from {}", path.display());
        }

        let cost = self
            .costs
            .record_embedding(&self.embedding_model, report.embedding_tokens);
        let findings = stage_findings(&report);
        let mut coverage = Map::new();
        coverage.insert("chunks_indexed".into(), json!(report.chunks_indexed));
        coverage.insert("files_processed".into(), json!(report.files_processed));

        self.memory.update(|m| {
            for failure in &report.failures {
                m.add_gap(format!(
                    "Failed to load {}: {}",
                    failure.path.display(),
                    failure.error
                ));
            }
            m.complete_stage(0, findings, coverage, INDEXING_QUALITY, cost);
        });

        tracing::info!(
            chunks = report.chunks_indexed,
            files = report.files_processed,
            embedding_cost = cost,
            "indexing stage recorded"
        );
        Ok(report)
    }

    /// Run the retrieval funnel for `query` and count it in the job memory.
    ///
    /// # Errors
    ///
    /// Returns the first embedding, index, or reranker failure.
    pub async fn query(&self, query: &str) -> anyhow::Result<AssembledContext> {
        let context = self
            .funnel
            .retrieve(query)
            .await
            .context("retrieval failed")?;
        self.costs
            .record_embedding(&self.embedding_model, estimate_tokens(query));

        self.memory.update(|m| {
            let processed = m
                .memory()
                .current_stage
                .get("queries_processed")
                .and_then(Value::as_u64)
                .unwrap_or(0)
                + 1;
            let mut extra = Map::new();
            extra.insert("queries_processed".into(), json!(processed));
            m.update_current_stage(1, "query_processed", 0.0, extra);
        });
        Ok(context)
    }

    /// Persist the job memory to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn finish(&self, path: &Path) -> anyhow::Result<()> {
        self.memory
            .save_to_file(path)
            .await
            .with_context(|| format!("failed to save job memory to {}", path.display()))?;
        let summary = self.costs.summary();
        tracing::info!(
            path = %path.display(),
            embedding_usd = summary.embedding_usd,
            rerank_calls = summary.rerank_calls,
            "job memory saved"
        );
        Ok(())
    }
}

fn stage_findings(report: &IndexReport) -> Vec<String> {
    let files = &report.statistics.files;
    let mut listed = files
        .iter()
        .take(LISTED_FILES)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if files.len() > LISTED_FILES {
        listed.push_str("...");
    }
    vec![
        format!(
            "Indexed {} chunks from {} files",
            report.chunks_indexed, report.files_processed
        ),
        format!("Total tokens: {}", report.statistics.total_tokens),
        format!("Files: {listed}"),
    ]
}
