use std::fmt::Write as _;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::clock::{Clock, SystemClock};
use super::error::Result;
use super::types::{JobMemory, StageCompletion, current_stage, percent_of};
use crate::tokens::estimate_tokens;

const MAX_DIGEST_FINDINGS: usize = 3;
const MAX_DIGEST_GAPS: usize = 3;
const TRUNCATION_MARKER: &str = "\n[... truncated]";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobMemoryConfig {
    pub max_memory_tokens: usize,
    pub enable_compression: bool,
    pub retain_key_findings: bool,
    pub retain_cost_tracking: bool,
    pub budget_limit: f64,
    pub time_limit_hours: f64,
}

impl Default for JobMemoryConfig {
    fn default() -> Self {
        Self {
            max_memory_tokens: 2000,
            enable_compression: true,
            retain_key_findings: true,
            retain_cost_tracking: true,
            budget_limit: 200.0,
            time_limit_hours: 12.0,
        }
    }
}

/// Single writer over one job's [`JobMemory`].
pub struct JobMemoryManager {
    memory: JobMemory,
    config: JobMemoryConfig,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for JobMemoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobMemoryManager")
            .field("job_id", &self.memory.job_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl JobMemoryManager {
    /// Start a job. Without an id one is derived from the current time.
    #[must_use]
    pub fn new(job_id: Option<String>, config: JobMemoryConfig) -> Self {
        Self::with_clock(job_id, config, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(
        job_id: Option<String>,
        config: JobMemoryConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        let job_id =
            job_id.unwrap_or_else(|| format!("job-{}", now.format("%Y%m%d-%H%M%S")));
        let memory = JobMemory::new(job_id, now, config.budget_limit, config.time_limit_hours);
        tracing::info!(job_id = %memory.job_id, "job memory initialized");
        Self {
            memory,
            config,
            clock,
        }
    }

    #[must_use]
    pub fn from_memory(memory: JobMemory, config: JobMemoryConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            memory,
            config,
            clock,
        }
    }

    #[must_use]
    pub fn memory(&self) -> &JobMemory {
        &self.memory
    }

    #[must_use]
    pub fn config(&self) -> &JobMemoryConfig {
        &self.config
    }

    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.memory.job_id
    }

    pub fn complete_stage(
        &mut self,
        stage: u32,
        key_findings: Vec<String>,
        coverage: Map<String, Value>,
        quality_score: f64,
        cost: f64,
    ) {
        let now = self.clock.now();
        self.memory.completed_stages.push(StageCompletion {
            stage,
            completed_at: now,
            key_findings,
            coverage,
            quality_score,
            cost,
        });

        self.memory
            .costs_by_stage
            .insert(format!("stage_{stage}"), cost);
        self.memory.constraints.budget_used = self.memory.costs_by_stage.values().sum();

        #[allow(clippy::cast_precision_loss)]
        let elapsed_hours =
            (now - self.memory.created_at).num_milliseconds() as f64 / 3_600_000.0;
        self.memory.constraints.time_elapsed_hours = (elapsed_hours * 100.0).round() / 100.0;

        self.update_risks();
        self.memory.updated_at = now;

        tracing::info!(
            job_id = %self.memory.job_id,
            stage,
            quality_score,
            cost,
            budget_used = self.memory.constraints.budget_used,
            "stage completed"
        );
    }

    /// Replace the current stage record. `extra` keys are kept beside the fixed fields.
    pub fn update_current_stage(
        &mut self,
        stage: u32,
        status: &str,
        percentage_complete: f64,
        extra: Map<String, Value>,
    ) {
        self.memory.current_stage = current_stage(stage, status, percentage_complete, extra);
        self.memory.updated_at = self.clock.now();
    }

    pub fn add_gap(&mut self, gap: impl Into<String>) {
        let gap = gap.into();
        if !self.memory.gaps_identified.contains(&gap) {
            self.memory.gaps_identified.push(gap);
            self.memory.updated_at = self.clock.now();
        }
    }

    /// Record an ad-hoc risk. It lasts until the next stage completion rederives risks.
    pub fn add_risk(&mut self, risk: impl Into<String>) {
        let risk = risk.into();
        if !self.memory.risks.contains(&risk) {
            self.memory.risks.push(risk);
            self.memory.updated_at = self.clock.now();
        }
    }

    pub fn update_executive_summary(&mut self, summary: impl Into<String>) {
        self.memory.executive_summary = summary.into();
        self.memory.updated_at = self.clock.now();
    }

    fn update_risks(&mut self) {
        let c = &self.memory.constraints;
        let mut risks = Vec::new();

        let budget_pct = percent_of(c.budget_used, c.budget_limit);
        if budget_pct > 90.0 {
            risks.push(format!("Budget risk: CRITICAL ({budget_pct:.0}% used)"));
        } else if budget_pct > 75.0 {
            risks.push(format!("Budget risk: HIGH ({budget_pct:.0}% used)"));
        } else if budget_pct > 50.0 {
            risks.push(format!("Budget risk: MEDIUM ({budget_pct:.0}% used)"));
        }

        let time_pct = percent_of(c.time_elapsed_hours, c.time_limit_hours);
        if time_pct > 90.0 {
            risks.push(format!("Time risk: CRITICAL ({time_pct:.0}% elapsed)"));
        } else if time_pct > 75.0 {
            risks.push(format!("Time risk: HIGH ({time_pct:.0}% elapsed)"));
        }

        if let Some(avg) = self.memory.average_quality()
            && avg < 80.0
        {
            risks.push(format!("Quality risk: MEDIUM (avg score: {avg:.1})"));
        }

        if !risks.is_empty() {
            tracing::warn!(job_id = %self.memory.job_id, ?risks, "job risks detected");
        }
        self.memory.risks = risks;
    }

    /// Bounded plain-text digest of the job, at most `max_tokens` estimated tokens
    /// plus the truncation marker. Defaults to `max_memory_tokens`.
    #[must_use]
    pub fn compressed_memory(&self, max_tokens: Option<usize>) -> String {
        let max_tokens = max_tokens.unwrap_or(self.config.max_memory_tokens);
        let m = &self.memory;
        let mut out = String::new();

        let _ = writeln!(out, "JOB: {}", m.job_id);
        let _ = writeln!(out, "STATUS: {}", m.executive_summary);
        out.push('\n');

        if !m.completed_stages.is_empty() {
            out.push_str("COMPLETED STAGES:\n");
            for s in &m.completed_stages {
                let _ = writeln!(
                    out,
                    "  Stage {}: Quality {:.0}, Cost ${:.2}",
                    s.stage, s.quality_score, s.cost
                );
                if self.config.retain_key_findings {
                    for finding in s.key_findings.iter().take(MAX_DIGEST_FINDINGS) {
                        let _ = writeln!(out, "    - {finding}");
                    }
                }
            }
            out.push('\n');
        }

        let _ = writeln!(
            out,
            "CURRENT: Stage {} ({:.0}% complete)",
            m.current_stage_number(),
            m.current_percentage()
        );
        out.push('\n');

        if !m.gaps_identified.is_empty() {
            let _ = writeln!(out, "GAPS: {} identified", m.gaps_identified.len());
            for gap in m.gaps_identified.iter().take(MAX_DIGEST_GAPS) {
                let _ = writeln!(out, "  - {gap}");
            }
            out.push('\n');
        }

        let c = &m.constraints;
        out.push_str("CONSTRAINTS:\n");
        if self.config.retain_cost_tracking {
            let _ = writeln!(
                out,
                "  Budget: ${:.2} / ${:.2}",
                c.budget_used, c.budget_limit
            );
        }
        let _ = writeln!(
            out,
            "  Time: {:.1}h / {:.1}h",
            c.time_elapsed_hours, c.time_limit_hours
        );

        if !m.risks.is_empty() {
            out.push_str("\nRISKS:");
            for risk in &m.risks {
                let _ = write!(out, "\n  - {risk}");
            }
        }
        truncate_digest(out, max_tokens)
    }

    /// Digest for prompts: compressed text, or the full JSON document when
    /// compression is disabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the memory cannot be serialized.
    pub fn digest(&self) -> Result<String> {
        if self.config.enable_compression {
            Ok(self.compressed_memory(None))
        } else {
            self.to_json()
        }
    }

    /// # Errors
    ///
    /// Returns an error if the memory cannot be serialized.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.memory)?)
    }

    /// Write the whole document to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error on serialization or I/O failure.
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        write_document(path, self.to_json()?).await?;
        tracing::info!(job_id = %self.memory.job_id, path = %path.display(), "job memory saved");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a job memory document.
    pub async fn load_from_file(path: &Path, config: JobMemoryConfig) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        let memory: JobMemory = serde_json::from_str(&raw)?;
        tracing::info!(job_id = %memory.job_id, path = %path.display(), "job memory loaded");
        Ok(Self::from_memory(memory, config, Arc::new(SystemClock)))
    }
}

async fn write_document(path: &Path, json: String) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, json).await?;
    Ok(())
}

fn truncate_digest(text: String, max_tokens: usize) -> String {
    if estimate_tokens(&text) <= max_tokens {
        return text;
    }
    let mut truncated: String = text.chars().take(max_tokens.saturating_mul(4)).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

/// Cloneable handle serializing all updates to one job's memory.
#[derive(Clone)]
pub struct SharedJobMemory(Arc<Mutex<JobMemoryManager>>);

impl std::fmt::Debug for SharedJobMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedJobMemory").finish_non_exhaustive()
    }
}

impl SharedJobMemory {
    #[must_use]
    pub fn new(manager: JobMemoryManager) -> Self {
        Self(Arc::new(Mutex::new(manager)))
    }

    /// Run `f` with exclusive access to the manager.
    pub fn update<R>(&self, f: impl FnOnce(&mut JobMemoryManager) -> R) -> R {
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    #[must_use]
    pub fn snapshot(&self) -> JobMemory {
        self.update(|m| m.memory().clone())
    }

    /// # Errors
    ///
    /// Returns an error if the memory cannot be serialized.
    pub fn digest(&self) -> Result<String> {
        self.update(|m| m.digest())
    }

    /// # Errors
    ///
    /// Returns an error on serialization or I/O failure.
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = self.update(|m| m.to_json())?;
        write_document(path, json).await
    }
}
