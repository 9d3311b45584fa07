use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_EXECUTIVE_SUMMARY: &str = "Job initialized";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageCompletion {
    pub stage: u32,
    pub completed_at: DateTime<Utc>,
    pub key_findings: Vec<String>,
    pub coverage: Map<String, Value>,
    /// 0 to 100.
    pub quality_score: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    pub budget_limit: f64,
    pub budget_used: f64,
    pub time_limit_hours: f64,
    pub time_elapsed_hours: f64,
}

/// Persistent progress record for one multi-stage job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMemory {
    pub job_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub executive_summary: String,
    pub completed_stages: Vec<StageCompletion>,
    /// Always holds `stage`, `status` and `percentage_complete`.
    pub current_stage: Map<String, Value>,
    pub gaps_identified: Vec<String>,
    pub constraints: Constraints,
    pub risks: Vec<String>,
    pub costs_by_stage: BTreeMap<String, f64>,
}

impl JobMemory {
    #[must_use]
    pub fn new(
        job_id: impl Into<String>,
        now: DateTime<Utc>,
        budget_limit: f64,
        time_limit_hours: f64,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            created_at: now,
            updated_at: now,
            executive_summary: DEFAULT_EXECUTIVE_SUMMARY.to_owned(),
            completed_stages: Vec::new(),
            current_stage: current_stage(0, "in_progress", 0.0, Map::new()),
            gaps_identified: Vec::new(),
            constraints: Constraints {
                budget_limit,
                budget_used: 0.0,
                time_limit_hours,
                time_elapsed_hours: 0.0,
            },
            risks: Vec::new(),
            costs_by_stage: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn current_stage_number(&self) -> u64 {
        self.current_stage
            .get("stage")
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    #[must_use]
    pub fn current_percentage(&self) -> f64 {
        self.current_stage
            .get("percentage_complete")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }

    #[must_use]
    pub fn average_quality(&self) -> Option<f64> {
        if self.completed_stages.is_empty() {
            return None;
        }
        let total: f64 = self.completed_stages.iter().map(|s| s.quality_score).sum();
        #[allow(clippy::cast_precision_loss)]
        Some(total / self.completed_stages.len() as f64)
    }
}

/// Build a `current_stage` object; `extra` keys never override the three fixed ones.
#[must_use]
pub fn current_stage(
    stage: u32,
    status: &str,
    percentage_complete: f64,
    extra: Map<String, Value>,
) -> Map<String, Value> {
    let mut map = extra;
    map.insert("stage".into(), Value::from(stage));
    map.insert("status".into(), Value::from(status));
    map.insert("percentage_complete".into(), Value::from(percentage_complete));
    map
}

/// Progress as a percentage of `limit`; a non-positive limit counts as zero.
#[must_use]
pub fn percent_of(used: f64, limit: f64) -> f64 {
    if limit > 0.0 { used / limit * 100.0 } else { 0.0 }
}
