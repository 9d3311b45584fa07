//! Configuration, cost tracking, and the engine that wires chunking,
//! retrieval, and job memory together.

pub mod config;
pub mod cost;
pub mod engine;

pub use config::Config;
pub use cost::{CostSummary, CostTracker};
pub use engine::{DefaultEngine, Engine, MeteredReranker};
