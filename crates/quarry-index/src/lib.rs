//! Document indexing and the multi-stage retrieval funnel.

pub mod config;
pub mod context;
pub mod error;
pub mod funnel;
pub mod indexer;

pub use config::RetrievalConfig;
pub use context::AssembledContext;
pub use error::{IndexError, Result};
pub use funnel::{Refinement, RefinementStrategy, RetrievalFunnel, SinglePass};
pub use indexer::{IndexReport, Indexer};
