//! Per-job progress memory with a bounded text digest.

mod clock;
mod error;
mod manager;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{JobMemoryError, Result};
pub use manager::{JobMemoryConfig, JobMemoryManager, SharedJobMemory};
pub use types::{Constraints, DEFAULT_EXECUTIVE_SUMMARY, JobMemory, StageCompletion};
