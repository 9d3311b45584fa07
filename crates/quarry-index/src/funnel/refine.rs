use crate::context::AssembledContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refinement {
    Stop,
    /// Run the funnel again with a rewritten query.
    Continue { query: String },
}

/// Decides after each funnel round whether to retrieve again.
pub trait RefinementStrategy: Send + Sync {
    /// `round` counts from 1.
    fn next(&self, round: usize, query: &str, context: &AssembledContext) -> Refinement;
}

/// Never refines.
#[derive(Debug, Clone, Copy, Default)]
pub struct SinglePass;

impl RefinementStrategy for SinglePass {
    fn next(&self, _round: usize, _query: &str, _context: &AssembledContext) -> Refinement {
        Refinement::Stop
    }
}
