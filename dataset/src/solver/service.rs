//! FoldSolver trait definition

use super::budget::SolveBudget;
use super::types::{FoldAssignment, SolverError, SolverRequest};

/// Trait for fold assignment backends (exact search, greedy heuristic, ...)
pub trait FoldSolver: Send + Sync {
    /// Registry name, matched against `SolverMethod::Named`
    fn name(&self) -> &str;

    /// Probe whether this backend can take on the given request
    fn is_available(&self, request: &SolverRequest) -> bool;

    /// Assign every row to a fold in `1..=request.folds`, keeping sites whole
    fn solve(
        &self,
        request: &SolverRequest,
        budget: &SolveBudget,
    ) -> Result<FoldAssignment, SolverError>;
}
