//! Fold solver module for site-preserved cross-validation
//!
//! This module provides:
//! - `FoldSolver` trait for abstracting assignment backends
//! - `ExactSolver` (branch-and-bound) and `GreedySolver` (heuristic) backends
//! - `SolverRegistry` for priority-ordered automatic selection
//! - `SolveBudget` for caller-supplied timeouts and cancellation

mod budget;
mod exact;
mod greedy;
mod problem;
mod registry;
mod service;
mod types;

pub use budget::{CancelToken, RunClock, SolveBudget};
pub use exact::{DEFAULT_MAX_EXACT_SITES, ExactSolver};
pub use greedy::{DEFAULT_MAX_PASSES, GreedySolver};
pub use registry::SolverRegistry;
pub use service::FoldSolver;
pub use types::{FoldAssignment, SolverError, SolverMethod, SolverRequest, SolverRow};
