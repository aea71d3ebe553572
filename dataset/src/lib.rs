//! SlideCohort Dataset Library
//!
//! Patient-level cross-validation splitting for whole-slide image cohorts,
//! plus the slide discovery and dataset recipe tooling around it.

pub mod cohort;
pub mod config;
pub mod recipe;
pub mod slides;
pub mod solver;
pub mod split;

// Re-export commonly used types
pub use cohort::{Cohort, Patient};
pub use config::{Config, SplitMode};
pub use solver::{CancelToken, FoldSolver, SolveBudget, SolverMethod, SolverRegistry};
pub use split::{CohortSplitter, CompositionTable, Split, SplitError};
