//! Cohort splitting module
//!
//! Partitions a patient cohort into cross-validation folds:
//! - plain: shuffled near-equal chunks
//! - balanced: every outcome label spread evenly across folds
//! - preserved-site: whole sites per fold, label balance delegated to a solver

mod splitter;
mod table;
mod types;

pub use splitter::{CohortSplitter, split_list};
pub use table::CompositionTable;
pub use types::{Split, SplitError};
