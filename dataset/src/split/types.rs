//! Split results and error definitions

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::table::CompositionTable;
use crate::cohort::CohortError;
use crate::solver::SolverError;

/// Errors that can occur when splitting a cohort
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Patient '{patient}' is missing attribute '{key}'")]
    MissingAttribute { patient: String, key: String },

    #[error("Solver unavailable: {0}")]
    SolverUnavailable(String),

    #[error("Infeasible split: {0}")]
    InfeasibleSplit(String),
}

impl From<SolverError> for SplitError {
    fn from(err: SolverError) -> Self {
        match err {
            SolverError::Unavailable(msg) => SplitError::SolverUnavailable(msg),
            SolverError::Infeasible(msg) => SplitError::InfeasibleSplit(msg),
            SolverError::TimedOut(after) => {
                SplitError::InfeasibleSplit(format!("solver timed out after {:?}", after))
            }
            SolverError::Cancelled => {
                SplitError::InfeasibleSplit("solver run was cancelled".to_string())
            }
        }
    }
}

impl From<CohortError> for SplitError {
    fn from(err: CohortError) -> Self {
        match err {
            CohortError::MissingAttribute { patient, key } => {
                SplitError::MissingAttribute { patient, key }
            }
            other => SplitError::InvalidArgument(other.to_string()),
        }
    }
}

/// `n` disjoint patient groups covering the whole cohort
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    /// Patient ids per fold, in fold order
    pub groups: Vec<Vec<String>>,
    /// Per-fold label counts (balanced and site-preserved splits)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composition: Option<CompositionTable>,
}

impl Split {
    pub fn new(groups: Vec<Vec<String>>) -> Self {
        Self {
            groups,
            composition: None,
        }
    }

    pub fn with_composition(mut self, table: CompositionTable) -> Self {
        self.composition = Some(table);
        self
    }

    /// Number of folds
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of patients across all folds
    pub fn patient_count(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    /// Fold index holding `patient`
    pub fn fold_of(&self, patient: &str) -> Option<usize> {
        self.groups
            .iter()
            .position(|group| group.iter().any(|p| p == patient))
    }

    /// Training and validation ids for cross-validation round `fold`
    ///
    /// The validation set is fold `fold`; training is every other fold, in order.
    pub fn train_val(&self, fold: usize) -> Result<(Vec<String>, Vec<String>), SplitError> {
        let validation = self.groups.get(fold).ok_or_else(|| {
            SplitError::InvalidArgument(format!(
                "fold {} out of range for a {}-fold split",
                fold,
                self.groups.len()
            ))
        })?;
        let training = self
            .groups
            .iter()
            .enumerate()
            .filter(|(k, _)| *k != fold)
            .flat_map(|(_, group)| group.iter().cloned())
            .collect();
        Ok((training, validation.clone()))
    }

    /// Whether every patient appears exactly once
    pub fn is_disjoint(&self) -> bool {
        let mut seen = HashSet::new();
        self.groups.iter().flatten().all(|p| seen.insert(p.as_str()))
    }
}
