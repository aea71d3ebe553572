//! Solver request/response types and error definitions

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when running a fold solver
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolverError {
    #[error("Solver unavailable: {0}")]
    Unavailable(String),

    #[error("No feasible assignment: {0}")]
    Infeasible(String),

    #[error("Solver timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Solver run was cancelled")]
    Cancelled,
}

/// Which solver backend to use for site-preserved splits
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum SolverMethod {
    /// First available backend in registry priority order
    #[default]
    Auto,
    /// A specific backend, by registered name (matched case-insensitively)
    Named(String),
}

impl FromStr for SolverMethod {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") || s.is_empty() {
            Ok(SolverMethod::Auto)
        } else {
            Ok(SolverMethod::Named(s.to_string()))
        }
    }
}

impl From<String> for SolverMethod {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(method) => method,
            Err(never) => match never {},
        }
    }
}

impl From<SolverMethod> for String {
    fn from(method: SolverMethod) -> Self {
        method.to_string()
    }
}

impl fmt::Display for SolverMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverMethod::Auto => f.write_str("auto"),
            SolverMethod::Named(name) => f.write_str(name),
        }
    }
}

/// One row of the (patient, outcome label, site) table handed to a solver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverRow {
    pub patient: String,
    pub label: String,
    pub site: String,
}

/// Fold assignment problem for site-preserved cross-validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverRequest {
    /// Patients in the order the caller wants them reported back
    pub rows: Vec<SolverRow>,
    /// Number of folds to produce
    pub folds: usize,
}

impl SolverRequest {
    pub fn new(rows: Vec<SolverRow>, folds: usize) -> Self {
        Self { rows, folds }
    }

    /// Number of distinct sites in the request
    pub fn site_count(&self) -> usize {
        let mut sites: Vec<&str> = self.rows.iter().map(|r| r.site.as_str()).collect();
        sites.sort_unstable();
        sites.dedup();
        sites.len()
    }
}

/// Per-row fold indices (`1..=folds`), aligned with `SolverRequest::rows`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldAssignment {
    pub folds: Vec<usize>,
}

impl FoldAssignment {
    pub fn new(folds: Vec<usize>) -> Self {
        Self { folds }
    }

    pub fn len(&self) -> usize {
        self.folds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folds.is_empty()
    }
}
