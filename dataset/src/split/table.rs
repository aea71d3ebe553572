//! Per-fold label composition of a split

use std::fmt;

use serde::{Deserialize, Serialize};

/// Label counts per fold: `counts[fold][label]`
///
/// Labels are sorted; folds are indexed from zero and rendered as `K-fold-{k}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionTable {
    pub labels: Vec<String>,
    pub counts: Vec<Vec<usize>>,
}

impl CompositionTable {
    /// Tally `(fold, label)` pairs; `labels` must contain every label seen
    pub fn tally<'a>(
        labels: Vec<String>,
        folds: usize,
        entries: impl IntoIterator<Item = (usize, &'a str)>,
    ) -> Self {
        let mut counts = vec![vec![0; labels.len()]; folds];
        for (fold, label) in entries {
            if let Ok(idx) = labels.binary_search_by(|l| l.as_str().cmp(label)) {
                counts[fold][idx] += 1;
            }
        }
        Self { labels, counts }
    }

    pub fn folds(&self) -> usize {
        self.counts.len()
    }

    /// Patients holding `label` in `fold`
    pub fn count(&self, fold: usize, label: &str) -> Option<usize> {
        let idx = self.labels.iter().position(|l| l == label)?;
        self.counts.get(fold).map(|row| row[idx])
    }

    /// Patients per fold
    pub fn fold_totals(&self) -> Vec<usize> {
        self.counts.iter().map(|row| row.iter().sum()).collect()
    }

    /// Patients per label
    pub fn label_totals(&self) -> Vec<usize> {
        (0..self.labels.len())
            .map(|idx| self.counts.iter().map(|row| row[idx]).sum())
            .collect()
    }

    /// Largest difference between per-fold counts of any single label
    pub fn max_label_spread(&self) -> usize {
        (0..self.labels.len())
            .map(|idx| {
                let column = self.counts.iter().map(|row| row[idx]);
                let max = column.clone().max().unwrap_or(0);
                let min = column.min().unwrap_or(0);
                max - min
            })
            .max()
            .unwrap_or(0)
    }
}

impl fmt::Display for CompositionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Category")?;
        for label in &self.labels {
            write!(f, "\t{}", label)?;
        }
        for (k, row) in self.counts.iter().enumerate() {
            write!(f, "\nK-fold-{}", k)?;
            for count in row {
                write!(f, "\t{}", count)?;
            }
        }
        Ok(())
    }
}
