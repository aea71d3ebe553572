//! Site-level view of a fold assignment request
//!
//! Both backends work on sites rather than patients: every patient of a site
//! lands in the same fold, so a site is just a vector of per-label counts.
//! The objective is the squared deviation of each fold's label counts from
//! an even share (`total[label] / folds`), summed over folds and labels.

use std::collections::HashMap;

use super::types::{FoldAssignment, SolverError, SolverRequest};

/// Improvements smaller than this are treated as ties
pub(crate) const COST_EPSILON: f64 = 1e-9;

/// Label composition of one site
#[derive(Debug, Clone)]
pub(crate) struct SiteProfile {
    pub name: String,
    pub counts: Vec<u32>,
    pub size: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct SiteProblem {
    pub sites: Vec<SiteProfile>,
    /// Site index of every request row
    row_sites: Vec<usize>,
    pub folds: usize,
    /// Even share of every label per fold
    pub targets: Vec<f64>,
}

impl SiteProblem {
    pub fn from_request(request: &SolverRequest) -> Result<Self, SolverError> {
        if request.folds == 0 {
            return Err(SolverError::Infeasible("fold count must be positive".into()));
        }

        let mut labels: Vec<&str> = request.rows.iter().map(|r| r.label.as_str()).collect();
        labels.sort_unstable();
        labels.dedup();
        let label_index: HashMap<&str, usize> =
            labels.iter().enumerate().map(|(i, l)| (*l, i)).collect();

        let mut site_index: HashMap<&str, usize> = HashMap::new();
        let mut sites: Vec<SiteProfile> = Vec::new();
        let mut row_sites = Vec::with_capacity(request.rows.len());
        let mut totals = vec![0u32; labels.len()];

        for row in &request.rows {
            let idx = *site_index.entry(row.site.as_str()).or_insert_with(|| {
                sites.push(SiteProfile {
                    name: row.site.clone(),
                    counts: vec![0; labels.len()],
                    size: 0,
                });
                sites.len() - 1
            });
            let label = label_index[row.label.as_str()];
            sites[idx].counts[label] += 1;
            sites[idx].size += 1;
            totals[label] += 1;
            row_sites.push(idx);
        }

        if sites.len() < request.folds {
            return Err(SolverError::Infeasible(format!(
                "{} site(s) cannot fill {} folds without splitting a site",
                sites.len(),
                request.folds
            )));
        }

        let targets = totals
            .iter()
            .map(|&t| f64::from(t) / request.folds as f64)
            .collect();

        Ok(Self {
            sites,
            row_sites,
            folds: request.folds,
            targets,
        })
    }

    pub fn label_count(&self) -> usize {
        self.targets.len()
    }

    /// Site indices ordered by descending size (ties keep request order)
    pub fn sites_by_size(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.sites.len()).collect();
        order.sort_by(|&a, &b| self.sites[b].size.cmp(&self.sites[a].size));
        order
    }

    /// Expand a 0-based fold per site into 1-based folds per request row
    pub fn to_assignment(&self, site_folds: &[usize]) -> FoldAssignment {
        FoldAssignment::new(self.row_sites.iter().map(|&s| site_folds[s] + 1).collect())
    }

    pub fn empty_loads(&self) -> FoldLoads {
        FoldLoads {
            counts: vec![vec![0; self.label_count()]; self.folds],
            site_counts: vec![0; self.folds],
        }
    }
}

/// Running per-fold label counts for a partial or complete assignment
#[derive(Debug, Clone)]
pub(crate) struct FoldLoads {
    pub counts: Vec<Vec<u32>>,
    pub site_counts: Vec<usize>,
}

fn deviation(count: f64, target: f64) -> f64 {
    (count - target) * (count - target)
}

impl FoldLoads {
    pub fn add(&mut self, fold: usize, site: &SiteProfile) {
        for (slot, c) in self.counts[fold].iter_mut().zip(&site.counts) {
            *slot += c;
        }
        self.site_counts[fold] += 1;
    }

    pub fn remove(&mut self, fold: usize, site: &SiteProfile) {
        for (slot, c) in self.counts[fold].iter_mut().zip(&site.counts) {
            *slot -= c;
        }
        self.site_counts[fold] -= 1;
    }

    pub fn empty_folds(&self) -> usize {
        self.site_counts.iter().filter(|&&n| n == 0).count()
    }

    pub fn cost(&self, targets: &[f64]) -> f64 {
        self.counts
            .iter()
            .flat_map(|fold| fold.iter().zip(targets))
            .map(|(&x, &t)| deviation(f64::from(x), t))
            .sum()
    }

    /// Change in cost from adding `site` to `fold`
    pub fn add_delta(&self, fold: usize, site: &SiteProfile, targets: &[f64]) -> f64 {
        self.shift_delta(fold, &site.counts, targets, 1.0)
    }

    /// Change in cost from removing `site` from `fold`
    pub fn remove_delta(&self, fold: usize, site: &SiteProfile, targets: &[f64]) -> f64 {
        self.shift_delta(fold, &site.counts, targets, -1.0)
    }

    /// Change in cost from exchanging `a` (currently in `fold_a`) with `b` (in `fold_b`)
    pub fn swap_delta(
        &self,
        fold_a: usize,
        a: &SiteProfile,
        fold_b: usize,
        b: &SiteProfile,
        targets: &[f64],
    ) -> f64 {
        let mut delta = 0.0;
        for l in 0..targets.len() {
            let diff = f64::from(b.counts[l]) - f64::from(a.counts[l]);
            let xa = f64::from(self.counts[fold_a][l]);
            let xb = f64::from(self.counts[fold_b][l]);
            delta += deviation(xa + diff, targets[l]) - deviation(xa, targets[l]);
            delta += deviation(xb - diff, targets[l]) - deviation(xb, targets[l]);
        }
        delta
    }

    /// Lower bound on the final cost of `fold`'s cells once `site` is added:
    /// counts only grow, so overfilled cells stay at least this far off target.
    pub fn overfill_delta(&self, fold: usize, site: &SiteProfile, targets: &[f64]) -> f64 {
        let mut delta = 0.0;
        for l in 0..targets.len() {
            let x = f64::from(self.counts[fold][l]);
            let c = f64::from(site.counts[l]);
            delta += overfill(x + c, targets[l]) - overfill(x, targets[l]);
        }
        delta
    }

    fn shift_delta(&self, fold: usize, counts: &[u32], targets: &[f64], sign: f64) -> f64 {
        self.counts[fold]
            .iter()
            .zip(counts)
            .zip(targets)
            .map(|((&x, &c), &t)| {
                let x = f64::from(x);
                deviation(x + sign * f64::from(c), t) - deviation(x, t)
            })
            .sum()
    }
}

fn overfill(count: f64, target: f64) -> f64 {
    if count > target {
        deviation(count, target)
    } else {
        0.0
    }
}
