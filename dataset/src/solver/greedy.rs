//! Greedy fold assignment with move/swap local search

use std::time::Instant;

use metrics::histogram;
use tracing::debug;

use super::budget::SolveBudget;
use super::problem::{COST_EPSILON, FoldLoads, SiteProblem};
use super::service::FoldSolver;
use super::types::{FoldAssignment, SolverError, SolverRequest};

/// Default cap on local search passes
pub const DEFAULT_MAX_PASSES: usize = 100;

/// Heuristic backend that handles any number of sites
///
/// Places sites largest first into the fold where they raise the imbalance
/// least, then improves the result by moving single sites and swapping pairs
/// of sites between folds until no step helps.
pub struct GreedySolver {
    max_passes: usize,
}

impl GreedySolver {
    pub fn new(max_passes: usize) -> Self {
        Self { max_passes }
    }

    fn place(&self, problem: &SiteProblem) -> (FoldLoads, Vec<usize>) {
        let targets = &problem.targets;
        let mut loads = problem.empty_loads();
        let mut site_folds = vec![0; problem.sites.len()];
        let order = problem.sites_by_size();

        for (placed, &site_idx) in order.iter().enumerate() {
            let site = &problem.sites[site_idx];
            let remaining = order.len() - placed;
            let must_open = loads.empty_folds() == remaining;

            let mut best: Option<(usize, f64)> = None;
            for fold in 0..problem.folds {
                if must_open && loads.site_counts[fold] != 0 {
                    continue;
                }
                let delta = loads.add_delta(fold, site, targets);
                let better = match best {
                    None => true,
                    Some((best_fold, best_delta)) => {
                        delta < best_delta - COST_EPSILON
                            || (delta < best_delta + COST_EPSILON
                                && fold_size(&loads, fold) < fold_size(&loads, best_fold))
                    }
                };
                if better {
                    best = Some((fold, delta));
                }
            }

            // At least one fold is always eligible: when `must_open` holds some fold is empty.
            let fold = best.map(|(f, _)| f).unwrap_or(0);
            loads.add(fold, site);
            site_folds[site_idx] = fold;
        }

        (loads, site_folds)
    }

    /// One improvement sweep; returns whether anything changed
    fn improve(
        &self,
        problem: &SiteProblem,
        loads: &mut FoldLoads,
        site_folds: &mut [usize],
    ) -> bool {
        let targets = &problem.targets;
        let mut improved = false;

        for s in 0..problem.sites.len() {
            let from = site_folds[s];
            if loads.site_counts[from] < 2 {
                continue;
            }
            let site = &problem.sites[s];
            let removal = loads.remove_delta(from, site, targets);
            for to in 0..problem.folds {
                if to == from {
                    continue;
                }
                if removal + loads.add_delta(to, site, targets) < -COST_EPSILON {
                    loads.remove(from, site);
                    loads.add(to, site);
                    site_folds[s] = to;
                    improved = true;
                    break;
                }
            }
        }

        for a in 0..problem.sites.len() {
            for b in (a + 1)..problem.sites.len() {
                let (fa, fb) = (site_folds[a], site_folds[b]);
                if fa == fb {
                    continue;
                }
                let (sa, sb) = (&problem.sites[a], &problem.sites[b]);
                if loads.swap_delta(fa, sa, fb, sb, targets) < -COST_EPSILON {
                    loads.remove(fa, sa);
                    loads.remove(fb, sb);
                    loads.add(fa, sb);
                    loads.add(fb, sa);
                    site_folds.swap(a, b);
                    improved = true;
                }
            }
        }

        improved
    }
}

fn fold_size(loads: &FoldLoads, fold: usize) -> u32 {
    loads.counts[fold].iter().sum()
}

impl Default for GreedySolver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PASSES)
    }
}

impl FoldSolver for GreedySolver {
    fn name(&self) -> &str {
        "greedy"
    }

    fn is_available(&self, _request: &SolverRequest) -> bool {
        true
    }

    fn solve(
        &self,
        request: &SolverRequest,
        budget: &SolveBudget,
    ) -> Result<FoldAssignment, SolverError> {
        let start = Instant::now();
        let problem = SiteProblem::from_request(request)?;
        let clock = budget.start();
        clock.checkpoint()?;

        let (mut loads, mut site_folds) = self.place(&problem);
        let mut passes = 0;
        while passes < self.max_passes {
            clock.checkpoint()?;
            passes += 1;
            if !self.improve(&problem, &mut loads, &mut site_folds) {
                break;
            }
        }

        histogram!("slidecohort_solver_phase_duration_seconds", "solver" => "greedy")
            .record(start.elapsed());
        debug!(
            "Greedy assignment of {} sites after {} pass(es), objective {:.3}",
            problem.sites.len(),
            passes,
            loads.cost(&problem.targets)
        );
        Ok(problem.to_assignment(&site_folds))
    }
}
