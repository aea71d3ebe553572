//! Exact fold assignment by depth-first branch-and-bound

use std::time::Instant;

use metrics::histogram;
use tracing::debug;

use super::budget::{RunClock, SolveBudget};
use super::problem::{COST_EPSILON, FoldLoads, SiteProblem};
use super::service::FoldSolver;
use super::types::{FoldAssignment, SolverError, SolverRequest};

/// Default limit on distinct sites handed to the exact search
pub const DEFAULT_MAX_EXACT_SITES: usize = 16;

/// Budget is polled once every this many search nodes
const CHECKPOINT_INTERVAL: u64 = 1024;

/// Optimal site-to-fold assignment
///
/// Search cost grows exponentially with the number of sites, so the backend
/// only reports itself available up to `max_sites` distinct sites.
pub struct ExactSolver {
    max_sites: usize,
}

impl ExactSolver {
    pub fn new(max_sites: usize) -> Self {
        Self { max_sites }
    }
}

impl Default for ExactSolver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EXACT_SITES)
    }
}

impl FoldSolver for ExactSolver {
    fn name(&self) -> &str {
        "exact"
    }

    fn is_available(&self, request: &SolverRequest) -> bool {
        request.site_count() <= self.max_sites
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

        let mut search = Search {
            order: problem.sites_by_size(),
            loads: problem.empty_loads(),
            current: vec![0; problem.sites.len()],
            best: None,
            best_cost: f64::INFINITY,
            nodes: 0,
            problem: &problem,
            clock: &clock,
        };
        search.descend(0, 0, 0.0)?;

        let nodes = search.nodes;
        let best_cost = search.best_cost;
        let best = search.best.ok_or_else(|| {
            SolverError::Infeasible("no assignment fills every fold".to_string())
        })?;

        histogram!("slidecohort_solver_phase_duration_seconds", "solver" => "exact")
            .record(start.elapsed());
        debug!(
            "Exact search over {} sites explored {} nodes, objective {:.3}",
            problem.sites.len(),
            nodes,
            best_cost
        );
        Ok(problem.to_assignment(&best))
    }
}

struct Search<'a> {
    problem: &'a SiteProblem,
    clock: &'a RunClock<'a>,
    /// Sites in branching order
    order: Vec<usize>,
    loads: FoldLoads,
    /// Fold per site for the current branch
    current: Vec<usize>,
    best: Option<Vec<usize>>,
    best_cost: f64,
    nodes: u64,
}

impl Search<'_> {
    /// `depth` sites placed, folds `0..used` non-empty, `bound` = overfill lower bound so far
    fn descend(&mut self, depth: usize, used: usize, bound: f64) -> Result<(), SolverError> {
        self.nodes += 1;
        if self.nodes.is_multiple_of(CHECKPOINT_INTERVAL) {
            self.clock.checkpoint()?;
        }

        let folds = self.problem.folds;
        if depth == self.order.len() {
            if used == folds {
                let cost = self.loads.cost(&self.problem.targets);
                if cost < self.best_cost - COST_EPSILON {
                    self.best_cost = cost;
                    self.best = Some(self.current.clone());
                }
            }
            return Ok(());
        }

        let remaining = self.order.len() - depth;
        let empty = folds - used;
        if remaining < empty {
            return Ok(());
        }

        let problem = self.problem;
        let site_idx = self.order[depth];
        let site = &problem.sites[site_idx];
        // Folds are interchangeable, so an empty fold is only ever opened in order.
        // When the remaining sites exactly cover the empty folds, each must open one.
        let first = if remaining == empty { used } else { 0 };
        let last = (used + 1).min(folds);

        for fold in first..last {
            let child_bound = bound + self.loads.overfill_delta(fold, site, &problem.targets);
            if child_bound >= self.best_cost - COST_EPSILON {
                continue;
            }
            self.loads.add(fold, site);
            self.current[site_idx] = fold;
            let child_used = if fold == used { used + 1 } else { used };
            let result = self.descend(depth + 1, child_used, child_bound);
            self.loads.remove(fold, site);
            result?;
        }
        Ok(())
    }
}
