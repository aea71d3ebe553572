//! Ordered registry of fold solver backends

use std::sync::Arc;

use tracing::debug;

use super::exact::ExactSolver;
use super::greedy::GreedySolver;
use super::service::FoldSolver;
use super::types::{SolverError, SolverMethod, SolverRequest};
use crate::config::SolverConfig;

/// Solver backends in priority order (first registered = preferred)
#[derive(Clone, Default)]
pub struct SolverRegistry {
    solvers: Vec<Arc<dyn FoldSolver>>,
}

impl SolverRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in backends: `exact`, then `greedy` as the fallback
    #[must_use]
    pub fn with_defaults(config: &SolverConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ExactSolver::new(config.max_exact_sites)));
        registry.register(Arc::new(GreedySolver::new(config.max_passes)));
        registry
    }

    /// Append a backend at the lowest priority; a backend with the same name is replaced in place
    pub fn register(&mut self, solver: Arc<dyn FoldSolver>) {
        if let Some(slot) = self
            .solvers
            .iter_mut()
            .find(|s| s.name().eq_ignore_ascii_case(solver.name()))
        {
            *slot = solver;
        } else {
            self.solvers.push(solver);
        }
    }

    /// Registered names, in priority order
    pub fn names(&self) -> Vec<&str> {
        self.solvers.iter().map(|s| s.name()).collect()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn FoldSolver>> {
        self.solvers
            .iter()
            .find(|s| s.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Pick the backend for `method`
    ///
    /// `Auto` tries every backend in priority order and takes the first one
    /// available for this request. A named backend must exist and be available.
    pub fn resolve(
        &self,
        method: &SolverMethod,
        request: &SolverRequest,
    ) -> Result<Arc<dyn FoldSolver>, SolverError> {
        match method {
            SolverMethod::Auto => {
                for solver in &self.solvers {
                    if solver.is_available(request) {
                        debug!("Auto-selected solver '{}'", solver.name());
                        return Ok(Arc::clone(solver));
                    }
                    debug!("Solver '{}' unavailable, trying next", solver.name());
                }
                Err(SolverError::Unavailable(format!(
                    "none of [{}] can handle {} site(s)",
                    self.names().join(", "),
                    request.site_count()
                )))
            }
            SolverMethod::Named(name) => {
                let solver = self.get(name).ok_or_else(|| {
                    SolverError::Unavailable(format!("no solver registered as '{}'", name))
                })?;
                if !solver.is_available(request) {
                    return Err(SolverError::Unavailable(format!(
                        "solver '{}' cannot handle {} site(s)",
                        name,
                        request.site_count()
                    )));
                }
                Ok(solver)
            }
        }
    }
}

impl std::fmt::Debug for SolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolverRegistry")
            .field("solvers", &self.names())
            .finish()
    }
}
