//! Time and cancellation limits for a solver run

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::types::SolverError;

/// Shared cancellation flag, cheap to clone and safe to trigger from another thread
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of every run holding this token
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Caller-supplied limits for one solver invocation
///
/// The timeout clock starts when the run starts (see [`SolveBudget::start`]),
/// not when the budget is built.
#[derive(Debug, Clone, Default)]
pub struct SolveBudget {
    timeout: Option<Duration>,
    cancel: CancelToken,
}

impl SolveBudget {
    /// No timeout, fresh cancellation token
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Start the clock for a run
    pub fn start(&self) -> RunClock<'_> {
        RunClock {
            budget: self,
            deadline: self.timeout.map(|t| Instant::now() + t),
        }
    }
}

/// Running view of a budget; solvers poll [`RunClock::checkpoint`] in their inner loops
#[derive(Debug)]
pub struct RunClock<'a> {
    budget: &'a SolveBudget,
    deadline: Option<Instant>,
}

impl RunClock<'_> {
    /// Fails once the run has been cancelled or has exceeded its timeout
    pub fn checkpoint(&self) -> Result<(), SolverError> {
        if self.budget.cancel.is_cancelled() {
            return Err(SolverError::Cancelled);
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(SolverError::TimedOut(self.budget.timeout.unwrap_or_default()));
        }
        Ok(())
    }
}
