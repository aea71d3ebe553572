//! Cohort tooling configuration
//!
//! Configuration is loaded from environment variables. Unparseable values are
//! ignored and the default is kept.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::solver::{DEFAULT_MAX_EXACT_SITES, DEFAULT_MAX_PASSES, SolverMethod};

/// Main configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the cohort annotations JSON document
    pub cohort_path: PathBuf,
    /// Directory to scan for whole-slide images (optional)
    pub slides_dir: Option<PathBuf>,
    /// Where to write Prometheus-format metrics after a run (optional)
    pub metrics_path: Option<PathBuf>,

    /// Split configuration
    pub split: SplitConfig,

    /// Solver configuration
    pub solver: SolverConfig,
}

/// How patients are distributed across folds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMode {
    /// Shuffle and chunk, ignoring labels
    Plain,
    /// Spread every label evenly across folds
    #[default]
    Balanced,
    /// Keep each site in a single fold, balancing labels as far as possible
    Site,
}

impl SplitMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SplitMode::Plain => "plain",
            SplitMode::Balanced => "balanced",
            SplitMode::Site => "site",
        }
    }
}

impl FromStr for SplitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "plain" => Ok(SplitMode::Plain),
            "balanced" => Ok(SplitMode::Balanced),
            "site" | "preserved_site" | "preserved-site" => Ok(SplitMode::Site),
            other => Err(format!("unknown split mode '{}'", other)),
        }
    }
}

/// Split-related configuration
#[derive(Debug, Clone)]
pub struct SplitConfig {
    /// Split strategy
    pub mode: SplitMode,
    /// Number of folds
    pub folds: usize,
    /// Outcome attribute to balance on (required for balanced and site modes)
    pub balance_key: Option<String>,
    /// Seed for the patient shuffle; OS entropy when unset
    pub seed: Option<u64>,
}

/// Solver-related configuration
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Backend selection
    pub method: SolverMethod,
    /// Limit on a single solver run (None = unlimited)
    pub timeout: Option<Duration>,
    /// Largest number of distinct sites the exact backend accepts
    pub max_exact_sites: usize,
    /// Local search pass limit for the greedy backend
    pub max_passes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cohort_path: PathBuf::from("annotations.json"),
            slides_dir: None,
            metrics_path: None,
            split: SplitConfig::default(),
            solver: SolverConfig::default(),
        }
    }
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            mode: SplitMode::Balanced,
            folds: 3,
            balance_key: None,
            seed: None,
        }
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            method: SolverMethod::Auto,
            timeout: Some(Duration::from_secs(60)),
            max_exact_sites: DEFAULT_MAX_EXACT_SITES,
            max_passes: DEFAULT_MAX_PASSES,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        // Paths
        if let Some(path) = lookup("COHORT_PATH")
            && !path.is_empty()
        {
            config.cohort_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("SLIDES_DIR")
            && !dir.is_empty()
        {
            config.slides_dir = Some(PathBuf::from(dir));
        }
        if let Some(path) = lookup("METRICS_PATH")
            && !path.is_empty()
        {
            config.metrics_path = Some(PathBuf::from(path));
        }

        // Split config
        if let Some(val) = lookup("SPLIT_MODE")
            && let Ok(mode) = val.parse()
        {
            config.split.mode = mode;
        }
        if let Some(val) = lookup("SPLIT_FOLDS")
            && let Ok(n) = val.parse()
        {
            config.split.folds = n;
        }
        if let Some(key) = lookup("BALANCE_KEY")
            && !key.is_empty()
        {
            config.split.balance_key = Some(key);
        }
        if let Some(val) = lookup("SPLIT_SEED")
            && let Ok(seed) = val.parse()
        {
            config.split.seed = Some(seed);
        }

        // Solver config
        if let Some(val) = lookup("SOLVER_METHOD") {
            config.solver.method = SolverMethod::from(val);
        }
        if let Some(val) = lookup("SOLVER_TIMEOUT_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.solver.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(val) = lookup("SOLVER_MAX_EXACT_SITES")
            && let Ok(n) = val.parse()
        {
            config.solver.max_exact_sites = n;
        }
        if let Some(val) = lookup("SOLVER_MAX_PASSES")
            && let Ok(n) = val.parse()
        {
            config.solver.max_passes = n;
        }

        config
    }
}
