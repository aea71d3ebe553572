use std::sync::Arc;

use anyhow::{Context, bail};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use slidecohort_dataset::config::{Config, SplitMode};
use slidecohort_dataset::slides::slide_directory_tree;
use slidecohort_dataset::{Cohort, CohortSplitter, SolveBudget, SolverRegistry, Split};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    // Initialize tracing; stdout is reserved for the split itself
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slidecohort=info,slidecohort_dataset=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration from environment
    let config = Config::from_env();
    info!(
        "Loaded configuration: cohort={:?}, mode={}, folds={}",
        config.cohort_path,
        config.split.mode.as_str(),
        config.split.folds
    );

    // Install the recorder before any metrics are recorded
    let metrics_handle = match config.metrics_path {
        Some(_) => Some(setup_prometheus_metrics()?),
        None => None,
    };

    if let Some(ref slides_dir) = config.slides_dir {
        match slide_directory_tree(slides_dir) {
            Ok(tree) => {
                if tree.is_empty() {
                    warn!("Slides directory {:?} contains no slides", slides_dir);
                }
                if let Some(duplicates) = &tree.duplicates {
                    warn!("{} slide names appear more than once", duplicates.len());
                }
            }
            Err(e) => warn!("Failed to scan slides directory {:?}: {}", slides_dir, e),
        }
    }

    let cohort = Cohort::from_json_file(&config.cohort_path)
        .with_context(|| format!("failed to load cohort from {:?}", config.cohort_path))?;
    info!("Loaded cohort with {} patients", cohort.len());

    // Metrics are written whether or not the split succeeds
    let result = run_split(&config, &cohort);
    if let (Some(path), Some(handle)) = (&config.metrics_path, &metrics_handle) {
        std::fs::write(path, handle.render())
            .with_context(|| format!("failed to write metrics to {:?}", path))?;
        info!("Wrote metrics to {:?}", path);
    }

    let split = result?;
    if let Some(table) = &split.composition {
        info!("Fold composition:\n{}", table);
    }

    println!("{}", serde_json::to_string_pretty(&split)?);
    Ok(())
}

/// Initialize the Prometheus metrics recorder
fn setup_prometheus_metrics() -> anyhow::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

fn run_split(config: &Config, cohort: &Cohort) -> anyhow::Result<Split> {
    let registry = Arc::new(SolverRegistry::with_defaults(&config.solver));
    let mut splitter = match config.split.seed {
        Some(seed) => CohortSplitter::seeded(seed),
        None => CohortSplitter::from_os_rng(),
    }
    .with_registry(registry);

    let folds = config.split.folds;
    let balance_key = || {
        config.split.balance_key.as_deref().with_context(|| {
            format!(
                "BALANCE_KEY is required for {} splits",
                config.split.mode.as_str()
            )
        })
    };

    let split = match config.split.mode {
        SplitMode::Plain => splitter.split_plain(cohort, folds)?,
        SplitMode::Balanced => splitter.split_balanced(cohort, folds, balance_key()?)?,
        SplitMode::Site => {
            let budget = match config.solver.timeout {
                Some(timeout) => SolveBudget::with_timeout(timeout),
                None => SolveBudget::unlimited(),
            };
            splitter.split_preserved_site(
                cohort,
                folds,
                balance_key()?,
                &config.solver.method,
                &budget,
            )?
        }
    };

    if split.len() != folds {
        bail!("expected {} folds, got {}", folds, split.len());
    }
    Ok(split)
}
