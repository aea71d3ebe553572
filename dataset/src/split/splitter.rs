//! Patient-level cross-validation splits

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use super::table::CompositionTable;
use super::types::{Split, SplitError};
use crate::cohort::Cohort;
use crate::config::SolverConfig;
use crate::solver::{FoldAssignment, SolveBudget, SolverMethod, SolverRegistry, SolverRequest, SolverRow};

/// Divide `items` into `n` contiguous chunks whose sizes differ by at most one
///
/// The first `len % n` chunks receive the extra element. `n == 0` yields no chunks.
pub fn split_list<T: Clone>(items: &[T], n: usize) -> Vec<Vec<T>> {
    if n == 0 {
        return Vec::new();
    }
    let (size, extra) = (items.len() / n, items.len() % n);
    (0..n)
        .map(|i| {
            let start = i * size + i.min(extra);
            let end = (i + 1) * size + (i + 1).min(extra);
            items[start..end].to_vec()
        })
        .collect()
}

/// Splits cohorts into `n` disjoint patient groups
///
/// Holds the random source used to shuffle patients before every split and
/// the solver registry consulted in site-preserved mode. A splitter is cheap
/// to build; concurrent callers should each own one and share the registry.
pub struct CohortSplitter<R: Rng = StdRng> {
    rng: R,
    registry: Arc<SolverRegistry>,
}

impl CohortSplitter<StdRng> {
    /// Reproducible shuffles from a fixed seed
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    /// Shuffles seeded from OS entropy
    pub fn from_os_rng() -> Self {
        Self::new(StdRng::from_os_rng())
    }
}

impl<R: Rng> CohortSplitter<R> {
    /// Splitter with the built-in solver backends
    pub fn new(rng: R) -> Self {
        Self {
            rng,
            registry: Arc::new(SolverRegistry::with_defaults(&SolverConfig::default())),
        }
    }

    pub fn with_registry(mut self, registry: Arc<SolverRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &SolverRegistry {
        &self.registry
    }

    /// Shuffle patients and cut them into `n` near-equal groups, ignoring labels
    pub fn split_plain(&mut self, cohort: &Cohort, n: usize) -> Result<Split, SplitError> {
        validate_fold_count(cohort, n)?;
        counter!("slidecohort_splits_total", "mode" => "plain").increment(1);

        let ids = self.shuffled_ids(cohort);
        let split = Split::new(split_list(&ids, n));
        debug!(
            "Plain split of {} patients into {} groups",
            cohort.len(),
            n
        );
        Ok(split)
    }

    /// Spread every label under `balance_key` evenly across `n` groups
    ///
    /// Each label's patients are chunked independently and chunk `k` of every
    /// label joins group `k`. Per-label counts differ by at most one between
    /// groups (earlier groups take the remainder), so total group sizes are
    /// only as even as the label distribution allows.
    pub fn split_balanced(
        &mut self,
        cohort: &Cohort,
        n: usize,
        balance_key: &str,
    ) -> Result<Split, SplitError> {
        validate_fold_count(cohort, n)?;
        let labels = cohort.labels(balance_key)?;
        counter!("slidecohort_splits_total", "mode" => "balanced").increment(1);

        let ids = self.shuffled_ids(cohort);
        let mut by_label: Vec<Vec<String>> = vec![Vec::new(); labels.len()];
        for id in ids {
            let label = cohort.label(&id, balance_key)?;
            // `labels` holds every label in the cohort
            if let Ok(idx) = labels.binary_search_by(|l| l.as_str().cmp(label)) {
                by_label[idx].push(id);
            }
        }

        let chunked: Vec<Vec<Vec<String>>> =
            by_label.iter().map(|ids| split_list(ids, n)).collect();
        let counts: Vec<Vec<usize>> = (0..n)
            .map(|k| chunked.iter().map(|chunks| chunks[k].len()).collect())
            .collect();
        let groups: Vec<Vec<String>> = (0..n)
            .map(|k| chunked.iter().flat_map(|chunks| chunks[k].iter().cloned()).collect())
            .collect();

        let table = CompositionTable { labels, counts };
        debug!("Balanced split on '{}':\n{}", balance_key, table);
        Ok(Split::new(groups).with_composition(table))
    }

    /// Keep every site within one group while balancing `balance_key`
    ///
    /// The assignment itself is delegated to a solver backend chosen by
    /// `method`; the run is bounded by `budget`. Solver failures (including
    /// timeouts and cancellation) surface as errors and are never replaced by
    /// a plain balanced split.
    pub fn split_preserved_site(
        &mut self,
        cohort: &Cohort,
        n: usize,
        balance_key: &str,
        method: &SolverMethod,
        budget: &SolveBudget,
    ) -> Result<Split, SplitError> {
        validate_fold_count(cohort, n)?;
        let mut attributes: HashMap<&str, (&str, &str)> = HashMap::with_capacity(cohort.len());
        for id in cohort.ids() {
            attributes.insert(id, (cohort.label(id, balance_key)?, cohort.site(id)?));
        }
        counter!("slidecohort_splits_total", "mode" => "site").increment(1);

        let rows: Vec<SolverRow> = self
            .shuffled_ids(cohort)
            .into_iter()
            .map(|patient| {
                let (label, site) = attributes[patient.as_str()];
                SolverRow {
                    patient,
                    label: label.to_string(),
                    site: site.to_string(),
                }
            })
            .collect();
        let request = SolverRequest::new(rows, n);

        let solver = self.registry.resolve(method, &request)?;
        info!(
            "Train/val split with preserved-site cross-val: {} patients, {} sites, {} folds, solver '{}'",
            cohort.len(),
            request.site_count(),
            n,
            solver.name()
        );

        let start = Instant::now();
        let assignment = solver.solve(&request, budget).map_err(|e| {
            counter!("slidecohort_solver_errors_total", "solver" => solver.name().to_string())
                .increment(1);
            warn!("Solver '{}' failed: {}", solver.name(), e);
            SplitError::from(e)
        })?;
        histogram!("slidecohort_solver_duration_seconds", "solver" => solver.name().to_string())
            .record(start.elapsed());

        check_assignment(&request, &assignment)?;

        let mut groups: Vec<Vec<String>> = vec![Vec::new(); n];
        for (row, &fold) in request.rows.iter().zip(&assignment.folds) {
            groups[fold - 1].push(row.patient.clone());
        }

        let table = CompositionTable::tally(
            cohort.labels(balance_key)?,
            n,
            request
                .rows
                .iter()
                .zip(&assignment.folds)
                .map(|(row, &fold)| (fold - 1, row.label.as_str())),
        );
        debug!("Preserved-site split on '{}':\n{}", balance_key, table);
        Ok(Split::new(groups).with_composition(table))
    }

    fn shuffled_ids(&mut self, cohort: &Cohort) -> Vec<String> {
        let mut ids: Vec<String> = cohort.ids().map(str::to_string).collect();
        ids.shuffle(&mut self.rng);
        ids
    }
}

fn validate_fold_count(cohort: &Cohort, n: usize) -> Result<(), SplitError> {
    if cohort.is_empty() {
        return Err(SplitError::InvalidArgument("cohort is empty".to_string()));
    }
    if n == 0 {
        return Err(SplitError::InvalidArgument(
            "number of splits must be at least 1".to_string(),
        ));
    }
    if n > cohort.len() {
        return Err(SplitError::InvalidArgument(format!(
            "cannot split {} patients into {} groups",
            cohort.len(),
            n
        )));
    }
    Ok(())
}

/// Reject solver output that is not a whole-site assignment into `1..=folds`
fn check_assignment(request: &SolverRequest, assignment: &FoldAssignment) -> Result<(), SplitError> {
    if assignment.len() != request.rows.len() {
        return Err(SplitError::InfeasibleSplit(format!(
            "solver assigned {} of {} patients",
            assignment.len(),
            request.rows.len()
        )));
    }

    let mut site_folds: HashMap<&str, usize> = HashMap::new();
    for (row, &fold) in request.rows.iter().zip(&assignment.folds) {
        if fold == 0 || fold > request.folds {
            return Err(SplitError::InfeasibleSplit(format!(
                "solver returned fold {} for patient '{}' (expected 1..={})",
                fold, row.patient, request.folds
            )));
        }
        let first = *site_folds.entry(row.site.as_str()).or_insert(fold);
        if first != fold {
            return Err(SplitError::InfeasibleSplit(format!(
                "solver split site '{}' across folds {} and {}",
                row.site, first, fold
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::Patient;
    use crate::solver::{FoldSolver, SolverError};

    fn four_patients() -> Cohort {
        [
            ("A", Patient::new().with_outcome("label", "X").with_site("1")),
            ("B", Patient::new().with_outcome("label", "X").with_site("1")),
            ("C", Patient::new().with_outcome("label", "Y").with_site("2")),
            ("D", Patient::new().with_outcome("label", "Y").with_site("2")),
        ]
        .into_iter()
        .collect()
    }

    fn sorted(mut group: Vec<String>) -> Vec<String> {
        group.sort();
        group
    }

    #[test]
    fn test_split_list_sizes() {
        let items: Vec<u32> = (0..10).collect();
        let chunks = split_list(&items, 3);
        assert_eq!(chunks, vec![vec![0, 1, 2, 3], vec![4, 5, 6], vec![7, 8, 9]]);
        assert_eq!(split_list(&items, 1), vec![items.clone()]);
        assert_eq!(split_list::<u32>(&[], 2), vec![Vec::<u32>::new(), Vec::new()]);
    }

    #[test]
    fn test_split_list_zero_chunks() {
        let items: Vec<u32> = (0..4).collect();
        assert!(split_list(&items, 0).is_empty());
        assert!(split_list::<u32>(&[], 0).is_empty());
    }

    #[test]
    fn test_plain_rejects_bad_counts() {
        let cohort = four_patients();
        let mut splitter = CohortSplitter::seeded(1);
        assert!(matches!(
            splitter.split_plain(&cohort, 0),
            Err(SplitError::InvalidArgument(_))
        ));
        assert!(matches!(
            splitter.split_plain(&cohort, 5),
            Err(SplitError::InvalidArgument(_))
        ));
        assert!(matches!(
            splitter.split_plain(&Cohort::new(), 1),
            Err(SplitError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_plain_singletons() {
        let split = CohortSplitter::seeded(2)
            .split_plain(&four_patients(), 4)
            .unwrap();
        assert!(split.groups.iter().all(|g| g.len() == 1));
        assert!(split.is_disjoint());
        assert!(split.composition.is_none());
    }

    #[test]
    fn test_seeded_splits_repeat() {
        let a = CohortSplitter::seeded(9).split_plain(&four_patients(), 2).unwrap();
        let b = CohortSplitter::seeded(9).split_plain(&four_patients(), 2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_balanced_pairs_labels() {
        let split = CohortSplitter::seeded(3)
            .split_balanced(&four_patients(), 2, "label")
            .unwrap();
        for group in &split.groups {
            assert_eq!(group.len(), 2);
            let xs = group.iter().filter(|p| *p == "A" || *p == "B").count();
            assert_eq!(xs, 1);
        }
        let table = split.composition.unwrap();
        assert_eq!(table.counts, vec![vec![1, 1], vec![1, 1]]);
    }

    #[test]
    fn test_balanced_missing_key() {
        let mut cohort = four_patients();
        cohort.insert("E", Patient::new().with_site("3"));
        let err = CohortSplitter::seeded(4)
            .split_balanced(&cohort, 2, "label")
            .unwrap_err();
        assert_eq!(
            err,
            SplitError::MissingAttribute {
                patient: "E".into(),
                key: "label".into()
            }
        );
    }

    #[test]
    fn test_preserved_site_keeps_sites_together() {
        let split = CohortSplitter::seeded(5)
            .split_preserved_site(
                &four_patients(),
                2,
                "label",
                &SolverMethod::Auto,
                &SolveBudget::unlimited(),
            )
            .unwrap();
        let mut groups: Vec<Vec<String>> = split.groups.into_iter().map(sorted).collect();
        groups.sort();
        assert_eq!(groups, vec![vec!["A", "B"], vec!["C", "D"]]);
    }

    #[test]
    fn test_preserved_site_requires_site() {
        let mut cohort = four_patients();
        cohort.insert("E", Patient::new().with_outcome("label", "X"));
        let err = CohortSplitter::seeded(6)
            .split_preserved_site(&cohort, 2, "label", &SolverMethod::Auto, &SolveBudget::unlimited())
            .unwrap_err();
        assert!(matches!(err, SplitError::MissingAttribute { ref key, .. } if key == "site"));
    }

    struct SplitsSites;

    impl FoldSolver for SplitsSites {
        fn name(&self) -> &str {
            "broken"
        }

        fn is_available(&self, _request: &SolverRequest) -> bool {
            true
        }

        fn solve(
            &self,
            request: &SolverRequest,
            _budget: &SolveBudget,
        ) -> Result<FoldAssignment, SolverError> {
            // Every site has two patients, so the first row's partner always lands elsewhere
            Ok(FoldAssignment::new(
                (0..request.rows.len()).map(|i| if i == 0 { 1 } else { 2 }).collect(),
            ))
        }
    }

    #[test]
    fn test_rejects_site_splitting_solver() {
        let mut registry = SolverRegistry::new();
        registry.register(Arc::new(SplitsSites));
        let err = CohortSplitter::seeded(7)
            .with_registry(Arc::new(registry))
            .split_preserved_site(
                &four_patients(),
                2,
                "label",
                &SolverMethod::Named("broken".into()),
                &SolveBudget::unlimited(),
            )
            .unwrap_err();
        assert!(matches!(err, SplitError::InfeasibleSplit(_)));
    }

    #[test]
    fn test_split_metrics_recorded() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            let mut splitter = CohortSplitter::seeded(8);
            splitter.split_balanced(&four_patients(), 2, "label").unwrap();
            splitter
                .split_preserved_site(
                    &four_patients(),
                    2,
                    "label",
                    &SolverMethod::Auto,
                    &SolveBudget::unlimited(),
                )
                .unwrap();
            let failed = splitter.split_preserved_site(
                &four_patients(),
                2,
                "label",
                &SolverMethod::Auto,
                &SolveBudget::with_timeout(std::time::Duration::ZERO),
            );
            assert!(failed.is_err());
        });

        let rendered = handle.render();
        assert!(rendered.contains("slidecohort_splits_total{mode=\"balanced\"} 1"));
        assert!(rendered.contains("slidecohort_splits_total{mode=\"site\"} 2"));
        assert!(rendered.contains("slidecohort_solver_duration_seconds"));
        assert!(rendered.contains("slidecohort_solver_errors_total{solver=\"exact\"} 1"));
    }
}
