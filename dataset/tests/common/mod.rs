//! Common Test Utilities for Integration Tests
//!
//! Shared cohort builders used across integration test modules.

#![allow(dead_code)]

use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use slidecohort_dataset::{Cohort, Patient, Split};

pub const OUTCOME: &str = "outcome";

/// Four patients, two labels, two sites: `{A:X/1, B:X/1, C:Y/2, D:Y/2}`
pub fn create_two_site_cohort() -> Cohort {
    [
        ("A", "X", "1"),
        ("B", "X", "1"),
        ("C", "Y", "2"),
        ("D", "Y", "2"),
    ]
    .into_iter()
    .map(|(id, label, site)| {
        (
            id,
            Patient::new().with_outcome(OUTCOME, label).with_site(site),
        )
    })
    .collect()
}

/// Random cohort with up to `labels` outcome labels spread over up to `sites` sites
pub fn create_random_cohort(rng: &mut ChaCha8Rng, patients: usize, labels: usize, sites: usize) -> Cohort {
    (0..patients)
        .map(|i| {
            let label = format!("L{}", rng.random_range(0..labels));
            let site = format!("S{}", rng.random_range(0..sites));
            (
                format!("P{:04}", i),
                Patient::new().with_outcome(OUTCOME, label).with_site(site),
            )
        })
        .collect()
}

/// Deterministic RNG for property loops
pub fn test_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Assert that `split` is a partition of the cohort's patients
pub fn assert_partition(split: &Split, cohort: &Cohort) {
    assert!(split.is_disjoint(), "a patient appears in two groups");
    assert_eq!(split.patient_count(), cohort.len());
    for id in cohort.ids() {
        assert!(split.fold_of(id).is_some(), "patient {} was dropped", id);
    }
}

/// Assert that no site is spread over two groups
pub fn assert_sites_whole(split: &Split, cohort: &Cohort) {
    let mut site_fold: HashMap<&str, usize> = HashMap::new();
    for (fold, group) in split.groups.iter().enumerate() {
        for id in group {
            let site = cohort.site(id).unwrap();
            let seen = *site_fold.entry(site).or_insert(fold);
            assert_eq!(seen, fold, "site {} spans folds {} and {}", site, seen, fold);
        }
    }
}

/// Sorted copy of every group, for order-insensitive comparisons
pub fn sorted_groups(split: &Split) -> Vec<Vec<String>> {
    let mut groups: Vec<Vec<String>> = split
        .groups
        .iter()
        .map(|g| {
            let mut g = g.clone();
            g.sort();
            g
        })
        .collect();
    groups.sort();
    groups
}
