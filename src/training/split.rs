//! Stratified train/test splitting

use crate::data::labels;
use crate::error::{ChurnError, Result};
use ndarray::Array1;
use polars::prelude::DataFrame;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Disjoint row index sets, each sorted ascending
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl Split {
    pub fn len(&self) -> usize {
        self.train.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split a frame on its binary target field
pub fn split_records(df: &DataFrame, target: &str, test_fraction: f64, seed: u64) -> Result<Split> {
    stratified_split(&labels(df, target)?, test_fraction, seed)
}

/// Stratified split of row indices by label.
///
/// The test set holds `ceil(test_fraction * n)` rows. Each class gets the
/// floor of its exact share `test_fraction * n_c`, the leftover rows go to
/// the largest remainders (ties to the lower label), and each quota is then
/// clamped so the class keeps at least one row on each side. Every class
/// ends within one row of its exact share. Each class is shuffled
/// with one seeded RNG, classes visited in ascending label order.
pub fn stratified_split(labels: &Array1<u8>, test_fraction: f64, seed: u64) -> Result<Split> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(ChurnError::range("test_fraction", test_fraction, "must be inside (0, 1)"));
    }

    let mut classes: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        classes.entry(label).or_default().push(i);
    }
    if let Some((label, members)) = classes.iter().find(|(_, m)| m.len() < 2) {
        return Err(ChurnError::InsufficientDataError(format!(
            "class {} has {} record(s), need at least 2",
            label,
            members.len()
        )));
    }
    if classes.is_empty() {
        return Err(ChurnError::InsufficientDataError("no records to split".to_string()));
    }

    let n = labels.len();
    // 1e-9 absorbs float noise such as 0.3 * 10 = 3.0000000000000004
    let n_test = ((test_fraction * n as f64) - 1e-9).ceil() as usize;
    let quotas = apportion(test_fraction, n_test, &classes);

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(n);
    let mut test = Vec::with_capacity(n_test);
    for (members, quota) in classes.values().zip(quotas) {
        let mut shuffled = members.clone();
        shuffled.shuffle(&mut rng);
        test.extend_from_slice(&shuffled[..quota]);
        train.extend_from_slice(&shuffled[quota..]);
    }
    train.sort_unstable();
    test.sort_unstable();

    debug!(
        n_train = train.len(),
        n_test = test.len(),
        n_classes = classes.len(),
        seed,
        "Stratified split"
    );
    Ok(Split { train, test })
}

/// Largest-remainder quotas per class, each clamped to `[1, n_c - 1]`
fn apportion(test_fraction: f64, n_test: usize, classes: &BTreeMap<u8, Vec<usize>>) -> Vec<usize> {
    let exact: Vec<(usize, f64)> = classes
        .values()
        .map(|m| {
            let share = test_fraction * m.len() as f64;
            let floor = (share + 1e-9).floor();
            (floor as usize, (share - floor).max(0.0))
        })
        .collect();

    let mut quotas: Vec<usize> = exact.iter().map(|&(floor, _)| floor).collect();
    let leftover = n_test.saturating_sub(quotas.iter().sum());

    // stable sort keeps ascending label order among equal remainders
    let mut by_remainder: Vec<usize> = (0..exact.len()).collect();
    by_remainder.sort_by(|&a, &b| exact[b].1.total_cmp(&exact[a].1));
    for &c in by_remainder.iter().take(leftover) {
        quotas[c] += 1;
    }

    quotas
        .into_iter()
        .zip(classes.values())
        .map(|(q, m)| q.clamp(1, m.len() - 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn seven_three() -> Array1<u8> {
        array![0, 0, 1, 0, 0, 1, 0, 0, 1, 0]
    }

    #[test]
    fn test_ten_records_three_positives() {
        let labels = seven_three();
        let split = stratified_split(&labels, 0.3, 1).unwrap();

        assert_eq!(split.test.len(), 3);
        assert_eq!(split.train.len(), 7);
        let positives = split.test.iter().filter(|&&i| labels[i] == 1).count();
        assert_eq!(positives, 1);
    }

    #[test]
    fn test_partition_is_disjoint_and_complete() {
        let labels = seven_three();
        let split = stratified_split(&labels, 0.3, 9).unwrap();

        let mut all: Vec<usize> = split.train.iter().chain(split.test.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
        assert!(split.train.windows(2).all(|w| w[0] < w[1]));
        assert!(split.test.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_deterministic_for_seed() {
        let labels: Array1<u8> = (0..200).map(|i| u8::from(i % 4 == 0)).collect();
        let a = stratified_split(&labels, 0.25, 42).unwrap();
        let b = stratified_split(&labels, 0.25, 42).unwrap();
        assert_eq!(a, b);

        let c = stratified_split(&labels, 0.25, 43).unwrap();
        assert_ne!(a.test, c.test);
    }

    #[test]
    fn test_stratification_bound() {
        let labels: Array1<u8> = (0..97).map(|i| u8::from(i % 5 < 2)).collect();
        let split = stratified_split(&labels, 0.3, 5).unwrap();

        let n_test = split.test.len() as f64;
        for class in [0u8, 1] {
            let in_test = split.test.iter().filter(|&&i| labels[i] == class).count() as f64;
            let overall = labels.iter().filter(|&&l| l == class).count() as f64;
            let gap = (in_test / n_test - overall / labels.len() as f64).abs();
            assert!(gap <= 1.0 / n_test, "class {} gap {}", class, gap);
        }
    }

    fn class_counts(labels: &Array1<u8>, rows: &[usize]) -> [usize; 2] {
        let mut counts = [0; 2];
        for &i in rows {
            counts[labels[i] as usize] += 1;
        }
        counts
    }

    #[test]
    fn test_small_minority_keeps_exact_shares() {
        // 2 positives in 16 at 0.2: 14 * 0.2 = 2.8 negatives belong in test
        let labels: Array1<u8> = (0..16).map(|i| u8::from(i < 2)).collect();
        let split = stratified_split(&labels, 0.2, 3).unwrap();
        assert_eq!(class_counts(&labels, &split.test), [3, 1]);

        let labels: Array1<u8> = (0..17).map(|i| u8::from(i < 4)).collect();
        let split = stratified_split(&labels, 0.3, 3).unwrap();
        assert_eq!(class_counts(&labels, &split.test), [4, 2]);
    }

    #[test]
    fn test_every_class_within_one_of_its_share() {
        for n in 4..120usize {
            for positives in 2..=n - 2 {
                let labels: Array1<u8> = (0..n).map(|i| u8::from(i < positives)).collect();
                let totals = [n - positives, positives];
                for step in 1..=18 {
                    let fraction = step as f64 * 0.05;
                    let split = stratified_split(&labels, fraction, 11).unwrap();
                    let in_test = class_counts(&labels, &split.test);
                    for class in 0..2 {
                        let share = fraction * totals[class] as f64;
                        assert!(
                            (in_test[class] as f64 - share).abs() <= 1.0 + 1e-9,
                            "n={} positives={} fraction={} class={} in_test={} share={}",
                            n,
                            positives,
                            fraction,
                            class,
                            in_test[class],
                            share
                        );
                        assert!(in_test[class] >= 1 && in_test[class] < totals[class]);
                    }
                }
            }
        }
    }

    #[test]
    fn test_split_records_reads_target() {
        use crate::data::{from_records, Record};

        let df = from_records((0..10).map(|i| {
            Record::new()
                .with("tenure", i as f64)
                .with("Churn", if i % 3 == 0 { 1.0 } else { 0.0 })
        }))
        .unwrap();
        let split = split_records(&df, "Churn", 0.3, 1).unwrap();
        assert_eq!(split.len(), 10);
        assert!(matches!(
            split_records(&df, "Exited", 0.3, 1),
            Err(ChurnError::SchemaError(_))
        ));
    }

    #[test]
    fn test_errors() {
        let labels = seven_three();
        assert!(matches!(
            stratified_split(&labels, 0.0, 1),
            Err(ChurnError::RangeError { .. })
        ));
        assert!(matches!(
            stratified_split(&labels, 1.0, 1),
            Err(ChurnError::RangeError { .. })
        ));
        assert!(matches!(
            stratified_split(&array![0, 0, 0, 1], 0.5, 1),
            Err(ChurnError::InsufficientDataError(_))
        ));
    }
}
