//! Stratified k-fold partitioning

use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

use crate::{CoverageError, Result};

/// One train/validation split
#[derive(Debug, Clone)]
pub struct Fold {
    pub index: usize,
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

/// Partition sample indices into `k` stratified folds.
///
/// Indices of each class are shuffled with `seed`, then dealt round-robin
/// across folds. The starting fold rotates from class to class so fold sizes
/// stay within one sample of each other. Validation sets are disjoint and
/// together cover every index; each fold's training set is its complement.
pub fn stratified_k_fold(labels: &[u32], k: usize, seed: u64) -> Result<Vec<Fold>> {
    if k < 2 {
        return Err(CoverageError::Config(format!(
            "need at least 2 folds, got {}",
            k
        )));
    }
    if labels.len() < k {
        return Err(CoverageError::InsufficientData(format!(
            "{} plays cannot fill {} folds",
            labels.len(),
            k
        )));
    }

    let mut by_class: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        by_class.entry(*label).or_default().push(i);
    }

    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut validation: Vec<Vec<usize>> = vec![Vec::new(); k];
    let mut next_fold = 0;

    for indices in by_class.values_mut() {
        indices.shuffle(&mut rng);
        for &i in indices.iter() {
            validation[next_fold].push(i);
            next_fold = (next_fold + 1) % k;
        }
    }

    Ok(validation
        .into_iter()
        .enumerate()
        .map(|(index, mut val)| {
            val.sort_unstable();
            let train = (0..labels.len())
                .filter(|i| val.binary_search(i).is_err())
                .collect();
            Fold {
                index,
                train,
                validation: val,
            }
        })
        .collect())
}

/// Stratified train/test split.
///
/// Each class's indices are shuffled with `seed` and `round(fraction * count)`
/// of them are held out. Returns sorted `(train, test)` index sets.
pub fn stratified_holdout(
    labels: &[u32],
    fraction: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(CoverageError::Config(format!(
            "holdout fraction must be in (0, 1), got {}",
            fraction
        )));
    }

    let mut by_class: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        by_class.entry(*label).or_default().push(i);
    }

    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();

    for indices in by_class.values_mut() {
        indices.shuffle(&mut rng);
        let held_out = ((fraction * indices.len() as f64).round() as usize).min(indices.len());
        test.extend_from_slice(&indices[..held_out]);
        train.extend_from_slice(&indices[held_out..]);
    }

    if train.is_empty() || test.is_empty() {
        return Err(CoverageError::InsufficientData(format!(
            "holding out {} of {} plays leaves {} train and {} test",
            fraction,
            labels.len(),
            train.len(),
            test.len()
        )));
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok((train, test))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn proportion(labels: &[u32], indices: &[usize], class: u32) -> f64 {
        indices.iter().filter(|&&i| labels[i] == class).count() as f64 / indices.len() as f64
    }

    fn labels_with_counts(counts: &[usize]) -> Vec<u32> {
        // interleave classes so stratification cannot lean on input order
        let mut labels = Vec::new();
        let mut remaining = counts.to_vec();
        while remaining.iter().any(|&c| c > 0) {
            for (class, count) in remaining.iter_mut().enumerate() {
                if *count > 0 {
                    labels.push(class as u32 + 1);
                    *count -= 1;
                }
            }
        }
        labels
    }

    #[test]
    fn test_folds_are_disjoint_and_cover_everything() {
        let labels = labels_with_counts(&[53, 31, 16]);
        let folds = stratified_k_fold(&labels, 5, 7).unwrap();
        assert_eq!(folds.len(), 5);

        let mut seen = HashSet::new();
        for fold in &folds {
            for &i in &fold.validation {
                assert!(seen.insert(i), "index {} in two validation sets", i);
            }
            assert_eq!(fold.train.len() + fold.validation.len(), labels.len());
            assert!(fold.train.iter().all(|i| !fold.validation.contains(i)));
        }
        assert_eq!(seen.len(), labels.len());
    }

    #[test]
    fn test_folds_are_stratified() {
        let labels = labels_with_counts(&[53, 31, 16]);
        let all: Vec<usize> = (0..labels.len()).collect();
        let folds = stratified_k_fold(&labels, 5, 11).unwrap();

        for fold in &folds {
            assert!(fold.validation.len() == 20);
            for class in 1..=3 {
                let diff =
                    (proportion(&labels, &fold.validation, class) - proportion(&labels, &all, class)).abs();
                assert!(diff < 0.06, "fold {} class {} off by {}", fold.index, class, diff);
            }
        }
    }

    #[test]
    fn test_same_seed_same_folds() {
        let labels = labels_with_counts(&[10, 10]);
        let a = stratified_k_fold(&labels, 4, 3).unwrap();
        let b = stratified_k_fold(&labels, 4, 3).unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.validation, y.validation);
        }
    }

    #[test]
    fn test_invalid_fold_counts() {
        assert!(matches!(
            stratified_k_fold(&[1, 2, 1], 1, 0),
            Err(CoverageError::Config(_))
        ));
        assert!(matches!(
            stratified_k_fold(&[1, 2, 1], 5, 0),
            Err(CoverageError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_holdout_split() {
        let labels = labels_with_counts(&[40, 20]);
        let (train, test) = stratified_holdout(&labels, 0.2, 5).unwrap();
        assert_eq!(train.len() + test.len(), 60);
        assert_eq!(test.len(), 12);
        assert_eq!(test.iter().filter(|&&i| labels[i] == 2).count(), 4);
        assert!(stratified_holdout(&labels, 0.0, 5).is_err());
    }

    #[test]
    fn test_holdout_follows_fraction() {
        let labels = labels_with_counts(&[50, 50]);
        for (fraction, expected) in [(0.4, 40), (0.6, 60), (0.7, 70), (0.9, 90)] {
            let (train, test) = stratified_holdout(&labels, fraction, 3).unwrap();
            assert_eq!(test.len(), expected, "fraction {}", fraction);
            assert_eq!(train.len() + test.len(), 100);
            assert_eq!(test.iter().filter(|&&i| labels[i] == 1).count(), expected / 2);
            assert!(train.iter().all(|i| test.binary_search(i).is_err()));
        }
    }

    #[test]
    fn test_holdout_of_everything_is_rejected() {
        assert!(matches!(
            stratified_holdout(&[1, 2], 0.2, 0),
            Err(CoverageError::InsufficientData(_))
        ));
    }
}
