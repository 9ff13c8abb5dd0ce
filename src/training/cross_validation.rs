//! Stratified k-fold cross-validation

use crate::data::{class_counts, class_indices};
use crate::error::{ForestShieldError, Result};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A single train/validation split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Stratified k-fold splitter: every fold keeps the class ratio of `y`.
#[derive(Debug, Clone)]
pub struct CrossValidator {
    n_splits: usize,
    shuffle: bool,
    random_state: Option<u64>,
}

impl CrossValidator {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            shuffle: true,
            random_state: None,
        }
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Generate stratified train/validation splits.
    ///
    /// Fails with `FitError` when any fold's training part holds a single
    /// class, since no classifier can be fitted on it.
    pub fn split(&self, y: &Array1<f64>) -> Result<Vec<CVSplit>> {
        let n_splits = self.n_splits;
        if n_splits < 2 {
            return Err(ForestShieldError::InvalidParameter {
                name: "cv_folds".to_string(),
                value: n_splits.to_string(),
                reason: "must be at least 2".to_string(),
            });
        }
        if y.len() < n_splits {
            return Err(ForestShieldError::FitError(format!(
                "n_samples ({}) must be >= n_splits ({})",
                y.len(),
                n_splits
            )));
        }

        let counts = class_counts(y);
        if let Some((class, count)) = counts.iter().find(|(_, &c)| c < n_splits) {
            warn!(class, count, n_splits, "Class has fewer members than folds");
        }

        let mut by_class = class_indices(y);
        if self.shuffle {
            let mut rng = match self.random_state {
                Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                None => ChaCha8Rng::from_entropy(),
            };
            for indices in by_class.values_mut() {
                indices.shuffle(&mut rng);
            }
        }

        // Round-robin per class, continuing where the previous class stopped
        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        let mut offset = 0;
        for indices in by_class.values() {
            for &idx in indices {
                folds[offset % n_splits].push(idx);
                offset += 1;
            }
        }

        let mut splits = Vec::with_capacity(n_splits);
        for fold_idx in 0..n_splits {
            let mut test_indices = folds[fold_idx].clone();
            test_indices.sort_unstable();
            let mut train_indices: Vec<usize> = folds
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != fold_idx)
                .flat_map(|(_, f)| f.iter().copied())
                .collect();
            train_indices.sort_unstable();

            let train_classes = class_counts(&train_indices.iter().map(|&i| y[i]).collect());
            if train_classes.len() < 2 {
                return Err(ForestShieldError::FitError(format!(
                    "fold {} training part contains a single class",
                    fold_idx
                )));
            }

            splits.push(CVSplit {
                train_indices,
                test_indices,
                fold_idx,
            });
        }

        Ok(splits)
    }
}

/// Cross-validation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVResults {
    /// Scores for each fold
    pub scores: Vec<f64>,
    /// Mean score across folds
    pub mean_score: f64,
    /// Standard deviation of scores
    pub std_score: f64,
    /// Number of folds
    pub n_folds: usize,
}

impl CVResults {
    /// Create CV results from fold scores
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len();
        if n_folds == 0 {
            return Self {
                scores,
                mean_score: 0.0,
                std_score: 0.0,
                n_folds,
            };
        }
        let mean_score = scores.iter().sum::<f64>() / n_folds as f64;
        let variance = scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n_folds as f64;

        Self {
            scores,
            mean_score,
            std_score: variance.sqrt(),
            n_folds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Array1<f64> {
        Array1::from_iter((0..40).map(|i| if i % 4 == 0 { 1.0 } else { 0.0 }))
    }

    #[test]
    fn test_stratified_k_fold() {
        let y = labels();
        let cv = CrossValidator::new(5).with_random_state(42);
        let splits = cv.split(&y).unwrap();

        assert_eq!(splits.len(), 5);
        for split in &splits {
            assert_eq!(split.test_indices.len(), 8);
            let positives = split.test_indices.iter().filter(|&&i| y[i] == 1.0).count();
            assert_eq!(positives, 2);
        }

        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort();
        assert_eq!(all_test, (0..40).collect::<Vec<_>>());
    }

    #[test]
    fn test_train_and_test_disjoint() {
        let y = labels();
        let splits = CrossValidator::new(4).with_random_state(1).split(&y).unwrap();
        for split in &splits {
            for idx in &split.test_indices {
                assert!(split.train_indices.binary_search(idx).is_err());
            }
            assert_eq!(split.train_indices.len() + split.test_indices.len(), 40);
        }
    }

    #[test]
    fn test_deterministic_given_seed() {
        let y = labels();
        let a = CrossValidator::new(4).with_random_state(3).split(&y).unwrap();
        let b = CrossValidator::new(4).with_random_state(3).split(&y).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_single_class_fold_is_fit_error() {
        let y = Array1::from_vec(vec![0.0, 0.0, 0.0, 1.0]);
        let result = CrossValidator::new(2).with_shuffle(false).split(&y);
        assert!(matches!(result, Err(ForestShieldError::FitError(_))));
    }

    #[test]
    fn test_rejects_one_fold() {
        assert!(CrossValidator::new(1).split(&labels()).is_err());
    }

    #[test]
    fn test_cv_results() {
        let results = CVResults::from_scores(vec![0.5, 0.7]);
        assert!((results.mean_score - 0.6).abs() < 1e-12);
        assert!((results.std_score - 0.1).abs() < 1e-12);
        assert_eq!(results.n_folds, 2);
    }
}
