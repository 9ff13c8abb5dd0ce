//! SMOTE oversampling

use crate::data::{class_counts, class_indices};
use crate::error::{ForestShieldError, Result};
use crate::synthetic::{ResampleResult, Sampler};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use tracing::debug;

/// Ordered float for BinaryHeap-based partial sort
#[derive(Debug, Clone, Copy)]
struct DistIdx(f64, usize);

impl PartialEq for DistIdx {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for DistIdx {}
impl PartialOrd for DistIdx {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DistIdx {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0).then(self.1.cmp(&other.1))
    }
}

/// SMOTE (Synthetic Minority Over-sampling Technique)
///
/// Each synthetic row lies on the segment between a minority sample and one
/// of its `k` nearest same-class neighbours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SMOTE {
    /// Number of nearest neighbors
    k_neighbors: usize,
    /// Desired minority/majority ratio after resampling
    sampling_strategy: f64,
    seed: Option<u64>,
    /// Target samples per class
    target_counts: Option<BTreeMap<i64, usize>>,
}

impl SMOTE {
    pub fn new() -> Self {
        Self {
            k_neighbors: 5,
            sampling_strategy: 1.0,
            seed: None,
            target_counts: None,
        }
    }

    pub fn with_k_neighbors(mut self, k: usize) -> Self {
        self.k_neighbors = k.max(1);
        self
    }

    /// Set sampling strategy (ratio in `(0, 1]`)
    pub fn with_sampling_strategy(mut self, ratio: f64) -> Self {
        self.sampling_strategy = ratio;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn k_neighbors(&self) -> usize {
        self.k_neighbors
    }

    fn distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(ai, bi)| (ai - bi).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    /// k nearest rows of `rows` to `rows[point]`, excluding the point itself,
    /// nearest first.
    fn find_neighbors(point: usize, rows: &Array2<f64>, k: usize) -> Vec<usize> {
        let target = rows.row(point);
        let mut heap: BinaryHeap<DistIdx> = BinaryHeap::with_capacity(k + 1);

        for (i, row) in rows.rows().into_iter().enumerate() {
            if i == point {
                continue;
            }
            let dist = Self::distance(target, row);
            if heap.len() < k {
                heap.push(DistIdx(dist, i));
            } else if let Some(&max) = heap.peek() {
                if DistIdx(dist, i) < max {
                    heap.pop();
                    heap.push(DistIdx(dist, i));
                }
            }
        }

        heap.into_sorted_vec().into_iter().map(|DistIdx(_, i)| i).collect()
    }
}

impl Default for SMOTE {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for SMOTE {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(ForestShieldError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if !(self.sampling_strategy > 0.0 && self.sampling_strategy <= 1.0) {
            return Err(ForestShieldError::InvalidParameter {
                name: "sampling_strategy".to_string(),
                value: self.sampling_strategy.to_string(),
                reason: "must be in (0, 1]".to_string(),
            });
        }

        let counts = class_counts(y);
        if counts.len() < 2 {
            return Err(ForestShieldError::DataError(
                "need at least 2 classes to balance".to_string(),
            ));
        }

        let max_count = counts.values().copied().max().unwrap_or(0);
        let mut targets = BTreeMap::new();
        for (&class, &count) in &counts {
            let target = if count == max_count {
                count
            } else {
                ((max_count as f64 * self.sampling_strategy) as usize).max(count)
            };
            if target > count && count < self.k_neighbors + 1 {
                return Err(ForestShieldError::BalanceError {
                    class,
                    count,
                    required: self.k_neighbors + 1,
                });
            }
            targets.insert(class, target);
        }

        self.target_counts = Some(targets);
        Ok(())
    }

    fn resample(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<ResampleResult> {
        let targets = self.target_counts.as_ref().ok_or(ForestShieldError::ModelNotFitted)?;

        let mut rng = match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let indices = class_indices(y);
        let n_features = x.ncols();

        let mut synthetic_x: Vec<f64> = Vec::new();
        let mut synthetic_y: Vec<f64> = Vec::new();
        let mut n_synthetic = BTreeMap::new();

        for (&class, &target_count) in targets {
            let class_idx = indices.get(&class).map(Vec::as_slice).unwrap_or(&[]);
            let n_to_generate = target_count.saturating_sub(class_idx.len());
            n_synthetic.insert(class, n_to_generate);
            if n_to_generate == 0 {
                continue;
            }
            if class_idx.len() < self.k_neighbors + 1 {
                return Err(ForestShieldError::BalanceError {
                    class,
                    count: class_idx.len(),
                    required: self.k_neighbors + 1,
                });
            }

            let class_samples = x.select(ndarray::Axis(0), class_idx);
            let neighbors: Vec<Vec<usize>> = (0..class_samples.nrows())
                .map(|i| Self::find_neighbors(i, &class_samples, self.k_neighbors))
                .collect();

            for _ in 0..n_to_generate {
                let idx = rng.gen_range(0..class_samples.nrows());
                let neighbor = neighbors[idx][rng.gen_range(0..neighbors[idx].len())];
                let gap: f64 = rng.gen();
                let sample = class_samples.row(idx);
                let other = class_samples.row(neighbor);
                synthetic_x.extend(sample.iter().zip(other.iter()).map(|(&p, &n)| p + gap * (n - p)));
                synthetic_y.push(class as f64);
            }

            debug!(class, original = class_idx.len(), generated = n_to_generate, "SMOTE class resampled");
        }

        let n_original = x.nrows();
        let n_total = n_original + synthetic_y.len();
        let result_x = Array2::from_shape_fn((n_total, n_features), |(i, j)| {
            if i < n_original {
                x[[i, j]]
            } else {
                synthetic_x[(i - n_original) * n_features + j]
            }
        });

        let mut all_y: Vec<f64> = y.to_vec();
        all_y.extend_from_slice(&synthetic_y);

        Ok(ResampleResult {
            x: result_x,
            y: Array1::from_vec(all_y),
            n_synthetic,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_imbalanced_data() -> (Array2<f64>, Array1<f64>) {
        // 20 majority around (0, 0), 6 minority around (10, 10)
        let mut data = Vec::new();
        let mut labels = Vec::new();

        for i in 0..20 {
            data.push((i % 5) as f64);
            data.push((i / 5) as f64);
            labels.push(0.0);
        }
        for i in 0..6 {
            data.push(10.0 + (i % 3) as f64);
            data.push(10.0 + (i / 3) as f64);
            labels.push(1.0);
        }

        let x = Array2::from_shape_vec((26, 2), data).unwrap();
        (x, Array1::from_vec(labels))
    }

    #[test]
    fn test_smote_balances_classes() {
        let (x, y) = create_imbalanced_data();
        let mut smote = SMOTE::new().with_k_neighbors(3).with_seed(42);
        let result = smote.fit_resample(&x, &y).unwrap();

        let counts = class_counts(&result.y);
        assert_eq!(counts[&0], 20);
        assert_eq!(counts[&1], 20);
        assert_eq!(result.n_synthetic[&1], 14);
        assert_eq!(result.total_synthetic(), 14);
    }

    #[test]
    fn test_smote_preserves_original() {
        let (x, y) = create_imbalanced_data();
        let mut smote = SMOTE::new().with_k_neighbors(3).with_seed(42);
        let result = smote.fit_resample(&x, &y).unwrap();

        for i in 0..x.nrows() {
            assert_eq!(result.x.row(i), x.row(i));
            assert_eq!(result.y[i], y[i]);
        }
    }

    #[test]
    fn test_synthetic_rows_stay_in_minority_hull() {
        let (x, y) = create_imbalanced_data();
        let mut smote = SMOTE::new().with_k_neighbors(3).with_seed(7);
        let result = smote.fit_resample(&x, &y).unwrap();

        for i in x.nrows()..result.x.nrows() {
            assert_eq!(result.y[i], 1.0);
            assert!((10.0..=12.0).contains(&result.x[[i, 0]]));
            assert!((10.0..=11.0).contains(&result.x[[i, 1]]));
        }
    }

    #[test]
    fn test_partial_sampling_strategy() {
        let (x, y) = create_imbalanced_data();
        let mut smote = SMOTE::new()
            .with_k_neighbors(3)
            .with_sampling_strategy(0.5)
            .with_seed(1);
        let result = smote.fit_resample(&x, &y).unwrap();
        assert_eq!(class_counts(&result.y)[&1], 10);
    }

    #[test]
    fn test_deterministic_given_seed() {
        let (x, y) = create_imbalanced_data();
        let a = SMOTE::new().with_k_neighbors(3).with_seed(9).fit_resample(&x, &y).unwrap();
        let b = SMOTE::new().with_k_neighbors(3).with_seed(9).fit_resample(&x, &y).unwrap();
        assert_eq!(a.x, b.x);
    }

    #[test]
    fn test_minority_too_small_for_neighbourhood() {
        let (x, y) = create_imbalanced_data();
        let mut smote = SMOTE::new().with_k_neighbors(6).with_seed(42);
        match smote.fit_resample(&x, &y) {
            Err(ForestShieldError::BalanceError { class, count, required }) => {
                assert_eq!(class, 1);
                assert_eq!(count, 6);
                assert_eq!(required, 7);
            }
            other => panic!("expected balance error, got {:?}", other.map(|r| r.x.nrows())),
        }
    }

    #[test]
    fn test_single_class_rejected() {
        let x = Array2::zeros((4, 2));
        let y = Array1::zeros(4);
        assert!(SMOTE::new().fit_resample(&x, &y).is_err());
    }
}
