//! Stratified train/test partitioning

use super::class_indices;
use crate::error::{ForestShieldError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Feature matrix with its binary labels
#[derive(Debug, Clone)]
pub struct LabeledSet {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
}

impl LabeledSet {
    pub fn new(x: Array2<f64>, y: Array1<f64>) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(ForestShieldError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        Ok(Self { x, y })
    }

    pub fn n_samples(&self) -> usize {
        self.y.len()
    }

    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            x: self.x.select(Axis(0), indices),
            y: self.y.select(Axis(0), indices),
        }
    }
}

/// Disjoint row indices of the two partitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Stratified random split of row indices; deterministic given `seed`.
///
/// Every class keeps at least one sample on each side.
pub fn stratified_indices(y: &Array1<f64>, test_fraction: f64, seed: u64) -> Result<SplitIndices> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(ForestShieldError::InvalidParameter {
            name: "test_fraction".to_string(),
            value: test_fraction.to_string(),
            reason: "must be in (0, 1)".to_string(),
        });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(y.len());
    let mut test = Vec::new();

    for (class, mut indices) in class_indices(y) {
        if indices.len() < 2 {
            return Err(ForestShieldError::DataError(format!(
                "class {} has {} sample(s), need at least 2 to stratify",
                class,
                indices.len()
            )));
        }
        indices.shuffle(&mut rng);
        let n_test = ((indices.len() as f64 * test_fraction).round() as usize)
            .clamp(1, indices.len() - 1);
        test.extend_from_slice(&indices[..n_test]);
        train.extend_from_slice(&indices[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok(SplitIndices { train, test })
}

/// Stratified split of a feature matrix and its labels into (train, test).
pub fn split(
    x: &Array2<f64>,
    y: &Array1<f64>,
    test_fraction: f64,
    seed: u64,
) -> Result<(LabeledSet, LabeledSet)> {
    let data = LabeledSet::new(x.clone(), y.clone())?;
    let indices = stratified_indices(y, test_fraction, seed)?;
    Ok((data.select(&indices.train), data.select(&indices.test)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::class_counts;

    fn labels() -> Array1<f64> {
        Array1::from_iter((0..100).map(|i| if i % 4 == 0 { 1.0 } else { 0.0 }))
    }

    #[test]
    fn test_disjoint_and_complete() {
        let y = labels();
        let split = stratified_indices(&y, 0.2, 42).unwrap();
        assert_eq!(split.train.len() + split.test.len(), 100);
        for idx in &split.test {
            assert!(!split.train.contains(idx));
        }
    }

    #[test]
    fn test_preserves_class_ratio() {
        let y = labels();
        let split = stratified_indices(&y, 0.2, 42).unwrap();
        let test_y = y.select(Axis(0), &split.test);
        let counts = class_counts(&test_y);
        assert_eq!(counts[&1], 5);
        assert_eq!(counts[&0], 15);
    }

    #[test]
    fn test_deterministic_given_seed() {
        let y = labels();
        let a = stratified_indices(&y, 0.2, 7).unwrap();
        let b = stratified_indices(&y, 0.2, 7).unwrap();
        let c = stratified_indices(&y, 0.2, 8).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_rejects_singleton_class() {
        let y = Array1::from_vec(vec![0.0, 0.0, 0.0, 1.0]);
        assert!(stratified_indices(&y, 0.25, 1).is_err());
    }

    #[test]
    fn test_split_matrix() {
        let y = labels();
        let x = Array2::from_shape_fn((100, 2), |(i, j)| (i * 2 + j) as f64);
        let (train, test) = split(&x, &y, 0.25, 3).unwrap();
        assert_eq!(train.n_samples(), 75);
        assert_eq!(test.n_samples(), 25);
        assert_eq!(train.x.ncols(), 2);
    }
}
