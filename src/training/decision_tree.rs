//! Binary CART classifier

use crate::error::{ForestShieldError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node holding the weighted fraction of positive samples
    Leaf {
        value: f64,
        n_samples: usize,
    },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

/// Weighted class totals of a node
#[derive(Debug, Clone, Copy, Default)]
struct ClassWeights {
    neg: f64,
    pos: f64,
}

impl ClassWeights {
    fn add(&mut self, label: f64, weight: f64) {
        if label >= 0.5 {
            self.pos += weight;
        } else {
            self.neg += weight;
        }
    }

    fn total(&self) -> f64 {
        self.neg + self.pos
    }

    fn gini(&self) -> f64 {
        let total = self.total();
        if total <= 0.0 {
            return 0.0;
        }
        let p = self.pos / total;
        let q = self.neg / total;
        1.0 - p * p - q * q
    }

    fn positive_fraction(&self) -> f64 {
        let total = self.total();
        if total <= 0.0 { 0.0 } else { self.pos / total }
    }
}

/// Gini decision tree for 0/1 labels.
///
/// Each split considers a fresh random subset of `max_features` features.
/// Leaves predict the probability of the positive class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; all when `None`
    pub max_features: Option<usize>,
    pub random_state: Option<u64>,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTree {
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            random_state: None,
            n_features: 0,
            feature_importances: None,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Fit with unit sample weights
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let weights = vec![1.0; y.len()];
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(0));
        self.fit_weighted(x, y, &weights, &mut rng)
    }

    /// Fit with per-sample weights, drawing split feature subsets from `rng`.
    pub fn fit_weighted(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        sample_weight: &[f64],
        rng: &mut ChaCha8Rng,
    ) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() || n_samples != sample_weight.len() {
            return Err(ForestShieldError::ShapeError {
                expected: format!("{} labels and weights", n_samples),
                actual: format!("{} labels, {} weights", y.len(), sample_weight.len()),
            });
        }
        if n_samples == 0 || n_features == 0 {
            return Err(ForestShieldError::FitError("cannot fit a tree on empty data".to_string()));
        }

        self.n_features = n_features;
        let mut importances = vec![0.0; n_features];
        let indices: Vec<usize> = (0..n_samples).collect();
        let builder = Builder {
            tree: self,
            x,
            y,
            w: sample_weight,
        };
        let root = builder.build(&indices, 0, rng, &mut importances);

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.root = Some(root);
        self.feature_importances = Some(Array1::from_vec(importances));
        Ok(self)
    }

    /// Positive-class probability for each row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(ForestShieldError::ModelNotFitted)?;
        self.check_width(x.ncols())?;
        Ok(x.rows().into_iter().map(|row| Self::leaf_value(root, row)).collect())
    }

    /// Positive-class probability for one row
    pub fn predict_proba_row(&self, row: ArrayView1<f64>) -> Result<f64> {
        let root = self.root.as_ref().ok_or(ForestShieldError::ModelNotFitted)?;
        self.check_width(row.len())?;
        Ok(Self::leaf_value(root, row))
    }

    pub(crate) fn leaf_value(mut node: &TreeNode, row: ArrayView1<f64>) -> f64 {
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                    node = if row[*feature_idx] <= *threshold { left } else { right };
                }
            }
        }
    }

    pub(crate) fn root(&self) -> Option<&TreeNode> {
        self.root.as_ref()
    }

    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn get_depth(&self) -> usize {
        fn depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => 1 + depth(left).max(depth(right)),
            }
        }
        self.root.as_ref().map_or(0, depth)
    }

    pub fn get_n_leaves(&self) -> usize {
        fn leaves(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => leaves(left) + leaves(right),
            }
        }
        self.root.as_ref().map_or(0, leaves)
    }

    fn check_width(&self, actual: usize) -> Result<()> {
        if actual != self.n_features {
            return Err(ForestShieldError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", actual),
            });
        }
        Ok(())
    }
}

struct Builder<'a> {
    tree: &'a DecisionTree,
    x: &'a Array2<f64>,
    y: &'a Array1<f64>,
    w: &'a [f64],
}

struct BestSplit {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
}

impl Builder<'_> {
    fn totals(&self, indices: &[usize]) -> ClassWeights {
        let mut totals = ClassWeights::default();
        for &i in indices {
            totals.add(self.y[i], self.w[i]);
        }
        totals
    }

    fn build(
        &self,
        indices: &[usize],
        depth: usize,
        rng: &mut ChaCha8Rng,
        importances: &mut [f64],
    ) -> TreeNode {
        let n_samples = indices.len();
        let totals = self.totals(indices);
        let impurity = totals.gini();
        let leaf = TreeNode::Leaf {
            value: totals.positive_fraction(),
            n_samples,
        };

        let should_stop = n_samples < self.tree.min_samples_split
            || n_samples < 2 * self.tree.min_samples_leaf
            || self.tree.max_depth.map_or(false, |d| depth >= d)
            || impurity <= 0.0;
        if should_stop {
            return leaf;
        }

        let Some(best) = self.find_best_split(indices, &totals, rng) else {
            return leaf;
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.x[[i, best.feature_idx]] <= best.threshold);

        importances[best.feature_idx] += totals.total() * best.gain;

        let left = Box::new(self.build(&left_indices, depth + 1, rng, importances));
        let right = Box::new(self.build(&right_indices, depth + 1, rng, importances));

        TreeNode::Split {
            feature_idx: best.feature_idx,
            threshold: best.threshold,
            left,
            right,
            n_samples,
            impurity,
        }
    }

    /// Best Gini split over a random feature subset; single sorted sweep per feature.
    fn find_best_split(
        &self,
        indices: &[usize],
        totals: &ClassWeights,
        rng: &mut ChaCha8Rng,
    ) -> Option<BestSplit> {
        let n_features = self.x.ncols();
        let k = self.tree.max_features.unwrap_or(n_features).min(n_features);
        let candidates = sample(rng, n_features, k).into_vec();

        let parent_impurity = totals.gini();
        let parent_weight = totals.total();
        let min_leaf = self.tree.min_samples_leaf;
        let mut best: Option<BestSplit> = None;

        let mut order: Vec<usize> = indices.to_vec();
        for feature_idx in candidates {
            order.sort_by(|&a, &b| self.x[[a, feature_idx]].total_cmp(&self.x[[b, feature_idx]]));

            let mut left = ClassWeights::default();
            for pos in 0..order.len() - 1 {
                let i = order[pos];
                left.add(self.y[i], self.w[i]);

                let n_left = pos + 1;
                let n_right = order.len() - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }
                let value = self.x[[i, feature_idx]];
                let next = self.x[[order[pos + 1], feature_idx]];
                if next <= value {
                    continue;
                }

                let right = ClassWeights {
                    neg: totals.neg - left.neg,
                    pos: totals.pos - left.pos,
                };
                let weighted = (left.total() * left.gini() + right.total() * right.gini()) / parent_weight;
                let gain = parent_impurity - weighted;

                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    let mut threshold = (value + next) / 2.0;
                    if threshold >= next {
                        threshold = value;
                    }
                    best = Some(BestSplit {
                        feature_idx,
                        threshold,
                        gain,
                    });
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classifier_simple() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();

        let proba = tree.predict_proba(&x).unwrap();
        assert_eq!(proba.to_vec(), vec![0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_max_depth() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0]];
        let y = array![0.0, 1.0, 0.0, 1.0];

        let mut tree = DecisionTree::new().with_max_depth(2);
        tree.fit(&x, &y).unwrap();
        assert!(tree.get_depth() <= 3);
    }

    #[test]
    fn test_min_samples_leaf() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = array![0.0, 1.0, 1.0, 1.0, 1.0, 1.0];

        let mut tree = DecisionTree::new().with_min_samples_leaf(3);
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.get_n_leaves(), 2);
        let proba = tree.predict_proba_row(array![1.0].view()).unwrap();
        assert!((proba - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_sample_weights_shift_leaf_probability() {
        let x = array![[0.0], [0.0], [0.0], [0.0]];
        let y = array![0.0, 0.0, 0.0, 1.0];
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let mut tree = DecisionTree::new();
        tree.fit_weighted(&x, &y, &[1.0, 1.0, 1.0, 3.0], &mut rng).unwrap();
        assert_eq!(tree.predict_proba_row(array![0.0].view()).unwrap(), 0.5);
    }

    #[test]
    fn test_feature_importances() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();

        let importances = tree.feature_importances().unwrap();
        assert_eq!(importances[0], 1.0);
        assert_eq!(importances[1], 0.0);
    }

    #[test]
    fn test_width_mismatch() {
        let mut tree = DecisionTree::new();
        tree.fit(&array![[0.0, 1.0], [1.0, 0.0]], &array![0.0, 1.0]).unwrap();
        assert!(tree.predict_proba_row(array![1.0].view()).is_err());
    }

    #[test]
    fn test_predict_before_fit() {
        let tree = DecisionTree::new();
        assert!(matches!(
            tree.predict_proba(&array![[1.0]]),
            Err(ForestShieldError::ModelNotFitted)
        ));
    }
}
