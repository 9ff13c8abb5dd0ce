//! Random Forest implementation

use super::decision_tree::DecisionTree;
use crate::data::class_counts;
use crate::error::{ForestShieldError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Strategy for max features
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    /// Square root of n_features
    Sqrt,
    /// Log2 of n_features
    Log2,
    /// Fraction of n_features
    Fraction(f64),
    /// Fixed number
    Fixed(usize),
    /// All features
    All,
}

impl MaxFeatures {
    pub fn resolve(&self, n_features: usize) -> usize {
        let n = n_features as f64;
        match *self {
            MaxFeatures::Sqrt => n.sqrt().floor() as usize,
            MaxFeatures::Log2 => n.log2().floor() as usize,
            MaxFeatures::Fraction(f) => (n * f).floor() as usize,
            MaxFeatures::Fixed(k) => k,
            MaxFeatures::All => n_features,
        }
        .clamp(1, n_features.max(1))
    }
}

impl fmt::Display for MaxFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxFeatures::Sqrt => write!(f, "sqrt"),
            MaxFeatures::Log2 => write!(f, "log2"),
            MaxFeatures::Fraction(v) => write!(f, "{}", v),
            MaxFeatures::Fixed(k) => write!(f, "{}", k),
            MaxFeatures::All => write!(f, "all"),
        }
    }
}

impl FromStr for MaxFeatures {
    type Err = ForestShieldError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sqrt" => Ok(MaxFeatures::Sqrt),
            "log2" => Ok(MaxFeatures::Log2),
            "all" | "none" => Ok(MaxFeatures::All),
            other => {
                if let Ok(k) = other.parse::<usize>() {
                    Ok(MaxFeatures::Fixed(k))
                } else if let Ok(f) = other.parse::<f64>() {
                    if f > 0.0 && f <= 1.0 {
                        Ok(MaxFeatures::Fraction(f))
                    } else {
                        Err(invalid("max_features", other, "fraction must be in (0, 1]"))
                    }
                } else {
                    Err(invalid("max_features", other, "expected sqrt, log2, all or a number"))
                }
            }
        }
    }
}

/// Class weighting applied through sample weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassWeight {
    /// Every sample weighs 1
    None,
    /// `n_samples / (2 * n_class)`
    #[default]
    Balanced,
}

impl fmt::Display for ClassWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassWeight::None => write!(f, "none"),
            ClassWeight::Balanced => write!(f, "balanced"),
        }
    }
}

impl FromStr for ClassWeight {
    type Err = ForestShieldError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "balanced" => Ok(ClassWeight::Balanced),
            "none" => Ok(ClassWeight::None),
            other => Err(invalid("class_weight", other, "expected balanced or none")),
        }
    }
}

fn invalid(name: &str, value: &str, reason: &str) -> ForestShieldError {
    ForestShieldError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub class_weight: ClassWeight,
    pub bootstrap: bool,
    pub random_state: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            class_weight: ClassWeight::Balanced,
            bootstrap: true,
            random_state: 42,
        }
    }
}

impl ForestParams {
    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_class_weight(mut self, class_weight: ClassWeight) -> Self {
        self.class_weight = class_weight;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(invalid("n_estimators", "0", "must be at least 1"));
        }
        if self.min_samples_split < 2 {
            return Err(invalid(
                "min_samples_split",
                &self.min_samples_split.to_string(),
                "must be at least 2",
            ));
        }
        if self.min_samples_leaf < 1 {
            return Err(invalid("min_samples_leaf", "0", "must be at least 1"));
        }
        if self.max_depth == Some(0) {
            return Err(invalid("max_depth", "0", "must be at least 1"));
        }
        Ok(())
    }
}

/// Random forest producing the probability of the positive class.
///
/// Trees are built in parallel; tree `i` draws from its own `ChaCha8Rng`
/// seeded with `random_state + i`, and probabilities are averaged in tree
/// order, so results do not depend on the thread count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    params: ForestParams,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(ForestParams::default())
    }
}

impl RandomForest {
    pub fn new(params: ForestParams) -> Self {
        Self {
            trees: Vec::new(),
            params,
            n_features: 0,
            feature_importances: None,
        }
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    /// Per-sample weights for the configured class weighting
    fn sample_weights(&self, y: &Array1<f64>) -> Vec<f64> {
        match self.params.class_weight {
            ClassWeight::None => vec![1.0; y.len()],
            ClassWeight::Balanced => {
                let counts = class_counts(y);
                let n = y.len() as f64;
                let n_classes = counts.len() as f64;
                y.iter()
                    .map(|&label| {
                        let count = counts.get(&(label.round() as i64)).copied().unwrap_or(1);
                        n / (n_classes * count as f64)
                    })
                    .collect()
            }
        }
    }

    /// Fit the forest to 0/1 labels
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        self.params.validate()?;
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(ForestShieldError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if let Some(bad) = y.iter().find(|v| **v != 0.0 && **v != 1.0) {
            return Err(ForestShieldError::FitError(format!("labels must be 0 or 1, found {}", bad)));
        }
        let counts = class_counts(y);
        if counts.len() < 2 {
            return Err(ForestShieldError::FitError(format!(
                "training data contains a single class ({} samples)",
                n_samples
            )));
        }

        self.n_features = n_features;
        let max_features = self.params.max_features.resolve(n_features);
        let weights = self.sample_weights(y);
        let params = &self.params;

        let trees: Vec<DecisionTree> = (0..params.n_estimators)
            .into_par_iter()
            .map(|tree_idx| -> Result<DecisionTree> {
                let seed = params.random_state.wrapping_add(tree_idx as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                let sample_indices: Vec<usize> = if params.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };

                let x_boot = x.select(Axis(0), &sample_indices);
                let y_boot = y.select(Axis(0), &sample_indices);
                let w_boot: Vec<f64> = sample_indices.iter().map(|&i| weights[i]).collect();

                let mut tree = DecisionTree::new()
                    .with_min_samples_split(params.min_samples_split)
                    .with_min_samples_leaf(params.min_samples_leaf)
                    .with_max_features(max_features);
                if let Some(d) = params.max_depth {
                    tree = tree.with_max_depth(d);
                }
                tree.fit_weighted(&x_boot, &y_boot, &w_boot, &mut rng)?;
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;
        self.compute_feature_importances();
        Ok(self)
    }

    fn compute_feature_importances(&mut self) {
        let mut total_importances = vec![0.0; self.n_features];
        for tree in &self.trees {
            if let Some(imp) = tree.feature_importances() {
                for (acc, &val) in total_importances.iter_mut().zip(imp.iter()) {
                    *acc += val;
                }
            }
        }

        let total: f64 = total_importances.iter().sum();
        if total > 0.0 {
            for imp in &mut total_importances {
                *imp /= total;
            }
        }
        self.feature_importances = Some(Array1::from_vec(total_importances));
    }

    /// Positive-class probability for each row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.check_fitted(x.ncols())?;
        let proba: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| self.mean_leaf_value(x.row(i)))
            .collect();
        Ok(Array1::from_vec(proba))
    }

    /// Positive-class probability for one row
    pub fn predict_proba_row(&self, row: ArrayView1<f64>) -> Result<f64> {
        self.check_fitted(row.len())?;
        Ok(self.mean_leaf_value(row))
    }

    /// Labels: 1 when the probability is at or above `threshold`
    pub fn predict(&self, x: &Array2<f64>, threshold: f64) -> Result<Array1<f64>> {
        Ok(self.predict_proba(x)?.mapv(|p| if p >= threshold { 1.0 } else { 0.0 }))
    }

    fn mean_leaf_value(&self, row: ArrayView1<f64>) -> f64 {
        let sum: f64 = self
            .trees
            .iter()
            .filter_map(|tree| tree.root())
            .map(|root| DecisionTree::leaf_value(root, row))
            .sum();
        sum / self.trees.len() as f64
    }

    fn check_fitted(&self, width: usize) -> Result<()> {
        if self.trees.is_empty() {
            return Err(ForestShieldError::ModelNotFitted);
        }
        if width != self.n_features {
            return Err(ForestShieldError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", width),
            });
        }
        Ok(())
    }

    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }
}
