//! Training configuration

use crate::error::{ForestShieldError, Result};
use crate::feature_engineering::{FeatureSet, ThresholdScope};
use crate::optimizer::{SearchSpace, SearchStrategy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Metric maximised by the hyperparameter search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMetric {
    /// F1 of the positive (fire) class
    #[default]
    F1,
    Accuracy,
}

impl std::str::FromStr for ScoringMetric {
    type Err = ForestShieldError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "f1" => Ok(ScoringMetric::F1),
            "accuracy" => Ok(ScoringMetric::Accuracy),
            other => Err(ForestShieldError::ConfigError(format!("unknown scoring metric '{}'", other))),
        }
    }
}

/// Configuration for a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Which derived features feed the model
    pub feature_set: FeatureSet,

    /// Partition that quantile thresholds are computed on
    pub threshold_scope: ThresholdScope,

    /// Quantile of FIRE_SIZE above which a row is labelled as a fire
    pub label_quantile: f64,

    /// Fraction of rows held out for the test partition
    pub test_fraction: f64,

    /// Random seed for split, balancing, folds and search
    pub seed: u64,

    /// Neighbourhood size for SMOTE interpolation
    pub smote_k_neighbors: usize,

    /// Target minority/majority ratio after balancing
    pub sampling_strategy: f64,

    /// Number of cross-validation folds
    pub cv_folds: usize,

    /// Metric to optimize
    pub scoring: ScoringMetric,

    pub search: SearchStrategy,

    pub search_space: SearchSpace,

    /// Probability at or above which a record is classified as fire risk
    pub decision_threshold: f64,

    /// Skip persistence when test AUC falls below this value
    pub min_auc_to_persist: Option<f64>,

    /// Directory receiving the artifacts
    pub output_dir: PathBuf,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            feature_set: FeatureSet::Core,
            threshold_scope: ThresholdScope::TrainOnly,
            label_quantile: 0.6,
            test_fraction: 0.2,
            seed: 42,
            smote_k_neighbors: 5,
            sampling_strategy: 1.0,
            cv_folds: 4,
            scoring: ScoringMetric::F1,
            search: SearchStrategy::default(),
            search_space: SearchSpace::default(),
            decision_threshold: 0.5,
            min_auc_to_persist: None,
            output_dir: PathBuf::from("./outputs_forestshield"),
        }
    }
}

impl TrainingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a JSON config; absent keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ForestShieldError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| ForestShieldError::ConfigError(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_feature_set(mut self, feature_set: FeatureSet) -> Self {
        self.feature_set = feature_set;
        self
    }

    pub fn with_threshold_scope(mut self, scope: ThresholdScope) -> Self {
        self.threshold_scope = scope;
        self
    }

    pub fn with_label_quantile(mut self, q: f64) -> Self {
        self.label_quantile = q;
        self
    }

    pub fn with_test_fraction(mut self, fraction: f64) -> Self {
        self.test_fraction = fraction;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_smote_k_neighbors(mut self, k: usize) -> Self {
        self.smote_k_neighbors = k;
        self
    }

    pub fn with_sampling_strategy(mut self, ratio: f64) -> Self {
        self.sampling_strategy = ratio;
        self
    }

    pub fn with_cv_folds(mut self, folds: usize) -> Self {
        self.cv_folds = folds;
        self
    }

    pub fn with_scoring(mut self, scoring: ScoringMetric) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_search(mut self, search: SearchStrategy) -> Self {
        self.search = search;
        self
    }

    pub fn with_search_space(mut self, space: SearchSpace) -> Self {
        self.search_space = space;
        self
    }

    pub fn with_decision_threshold(mut self, threshold: f64) -> Self {
        self.decision_threshold = threshold;
        self
    }

    pub fn with_min_auc_to_persist(mut self, min_auc: f64) -> Self {
        self.min_auc_to_persist = Some(min_auc);
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        let err = |msg: String| Err(ForestShieldError::ConfigError(msg));

        if !(self.label_quantile > 0.0 && self.label_quantile < 1.0) {
            return err(format!("label_quantile must be in (0, 1), got {}", self.label_quantile));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return err(format!("test_fraction must be in (0, 1), got {}", self.test_fraction));
        }
        if self.smote_k_neighbors == 0 {
            return err("smote_k_neighbors must be at least 1".to_string());
        }
        if !(self.sampling_strategy > 0.0 && self.sampling_strategy <= 1.0) {
            return err(format!(
                "sampling_strategy must be in (0, 1], got {}",
                self.sampling_strategy
            ));
        }
        if self.cv_folds < 2 {
            return err(format!("cv_folds must be at least 2, got {}", self.cv_folds));
        }
        if let SearchStrategy::Randomized { n_iter: 0 } = self.search {
            return err("randomized search needs n_iter >= 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.decision_threshold) {
            return err(format!(
                "decision_threshold must be in [0, 1], got {}",
                self.decision_threshold
            ));
        }
        if let Some(min_auc) = self.min_auc_to_persist {
            if !(0.0..=1.0).contains(&min_auc) {
                return err(format!("min_auc_to_persist must be in [0, 1], got {}", min_auc));
            }
        }
        self.search_space
            .validate()
            .map_err(|e| ForestShieldError::ConfigError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_valid() {
        let config = TrainingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cv_folds, 4);
        assert_eq!(config.search, SearchStrategy::Randomized { n_iter: 20 });
        assert_eq!(config.threshold_scope, ThresholdScope::TrainOnly);
        assert!(config.min_auc_to_persist.is_none());
    }

    #[test]
    fn test_builder_and_validation() {
        let config = TrainingConfig::new().with_cv_folds(1);
        assert!(matches!(config.validate(), Err(ForestShieldError::ConfigError(_))));

        let config = TrainingConfig::new().with_test_fraction(1.0);
        assert!(config.validate().is_err());

        let config = TrainingConfig::new()
            .with_decision_threshold(0.35)
            .with_scoring(ScoringMetric::Accuracy);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"feature_set": "extended", "decision_threshold": 0.35, "search": "grid"}}"#
        )
        .unwrap();

        let config = TrainingConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.feature_set, FeatureSet::Extended);
        assert_eq!(config.decision_threshold, 0.35);
        assert_eq!(config.search, SearchStrategy::Grid);
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn test_scoring_from_str() {
        assert_eq!("F1".parse::<ScoringMetric>().unwrap(), ScoringMetric::F1);
        assert!("roc".parse::<ScoringMetric>().is_err());
    }
}
