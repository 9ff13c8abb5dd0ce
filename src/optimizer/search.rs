//! Cross-validated hyperparameter search over random forests

use super::search_space::{ParameterValue, SearchSpace, TrialParams};
use crate::error::{ForestShieldError, Result};
use crate::training::{
    CVResults, CVSplit, ClassWeight, CrossValidator, ForestParams, MaxFeatures, ModelMetrics,
    RandomForest, ScoringMetric,
};
use ndarray::{Array1, Array2, Axis};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// How candidates are drawn from the search space
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// `n_iter` independent draws
    Randomized { n_iter: usize },
    /// Every grid point
    Grid,
}

impl Default for SearchStrategy {
    fn default() -> Self {
        SearchStrategy::Randomized { n_iter: 20 }
    }
}

/// Result of a single candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: usize,
    pub params: ForestParams,
    pub cv: CVResults,
    pub duration_secs: f64,
}

/// Outcome of a search: every trial plus the refitted winner
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub trials: Vec<TrialResult>,
    pub best_index: usize,
    /// Best configuration refitted on all the data the search saw
    pub best_estimator: RandomForest,
}

impl SearchResult {
    pub fn best_trial(&self) -> &TrialResult {
        &self.trials[self.best_index]
    }

    pub fn best_params(&self) -> &ForestParams {
        &self.trials[self.best_index].params
    }

    pub fn best_score(&self) -> f64 {
        self.trials[self.best_index].cv.mean_score
    }
}

/// Map sampled values onto forest hyperparameters. Parameters absent from
/// the trial keep their defaults.
pub fn forest_params(trial: &TrialParams, seed: u64) -> Result<ForestParams> {
    let mut params = ForestParams::default().with_random_state(seed);
    for (name, value) in trial {
        match name.as_str() {
            "n_estimators" => params.n_estimators = int_value(name, value)?,
            "max_depth" => params.max_depth = Some(int_value(name, value)?),
            "min_samples_split" => params.min_samples_split = int_value(name, value)?,
            "min_samples_leaf" => params.min_samples_leaf = int_value(name, value)?,
            "max_features" => params.max_features = str_value(name, value)?.parse::<MaxFeatures>()?,
            "class_weight" => params.class_weight = str_value(name, value)?.parse::<ClassWeight>()?,
            other => {
                return Err(ForestShieldError::InvalidParameter {
                    name: other.to_string(),
                    value: value.to_string(),
                    reason: "unknown random forest parameter".to_string(),
                })
            }
        }
    }
    params.validate()?;
    Ok(params)
}

fn int_value(name: &str, value: &ParameterValue) -> Result<usize> {
    value
        .as_int()
        .filter(|v| *v >= 0)
        .map(|v| v as usize)
        .ok_or_else(|| ForestShieldError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: "expected a non-negative integer".to_string(),
        })
}

fn str_value<'a>(name: &str, value: &'a ParameterValue) -> Result<&'a str> {
    value.as_string().ok_or_else(|| ForestShieldError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
        reason: "expected a string".to_string(),
    })
}

/// Grid or randomized search with stratified k-fold cross-validation.
///
/// Candidates are evaluated in parallel. The highest mean fold score wins;
/// on equal scores the earliest candidate is kept.
#[derive(Debug, Clone)]
pub struct HyperparameterSearch {
    space: SearchSpace,
    strategy: SearchStrategy,
    cv_folds: usize,
    scoring: ScoringMetric,
    seed: u64,
}

impl HyperparameterSearch {
    pub fn new(space: SearchSpace) -> Self {
        Self {
            space,
            strategy: SearchStrategy::default(),
            cv_folds: 4,
            scoring: ScoringMetric::F1,
            seed: 42,
        }
    }

    pub fn with_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.strategy = strategy;
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

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Candidate configurations in evaluation order
    pub fn candidates(&self) -> Result<Vec<ForestParams>> {
        self.space.validate()?;
        let trials: Vec<TrialParams> = match self.strategy {
            SearchStrategy::Randomized { n_iter } => {
                if n_iter == 0 {
                    return Err(ForestShieldError::ConfigError(
                        "randomized search needs n_iter >= 1".to_string(),
                    ));
                }
                let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.seed);
                (0..n_iter).map(|_| self.space.sample(&mut rng)).collect()
            }
            SearchStrategy::Grid => self.space.grid(),
        };
        trials.iter().map(|t| forest_params(t, self.seed)).collect()
    }

    /// Run the search on `(x, y)` and refit the winner on all of it.
    pub fn run(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<SearchResult> {
        let start = Instant::now();
        let candidates = self.candidates()?;
        let splits = CrossValidator::new(self.cv_folds)
            .with_random_state(self.seed)
            .split(y)?;

        info!(
            candidates = candidates.len(),
            folds = splits.len(),
            scoring = ?self.scoring,
            rows = x.nrows(),
            "Starting hyperparameter search"
        );

        let trials: Vec<TrialResult> = candidates
            .into_par_iter()
            .enumerate()
            .map(|(trial_id, params)| -> Result<TrialResult> {
                let trial_start = Instant::now();
                let cv = self.cross_validate(&params, x, y, &splits)?;
                debug!(
                    trial = trial_id,
                    score = cv.mean_score,
                    std = cv.std_score,
                    n_estimators = params.n_estimators,
                    max_depth = ?params.max_depth,
                    max_features = %params.max_features,
                    "Candidate evaluated"
                );
                Ok(TrialResult {
                    trial_id,
                    params,
                    cv,
                    duration_secs: trial_start.elapsed().as_secs_f64(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut best_index = 0;
        for (i, trial) in trials.iter().enumerate() {
            if trial.cv.mean_score > trials[best_index].cv.mean_score {
                best_index = i;
            }
        }
        let best_params = trials[best_index].params.clone();

        let mut best_estimator = RandomForest::new(best_params.clone());
        best_estimator.fit(x, y)?;

        info!(
            best_trial = best_index,
            best_score = trials[best_index].cv.mean_score,
            n_estimators = best_params.n_estimators,
            max_depth = ?best_params.max_depth,
            min_samples_split = best_params.min_samples_split,
            min_samples_leaf = best_params.min_samples_leaf,
            max_features = %best_params.max_features,
            class_weight = %best_params.class_weight,
            elapsed_secs = start.elapsed().as_secs_f64(),
            "Hyperparameter search complete"
        );

        Ok(SearchResult {
            trials,
            best_index,
            best_estimator,
        })
    }

    fn cross_validate(
        &self,
        params: &ForestParams,
        x: &Array2<f64>,
        y: &Array1<f64>,
        splits: &[CVSplit],
    ) -> Result<CVResults> {
        let mut scores = Vec::with_capacity(splits.len());
        for split in splits {
            let x_train = x.select(Axis(0), &split.train_indices);
            let y_train = y.select(Axis(0), &split.train_indices);
            let x_val = x.select(Axis(0), &split.test_indices);
            let y_val = y.select(Axis(0), &split.test_indices);

            let mut forest = RandomForest::new(params.clone());
            forest.fit(&x_train, &y_train)?;
            let y_pred = forest.predict(&x_val, 0.5)?;
            scores.push(ModelMetrics::from_labels(&y_val, &y_pred).score(self.scoring));
        }
        Ok(CVResults::from_scores(scores))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> (Array2<f64>, Array1<f64>) {
        let n = 60;
        let x = Array2::from_shape_fn((n, 3), |(i, j)| {
            let base = if i % 2 == 0 { 0.0 } else { 3.0 };
            base + ((i * 7 + j * 3) % 10) as f64 / 10.0
        });
        let y = Array1::from_shape_fn(n, |i| (i % 2) as f64);
        (x, y)
    }

    fn small_space() -> SearchSpace {
        SearchSpace::new()
            .int("n_estimators", 5, 10)
            .int_step("max_depth", 2, 4, 2)
            .categorical("max_features", vec!["sqrt", "log2"])
    }

    #[test]
    fn test_forest_params_mapping() {
        let mut trial = TrialParams::new();
        trial.insert("n_estimators".into(), ParameterValue::Int(300));
        trial.insert("max_features".into(), ParameterValue::String("log2".into()));
        let params = forest_params(&trial, 7).unwrap();
        assert_eq!(params.n_estimators, 300);
        assert_eq!(params.max_features, MaxFeatures::Log2);
        assert_eq!(params.random_state, 7);

        trial.insert("learning_rate".into(), ParameterValue::Int(1));
        assert!(forest_params(&trial, 7).is_err());
    }

    #[test]
    fn test_randomized_candidates_deterministic() {
        let search = HyperparameterSearch::new(small_space())
            .with_strategy(SearchStrategy::Randomized { n_iter: 5 })
            .with_seed(3);
        let a = search.candidates().unwrap();
        let b = search.candidates().unwrap();
        assert_eq!(a.len(), 5);
        assert_eq!(a, b);
    }

    #[test]
    fn test_grid_candidates() {
        let search = HyperparameterSearch::new(small_space()).with_strategy(SearchStrategy::Grid);
        // 6 tree counts x 2 depths x 2 feature rules
        assert_eq!(search.candidates().unwrap().len(), 24);
    }

    #[test]
    fn test_search_picks_best_and_refits() {
        let (x, y) = blobs();
        let search = HyperparameterSearch::new(small_space())
            .with_strategy(SearchStrategy::Randomized { n_iter: 3 })
            .with_cv_folds(3)
            .with_seed(11);
        let result = search.run(&x, &y).unwrap();

        assert_eq!(result.trials.len(), 3);
        let best = result.best_score();
        assert!(result.trials.iter().all(|t| t.cv.mean_score <= best));
        // earliest trial wins ties
        let first_best = result.trials.iter().position(|t| t.cv.mean_score == best).unwrap();
        assert_eq!(result.best_index, first_best);
        assert!(result.best_estimator.is_fitted());
        assert_eq!(result.best_estimator.params(), result.best_params());
        assert!(best > 0.9, "separable data should score high, got {}", best);
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let search = HyperparameterSearch::new(small_space())
            .with_strategy(SearchStrategy::Randomized { n_iter: 0 });
        assert!(search.candidates().is_err());
    }
}
