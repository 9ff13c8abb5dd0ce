//! Training pipeline: split, impute, derive, balance, scale, search,
//! evaluate and persist

use super::config::TrainingConfig;
use super::metrics::{FeatureImportance, MetricsRecord, ModelMetrics};
use super::random_forest::RandomForest;
use crate::data::{
    self, class_counts, stratified_indices, LabelSource, LabeledSet, RawColumn, RawDataset,
};
use crate::error::{ForestShieldError, Result};
use crate::export::{ArtifactStore, Manifest};
use crate::feature_engineering::{
    quantile, FeatureDeriver, FeatureSchema, FeatureSet, ThresholdScope, Thresholds,
};
use crate::imputation::{Imputer, MeanImputer};
use crate::optimizer::{HyperparameterSearch, TrialResult};
use crate::preprocessing::StandardScaler;
use crate::synthetic::{Sampler, SMOTE};
use ndarray::{Array1, Axis};
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

/// Oversample the minority class of a training partition with SMOTE.
///
/// Original rows are kept in front; only synthetic rows are appended.
pub fn balance(train: &LabeledSet, k_neighbors: usize, sampling_strategy: f64, seed: u64) -> Result<LabeledSet> {
    let mut smote = SMOTE::new()
        .with_k_neighbors(k_neighbors)
        .with_sampling_strategy(sampling_strategy)
        .with_seed(seed);
    let resampled = smote.fit_resample(&train.x, &train.y)?;

    info!(
        before = ?class_counts(&train.y),
        after = ?class_counts(&resampled.y),
        synthetic = resampled.total_synthetic(),
        "Balanced training partition"
    );
    LabeledSet::new(resampled.x, resampled.y)
}

/// Fit per-feature mean/std on the (balanced) training features.
pub fn fit_scaler(train: &LabeledSet, schema: FeatureSchema) -> Result<StandardScaler> {
    let mut scaler = StandardScaler::new(schema);
    scaler.fit(&train.x)?;
    info!(features = scaler.n_features(), rows = train.n_samples(), "Fitted scaler");
    Ok(scaler)
}

/// Score a fitted forest on the test partition.
///
/// The scaler is applied as fitted; it is never refit on test rows.
pub fn evaluate(
    model: &RandomForest,
    scaler: &StandardScaler,
    test: &LabeledSet,
    threshold: f64,
) -> Result<ModelMetrics> {
    let x = scaler.transform(&test.x)?;
    let proba = model.predict_proba(&x)?;
    let metrics = ModelMetrics::compute(&test.y, &proba, threshold)?;
    if metrics.auc_roc.is_none() {
        warn!(rows = test.n_samples(), "AUC undefined: test partition holds a single class");
    }
    info!(
        accuracy = metrics.accuracy,
        f1 = metrics.f1_score,
        auc = ?metrics.auc_roc,
        threshold,
        "Evaluated on test partition"
    );
    Ok(metrics)
}

/// Raw columns whose missing cells are filled with train means: those the
/// feature set reads, except the precomputed `HEAT_INDEX` / `SOLAR_STRESS`,
/// whose gaps are recomputed from their formulas during derivation.
pub fn imputed_columns(columns: &[RawColumn], feature_set: FeatureSet) -> Vec<RawColumn> {
    let mut read: Vec<RawColumn> = feature_set
        .features(columns)
        .iter()
        .filter_map(|f| f.raw_column())
        .filter(|c| !matches!(c, RawColumn::HeatIndex | RawColumn::SolarStress))
        .collect();
    // the formulas behind the derived features
    read.extend([RawColumn::T2m, RawColumn::Rh2m, RawColumn::AllskySfcSwDwn]);
    columns.iter().copied().filter(|c| read.contains(c)).collect()
}

/// Fit a mean imputer on the train partition and apply it to both.
fn impute(
    train: &RawDataset,
    test: &RawDataset,
    feature_set: FeatureSet,
) -> Result<(RawDataset, RawDataset)> {
    let targets = imputed_columns(train.columns(), feature_set);
    let positions: Vec<usize> = targets
        .iter()
        .filter_map(|c| train.columns().iter().position(|k| k == c))
        .collect();

    let mut imputer = MeanImputer::new();
    imputer
        .fit(&train.values().select(Axis(1), &positions))
        .map_err(|_| {
            let empty: Vec<&str> = positions
                .iter()
                .filter(|&&j| train.values().column(j).iter().all(|v| v.is_nan()))
                .map(|&j| train.columns()[j].name())
                .collect();
            ForestShieldError::DataError(format!(
                "no observed training values to impute {}",
                empty.join(", ")
            ))
        })?;

    let mut missing = 0;
    let mut fill = |part: &RawDataset| -> Result<RawDataset> {
        let filled = imputer.transform(&part.values().select(Axis(1), &positions))?;
        let mut values = part.values().clone();
        for (k, &j) in positions.iter().enumerate() {
            missing += values.column(j).iter().filter(|v| v.is_nan()).count();
            values.column_mut(j).assign(&filled.column(k));
        }
        part.with_values(values)
    };
    let train = fill(train)?;
    let test = fill(test)?;

    if missing > 0 {
        info!(
            imputed = missing,
            columns = ?targets.iter().map(|c| c.name()).collect::<Vec<_>>(),
            "Imputed missing values with train means"
        );
    }
    Ok((train, test))
}

/// Leakage-free feature/label partitions ready for fitting
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub train: LabeledSet,
    pub test: LabeledSet,
    pub schema: FeatureSchema,
    pub thresholds: Thresholds,
    pub feature_set: FeatureSet,
    /// Rows of the source dataset that went into train / test
    pub train_rows: Vec<usize>,
    pub test_rows: Vec<usize>,
}

/// Everything produced by one training run
#[derive(Debug, Clone)]
pub struct TrainingRun {
    pub model: RandomForest,
    pub scaler: StandardScaler,
    pub metrics: MetricsRecord,
    pub trials: Vec<TrialResult>,
    /// Set once the artifacts have been written
    pub manifest: Option<Manifest>,
}

/// Runs the full training pipeline for one [`TrainingConfig`].
#[derive(Debug, Clone)]
pub struct TrainingPipeline {
    config: TrainingConfig,
}

impl TrainingPipeline {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Load `path`, train, evaluate and persist into the configured output directory.
    pub fn run_path(&self, path: impl AsRef<Path>) -> Result<TrainingRun> {
        let dataset = data::load(path)?;
        self.run(&dataset)
    }

    /// Train on `dataset` and persist the artifacts.
    ///
    /// Any failure before evaluation aborts the run and nothing is written.
    pub fn run(&self, dataset: &RawDataset) -> Result<TrainingRun> {
        let start = Instant::now();
        let prepared = self.prepare(dataset)?;
        let mut run = self.fit(&prepared)?;

        self.check_quality(&run.metrics)?;

        let store = ArtifactStore::new(&self.config.output_dir);
        let manifest = store.persist(&run.model, &run.scaler, &run.metrics)?;
        run.manifest = Some(manifest);

        info!(
            output_dir = %self.config.output_dir.display(),
            elapsed_secs = start.elapsed().as_secs_f64(),
            "Training run complete"
        );
        Ok(run)
    }

    /// Split, impute and derive features without touching the test rows
    /// for any fitted statistic (except thresholds under `FullDataset`).
    pub fn prepare(&self, dataset: &RawDataset) -> Result<PreparedData> {
        let config = &self.config;
        config.validate()?;

        let (dataset, dropped) = dataset.clone().drop_unlabeled();
        if dropped > 0 {
            warn!(dropped, "Dropped rows without a label");
        }

        // Stratification key. Fire-size labels use the full-data quantile
        // here only to assign partitions; final labels are refit below.
        let strat_key: Array1<f64> = match dataset.labels() {
            LabelSource::Occurred(flags) => flags.clone(),
            LabelSource::FireSize(sizes) => {
                let cut = quantile(sizes.iter(), config.label_quantile)?;
                sizes.mapv(|v| if v >= cut { 1.0 } else { 0.0 })
            }
        };
        let indices = stratified_indices(&strat_key, config.test_fraction, config.seed)?;
        info!(train = indices.train.len(), test = indices.test.len(), "Split dataset");

        let train_raw = dataset.select_rows(&indices.train);
        let test_raw = dataset.select_rows(&indices.test);

        let (train_raw, test_raw) = impute(&train_raw, &test_raw, config.feature_set)?;

        let mut deriver =
            FeatureDeriver::new(config.feature_set).with_label_quantile(config.label_quantile);
        match config.threshold_scope {
            ThresholdScope::TrainOnly => deriver.fit(&train_raw)?,
            ThresholdScope::FullDataset => {
                warn!("Fitting quantile thresholds on the full dataset; test rows leak into labels and indicators");
                deriver.fit(&dataset)?;
            }
        }

        let (x_train, y_train) = deriver.derive(&train_raw)?;
        let (x_test, y_test) = deriver.derive(&test_raw)?;
        let schema = deriver.schema()?;
        let thresholds = deriver.thresholds().cloned().unwrap_or_default();

        info!(
            features = schema.len(),
            train_classes = ?class_counts(&y_train),
            test_classes = ?class_counts(&y_test),
            "Derived features"
        );

        Ok(PreparedData {
            train: LabeledSet::new(x_train, y_train)?,
            test: LabeledSet::new(x_test, y_test)?,
            schema,
            thresholds,
            feature_set: config.feature_set,
            train_rows: indices.train,
            test_rows: indices.test,
        })
    }

    /// Balance, scale, search and evaluate. Evaluation failures are recorded
    /// in the metrics record instead of failing the run.
    pub fn fit(&self, prepared: &PreparedData) -> Result<TrainingRun> {
        let config = &self.config;

        let balanced = balance(
            &prepared.train,
            config.smote_k_neighbors,
            config.sampling_strategy,
            config.seed,
        )?;
        let scaler = fit_scaler(&balanced, prepared.schema.clone())?;
        let x_scaled = scaler.transform(&balanced.x)?;

        let search = HyperparameterSearch::new(config.search_space.clone())
            .with_strategy(config.search.clone())
            .with_cv_folds(config.cv_folds)
            .with_scoring(config.scoring)
            .with_seed(config.seed)
            .run(&x_scaled, &balanced.y)?;

        let best = search.best_trial().clone();
        let model = search.best_estimator;

        let (test_metrics, evaluation_error) =
            match evaluate(&model, &scaler, &prepared.test, config.decision_threshold) {
                Ok(m) => (Some(m), None),
                Err(e) => {
                    warn!(error = %e, "Evaluation failed; artifacts are still persisted");
                    (None, Some(e.to_string()))
                }
            };

        let mut feature_importances: Vec<FeatureImportance> = match model.feature_importances() {
            Some(imp) => prepared
                .schema
                .names()
                .iter()
                .zip(imp.iter())
                .map(|(name, &importance)| FeatureImportance {
                    feature: name.clone(),
                    importance,
                })
                .collect(),
            None => Vec::new(),
        };
        feature_importances.sort_by(|a, b| b.importance.total_cmp(&a.importance));

        let metrics = MetricsRecord {
            report: test_metrics
                .as_ref()
                .map(ModelMetrics::classification_report)
                .unwrap_or_default(),
            test: test_metrics,
            evaluation_error,
            best_params: best.params.clone(),
            scoring: config.scoring,
            cv_score: best.cv.mean_score,
            cv_std: best.cv.std_score,
            feature_set: prepared.feature_set,
            features: prepared.schema.names().to_vec(),
            feature_importances,
            thresholds: prepared.thresholds.clone(),
            n_train: prepared.train.n_samples(),
            n_train_balanced: balanced.n_samples(),
            n_test: prepared.test.n_samples(),
            created_at: chrono::Utc::now(),
        };

        Ok(TrainingRun {
            model,
            scaler,
            metrics,
            trials: search.trials,
            manifest: None,
        })
    }

    fn check_quality(&self, metrics: &MetricsRecord) -> Result<()> {
        let Some(min_auc) = self.config.min_auc_to_persist else {
            return Ok(());
        };
        match metrics.auc_roc() {
            Some(auc) if auc >= min_auc => Ok(()),
            Some(auc) => Err(ForestShieldError::FitError(format!(
                "test AUC {:.3} is below the persistence minimum {:.3}",
                auc, min_auc
            ))),
            None => Err(ForestShieldError::FitError(format!(
                "test AUC unavailable; persistence requires at least {:.3}",
                min_auc
            ))),
        }
    }
}
