//! Integration test: nothing fitted on the training partition sees test rows

mod common;

use common::{quick_config, write_fire_size_csv, write_occurred_csv};
use forestshield::data::{self, class_counts, RawColumn};
use forestshield::feature_engineering::{quantile, FeatureSet, ThresholdScope};
use forestshield::training::{balance, fit_scaler, TrainingPipeline};

#[test]
fn test_scaler_ignores_test_rows() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = data::load(write_occurred_csv(dir.path(), 200)).unwrap();
    let pipeline = TrainingPipeline::new(quick_config(dir.path()));
    let prepared = pipeline.prepare(&dataset).unwrap();
    let balanced = balance(&prepared.train, 5, 1.0, 42).unwrap();
    let scaler = fit_scaler(&balanced, prepared.schema.clone()).unwrap();

    // rewrite every raw value of the test rows; labels stay, so the split does too
    let mut values = dataset.values().clone();
    for &row in &prepared.test_rows {
        values.row_mut(row).mapv_inplace(|v| v * 3.0 + 50.0);
    }
    let altered = dataset.with_values(values).unwrap();

    let prepared_again = pipeline.prepare(&altered).unwrap();
    assert_eq!(prepared_again.test_rows, prepared.test_rows);
    assert_ne!(prepared_again.test.x, prepared.test.x);
    assert_eq!(prepared_again.train.x, prepared.train.x);

    let balanced_again = balance(&prepared_again.train, 5, 1.0, 42).unwrap();
    let scaler_again = fit_scaler(&balanced_again, prepared_again.schema.clone()).unwrap();
    assert_eq!(scaler, scaler_again);
}

#[test]
fn test_balancing_only_touches_train() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = data::load(write_occurred_csv(dir.path(), 200)).unwrap();
    let prepared = TrainingPipeline::new(quick_config(dir.path())).prepare(&dataset).unwrap();

    let test_before = class_counts(&prepared.test.y);
    let train_before = class_counts(&prepared.train.y);
    let balanced = balance(&prepared.train, 5, 1.0, 42).unwrap();
    let train_after = class_counts(&balanced.y);

    assert_eq!(class_counts(&prepared.test.y), test_before);
    for (class, count) in &train_before {
        assert!(train_after[class] >= *count, "class {} shrank", class);
    }
    assert_eq!(train_after[&0], train_after[&1]);
}

#[test]
fn test_label_threshold_fitted_on_train_only() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = data::load(write_fire_size_csv(dir.path(), 200)).unwrap();
    let config = quick_config(dir.path()).with_feature_set(FeatureSet::ExtendedWithIndicators);
    let prepared = TrainingPipeline::new(config.clone()).prepare(&dataset).unwrap();

    let train_raw = dataset.select_rows(&prepared.train_rows);
    let expected_label = quantile(train_raw.labels().values().iter(), 0.6).unwrap();
    let expected_high_temp =
        quantile(train_raw.column(RawColumn::T2m).unwrap().iter(), 0.75).unwrap();

    assert_eq!(prepared.thresholds.label, Some(expected_label));
    assert_eq!(prepared.thresholds.high_temp, Some(expected_high_temp));

    // the leaking variant uses every row
    let full = TrainingPipeline::new(config.with_threshold_scope(ThresholdScope::FullDataset))
        .prepare(&dataset)
        .unwrap();
    let expected_full = quantile(dataset.labels().values().iter(), 0.6).unwrap();
    assert_eq!(full.thresholds.label, Some(expected_full));
}

#[test]
fn test_missing_values_use_train_mean() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = data::load(write_occurred_csv(dir.path(), 200)).unwrap();
    assert!(dataset.column(RawColumn::T2m).unwrap()[3].is_nan());

    let prepared = TrainingPipeline::new(quick_config(dir.path())).prepare(&dataset).unwrap();
    let train_t2m = dataset.select_rows(&prepared.train_rows);
    let observed: Vec<f64> = train_t2m
        .column(RawColumn::T2m)
        .unwrap()
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .collect();
    let train_mean = observed.iter().sum::<f64>() / observed.len() as f64;

    // T2M is the second feature
    let imputed = match prepared.test_rows.iter().position(|&r| r == 3) {
        Some(pos) => prepared.test.x[[pos, 1]],
        None => {
            let pos = prepared.train_rows.iter().position(|&r| r == 3).unwrap();
            prepared.train.x[[pos, 1]]
        }
    };
    assert!((imputed - train_mean).abs() < 1e-9);
}

#[test]
fn test_split_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = data::load(write_occurred_csv(dir.path(), 200)).unwrap();
    let pipeline = TrainingPipeline::new(quick_config(dir.path()));
    let a = pipeline.prepare(&dataset).unwrap();
    let b = pipeline.prepare(&dataset).unwrap();
    assert_eq!(a.train_rows, b.train_rows);
    assert_eq!(a.test_rows, b.test_rows);
    assert_eq!(a.train.x, b.train.x);
}
