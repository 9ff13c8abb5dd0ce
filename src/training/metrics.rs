//! Binary classification metrics and the persisted metrics record

use super::config::ScoringMetric;
use super::random_forest::ForestParams;
use crate::error::{ForestShieldError, Result};
use crate::feature_engineering::{FeatureSet, Thresholds};
use chrono::{DateTime, Utc};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Metrics for one evaluated partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f64,
    /// Precision of the positive class
    pub precision: f64,
    /// Recall of the positive class
    pub recall: f64,
    /// F1 of the positive class
    pub f1_score: f64,
    /// `None` when only one class is present
    pub auc_roc: Option<f64>,
    /// `[[tn, fp], [fn, tp]]`
    pub confusion_matrix: [[usize; 2]; 2],
    /// Samples per class `[negatives, positives]`
    pub support: [usize; 2],
    /// Decision threshold used for the labels
    pub threshold: f64,
    pub n_samples: usize,
}

impl ModelMetrics {
    /// Metrics from true labels and positive-class probabilities.
    pub fn compute(y_true: &Array1<f64>, y_prob: &Array1<f64>, threshold: f64) -> Result<Self> {
        if y_true.len() != y_prob.len() {
            return Err(ForestShieldError::ShapeError {
                expected: format!("{} probabilities", y_true.len()),
                actual: format!("{} probabilities", y_prob.len()),
            });
        }
        if y_true.is_empty() {
            return Err(ForestShieldError::InvalidInput("cannot evaluate zero samples".to_string()));
        }

        let y_pred = y_prob.mapv(|p| if p >= threshold { 1.0 } else { 0.0 });
        let mut metrics = Self::from_labels(y_true, &y_pred);
        metrics.auc_roc = roc_auc(y_true, y_prob);
        metrics.threshold = threshold;
        Ok(metrics)
    }

    /// Metrics from hard labels only; AUC is left unset.
    pub fn from_labels(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        let mut cm = [[0usize; 2]; 2];
        for (t, p) in y_true.iter().zip(y_pred.iter()) {
            let actual = usize::from(*t >= 0.5);
            let predicted = usize::from(*p >= 0.5);
            cm[actual][predicted] += 1;
        }
        let [[tn, fp], [fn_, tp]] = cm;
        let n = tn + fp + fn_ + tp;

        let ratio = |num: usize, den: usize| if den > 0 { num as f64 / den as f64 } else { 0.0 };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            accuracy: ratio(tp + tn, n),
            precision,
            recall,
            f1_score,
            auc_roc: None,
            confusion_matrix: cm,
            support: [tn + fp, fn_ + tp],
            threshold: 0.5,
            n_samples: n,
        }
    }

    pub fn score(&self, metric: ScoringMetric) -> f64 {
        match metric {
            ScoringMetric::F1 => self.f1_score,
            ScoringMetric::Accuracy => self.accuracy,
        }
    }

    /// Plain-text per-class report
    pub fn classification_report(&self) -> String {
        let [[tn, fp], [fn_, tp]] = self.confusion_matrix;
        let ratio = |num: usize, den: usize| if den > 0 { num as f64 / den as f64 } else { 0.0 };
        let f1 = |p: f64, r: f64| if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };

        let neg_precision = ratio(tn, tn + fn_);
        let neg_recall = ratio(tn, tn + fp);

        let mut out = String::new();
        let _ = writeln!(out, "{:>14} {:>10} {:>10} {:>10} {:>10}", "", "precision", "recall", "f1-score", "support");
        let _ = writeln!(
            out,
            "{:>14} {:>10.3} {:>10.3} {:>10.3} {:>10}",
            "no fire (0)",
            neg_precision,
            neg_recall,
            f1(neg_precision, neg_recall),
            self.support[0]
        );
        let _ = writeln!(
            out,
            "{:>14} {:>10.3} {:>10.3} {:>10.3} {:>10}",
            "fire (1)", self.precision, self.recall, self.f1_score, self.support[1]
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "{:>14} {:>32.3} {:>10}", "accuracy", self.accuracy, self.n_samples);
        match self.auc_roc {
            Some(auc) => {
                let _ = writeln!(out, "{:>14} {:>32.3}", "roc auc", auc);
            }
            None => {
                let _ = writeln!(out, "{:>14} {:>32}", "roc auc", "n/a");
            }
        }
        let _ = writeln!(out, "confusion matrix [[tn, fp], [fn, tp]]: [[{}, {}], [{}, {}]]", tn, fp, fn_, tp);
        out
    }
}

/// Area under the ROC curve via the rank statistic, ties averaged.
/// `None` when `y_true` holds a single class.
pub fn roc_auc(y_true: &Array1<f64>, scores: &Array1<f64>) -> Option<f64> {
    let n = y_true.len();
    let n_pos = y_true.iter().filter(|&&t| t >= 0.5).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 || scores.len() != n {
        return None;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // 1-based average rank of the tie group
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = rank;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = (0..n).filter(|&k| y_true[k] >= 0.5).map(|k| ranks[k]).sum();
    let u = pos_rank_sum - (n_pos * (n_pos + 1)) as f64 / 2.0;
    Some(u / (n_pos * n_neg) as f64)
}

/// Named feature importance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Read-only summary of one training run, persisted as `metrics.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsRecord {
    /// Test-set metrics; absent when evaluation failed
    pub test: Option<ModelMetrics>,
    /// Why evaluation failed, if it did
    pub evaluation_error: Option<String>,
    pub best_params: ForestParams,
    pub scoring: ScoringMetric,
    pub cv_score: f64,
    pub cv_std: f64,
    pub feature_set: FeatureSet,
    pub features: Vec<String>,
    /// Sorted by decreasing importance
    pub feature_importances: Vec<FeatureImportance>,
    pub thresholds: Thresholds,
    pub n_train: usize,
    pub n_train_balanced: usize,
    pub n_test: usize,
    pub report: String,
    pub created_at: DateTime<Utc>,
}

impl MetricsRecord {
    pub fn accuracy(&self) -> Option<f64> {
        self.test.as_ref().map(|m| m.accuracy)
    }

    pub fn f1_score(&self) -> Option<f64> {
        self.test.as_ref().map(|m| m.f1_score)
    }

    pub fn auc_roc(&self) -> Option<f64> {
        self.test.as_ref().and_then(|m| m.auc_roc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classification_metrics() {
        let y_true = array![1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0];
        let y_pred = array![1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0];

        let m = ModelMetrics::from_labels(&y_true, &y_pred);
        assert_eq!(m.confusion_matrix, [[3, 1], [1, 3]]);
        assert_eq!(m.support, [4, 4]);
        assert!((m.accuracy - 0.75).abs() < 1e-12);
        assert!((m.precision - 0.75).abs() < 1e-12);
        assert!((m.recall - 0.75).abs() < 1e-12);
        assert!((m.f1_score - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_boundary_is_positive() {
        let y_true = array![0.0, 1.0];
        let y_prob = array![0.2, 0.35];
        let m = ModelMetrics::compute(&y_true, &y_prob, 0.35).unwrap();
        assert_eq!(m.confusion_matrix, [[1, 0], [0, 1]]);
        assert_eq!(m.threshold, 0.35);
    }

    #[test]
    fn test_roc_auc() {
        let y = array![0.0, 0.0, 1.0, 1.0];
        assert_eq!(roc_auc(&y, &array![0.1, 0.4, 0.35, 0.8]), Some(0.75));
        assert_eq!(roc_auc(&y, &array![0.1, 0.2, 0.8, 0.9]), Some(1.0));
        // all tied scores
        assert_eq!(roc_auc(&y, &array![0.5, 0.5, 0.5, 0.5]), Some(0.5));
    }

    #[test]
    fn test_auc_undefined_for_single_class() {
        let y = array![1.0, 1.0];
        assert_eq!(roc_auc(&y, &array![0.2, 0.9]), None);
        let m = ModelMetrics::compute(&y, &array![0.2, 0.9], 0.5).unwrap();
        assert!(m.auc_roc.is_none());
    }

    #[test]
    fn test_no_positive_predictions() {
        let m = ModelMetrics::from_labels(&array![1.0, 0.0], &array![0.0, 0.0]);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.f1_score, 0.0);
    }

    #[test]
    fn test_report_mentions_classes() {
        let m = ModelMetrics::compute(&array![0.0, 1.0], &array![0.1, 0.9], 0.5).unwrap();
        let report = m.classification_report();
        assert!(report.contains("fire (1)"));
        assert!(report.contains("[[1, 0], [0, 1]]"));
    }
}
