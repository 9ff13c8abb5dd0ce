//! Read-only classification context

use crate::error::{ForestShieldError, Result};
use crate::export::ArtifactStore;
use crate::feature_engineering::FeatureSchema;
use crate::preprocessing::StandardScaler;
use crate::training::RandomForest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Outcome for one record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// 1 when `probability >= threshold`
    pub label: u8,
    /// Positive-class probability
    pub probability: f64,
}

/// Flat record of named feature values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredictionRequest(pub BTreeMap<String, f64>);

impl PredictionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn features(&self) -> &BTreeMap<String, f64> {
        &self.0
    }
}

impl From<BTreeMap<String, f64>> for PredictionRequest {
    fn from(map: BTreeMap<String, f64>) -> Self {
        Self(map)
    }
}

/// Wire response of the prediction endpoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub riesgo_incendio: u8,
    /// Rounded to 3 decimals
    pub probabilidad: f64,
}

impl From<Classification> for PredictionResponse {
    fn from(c: Classification) -> Self {
        Self {
            riesgo_incendio: c.label,
            probabilidad: (c.probability * 1000.0).round() / 1000.0,
        }
    }
}

/// Scale one named record with `scaler`, score it with `model` and apply
/// `threshold` (`>=` is positive).
///
/// The record must carry exactly the scaler's features; nothing is padded
/// or reordered silently.
pub fn classify(
    model: &RandomForest,
    scaler: &StandardScaler,
    features: &BTreeMap<String, f64>,
    threshold: f64,
) -> Result<Classification> {
    let row = scaler.transform_record(features)?;
    let probability = model.predict_proba_row(row.view())?;
    Ok(Classification {
        label: u8::from(probability >= threshold),
        probability,
    })
}

/// Loaded model and scaler plus the decision threshold
#[derive(Debug, Clone)]
pub struct RiskClassifier {
    model: RandomForest,
    scaler: StandardScaler,
    threshold: f64,
}

impl RiskClassifier {
    pub fn new(model: RandomForest, scaler: StandardScaler, threshold: f64) -> Result<Self> {
        if !model.is_fitted() || !scaler.is_fitted() {
            return Err(ForestShieldError::ModelNotFitted);
        }
        if model.n_features() != scaler.n_features() {
            return Err(ForestShieldError::ScalingError {
                expected: scaler.n_features(),
                actual: model.n_features(),
            });
        }
        validate_threshold(threshold)?;
        Ok(Self {
            model,
            scaler,
            threshold,
        })
    }

    /// Load verified artifacts from `dir`.
    pub fn from_dir(dir: impl AsRef<Path>, threshold: f64) -> Result<Self> {
        let loaded = ArtifactStore::new(dir.as_ref()).load()?;
        Self::new(loaded.model, loaded.scaler, threshold)
    }

    pub fn with_threshold(mut self, threshold: f64) -> Result<Self> {
        validate_threshold(threshold)?;
        self.threshold = threshold;
        Ok(self)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn schema(&self) -> &FeatureSchema {
        self.scaler.schema()
    }

    pub fn model(&self) -> &RandomForest {
        &self.model
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn classify(&self, features: &BTreeMap<String, f64>) -> Result<Classification> {
        let result = classify(&self.model, &self.scaler, features, self.threshold)?;
        debug!(label = result.label, probability = result.probability, "Classified record");
        Ok(result)
    }

    pub fn predict(&self, request: &PredictionRequest) -> Result<PredictionResponse> {
        self.classify(request.features()).map(PredictionResponse::from)
    }
}

fn validate_threshold(threshold: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ForestShieldError::InvalidParameter {
            name: "threshold".to_string(),
            value: threshold.to_string(),
            reason: "must be in [0, 1]".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_engineering::FeatureSchema;
    use ndarray::{Array1, Array2};

    fn fitted() -> RiskClassifier {
        // column 0 separates the classes, column 1 is noise
        let x = Array2::from_shape_fn((40, 2), |(i, j)| match j {
            0 => (if i % 2 == 0 { 10.0 } else { 30.0 }) + i as f64 * 0.1,
            _ => ((i * 7) % 13) as f64,
        });
        let y = Array1::from_shape_fn(40, |i| (i % 2) as f64);

        let schema = FeatureSchema::new(vec!["T2M".into(), "DOY".into()]).unwrap();
        let mut scaler = StandardScaler::new(schema);
        let xs = scaler.fit_transform(&x).unwrap();
        let mut model = RandomForest::new(
            crate::training::ForestParams::default().with_n_estimators(10),
        );
        model.fit(&xs, &y).unwrap();
        RiskClassifier::new(model, scaler, 0.5).unwrap()
    }

    fn record(t2m: f64) -> BTreeMap<String, f64> {
        BTreeMap::from([("T2M".to_string(), t2m), ("DOY".to_string(), 6.0)])
    }

    #[test]
    fn test_classify_deterministic() {
        let clf = fitted();
        let a = clf.classify(&record(31.0)).unwrap();
        let b = clf.classify(&record(31.0)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.label, 1);
        assert_eq!(clf.classify(&record(10.5)).unwrap().label, 0);
    }

    #[test]
    fn test_threshold_boundary_fires() {
        let clf = fitted();
        let p = clf.classify(&record(20.0)).unwrap().probability;
        let at_boundary = clf.with_threshold(p).unwrap();
        assert_eq!(at_boundary.classify(&record(20.0)).unwrap().label, 1);
    }

    #[test]
    fn test_wrong_feature_count() {
        let clf = fitted();
        let mut rec = record(25.0);
        rec.remove("DOY");
        assert!(matches!(
            clf.classify(&rec),
            Err(ForestShieldError::ScalingError { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_response_rounding() {
        let response = PredictionResponse::from(Classification {
            label: 1,
            probability: 0.123456,
        });
        assert_eq!(response.probabilidad, 0.123);
        assert_eq!(response.riesgo_incendio, 1);
    }

    #[test]
    fn test_rejects_bad_threshold() {
        assert!(fitted().with_threshold(1.5).is_err());
    }
}
