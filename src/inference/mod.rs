//! Single-record risk classification
//!
//! [`RiskClassifier`] owns a loaded model and scaler and never mutates
//! them, so one instance can be shared across request handlers.

mod classifier;

pub use classifier::{
    classify, Classification, PredictionRequest, PredictionResponse, RiskClassifier,
    DEFAULT_THRESHOLD,
};
