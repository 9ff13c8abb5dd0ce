//! ForestShield - wildfire risk classification
//!
//! This crate provides:
//! - An offline training pipeline: load, split, impute, derive features,
//!   balance with SMOTE, scale, search random forest hyperparameters with
//!   cross-validation, evaluate and persist
//! - A read-only classifier that replays the persisted scaler and model on
//!   single records
//! - An HTTP server and a CLI on top of both
//!
//! # Modules
//!
//! ## Data
//! - [`data`] - Dataset loading, duplicate removal, stratified split
//! - [`imputation`] - Train-only mean imputation
//! - [`feature_engineering`] - Derived features, quantile thresholds, feature schema
//!
//! ## Training
//! - [`synthetic`] - SMOTE class balancing
//! - [`preprocessing`] - Standard scaler
//! - [`training`] - Decision trees, random forest, cross-validation, metrics, pipeline
//! - [`optimizer`] - Randomized and grid hyperparameter search
//!
//! ## Serving
//! - [`inference`] - Single-record classification
//! - [`export`] - Artifact persistence with checksummed manifest
//! - [`server`] - HTTP prediction endpoint
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Data
pub mod data;
pub mod feature_engineering;
pub mod imputation;

// Training
pub mod optimizer;
pub mod preprocessing;
pub mod synthetic;
pub mod training;

// Serving
pub mod export;
pub mod inference;

// Services
pub mod cli;
pub mod server;

pub use error::{ForestShieldError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{ForestShieldError, Result};

    // Data
    pub use crate::data::{load, split, LabeledSet, RawColumn, RawDataset, RawRecord};

    // Feature engineering
    pub use crate::feature_engineering::{
        derive_features, Feature, FeatureDeriver, FeatureSchema, FeatureSet, ThresholdScope,
    };

    // Imputation
    pub use crate::imputation::{Imputer, MeanImputer};

    // Balancing
    pub use crate::synthetic::{Sampler, SMOTE};

    // Preprocessing
    pub use crate::preprocessing::StandardScaler;

    // Training
    pub use crate::training::{
        balance, evaluate, fit_scaler, ForestParams, MetricsRecord, ModelMetrics, RandomForest,
        ScoringMetric, TrainingConfig, TrainingPipeline, TrainingRun,
    };

    // Optimization
    pub use crate::optimizer::{HyperparameterSearch, SearchSpace, SearchStrategy};

    // Inference
    pub use crate::inference::{
        classify, Classification, PredictionRequest, PredictionResponse, RiskClassifier,
    };

    // Export
    pub use crate::export::ArtifactStore;
}
