//! Model training module
//!
//! Everything needed to go from a raw dataset to a fitted, evaluated
//! wildfire-risk classifier:
//! - CART decision trees and the random forest built from them
//! - Stratified k-fold cross-validation
//! - Binary classification metrics and the persisted metrics record
//! - [`TrainingPipeline`], which runs the stages in order

mod config;
mod engine;
pub mod cross_validation;
pub mod decision_tree;
pub mod metrics;
pub mod random_forest;

pub use config::{ScoringMetric, TrainingConfig};
pub use engine::{balance, evaluate, fit_scaler, PreparedData, TrainingPipeline, TrainingRun};
pub use cross_validation::{CVResults, CVSplit, CrossValidator};
pub use decision_tree::{DecisionTree, TreeNode};
pub use metrics::{roc_auc, FeatureImportance, MetricsRecord, ModelMetrics};
pub use random_forest::{ClassWeight, ForestParams, MaxFeatures, RandomForest};
