//! Feature derivation
//!
//! Turns raw weather/geographic records into the fixed-order feature matrix
//! consumed by the forest:
//! - [`Feature`] / [`FeatureSet`] - the feature catalogue and the supported sets
//! - [`FeatureSchema`] - the named, ordered contract shared by training and inference
//! - [`FeatureDeriver`] - fits quantile thresholds and derives features + labels

mod deriver;
mod features;
mod schema;

pub use deriver::{derive_features, quantile, FeatureDeriver, Thresholds, ThresholdScope};
pub use features::{Feature, FeatureSet};
pub use schema::FeatureSchema;
