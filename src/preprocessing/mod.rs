//! Feature scaling
//!
//! The scaler is fitted once on the balanced training features and persisted
//! with its feature schema, so inference replays exactly the same order and
//! statistics.

mod scaler;

pub use scaler::{ScalerParams, StandardScaler};
