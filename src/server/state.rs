//! Application state shared across handlers

use crate::inference::RiskClassifier;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Read-only context built once at startup
#[derive(Debug, Clone)]
pub struct AppState {
    pub classifier: Arc<RiskClassifier>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(classifier: RiskClassifier) -> Self {
        Self {
            classifier: Arc::new(classifier),
            started_at: Utc::now(),
        }
    }
}
