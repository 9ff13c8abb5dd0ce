//! HTTP request handlers

use super::error::{Result, ServerError};
use super::state::AppState;
use crate::inference::{PredictionRequest, PredictionResponse};
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

pub async fn root() -> Json<Value> {
    Json(json!({ "mensaje": "API de ForestShield activa" }))
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let uptime = chrono::Utc::now().signed_duration_since(state.started_at);
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "features": state.classifier.schema().names(),
        "threshold": state.classifier.threshold(),
        "uptime_secs": uptime.num_seconds(),
    }))
}

/// Classify one record of named feature values
pub async fn predict(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<PredictionRequest>, JsonRejection>,
) -> Result<Json<PredictionResponse>> {
    let Json(request) = payload.map_err(|rejection| {
        warn!(reason = %rejection.body_text(), "Rejected prediction payload");
        ServerError::Unprocessable(rejection.body_text())
    })?;

    let response = state.classifier.predict(&request).map_err(|e| {
        if e.is_client_error() {
            warn!(error = %e, "Invalid prediction request");
        }
        ServerError::from(e)
    })?;

    debug!(
        riesgo_incendio = response.riesgo_incendio,
        probabilidad = response.probabilidad,
        "Prediction served"
    );
    Ok(Json(response))
}
