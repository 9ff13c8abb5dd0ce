//! Integration test: HTTP surface of the classifier

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::{example_request, quick_config, write_occurred_csv};
use forestshield::inference::RiskClassifier;
use forestshield::server::{create_router, AppState, ServerConfig};
use forestshield::training::TrainingPipeline;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

fn app() -> (TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let csv = write_occurred_csv(dir.path(), 200);
    let model_dir = dir.path().join("model");
    TrainingPipeline::new(quick_config(&model_dir)).run_path(csv).unwrap();

    let classifier = RiskClassifier::from_dir(&model_dir, 0.35).unwrap();
    let state = Arc::new(AppState::new(classifier));
    let router = create_router(state, &ServerConfig::default());
    (dir, router)
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(body: impl Into<String>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/predecir")
        .header("content-type", "application/json")
        .body(Body::from(body.into()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_root_and_health() {
    let (_dir, router) = app();

    let (status, body) = send(router.clone(), get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mensaje"], "API de ForestShield activa");

    let (status, body) = send(router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["threshold"], 0.35);
    assert_eq!(body["features"].as_array().unwrap().len(), 8);
}

#[tokio::test]
async fn test_predict_example() {
    let (_dir, router) = app();
    let (status, body) = send(router, post_json(example_request().to_string())).await;

    assert_eq!(status, StatusCode::OK);
    let object = body.as_object().unwrap();
    assert_eq!(object.len(), 2);

    let label = object["riesgo_incendio"].as_u64().unwrap();
    assert!(label == 0 || label == 1);
    let probability = object["probabilidad"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&probability));
    assert_eq!((probability * 1000.0).round() / 1000.0, probability);
}

#[tokio::test]
async fn test_missing_feature_is_bad_request() {
    let (_dir, router) = app();
    let mut request = example_request();
    request.as_object_mut().unwrap().remove("HEAT_INDEX");

    let (status, body) = send(router, post_json(request.to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], true);
    assert!(body["message"].as_str().unwrap().contains("expected 8"));
}

#[tokio::test]
async fn test_out_of_range_is_bad_request() {
    let (_dir, router) = app();
    let mut request = example_request();
    request["RH2M"] = json!(140.0);

    let (status, body) = send(router, post_json(request.to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("RH2M"));
}

#[tokio::test]
async fn test_malformed_payload_is_unprocessable() {
    let (_dir, router) = app();

    let (status, body) = send(router.clone(), post_json("{\"DOY\": 150,")).await;
    assert!(status.is_client_error());
    assert_eq!(body["error"], true);

    let mut request = example_request();
    request["T2M"] = json!("hot");
    let (status, body) = send(router, post_json(request.to_string())).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], true);
}

#[tokio::test]
async fn test_server_survives_bad_requests() {
    let (_dir, router) = app();
    let (status, _) = send(router.clone(), post_json("not json")).await;
    assert!(status.is_client_error());

    let (status, _) = send(router, post_json(example_request().to_string())).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_route_and_method() {
    let (_dir, router) = app();

    let (status, body) = send(router.clone(), get("/predict")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], true);

    let (status, _) = send(router, get("/predecir")).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}
