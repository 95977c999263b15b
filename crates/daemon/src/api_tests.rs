// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use axum::body::Body;
use axum::http::Request;
use tower::util::ServiceExt;

async fn call(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes)
        .unwrap_or(serde_json::Value::String(
            String::from_utf8_lossy(&bytes).to_string(),
        ));
    (status, value)
}

fn context() -> (Arc<AgentState>, Arc<Cancellation>, Router) {
    let state = Arc::new(AgentState::new());
    let cancellation = Arc::new(Cancellation::new());
    let router = router(state.clone(), cancellation.clone());
    (state, cancellation, router)
}

#[tokio::test]
async fn health_reports_shutdown_when_nothing_runs() {
    let (_state, _cancellation, router) = context();
    let (status, body) = call(router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "SHUTDOWN");
    assert_eq!(body["current_activity"], "idle");
    assert_eq!(body["errors"], serde_json::json!([]));
}

#[tokio::test]
async fn health_reports_activity_and_errors() {
    let (state, _cancellation, router) = context();
    let _serve = state.enter("serve");
    let _job = state.enter("sustain_job");
    state.error("healthcheck", "low disk space");
    let (status, body) = call(router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "ALIVE");
    assert_eq!(body["current_activity"], "serve -> sustain_job");
    assert_eq!(body["errors"], serde_json::json!(["low disk space"]));
}

#[tokio::test]
async fn health_reports_shutting_down_under_graceful_cancellation() {
    let (state, cancellation, router) = context();
    let _serve = state.enter("serve");
    cancellation.notify("winding down", CancellationLevel::Graceful);
    let (_status, body) = call(router, "/health").await;
    assert_eq!(body["state"], "SHUTTING_DOWN");
}

#[tokio::test]
async fn shutdown_requests_graceful_cancellation() {
    let (state, cancellation, router) = context();
    let _serve = state.enter("serve");
    let (status, body) = call(router, "/shutdown").await;
    assert_eq!(status, StatusCode::PROCESSING);
    assert_eq!(body, serde_json::json!("SHUTTING_DOWN"));
    assert!(cancellation.is_set(CancellationLevel::Graceful));
    assert!(!cancellation.is_set(CancellationLevel::Forced));
}

#[tokio::test]
async fn shutdown_with_force_escalates() {
    let (state, cancellation, router) = context();
    let _serve = state.enter("serve");
    let (_status, _body) = call(router, "/shutdown?force=1").await;
    assert!(cancellation.is_set(CancellationLevel::Forced));
}

#[tokio::test]
async fn empty_force_value_stays_graceful() {
    let (state, cancellation, router) = context();
    let _serve = state.enter("serve");
    let (_status, _body) = call(router, "/shutdown?force=").await;
    assert!(cancellation.is_set(CancellationLevel::Graceful));
    assert!(!cancellation.is_set(CancellationLevel::Forced));
}

#[tokio::test]
async fn shutdown_returns_ok_once_everything_stopped() {
    let (_state, _cancellation, router) = context();
    let (status, body) = call(router, "/shutdown").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!("SHUTDOWN"));
}

#[tokio::test]
async fn binds_loopback_listeners() {
    let state = Arc::new(AgentState::new());
    let cancellation = Arc::new(Cancellation::new());
    // port 0 lets the OS pick; both stacks bind independently
    let api = serve_admin_api(state, cancellation, 0).await.unwrap();
    api.stop().await;
}
