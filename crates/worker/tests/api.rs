//! Integration tests for the local job API router.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use common::{context, template, FakeExecutor, PUBLIC_BASE};
use http_body_util::BodyExt;
use relay_cloud::memory::MemoryStore;
use relay_worker::config::ApiConfig;
use relay_worker::handler::NO_OUTPUT_NODE_ERROR;
use relay_worker::serve::router;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app(executor: FakeExecutor) -> Router {
    app_with(Arc::new(executor))
}

fn app_with(executor: Arc<FakeExecutor>) -> Router {
    let ctx = context(
        Some(template()),
        executor,
        Arc::new(MemoryStore::new(PUBLIC_BASE)),
    );
    let config = ApiConfig {
        host: "127.0.0.1".into(),
        port: 0,
        request_timeout: Duration::from_secs(30),
    };
    router(Arc::new(ctx), &config)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn post_json(app: Router, uri: &str, body: Value) -> axum::response::Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

// ---------------------------------------------------------------------------
// Test: GET /health returns 200 with status and version
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_returns_ok() {
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app(FakeExecutor::default()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-request-id").is_some());

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

// ---------------------------------------------------------------------------
// Test: POST /runsync reports COMPLETED with image URLs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn runsync_completes_with_images() {
    let app = app(FakeExecutor::with_images(&["out.png"]));
    let response = post_json(app, "/runsync", json!({"id": "req-1", "input": {"prompt": "a cat"}})).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["id"], "req-1");
    assert_eq!(json["status"], "COMPLETED");
    assert!(json.get("error").is_none());

    let urls = json["output"]["images"].as_array().unwrap();
    assert_eq!(urls.len(), 1);
    assert!(urls[0].as_str().unwrap().starts_with("https://cdn.example.com/"));
    assert!(json["executionTime"].is_u64());
}

// ---------------------------------------------------------------------------
// Test: POST /runsync reports FAILED with the handler's error string
// ---------------------------------------------------------------------------

#[tokio::test]
async fn runsync_reports_handler_errors() {
    let app = app(FakeExecutor::with_images(&["out.png"]));
    let response = post_json(
        app,
        "/runsync",
        json!({"input": {"workflow": {"1": {"class_type": "KSampler", "inputs": {}}}}}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "FAILED");
    assert_eq!(json["error"], NO_OUTPUT_NODE_ERROR);
    assert!(json.get("output").is_none());
    // A job id is generated when the caller omits one.
    assert!(uuid::Uuid::parse_str(json["id"].as_str().unwrap()).is_ok());
}

// ---------------------------------------------------------------------------
// Test: malformed JSON is rejected before reaching the handler
// ---------------------------------------------------------------------------

#[tokio::test]
async fn runsync_rejects_malformed_body() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/runsync")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app(FakeExecutor::default()).oneshot(request).await.unwrap();

    assert!(response.status().is_client_error());
}

// ---------------------------------------------------------------------------
// Test: concurrent /runsync requests run one after the other
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_runs_do_not_overlap() {
    let executor = Arc::new(FakeExecutor::slow(&["out.png"], Duration::from_millis(150)));
    let app = app_with(executor.clone());

    let (first, second) = tokio::join!(
        post_json(app.clone(), "/runsync", json!({"input": {"prompt": "first"}})),
        post_json(app, "/runsync", json!({"input": {"prompt": "second"}})),
    );

    for response in [first, second] {
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "COMPLETED");
    }
    assert_eq!(executor.submissions().len(), 2);
    assert_eq!(executor.peak_in_flight(), 1);
}
