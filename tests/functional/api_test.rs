//! Functional tests for the HTTP API

use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use imagegen_router::{
    api::routes::create_router,
    backend::{clock::TokioClock, registry::ProviderRegistry},
    config::Settings,
    jobs::store::JobStore,
    telemetry::MemorySink,
    AppState,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    registry: Arc<ProviderRegistry>,
}

async fn create_test_app(mock_mode: bool, debug_errors: bool) -> TestApp {
    let mut settings = Settings::default();
    settings.routing.mock_mode = mock_mode;
    settings.debug_errors = debug_errors;

    // Simulated jobs follow tokio's clock, which paused tests drive
    let registry = Arc::new(ProviderRegistry::from_settings(&settings, Arc::new(TokioClock::new())).unwrap());
    let state = AppState::with_registry(
        settings,
        registry.clone(),
        Arc::new(MemorySink::new()),
        Arc::new(JobStore::new()),
    )
    .unwrap();

    TestApp {
        router: create_router(Arc::new(state)).await,
        registry,
    }
}

async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn generation_body() -> Value {
    json!({
        "source_images": ["https://img.test/source.png"],
        "style": "watercolor",
        "template": "portrait"
    })
}

async fn submit(app: &TestApp) -> String {
    let (status, body) = send(&app.router, Method::POST, "/v1/generations", Some(generation_body())).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_submit_returns_accepted_job() {
    let app = create_test_app(true, false).await;

    let (status, body) = send(&app.router, Method::POST, "/v1/generations", Some(generation_body())).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body["id"].as_str().unwrap().starts_with("mock_"));
    assert_eq!(body["provider"], "mock");
    assert_eq!(body["status"], "processing");
    assert!(body.get("result_urls").is_none());
}

#[tokio::test]
async fn test_invalid_submission() {
    let app = create_test_app(true, false).await;

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/v1/generations",
        Some(json!({ "source_images": [], "style": "watercolor", "template": "portrait" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[tokio::test(start_paused = true)]
async fn test_progress_and_results_flow() {
    let app = create_test_app(true, false).await;
    let id = submit(&app).await;

    let (status, body) = send(&app.router, Method::GET, &format!("/v1/jobs/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["job_id"], id.as_str());
    assert_eq!(body["status"], "processing");

    let (status, body) = send(&app.router, Method::GET, &format!("/v1/jobs/{}/results", id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "job_not_ready");

    tokio::time::sleep(Duration::from_secs(95)).await;

    let (status, body) = send(&app.router, Method::GET, &format!("/v1/jobs/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "succeeded");
    assert_eq!(body["progress"], 100);

    let (status, body) = send(&app.router, Method::GET, &format!("/v1/jobs/{}/results", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["paid"], false);
    assert_eq!(body["images"].as_array().unwrap().len(), 1);
    assert_eq!(body["images"][0]["preview"], true);

    let (status, body) = send(
        &app.router,
        Method::GET,
        &format!("/v1/jobs/{}/results?paid=true", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["images"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let app = create_test_app(true, false).await;

    for uri in ["/v1/jobs/mock_missing", "/v1/jobs/other_123"] {
        let (status, body) = send(&app.router, Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "job_not_found");
    }
}

#[tokio::test(start_paused = true)]
async fn test_failure_detail_is_hidden_by_default() {
    let app = create_test_app(true, false).await;
    let id = submit(&app).await;
    let provider_ref = id.trim_start_matches("mock_");
    assert!(app.registry.mock().drop_job(provider_ref));
    tokio::time::sleep(Duration::from_secs(5)).await;

    let (status, body) = send(&app.router, Method::GET, &format!("/v1/jobs/{}", id), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["message"], "generation failed");
}

#[tokio::test(start_paused = true)]
async fn test_failure_detail_shown_in_debug_mode() {
    let app = create_test_app(true, true).await;
    let id = submit(&app).await;
    let provider_ref = id.trim_start_matches("mock_");
    assert!(app.registry.mock().drop_job(provider_ref));
    tokio::time::sleep(Duration::from_secs(5)).await;

    let (_, body) = send(&app.router, Method::GET, &format!("/v1/jobs/{}", id), None).await;

    assert_eq!(body["status"], "failed");
    assert!(body["message"].as_str().unwrap().contains("mock"));
}

#[tokio::test]
async fn test_provider_errors_are_generic() {
    // No credentials anywhere, so the compiled-default primary cannot be used
    let app = create_test_app(false, false).await;

    let (status, body) = send(&app.router, Method::POST, "/v1/generations", Some(generation_body())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["message"], "generation failed");
    assert_eq!(body["error"]["code"], "provider_misconfigured");
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app(true, false).await;

    let (status, body) = send(&app.router, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["providers"].is_object());
}
