//! 健康检查 API 集成测试

use axum::{body::Body, http::Request, http::StatusCode};

mod common;
use common::{body_json, create_test_app, send};

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app(false);

    let response = send(
        &app.router,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_readiness_checks_session_store() {
    let app = create_test_app(true);

    let response = send(
        &app.router,
        Request::builder().uri("/ready").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["ready"], true);

    let names: Vec<&str> = json["checks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["database", "session_store"]);
}

#[tokio::test]
async fn test_trace_id_echoed() {
    let app = create_test_app(false);

    let response = send(
        &app.router,
        Request::builder()
            .uri("/health")
            .header("x-trace-id", "trace-42")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.headers().get("x-trace-id").unwrap(), "trace-42");
}
