//! 认证 API 集成测试

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::json;

mod common;
use common::{
    body_json, cookie_pair, create_test_app, create_test_app_with_backend, json_request, register,
    send, FlakySessionBackend, COOKIE_NAME,
};
use std::sync::Arc;

const PASSWORD: &str = "Secret1!";

fn me_request(token: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("GET")
        .uri("/api/v1/auth/me")
        .header(header::AUTHORIZATION, format!("Bearer {}", token));
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

/// Flip one character in the middle of the signature segment
fn mutate_signature(token: &str) -> String {
    let mut chars: Vec<char> = token.chars().collect();
    let idx = chars.len() - 10;
    chars[idx] = if chars[idx] == 'a' { 'b' } else { 'a' };
    chars.into_iter().collect()
}

#[tokio::test]
async fn test_register_then_me() {
    let app = create_test_app(true);
    let (body, set_cookie) = register(&app.router, "alice", "alice@example.com", PASSWORD).await;

    let token = body["access_token"].as_str().unwrap();
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 43200);
    assert_eq!(body["refresh_token"].as_str().unwrap().len(), 64);

    let set_cookie = set_cookie.expect("session cookie should be set");
    assert!(set_cookie.starts_with(&format!("{}=", COOKIE_NAME)));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Strict"));

    let response = send(&app.router, me_request(token, Some(&cookie_pair(&set_cookie)))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let me = body_json(response).await;
    assert_eq!(me["user_id"], body["user_id"]);
    assert!(me["session_expires_at"].is_string());
}

#[tokio::test]
async fn test_mutated_token_rejected() {
    let app = create_test_app(false);
    let (body, _) = register(&app.router, "bob", "bob@example.com", PASSWORD).await;
    let token = body["access_token"].as_str().unwrap();

    let response = send(&app.router, me_request(&mutate_signature(token), None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        "Bearer"
    );

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"invalid token");
}

#[tokio::test]
async fn test_me_without_header() {
    let app = create_test_app(false);

    let response = send(
        &app.router,
        Request::builder()
            .uri("/api/v1/auth/me")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"empty auth header");
}

#[tokio::test]
async fn test_login_success_and_failures() {
    let app = create_test_app(true);
    register(&app.router, "carol", "carol@example.com", PASSWORD).await;

    // 邮箱大小写不敏感
    let response = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/auth/login",
            json!({"email": "Carol@Example.com", "password": PASSWORD}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::SET_COOKIE).is_some());
    let body = body_json(response).await;
    assert!(body["access_token"].is_string());

    let wrong_password = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/auth/login",
            json!({"email": "carol@example.com", "password": "Wrong1!x"}),
        ),
    )
    .await;
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    let wrong_password = body_json(wrong_password).await;

    let unknown_email = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/auth/login",
            json!({"email": "nobody@example.com", "password": PASSWORD}),
        ),
    )
    .await;
    assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);
    let unknown_email = body_json(unknown_email).await;

    // 不泄露邮箱是否存在
    assert_eq!(
        wrong_password["error"]["message"],
        unknown_email["error"]["message"]
    );
}

#[tokio::test]
async fn test_duplicate_email_conflict() {
    let app = create_test_app(false);
    register(&app.router, "dave", "dave@example.com", PASSWORD).await;

    let response = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/auth/register",
            json!({"username": "dave2", "email": "DAVE@example.com", "password": PASSWORD}),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(app.users.len(), 1);
}

#[tokio::test]
async fn test_weak_password_rejected() {
    let app = create_test_app(false);

    for password in ["short", "alllowercase1!", "NoDigits!!", "NoSpecial123"] {
        let response = send(
            &app.router,
            json_request(
                "POST",
                "/api/v1/auth/register",
                json!({"username": "erin", "email": "erin@example.com", "password": password}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", password);
    }
    assert_eq!(app.users.len(), 0);
}

#[tokio::test]
async fn test_invalid_registration_payload() {
    let app = create_test_app(false);

    let response = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/auth/register",
            json!({"username": "x", "email": "not-an-email", "password": PASSWORD}),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_password_stored_as_argon2id_hash() {
    let app = create_test_app(false);
    register(&app.router, "frank", "frank@example.com", PASSWORD).await;

    let stored = app.users.password_hash("frank@example.com").unwrap();
    assert!(stored.starts_with("$argon2id$"));
    assert!(!stored.contains(PASSWORD));
}

#[tokio::test]
async fn test_logout_clears_session() {
    let app = create_test_app(true);
    let (body, set_cookie) = register(&app.router, "grace", "grace@example.com", PASSWORD).await;
    let token = body["access_token"].as_str().unwrap();
    let cookie = cookie_pair(&set_cookie.unwrap());
    let session_id = cookie.trim_start_matches(&format!("{}=", COOKIE_NAME)).to_string();

    let backend = app.sessions.as_ref().unwrap();
    assert!(backend.contains(&format!("session:{}", session_id)));

    let response = send(
        &app.router,
        Request::builder()
            .method("POST")
            .uri("/api/v1/auth/logout")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cleared = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(cleared.contains("Max-Age=0"));
    assert!(!backend.contains(&format!("session:{}", session_id)));

    // 访问令牌仍然有效，但会话已不存在
    let response = send(&app.router, me_request(token, Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let me = body_json(response).await;
    assert!(me.get("session_expires_at").is_none());
}

#[tokio::test]
async fn test_logout_requires_identity() {
    let app = create_test_app(true);

    let response = send(
        &app.router,
        Request::builder()
            .method("POST")
            .uri("/api/v1/auth/logout")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_only_mode_sets_no_cookie() {
    let app = create_test_app(false);
    let (body, set_cookie) = register(&app.router, "heidi", "heidi@example.com", PASSWORD).await;

    assert!(set_cookie.is_none());
    let response = send(
        &app.router,
        me_request(body["access_token"].as_str().unwrap(), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_register_leaves_no_account_when_session_store_down() {
    let backend = Arc::new(FlakySessionBackend::default());
    let app = create_test_app_with_backend(backend.clone());
    let body = json!({"username": "ken", "email": "ken@example.com", "password": PASSWORD});

    backend.set_down(true);
    let response = send(
        &app.router,
        json_request("POST", "/api/v1/auth/register", body.clone()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(app.users.len(), 0);

    // 存储恢复后重试应成功，而不是 409
    backend.set_down(false);
    let response = send(&app.router, json_request("POST", "/api/v1/auth/register", body)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(app.users.len(), 1);
}

#[tokio::test]
async fn test_protected_route_loads_session_per_request() {
    let backend = Arc::new(FlakySessionBackend::default());
    let app = create_test_app_with_backend(backend.clone());
    let (body, set_cookie) = register(&app.router, "leo", "leo@example.com", PASSWORD).await;
    let token = body["access_token"].as_str().unwrap();
    let cookie = cookie_pair(&set_cookie.unwrap());

    let response = send(&app.router, me_request(token, Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["session_expires_at"].is_string());

    // 无 cookie 时不访问会话存储
    backend.set_down(true);
    let response = send(&app.router, me_request(token, None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app.router, me_request(token, Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_session_of_another_user_is_not_exposed() {
    let app = create_test_app(true);
    let (mallory, _) = register(&app.router, "mallory", "mallory@example.com", PASSWORD).await;
    let (_, victim_cookie) = register(&app.router, "nina", "nina@example.com", PASSWORD).await;

    let response = send(
        &app.router,
        me_request(
            mallory["access_token"].as_str().unwrap(),
            Some(&cookie_pair(&victim_cookie.unwrap())),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await.get("session_expires_at").is_none());
}
