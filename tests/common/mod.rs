//! 测试公共模块
//! 内存用户存储、测试配置和应用构建
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use dashmap::{mapref::entry::Entry, DashMap};
use http_body_util::BodyExt;
use notes_auth::{
    auth::UserId,
    config::{
        AppConfig, DatabaseConfig, LoggingConfig, SecurityConfig, ServerConfig, SessionConfig,
    },
    middleware::AppState,
    models::user::{NewUser, UserCredentials},
    repository::{StorageError, UserStorage},
    session::{MemorySessionBackend, SessionBackend, SessionError, SessionStore},
};
use secrecy::Secret;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub const COOKIE_NAME: &str = "session_id";

/// 内存用户存储，邮箱唯一
#[derive(Default)]
pub struct InMemoryUserStorage {
    by_email: DashMap<String, UserCredentials>,
}

impl InMemoryUserStorage {
    pub fn len(&self) -> usize {
        self.by_email.len()
    }

    pub fn password_hash(&self, email: &str) -> Option<String> {
        self.by_email.get(email).map(|u| u.password_hash.clone())
    }
}

#[async_trait]
impl UserStorage for InMemoryUserStorage {
    async fn check_user_exists(&self, email: &str) -> Result<bool, StorageError> {
        Ok(self.by_email.contains_key(email))
    }

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, StorageError> {
        Ok(self.by_email.get(email).map(|u| u.clone()))
    }

    async fn create_user(&self, user: NewUser) -> Result<UserId, StorageError> {
        match self.by_email.entry(user.email.clone()) {
            Entry::Occupied(_) => Err(StorageError::Conflict),
            Entry::Vacant(slot) => {
                slot.insert(UserCredentials {
                    id: user.id.as_uuid(),
                    username: user.username,
                    email: user.email,
                    password_hash: user.password_hash,
                });
                Ok(user.id)
            }
        }
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// 创建测试配置（低成本 Argon2 参数）
pub fn create_test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            addr: "127.0.0.1:0".to_string(),
            graceful_shutdown_timeout_secs: 5,
        },
        database: DatabaseConfig {
            url: Secret::new("postgresql://localhost/notes_test".to_string()),
            max_connections: 5,
            min_connections: 1,
            acquire_timeout_secs: 5,
            idle_timeout_secs: 300,
            max_lifetime_secs: 1800,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
        security: SecurityConfig {
            jwt_secret: Secret::new("test-secret-key-for-testing-only-min-32-chars".to_string()),
            token_ttl_secs: 43200,
            password_pepper: Secret::new("test-pepper".to_string()),
            hash_memory_kib: 8,
            hash_iterations: 1,
            hash_parallelism: 1,
            password_min_length: 6,
            password_require_uppercase: true,
            password_require_lowercase: true,
            password_require_digit: true,
            password_require_special: true,
        },
        session: SessionConfig {
            enabled: true,
            redis_url: Secret::new("redis://127.0.0.1:6379/0".to_string()),
            ttl_secs: 3600,
            cookie_name: COOKIE_NAME.to_string(),
            cookie_secure: false,
            op_timeout_ms: 1000,
        },
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub users: Arc<InMemoryUserStorage>,
    pub sessions: Option<Arc<MemorySessionBackend>>,
}

/// 构建测试应用；`with_sessions` 为 false 时仅使用 JWT
pub fn create_test_app(with_sessions: bool) -> TestApp {
    let backend = with_sessions.then(|| Arc::new(MemorySessionBackend::new()));
    let mut app = build_app(backend.clone().map(|b| b as Arc<dyn SessionBackend>));
    app.sessions = backend;
    app
}

/// 使用指定会话后端构建测试应用
pub fn create_test_app_with_backend(backend: Arc<dyn SessionBackend>) -> TestApp {
    build_app(Some(backend))
}

fn build_app(backend: Option<Arc<dyn SessionBackend>>) -> TestApp {
    let mut config = create_test_config();
    config.session.enabled = backend.is_some();

    let users = Arc::new(InMemoryUserStorage::default());
    let sessions = backend.map(|b| {
        SessionStore::new(
            b,
            Duration::from_secs(config.session.ttl_secs),
            Duration::from_millis(config.session.op_timeout_ms),
        )
    });

    let state = Arc::new(
        AppState::new(config, users.clone(), sessions).expect("Failed to build test state"),
    );

    TestApp {
        router: notes_auth::routes::create_router(state.clone()),
        state,
        users,
        sessions: None,
    }
}

/// 可切换故障的会话后端
#[derive(Default)]
pub struct FlakySessionBackend {
    inner: MemorySessionBackend,
    down: AtomicBool,
}

impl FlakySessionBackend {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), SessionError> {
        if self.down.load(Ordering::SeqCst) {
            Err(SessionError::StoreUnavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SessionBackend for FlakySessionBackend {
    async fn put(&self, key: &str, payload: Vec<u8>, ttl: Duration) -> Result<(), SessionError> {
        self.check()?;
        self.inner.put(key, payload, ttl).await
    }

    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>, SessionError> {
        self.check()?;
        self.inner.fetch(key).await
    }

    async fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.check()?;
        self.inner.remove(key).await
    }

    async fn ping(&self) -> Result<(), SessionError> {
        self.check()
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// 注册一个用户，返回响应体和 Set-Cookie
pub async fn register(
    router: &Router,
    username: &str,
    email: &str,
    password: &str,
) -> (serde_json::Value, Option<String>) {
    let response = send(
        router,
        json_request(
            "POST",
            "/api/v1/auth/register",
            serde_json::json!({"username": username, "email": email, "password": password}),
        ),
    )
    .await;
    assert_eq!(response.status(), 201, "registration should succeed");

    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    (body_json(response).await, cookie)
}

/// 从 Set-Cookie 中取出 `name=value`
pub fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap_or_default().trim().to_string()
}
