//! HTTP 中间件
//! 应用共享状态与请求追踪

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    auth::{PasswordHasher, TokenManager},
    config::AppConfig,
    error::AppError,
    repository::UserStorage,
    services::AuthService,
    session::SessionStore,
};

const TRACE_ID_HEADER: &str = "x-trace-id";
const REQUEST_ID_HEADER: &str = "x-request-id";

/// 应用状态
///
/// 所有组件在启动时构建一次，之后按引用共享。
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStorage>,
    pub auth_service: AuthService,
    pub tokens: Arc<TokenManager>,
    pub started_at: Instant,
}

impl AppState {
    /// 组装应用状态；`sessions` 为 `None` 时仅使用 JWT
    pub fn new(
        config: AppConfig,
        users: Arc<dyn UserStorage>,
        sessions: Option<SessionStore>,
    ) -> Result<Self, AppError> {
        let tokens = Arc::new(TokenManager::from_config(&config.security)?);
        let hasher = Arc::new(PasswordHasher::from_config(&config.security)?);

        let auth_service = AuthService::new(
            users.clone(),
            hasher,
            tokens.clone(),
            sessions,
            Arc::new(config.security.clone()),
        );

        Ok(Self {
            config: Arc::new(config),
            users,
            auth_service,
            tokens,
            started_at: Instant::now(),
        })
    }
}

/// 请求追踪中间件
/// 为每个请求生成 trace_id 和 request_id，并记录指标
pub async fn request_tracking_middleware(req: Request, next: Next) -> Response {
    let trace_id = extract_or_generate_trace_id(req.headers());
    let request_id = Uuid::new_v4().to_string();

    let method = req.method().clone();
    // 只记录 path，query 中可能带有凭据
    let path = req.uri().path().to_string();

    let span = tracing::info_span!(
        "http_request",
        trace_id = %trace_id,
        request_id = %request_id,
        method = %method,
        path = %path,
    );

    async move {
        let start = Instant::now();
        let mut response = next.run(req).await;
        let elapsed = start.elapsed();

        let status = response.status().as_u16();
        let method_name = match method.as_str() {
            "GET" => "GET",
            "POST" => "POST",
            "PUT" => "PUT",
            "DELETE" => "DELETE",
            "PATCH" => "PATCH",
            _ => "UNKNOWN",
        };
        let status_class = match status {
            200..=299 => "2xx",
            300..=399 => "3xx",
            400..=499 => "4xx",
            _ => "5xx",
        };

        metrics::counter!("http_requests_total", "method" => method_name, "status" => status_class)
            .increment(1);
        metrics::histogram!("http_request_duration_seconds").record(elapsed.as_secs_f64());

        tracing::info!(
            status = status,
            elapsed_ms = elapsed.as_millis() as u64,
            "Request completed"
        );

        if let Ok(value) = HeaderValue::from_str(&trace_id) {
            response.headers_mut().insert(TRACE_ID_HEADER, value);
        }
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }

        response
    }
    .instrument(span)
    .await
}

/// 从请求头中提取或生成 trace_id
fn extract_or_generate_trace_id(headers: &HeaderMap) -> String {
    headers
        .get(TRACE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty() && s.len() <= 128)
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}
