//! 路由注册
//! 创建所有 API 路由并应用中间件

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::{
    auth::identity_middleware,
    handlers,
    middleware::AppState,
    session::{session_middleware, SessionLayerState},
};

/// JSON 请求体上限
const MAX_BODY_BYTES: usize = 64 * 1024;

/// 创建应用路由
pub fn create_router(state: Arc<AppState>) -> Router {
    // 公开端点（健康检查）
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check));

    // 认证路由（无需身份）
    let auth_routes = Router::new()
        .route("/api/v1/auth/register", post(handlers::auth::register))
        .route("/api/v1/auth/login", post(handlers::auth::login));

    // 需要身份的路由；启用会话时在身份校验之后加载会话
    let mut protected_routes = Router::new()
        .route("/api/v1/auth/me", get(handlers::auth::me))
        .route("/api/v1/auth/logout", post(handlers::auth::logout));

    if let Some(store) = state.auth_service.sessions() {
        protected_routes = protected_routes.layer(axum::middleware::from_fn_with_state(
            SessionLayerState::new(store.clone(), state.config.session.cookie_name.clone()),
            session_middleware,
        ));
    }

    let protected_routes = protected_routes.layer(axum::middleware::from_fn_with_state(
        state.tokens.clone(),
        identity_middleware,
    ));

    Router::new()
        .merge(public_routes)
        .merge(auth_routes)
        .merge(protected_routes)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(crate::middleware::request_tracking_middleware))
        .with_state(state)
}
