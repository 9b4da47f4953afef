//! 认证相关的 HTTP 处理器

use crate::{
    auth::UserId,
    error::AppError,
    middleware::AppState,
    models::auth::*,
    services::IssuedCredentials,
    session::{
        cookie::{clear_session_cookie, session_cookie},
        CurrentSession,
    },
};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

/// 注册
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Response, AppError> {
    req.validate()?;

    let issued = state.auth_service.register(req).await?;
    credentials_response(&state, StatusCode::CREATED, issued)
}

/// 登录
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, AppError> {
    req.validate()?;

    let issued = state.auth_service.login(req).await?;
    credentials_response(&state, StatusCode::OK, issued)
}

/// 登出
pub async fn logout(
    State(state): State<Arc<AppState>>,
    user_id: UserId,
    CurrentSession(session): CurrentSession,
) -> Result<Response, AppError> {
    state.auth_service.logout(session.as_ref()).await?;
    tracing::info!(user_id = %user_id, "User logged out");

    let mut response = Json(json!({"message": "logged out"})).into_response();
    if state.auth_service.sessions().is_some() {
        let session_cfg = &state.config.session;
        let cookie = clear_session_cookie(&session_cfg.cookie_name, session_cfg.cookie_secure)?;
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }

    Ok(response)
}

/// 当前用户
pub async fn me(user_id: UserId, CurrentSession(session): CurrentSession) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: user_id.as_uuid(),
        session_expires_at: session.map(|s| s.expires_at),
    })
}

fn credentials_response(
    state: &AppState,
    status: StatusCode,
    issued: IssuedCredentials,
) -> Result<Response, AppError> {
    let mut response = (status, Json(issued.response)).into_response();

    if let Some(session) = issued.session {
        let session_cfg = &state.config.session;
        let max_age = (session.expires_at - session.created_at).num_seconds().max(0) as u64;
        let cookie = session_cookie(
            &session_cfg.cookie_name,
            &session.id,
            max_age,
            session_cfg.cookie_secure,
        )?;
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }

    Ok(response)
}
