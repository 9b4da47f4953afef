//! HTTP identity middleware
//!
//! Mounted with `from_fn_with_state` on the protected route group only;
//! register/login live in a separate group that never passes through it.

use crate::{
    auth::{
        identity::{resolve_bearer, IdentityError, UserId},
        jwt::TokenManager,
    },
    error::AppError,
};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

// Handlers extract the identity directly: `async fn handler(user_id: UserId)`
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<UserId>()
            .copied()
            .ok_or(AppError::Unauthorized)
    }
}

impl IntoResponse for IdentityError {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Bearer")],
            self.public_message(),
        )
            .into_response()
    }
}

/// Bearer token middleware - authentication required
pub async fn identity_middleware(
    State(tokens): State<Arc<TokenManager>>,
    mut req: Request,
    next: Next,
) -> Response {
    let resolved = {
        let headers = req.headers();
        resolve_bearer(
            headers.get_all(header::AUTHORIZATION).iter().map(|v| v.to_str().ok()),
            &tokens,
        )
    };

    match resolved {
        Ok(user_id) => {
            tracing::debug!(user_id = %user_id, "Request authenticated");
            req.extensions_mut().insert(user_id);
            next.run(req).await
        }
        Err(e) => {
            tracing::info!(
                reason = e.reason(),
                uri = %req.uri().path(),
                "Rejected unauthenticated request"
            );
            metrics::counter!("auth_rejections_total", "transport" => "http", "reason" => e.reason())
                .increment(1);
            e.into_response()
        }
    }
}
