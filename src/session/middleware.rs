//! Per-request session loading
//!
//! Mounted on the protected route group inside the identity middleware. The
//! session named by the cookie is loaded once and handed to handlers through
//! [`CurrentSession`].

use super::{cookie::read_session_cookie, Session, SessionError, SessionStore};
use crate::{auth::UserId, error::AppError};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{convert::Infallible, sync::Arc};

/// State for [`session_middleware`]
#[derive(Clone)]
pub struct SessionLayerState {
    pub store: SessionStore,
    pub cookie_name: String,
}

impl SessionLayerState {
    pub fn new(store: SessionStore, cookie_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            store,
            cookie_name: cookie_name.into(),
        })
    }
}

/// The caller's session; `None` without a cookie, for an unknown or expired id,
/// for a session owned by another user, or when sessions are disabled.
#[derive(Debug, Clone, Default)]
pub struct CurrentSession(pub Option<Session>);

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<CurrentSession>()
            .cloned()
            .unwrap_or_default())
    }
}

/// Load the session named by the cookie. A store outage fails the request.
pub async fn session_middleware(
    State(layer): State<Arc<SessionLayerState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(id) = read_session_cookie(req.headers(), &layer.cookie_name) else {
        return next.run(req).await;
    };

    let session = match layer.store.get(&id).await {
        Ok(session) => Some(session),
        Err(SessionError::NotFound) => None,
        Err(e) => return AppError::from(e).into_response(),
    };

    let owner = req.extensions().get::<UserId>().map(UserId::as_uuid);
    let session = session.filter(|s| {
        let owned = owner.is_some() && s.user_id() == owner;
        if !owned {
            tracing::warn!("Session cookie does not belong to the authenticated user");
        }
        owned
    });

    req.extensions_mut().insert(CurrentSession(session));
    next.run(req).await
}
