//! gRPC identity enforcement
//!
//! Two entry points over the same bearer resolution as the HTTP middleware:
//! - [`GrpcIdentityLayer`]: server-wide tower layer, keyed off the request path
//!   (`/<package>.<Service>/<Method>`) with an explicit set of exempt methods.
//!   Unary and streaming calls are both a single HTTP/2 request here, so the
//!   identity inserted into the extensions is visible for the whole stream.
//! - [`GrpcIdentityInterceptor`]: tonic interceptor for services that are wrapped
//!   one by one; the auth service is simply never wrapped.

use crate::{
    auth::{
        identity::{resolve_bearer, IdentityError, UserId, AUTHORIZATION},
        jwt::TokenManager,
    },
    session::SessionError,
};
use futures::future::BoxFuture;
use http::{header::CONTENT_TYPE, HeaderValue};
use std::{
    collections::HashSet,
    sync::Arc,
    task::{Context, Poll},
};
use tonic::{service::Interceptor, Request, Status};
use tower::{Layer, Service};

/// Fully-qualified name of the registration RPC
pub const AUTH_SIGN_UP_METHOD: &str = "/auth_service.service.v1.AuthService/SignUp";
/// Fully-qualified name of the login RPC
pub const AUTH_SIGN_IN_METHOD: &str = "/auth_service.service.v1.AuthService/SignIn";

/// Methods that skip authentication. Matched by exact path only.
#[derive(Debug, Clone, Default)]
pub struct ExemptMethods(Arc<HashSet<String>>);

impl ExemptMethods {
    pub fn new<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(Arc::new(methods.into_iter().map(Into::into).collect()))
    }

    /// The auth service's unauthenticated RPCs
    pub fn auth_service() -> Self {
        Self::new([AUTH_SIGN_UP_METHOD, AUTH_SIGN_IN_METHOD])
    }

    pub fn contains(&self, method: &str) -> bool {
        self.0.contains(method)
    }
}

impl From<IdentityError> for Status {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::MissingHeader => Status::unauthenticated("missing authorization metadata"),
            IdentityError::MalformedHeader => Status::unauthenticated("invalid authorization header"),
            IdentityError::InvalidToken(reason) => {
                Status::unauthenticated(format!("invalid token: {}", reason))
            }
            IdentityError::InvalidUserId => Status::unauthenticated("invalid user id"),
        }
    }
}

impl From<SessionError> for Status {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound => Status::unauthenticated("session not found"),
            SessionError::Invalid(msg) => Status::invalid_argument(msg),
            SessionError::StoreUnavailable(_)
            | SessionError::Serialization(_)
            | SessionError::Deserialization(_) => Status::internal("session store failure"),
        }
    }
}

fn reject(method: &str, e: IdentityError) -> Status {
    tracing::info!(reason = e.reason(), method = %method, "Rejected unauthenticated gRPC call");
    metrics::counter!("auth_rejections_total", "transport" => "grpc", "reason" => e.reason())
        .increment(1);
    e.into()
}

/// Read the authenticated user from a tonic request
pub trait UserIdExt {
    fn user_id(&self) -> Result<UserId, Status>;
}

impl<T> UserIdExt for Request<T> {
    fn user_id(&self) -> Result<UserId, Status> {
        self.extensions()
            .get::<UserId>()
            .copied()
            .ok_or_else(|| Status::unauthenticated("request is not authenticated"))
    }
}

/// Tower layer enforcing bearer authentication on every non-exempt gRPC method.
#[derive(Clone)]
pub struct GrpcIdentityLayer {
    tokens: Arc<TokenManager>,
    exempt: ExemptMethods,
}

impl GrpcIdentityLayer {
    pub fn new(tokens: Arc<TokenManager>, exempt: ExemptMethods) -> Self {
        Self { tokens, exempt }
    }
}

impl<S> Layer<S> for GrpcIdentityLayer {
    type Service = GrpcIdentityService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GrpcIdentityService {
            inner,
            tokens: self.tokens.clone(),
            exempt: self.exempt.clone(),
        }
    }
}

#[derive(Clone)]
pub struct GrpcIdentityService<S> {
    inner: S,
    tokens: Arc<TokenManager>,
    exempt: ExemptMethods,
}

impl<S, ReqBody, ResBody> Service<http::Request<ReqBody>> for GrpcIdentityService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>,
    S::Future: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = http::Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<ReqBody>) -> Self::Future {
        if self.exempt.contains(req.uri().path()) {
            return Box::pin(self.inner.call(req));
        }

        let resolved = {
            let headers = req.headers();
            resolve_bearer(
                headers.get_all(AUTHORIZATION).iter().map(|v| v.to_str().ok()),
                &self.tokens,
            )
        };

        match resolved {
            Ok(user_id) => {
                req.extensions_mut().insert(user_id);
                Box::pin(self.inner.call(req))
            }
            Err(e) => {
                let status = reject(req.uri().path(), e);
                Box::pin(async move { Ok(status_response(status)) })
            }
        }
    }
}

/// Trailers-only gRPC response carrying `status`
fn status_response<B: Default>(status: Status) -> http::Response<B> {
    let mut response = http::Response::new(B::default());
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/grpc"));
    if let Err(e) = status.add_header(response.headers_mut()) {
        tracing::error!(error = %e, "Failed to encode gRPC status headers");
    }
    response
}

/// Interceptor for individually wrapped services (`ServiceServer::with_interceptor`)
#[derive(Clone)]
pub struct GrpcIdentityInterceptor {
    tokens: Arc<TokenManager>,
}

impl GrpcIdentityInterceptor {
    pub fn new(tokens: Arc<TokenManager>) -> Self {
        Self { tokens }
    }
}

impl Interceptor for GrpcIdentityInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let resolved = {
            let metadata = request.metadata();
            resolve_bearer(
                metadata.get_all(AUTHORIZATION).iter().map(|v| v.to_str().ok()),
                &self.tokens,
            )
        };

        let user_id = resolved.map_err(|e| reject("intercepted", e))?;
        request.extensions_mut().insert(user_id);
        Ok(request)
    }
}
