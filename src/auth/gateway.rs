//! Gateway re-authentication shim
//!
//! The REST gateway checks the bearer token once at the HTTP edge, then forwards
//! the `authorization` value unchanged as gRPC metadata. The gRPC side re-derives
//! the identity from the same bytes with the same resolver, so the two checks
//! cannot disagree.

use crate::auth::{
    identity::{resolve_bearer, IdentityError, UserId, AUTHORIZATION},
    jwt::TokenManager,
};
use axum::http::HeaderMap;
use tonic::metadata::{MetadataMap, MetadataValue};

/// Authenticate an inbound HTTP request and build the metadata for the outbound gRPC call.
pub fn forward_identity(
    headers: &HeaderMap,
    tokens: &TokenManager,
) -> Result<(UserId, MetadataMap), IdentityError> {
    let user_id = resolve_bearer(
        headers.get_all(AUTHORIZATION).iter().map(|v| v.to_str().ok()),
        tokens,
    )?;

    // resolve_bearer guarantees exactly one visible-ASCII value
    let raw = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(IdentityError::MalformedHeader)?;
    let value = MetadataValue::try_from(raw).map_err(|_| IdentityError::MalformedHeader)?;

    let mut metadata = MetadataMap::new();
    metadata.insert(AUTHORIZATION, value);

    Ok((user_id, metadata))
}

/// Wrap `message` into a gRPC request carrying the caller's credentials.
pub fn forward_request<T>(
    message: T,
    headers: &HeaderMap,
    tokens: &TokenManager,
) -> Result<tonic::Request<T>, IdentityError> {
    let (user_id, metadata) = forward_identity(headers, tokens)?;
    tracing::debug!(user_id = %user_id, "Forwarding authenticated request to gRPC");

    let mut request = tonic::Request::new(message);
    *request.metadata_mut() = metadata;
    Ok(request)
}
