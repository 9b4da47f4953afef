//! Bearer credential resolution shared by every transport.
//!
//! The HTTP middleware, the gRPC layer/interceptor and the gateway shim all go
//! through [`resolve_bearer`], so they agree on exactly which headers produce an
//! identity.

use crate::auth::jwt::{TokenError, TokenManager};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Authorization header / metadata key (lower case, as carried on the wire)
pub const AUTHORIZATION: &str = "authorization";

const BEARER_SCHEME: &str = "Bearer";

/// Identifier of the authenticated principal.
///
/// Request extensions are keyed by type, so this newtype is the one context key
/// under which the identity travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("empty auth header")]
    MissingHeader,

    #[error("invalid auth header")]
    MalformedHeader,

    #[error("invalid token")]
    InvalidToken(#[source] TokenError),

    #[error("invalid user id")]
    InvalidUserId,
}

impl IdentityError {
    /// Fixed message safe to return to the client
    pub fn public_message(&self) -> &'static str {
        match self {
            IdentityError::MissingHeader => "empty auth header",
            IdentityError::MalformedHeader => "invalid auth header",
            IdentityError::InvalidToken(_) => "invalid token",
            IdentityError::InvalidUserId => "invalid user id",
        }
    }

    /// Short label used for logs and metrics
    pub fn reason(&self) -> &'static str {
        match self {
            IdentityError::MissingHeader => "missing_header",
            IdentityError::MalformedHeader => "malformed_header",
            IdentityError::InvalidToken(TokenError::Expired) => "expired_token",
            IdentityError::InvalidToken(TokenError::InvalidSignature) => "invalid_signature",
            IdentityError::InvalidToken(_) => "malformed_token",
            IdentityError::InvalidUserId => "invalid_user_id",
        }
    }
}

/// Split `Bearer <token>` into its token part.
///
/// Exactly two whitespace-separated parts are required and the scheme must be `Bearer`.
pub fn extract_bearer(header: &str) -> Result<&str, IdentityError> {
    if header.trim().is_empty() {
        return Err(IdentityError::MissingHeader);
    }

    let mut parts = header.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(BEARER_SCHEME), Some(token), None) => Ok(token),
        _ => Err(IdentityError::MalformedHeader),
    }
}

/// Resolve the values of the `authorization` header into a [`UserId`].
///
/// `values` must yield every occurrence of the header: none is a missing header and
/// more than one is malformed.
pub fn resolve_bearer<'a, I>(values: I, tokens: &TokenManager) -> Result<UserId, IdentityError>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut values = values.into_iter();
    let header = match (values.next(), values.next()) {
        (None, _) => return Err(IdentityError::MissingHeader),
        (Some(_), Some(_)) => return Err(IdentityError::MalformedHeader),
        // non-visible-ASCII header value
        (Some(None), None) => return Err(IdentityError::MalformedHeader),
        (Some(Some(value)), None) => value,
    };

    let token = extract_bearer(header)?;
    let subject = tokens.parse_token(token).map_err(IdentityError::InvalidToken)?;

    Uuid::parse_str(&subject)
        .map(UserId)
        .map_err(|_| IdentityError::InvalidUserId)
}
