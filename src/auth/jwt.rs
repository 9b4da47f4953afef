//! JWT token generation and validation
//! Implements the stateless access token + opaque refresh token pattern

use crate::{config::SecurityConfig, error::AppError};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use rand::{rngs::OsRng, RngCore};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Refresh token size in bytes (256 bits)
const REFRESH_TOKEN_BYTES: usize = 32;

const SIGNING_ALG: &str = "HS256";

/// Token failures.
///
/// A missing token is not represented here: that is the caller's precondition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("failed to sign token: {0}")]
    Signing(String),

    #[error("failed to gather randomness: {0}")]
    Entropy(String),
}

/// JWT claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,

    /// Issued at
    pub iat: i64,

    /// Expiration
    pub exp: i64,
}

/// Issues and validates signed bearer tokens.
pub struct TokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenManager {
    /// Create token manager from config
    pub fn from_config(config: &SecurityConfig) -> Result<Self, AppError> {
        Self::new(config.jwt_secret.expose_secret().as_bytes(), config.token_ttl_secs)
    }

    pub fn new(secret: &[u8], ttl_secs: u64) -> Result<Self, AppError> {
        // Ensure secret is at least 32 bytes for HS256
        if secret.len() < 32 {
            return Err(AppError::Config("JWT secret too short (min 32 chars)".to_string()));
        }
        if ttl_secs == 0 {
            return Err(AppError::Config("token TTL must be positive".to_string()));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl: Duration::seconds(ttl_secs as i64),
        })
    }

    /// Token lifetime in seconds
    pub fn ttl_secs(&self) -> u64 {
        self.ttl.num_seconds() as u64
    }

    /// Issue a signed access token for `subject`
    pub fn issue_token(&self, subject: &str) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        self.sign(&claims)
    }

    pub(crate) fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key).map_err(|e| {
            tracing::error!(error = %e, "Failed to encode access token");
            TokenError::Signing(e.to_string())
        })
    }

    /// Validate a token and return its subject.
    ///
    /// The signature is checked before any claim, so a forged token never reports `Expired`.
    pub fn parse_token(&self, token: &str) -> Result<String, TokenError> {
        // jsonwebtoken cannot deserialize some algorithms (e.g. `none`) and would
        // report them as malformed
        if let Some(alg) = header_alg(token) {
            if alg != SIGNING_ALG {
                tracing::debug!(alg = %alg, "Token uses an unexpected signing algorithm");
                return Err(TokenError::InvalidSignature);
            }
        }

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            let err = match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenError::InvalidSignature
                }
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            };
            tracing::debug!(reason = %err, "Token validation failed");
            err
        })?;

        Ok(data.claims.sub)
    }

    /// Generate an opaque refresh token, unrelated to the signing key
    pub fn issue_refresh_token(&self) -> Result<String, TokenError> {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| TokenError::Entropy(e.to_string()))?;

        Ok(hex::encode(bytes))
    }
}

/// `alg` from the token header, if the header is decodable JSON
fn header_alg(token: &str) -> Option<String> {
    let (header, _) = token.split_once('.')?;
    let bytes = URL_SAFE_NO_PAD.decode(header).ok()?;
    let header: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    header.get("alg")?.as_str().map(str::to_string)
}
