//! Password hashing and verification using Argon2id
//!
//! Every hash gets its own random salt (embedded in the PHC string) and is keyed
//! with the deployment-wide pepper, passed to Argon2 as its secret input.

use crate::{config::SecurityConfig, error::AppError};
use argon2::{
    password_hash::{
        rand_core::{OsRng, RngCore}, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};
use once_cell::sync::Lazy;
use regex::Regex;
use secrecy::{ExposeSecret, Secret};
use thiserror::Error;

static ALLOWED_PASSWORD_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^[A-Za-z0-9!@#$%^&*()\-_=+\[\]{}|:;"'<>,.?/`~]+$"#)
        .expect("password charset regex is valid")
});

const SPECIAL_CHARS: &str = r#"!@#$%^&*()-_=+[]{}|:;"'<>,.?/`~"#;

/// Credential hashing failures.
///
/// Neither variant carries the plaintext.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("password does not match")]
    Mismatch,
}

/// Password hasher with configurable cost parameters
pub struct PasswordHasher {
    pepper: Secret<String>,
    params: Params,
    /// Hash checked when no stored credential exists, so an unknown account costs the same
    dummy_hash: String,
}

impl PasswordHasher {
    /// Create hasher from the security section of the config.
    pub fn from_config(config: &SecurityConfig) -> Result<Self, AppError> {
        Self::new(
            config.password_pepper.clone(),
            config.hash_memory_kib,
            config.hash_iterations,
            config.hash_parallelism,
        )
    }

    /// Create hasher with explicit Argon2 cost (m = memory in KiB, t = iterations, p = lanes).
    pub fn new(
        pepper: Secret<String>,
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    ) -> Result<Self, AppError> {
        if pepper.expose_secret().is_empty() {
            return Err(AppError::Config("password pepper must not be empty".to_string()));
        }

        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| AppError::Config(format!("Invalid Argon2 params: {}", e)))?;

        let mut hasher = Self {
            pepper,
            params,
            dummy_hash: String::new(),
        };
        hasher.dummy_hash = hasher.hash(&generate_dummy_password())?;

        Ok(hasher)
    }

    fn argon2(&self) -> Result<Argon2<'_>, CredentialError> {
        Argon2::new_with_secret(
            self.pepper.expose_secret().as_bytes(),
            Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )
        .map_err(|e| CredentialError::Hashing(e.to_string()))
    }

    /// Hash a password
    pub fn hash(&self, password: &str) -> Result<String, CredentialError> {
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = self
            .argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to hash password");
                CredentialError::Hashing(e.to_string())
            })?
            .to_string();

        Ok(password_hash)
    }

    /// Verify a password against a stored hash.
    ///
    /// Any failure, including a stored hash that does not parse, is a mismatch.
    pub fn verify(&self, password: &str, hash: &str) -> Result<(), CredentialError> {
        let parsed_hash = PasswordHash::new(hash).map_err(|e| {
            tracing::warn!(error = %e, "Stored password hash is not a valid PHC string");
            CredentialError::Mismatch
        })?;

        self.argon2()?
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| CredentialError::Mismatch)
    }
}

impl PasswordHasher {
    /// Run a full verification against a hash no password matches. Always `Mismatch`.
    pub fn verify_dummy(&self, password: &str) -> Result<(), CredentialError> {
        self.verify(password, &self.dummy_hash)?;
        Err(CredentialError::Mismatch)
    }
}

fn generate_dummy_password() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Validate password against policy
pub fn validate_password_policy(password: &str, policy: &SecurityConfig) -> Result<(), AppError> {
    if password.chars().count() < policy.password_min_length {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {} characters",
            policy.password_min_length
        )));
    }

    if !ALLOWED_PASSWORD_CHARS.is_match(password) {
        return Err(AppError::BadRequest(
            "Password contains unsupported characters".to_string(),
        ));
    }

    if policy.password_require_uppercase && !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(AppError::BadRequest(
            "Password must contain at least one uppercase letter".to_string(),
        ));
    }

    if policy.password_require_lowercase && !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(AppError::BadRequest(
            "Password must contain at least one lowercase letter".to_string(),
        ));
    }

    if policy.password_require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AppError::BadRequest(
            "Password must contain at least one digit".to_string(),
        ));
    }

    if policy.password_require_special && !password.chars().any(|c| SPECIAL_CHARS.contains(c)) {
        return Err(AppError::BadRequest(
            "Password must contain at least one special character".to_string(),
        ));
    }

    Ok(())
}
