//! 认证服务：注册、登录、登出

use crate::{
    auth::{validate_password_policy, PasswordHasher, TokenManager, UserId},
    config::SecurityConfig,
    error::AppError,
    models::{auth::*, user::NewUser},
    repository::UserStorage,
    session::{Session, SessionStore, USER_ID_KEY},
};
use std::sync::Arc;
use uuid::Uuid;

/// Credentials handed back after a successful register or login
#[derive(Debug)]
pub struct IssuedCredentials {
    pub response: AuthResponse,
    /// Server-side session, when sessions are enabled
    pub session: Option<Session>,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStorage>,
    hasher: Arc<PasswordHasher>,
    tokens: Arc<TokenManager>,
    sessions: Option<SessionStore>,
    policy: Arc<SecurityConfig>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStorage>,
        hasher: Arc<PasswordHasher>,
        tokens: Arc<TokenManager>,
        sessions: Option<SessionStore>,
        policy: Arc<SecurityConfig>,
    ) -> Self {
        Self {
            users,
            hasher,
            tokens,
            sessions,
            policy,
        }
    }

    pub fn sessions(&self) -> Option<&SessionStore> {
        self.sessions.as_ref()
    }

    /// 用户注册
    ///
    /// Tokens and the session are produced before the user row is written, so a
    /// session-store outage leaves no account behind.
    pub async fn register(&self, req: RegisterRequest) -> Result<IssuedCredentials, AppError> {
        let email = normalize_email(&req.email);
        validate_password_policy(&req.password, &self.policy)?;

        if self.users.check_user_exists(&email).await? {
            tracing::info!(username = %req.username, "Registration rejected: email taken");
            return Err(AppError::Conflict("email already exists".to_string()));
        }

        let password_hash = self.hash_password(req.password).await?;
        let user_id = UserId(Uuid::new_v4());
        let issued = self.issue(user_id).await?;

        let created = self
            .users
            .create_user(NewUser {
                id: user_id,
                username: req.username,
                email,
                password_hash,
            })
            .await;

        if let Err(e) = created {
            self.discard_session(issued.session.as_ref()).await;
            return Err(e.into());
        }

        metrics::counter!("auth_registrations_total").increment(1);
        tracing::info!(user_id = %user_id, "User registered");

        Ok(issued)
    }

    /// 用户登录
    pub async fn login(&self, req: LoginRequest) -> Result<IssuedCredentials, AppError> {
        let email = normalize_email(&req.email);

        let Some(user) = self.users.find_credentials_by_email(&email).await? else {
            // same Argon2 cost as a real mismatch
            let _ = self.verify_dummy(req.password).await;
            metrics::counter!("auth_login_failures_total").increment(1);
            tracing::info!("Login failed: unknown email");
            return Err(AppError::Unauthorized);
        };

        if let Err(e) = self.verify_password(req.password, user.password_hash).await {
            metrics::counter!("auth_login_failures_total").increment(1);
            tracing::info!(user_id = %user.id, "Login failed: bad password");
            return Err(e);
        }

        let issued = self.issue(UserId(user.id)).await?;
        tracing::info!(user_id = %user.id, "User logged in");

        Ok(issued)
    }

    /// 用户登出：删除服务端会话（幂等）
    pub async fn logout(&self, session: Option<&Session>) -> Result<(), AppError> {
        if let (Some(store), Some(session)) = (&self.sessions, session) {
            store.delete(&session.id).await?;
        }
        Ok(())
    }

    async fn discard_session(&self, session: Option<&Session>) {
        if let (Some(store), Some(session)) = (&self.sessions, session) {
            if let Err(e) = store.delete(&session.id).await {
                tracing::warn!(error = %e, "Failed to discard session of aborted registration");
            }
        }
    }

    async fn issue(&self, user_id: UserId) -> Result<IssuedCredentials, AppError> {
        let access_token = self.tokens.issue_token(&user_id.to_string())?;
        let refresh_token = self.tokens.issue_refresh_token()?;

        let session = match &self.sessions {
            Some(store) => {
                let mut session = store.create()?;
                session.insert(USER_ID_KEY, user_id.as_uuid())?;
                store.save(&session).await?;
                Some(session)
            }
            None => None,
        };

        Ok(IssuedCredentials {
            response: AuthResponse {
                user_id: user_id.as_uuid(),
                access_token,
                refresh_token,
                token_type: "Bearer",
                expires_in: self.tokens.ttl_secs(),
            },
            session,
        })
    }

    // Argon2 is CPU bound; keep it off the async workers.
    async fn hash_password(&self, password: String) -> Result<String, AppError> {
        let hasher = self.hasher.clone();
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AppError::Internal(format!("hashing task failed: {}", e)))??;
        Ok(hash)
    }

    async fn verify_dummy(&self, password: String) -> Result<(), AppError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify_dummy(&password))
            .await
            .map_err(|e| AppError::Internal(format!("verification task failed: {}", e)))??;
        Ok(())
    }

    async fn verify_password(&self, password: String, hash: String) -> Result<(), AppError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("verification task failed: {}", e)))??;
        Ok(())
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
