//! User repository (数据库访问层)
//!
//! The auth core talks to user storage only through [`UserStorage`]; Postgres is
//! the production implementation.

use crate::models::user::{NewUser, UserCredentials};
use crate::auth::UserId;
use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// Email (or username) already taken
    #[error("user already exists")]
    Conflict,

    #[error("storage error: {0}")]
    Database(#[from] sqlx::Error),
}

/// User storage consumed by registration and login
#[async_trait]
pub trait UserStorage: Send + Sync {
    async fn check_user_exists(&self, email: &str) -> Result<bool, StorageError>;

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, StorageError>;

    /// Insert a user. Fails with `Conflict` if the email is taken, even when two
    /// registrations race past `check_user_exists`.
    async fn create_user(&self, user: NewUser) -> Result<UserId, StorageError>;

    async fn ping(&self) -> Result<(), StorageError>;
}

pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStorage for PgUserRepository {
    async fn check_user_exists(&self, email: &str) -> Result<bool, StorageError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.db)
                .await?;

        Ok(exists)
    }

    /// 根据邮箱查找凭据
    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, StorageError> {
        let user = sqlx::query_as::<_, UserCredentials>(
            "SELECT id, username, email, password_hash FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;

        Ok(user)
    }

    /// 创建用户
    async fn create_user(&self, user: NewUser) -> Result<UserId, StorageError> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => Ok(user.id),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(StorageError::Conflict),
            Err(e) => Err(StorageError::Database(e)),
        }
    }

    async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }
}
