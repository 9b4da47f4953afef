//! 统一错误模型
//! 定义应用错误类型和错误响应格式，以及各组件错误到 AppError 的映射

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::{
    auth::{jwt::TokenError, password::CredentialError},
    repository::StorageError,
    session::SessionError,
};

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed")]
    Unauthorized,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// 返回给客户端的消息；服务端错误只给出固定文案
    pub fn user_message(&self) -> String {
        let fixed = match self {
            AppError::Conflict(msg) | AppError::BadRequest(msg) => return msg.clone(),
            AppError::Unauthorized => "Authentication failed",
            AppError::ServiceUnavailable(_) => "Service temporarily unavailable",
            AppError::Database(_) => "Database error occurred",
            AppError::Config(_) | AppError::Internal(_) => "Internal server error",
        };
        fixed.to_string()
    }

    pub fn code(&self) -> u16 {
        self.status_code().as_u16()
    }
}

/// 错误响应体: `{"error": {"code", "message", "request_id"}}`
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: u16,
    pub message: String,
    pub request_id: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let request_id = uuid::Uuid::new_v4().to_string();

        if status.is_server_error() {
            tracing::error!(code = status.as_u16(), error = %self, %request_id, "Request failed");
        } else {
            tracing::warn!(code = status.as_u16(), error = %self, %request_id, "Request rejected");
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: status.as_u16(),
                message: self.user_message(),
                request_id,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<CredentialError> for AppError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::Mismatch => AppError::Unauthorized,
            CredentialError::Hashing(msg) => AppError::Internal(msg),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Malformed | TokenError::InvalidSignature | TokenError::Expired => {
                AppError::Unauthorized
            }
            TokenError::Signing(msg) | TokenError::Entropy(msg) => AppError::Internal(msg),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound => AppError::Unauthorized,
            SessionError::Invalid(msg) => AppError::BadRequest(msg),
            SessionError::StoreUnavailable(msg) => AppError::ServiceUnavailable(msg),
            SessionError::Serialization(msg) | SessionError::Deserialization(msg) => {
                AppError::Internal(msg)
            }
        }
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Conflict => AppError::Conflict("email already exists".to_string()),
            StorageError::Database(e) => AppError::Database(e),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::BadRequest(e.to_string())
    }
}
