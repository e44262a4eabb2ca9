use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::accounts::AccountError;
use crate::feed::{LikeError, PostError};
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { .. } => AppError::Conflict(e.to_string()),
            StoreError::Unavailable(msg) => AppError::Unavailable(msg),
            StoreError::Serialization(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<LikeError> for AppError {
    fn from(e: LikeError) -> Self {
        match e {
            LikeError::NotFound(_) => AppError::NotFound,
            LikeError::InvalidCaller => AppError::Unauthorized,
            LikeError::TransactionConflict { .. } => AppError::Conflict(e.to_string()),
            LikeError::StoreUnavailable(msg) => AppError::Unavailable(msg),
            LikeError::Malformed(msg) => AppError::Internal(msg),
        }
    }
}

impl From<PostError> for AppError {
    fn from(e: PostError) -> Self {
        match e {
            PostError::TooManyImages { .. } => AppError::BadRequest(e.to_string()),
            PostError::Store(e) => e.into(),
        }
    }
}

impl From<AccountError> for AppError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::Invalid(msg) => AppError::BadRequest(msg),
            AccountError::IdTaken(_) => AppError::Conflict(e.to_string()),
            AccountError::InvalidCredentials => AppError::Unauthorized,
            AccountError::NotFound(_) => AppError::NotFound,
            AccountError::Hash(e) => AppError::Internal(e.to_string()),
            AccountError::Store(e) => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Unavailable(msg) => {
                tracing::error!("Store unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service temporarily unavailable, try again".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
