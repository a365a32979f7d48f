use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("rate limited")]
    RateLimited,
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            ApiError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate limited".to_string()),
            ApiError::Internal(err) => {
                tracing::error!("API internal error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message, "message": message }))).into_response()
    }
}

impl From<quickchat_core::error::CoreError> for ApiError {
    fn from(e: quickchat_core::error::CoreError) -> Self {
        match e {
            quickchat_core::error::CoreError::NotFound => ApiError::NotFound,
            quickchat_core::error::CoreError::Forbidden => ApiError::Forbidden,
            quickchat_core::error::CoreError::BadRequest(msg) => ApiError::BadRequest(msg),
            quickchat_core::error::CoreError::Storage(e) => match e {
                quickchat_media::StorageError::NotFound(_) => ApiError::NotFound,
                quickchat_media::StorageError::TooLarge { got, max } => {
                    ApiError::BadRequest(format!("image too large ({got} bytes, max {max})"))
                }
                quickchat_media::StorageError::InvalidData(msg) => ApiError::BadRequest(msg),
                quickchat_media::StorageError::Io(_) => {
                    ApiError::Internal(anyhow::anyhow!("storage error"))
                }
            },
            quickchat_core::error::CoreError::Database(_) => {
                ApiError::Internal(anyhow::anyhow!("database error"))
            }
            quickchat_core::error::CoreError::Internal(msg) => {
                ApiError::Internal(anyhow::anyhow!(msg))
            }
        }
    }
}

impl From<quickchat_db::DbError> for ApiError {
    fn from(e: quickchat_db::DbError) -> Self {
        match e {
            quickchat_db::DbError::NotFound => ApiError::NotFound,
            quickchat_db::DbError::UniqueViolation => {
                ApiError::Conflict("already exists".into())
            }
            quickchat_db::DbError::Sqlx(_) => ApiError::Internal(anyhow::anyhow!("database error")),
        }
    }
}
