use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found")]
    NotFound,
    #[error("forbidden")]
    Forbidden,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("database error: {0}")]
    Database(#[from] quickchat_db::DbError),
    #[error("storage error: {0}")]
    Storage(#[from] quickchat_media::StorageError),
    #[error("internal error: {0}")]
    Internal(String),
}
