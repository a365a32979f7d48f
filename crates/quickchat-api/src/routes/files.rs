use axum::{
    extract::{Path, State},
    http::{header, HeaderValue},
    response::IntoResponse,
};
use quickchat_core::AppState;

use crate::error::ApiError;
use crate::middleware::AuthUser;

/// Serve a stored object (avatar or message image) by its storage key.
pub async fn download_file(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let data = state.storage.retrieve(&key).await.map_err(|e| match e {
        quickchat_media::StorageError::NotFound(_) => ApiError::NotFound,
        other => ApiError::Internal(anyhow::anyhow!(other.to_string())),
    })?;

    let content_type = mime_guess::from_path(&key)
        .first_or_octet_stream()
        .to_string();

    Ok((
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_str(&content_type)
                .unwrap_or(HeaderValue::from_static("application/octet-stream")),
        )],
        data,
    ))
}
