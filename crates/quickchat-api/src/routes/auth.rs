use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use quickchat_core::{auth, user::user_json, AppState};
use quickchat_util::validation;
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::middleware::AuthUser;

#[derive(Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub bio: Option<String>,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_ascii_lowercase();
    validation::validate_email(&email).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    validation::validate_full_name(req.full_name.trim())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    validation::validate_password(&req.password)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if let Some(bio) = req.bio.as_deref() {
        validation::validate_bio(bio).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    }

    let password_hash = auth::hash_password(&req.password)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!(e.to_string())))?;
    let user_id = quickchat_util::snowflake::generate(1);
    // The UNIQUE index on email is the authority; a racing duplicate signup
    // loses here rather than at a lookup beforehand.
    let user = match quickchat_db::users::create_user(
        &state.db,
        user_id,
        &email,
        req.full_name.trim(),
        &password_hash,
        req.bio.as_deref(),
    )
    .await
    {
        Ok(user) => user,
        Err(quickchat_db::DbError::UniqueViolation) => {
            return Err(ApiError::Conflict("email already registered".into()));
        }
        Err(e) => return Err(e.into()),
    };

    let token = auth::create_token(
        user.id,
        &state.config.jwt_secret,
        state.config.jwt_expiry_seconds,
    )
    .map_err(|e| ApiError::Internal(anyhow::anyhow!(e.to_string())))?;

    tracing::info!(user_id = user.id, "account created");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "user": user_json(&user), "token": token })),
    ))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_ascii_lowercase();
    let user = quickchat_db::users::get_user_by_email(&state.db, &email)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let valid = auth::verify_password(&req.password, &user.password_hash)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!(e.to_string())))?;
    if !valid {
        return Err(ApiError::Unauthorized);
    }

    let token = auth::create_token(
        user.id,
        &state.config.jwt_secret,
        state.config.jwt_expiry_seconds,
    )
    .map_err(|e| ApiError::Internal(anyhow::anyhow!(e.to_string())))?;

    Ok(Json(json!({ "user": user_json(&user), "token": token })))
}

/// Token check used by clients on startup to restore a session.
pub async fn check(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let user = quickchat_db::users::get_user_by_id(&state.db, auth.user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    Ok(Json(user_json(&user)))
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub bio: Option<String>,
    /// Inline image as a `data:image/...;base64,` URI.
    pub avatar: Option<String>,
}

pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = quickchat_core::user::update_profile(
        &state.db,
        &state.storage,
        state.config.max_upload_size,
        auth.user_id,
        req.full_name.as_deref(),
        req.bio.as_deref(),
        req.avatar.as_deref(),
    )
    .await?;
    Ok(Json(user_json(&updated)))
}
