use crate::error::CoreError;
use quickchat_db::users::UserRow;
use quickchat_db::DbPool;
use quickchat_media::{decode_data_uri, Storage};
use serde_json::{json, Value};

pub fn user_json(user: &UserRow) -> Value {
    json!({
        "id": user.id.to_string(),
        "email": user.email,
        "full_name": user.full_name,
        "bio": user.bio,
        "avatar_url": user.avatar_key.as_deref().map(crate::message::file_url),
        "created_at": user.created_at.to_rfc3339(),
    })
}

/// Update profile fields; a `avatar` data URI is decoded and pushed to the
/// storage backend first, and only the stored key lands in the database.
pub async fn update_profile(
    pool: &DbPool,
    storage: &Storage,
    max_image_bytes: u64,
    user_id: i64,
    full_name: Option<&str>,
    bio: Option<&str>,
    avatar: Option<&str>,
) -> Result<UserRow, CoreError> {
    if let Some(name) = full_name {
        quickchat_util::validation::validate_full_name(name)
            .map_err(|e| CoreError::BadRequest(e.to_string()))?;
    }
    if let Some(bio) = bio {
        quickchat_util::validation::validate_bio(bio)
            .map_err(|e| CoreError::BadRequest(e.to_string()))?;
    }

    let avatar_key = match avatar {
        Some(uri) => {
            let image = decode_data_uri(uri, max_image_bytes)?;
            let key = image.storage_key("avatars");
            storage.store(&key, &image.bytes).await?;
            Some(key)
        }
        None => None,
    };

    match quickchat_db::users::update_user(pool, user_id, full_name, bio, avatar_key.as_deref())
        .await
    {
        Ok(updated) => Ok(updated),
        Err(err) => {
            // No row took ownership of the stored avatar; drop it again.
            if let Some(key) = avatar_key.as_deref() {
                if let Err(cleanup) = storage.delete(key).await {
                    tracing::warn!(key, error = %cleanup, "failed to remove orphaned avatar");
                }
            }
            Err(err.into())
        }
    }
}
