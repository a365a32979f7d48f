use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub bio: Option<String>,
    pub avatar_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub async fn create_user(
    pool: &DbPool,
    id: i64,
    email: &str,
    full_name: &str,
    password_hash: &str,
    bio: Option<&str>,
) -> Result<UserRow, DbError> {
    let row = match sqlx::query_as::<_, UserRow>(
        "INSERT INTO users (id, email, full_name, password_hash, bio)
         VALUES (?1, ?2, ?3, ?4, ?5)
         RETURNING id, email, full_name, password_hash, bio, avatar_key, created_at",
    )
    .bind(id)
    .bind(email)
    .bind(full_name)
    .bind(password_hash)
    .bind(bio)
    .fetch_one(pool)
    .await
    {
        Ok(row) => row,
        Err(err) if is_unique_violation(&err) => return Err(DbError::UniqueViolation),
        Err(err) => return Err(DbError::Sqlx(err)),
    };
    Ok(row)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db_err) = err else {
        return false;
    };

    let code_binding = db_err.code();
    let code = code_binding.as_deref().unwrap_or_default();
    if code == "23505" || code == "2067" || code == "1555" {
        return true;
    }

    db_err.message().to_ascii_lowercase().contains("unique")
}

pub async fn get_user_by_id(pool: &DbPool, id: i64) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, email, full_name, password_hash, bio, avatar_key, created_at
         FROM users WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_user_by_email(pool: &DbPool, email: &str) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, email, full_name, password_hash, bio, avatar_key, created_at
         FROM users WHERE email = ?1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn update_user(
    pool: &DbPool,
    id: i64,
    full_name: Option<&str>,
    bio: Option<&str>,
    avatar_key: Option<&str>,
) -> Result<UserRow, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "UPDATE users SET full_name = COALESCE(?2, full_name), bio = COALESCE(?3, bio),
                avatar_key = COALESCE(?4, avatar_key), updated_at = datetime('now')
         WHERE id = ?1
         RETURNING id, email, full_name, password_hash, bio, avatar_key, created_at",
    )
    .bind(id)
    .bind(full_name)
    .bind(bio)
    .bind(avatar_key)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// All accounts except `user_id`, for the contact sidebar.
pub async fn list_other_users(pool: &DbPool, user_id: i64) -> Result<Vec<UserRow>, DbError> {
    let rows = sqlx::query_as::<_, UserRow>(
        "SELECT id, email, full_name, password_hash, bio, avatar_key, created_at
         FROM users WHERE id != ?1
         ORDER BY created_at ASC, id ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
