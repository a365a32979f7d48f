use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    pub id: i64,
    pub sender_id: i64,
    pub recipient_id: i64,
    pub text: Option<String>,
    pub image_key: Option<String>,
    pub seen: bool,
    pub created_at: DateTime<Utc>,
}

pub async fn create_message(
    pool: &DbPool,
    id: i64,
    sender_id: i64,
    recipient_id: i64,
    text: Option<&str>,
    image_key: Option<&str>,
) -> Result<MessageRow, DbError> {
    let row = sqlx::query_as::<_, MessageRow>(
        "INSERT INTO messages (id, sender_id, recipient_id, text, image_key)
         VALUES (?1, ?2, ?3, ?4, ?5)
         RETURNING id, sender_id, recipient_id, text, image_key, seen, created_at",
    )
    .bind(id)
    .bind(sender_id)
    .bind(recipient_id)
    .bind(text)
    .bind(image_key)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_message(pool: &DbPool, id: i64) -> Result<Option<MessageRow>, DbError> {
    let row = sqlx::query_as::<_, MessageRow>(
        "SELECT id, sender_id, recipient_id, text, image_key, seen, created_at
         FROM messages WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Full conversation between two users, oldest first.
pub async fn get_conversation(
    pool: &DbPool,
    user_a: i64,
    user_b: i64,
) -> Result<Vec<MessageRow>, DbError> {
    let rows = sqlx::query_as::<_, MessageRow>(
        "SELECT id, sender_id, recipient_id, text, image_key, seen, created_at
         FROM messages
         WHERE (sender_id = ?1 AND recipient_id = ?2)
            OR (sender_id = ?2 AND recipient_id = ?1)
         ORDER BY id ASC",
    )
    .bind(user_a)
    .bind(user_b)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn mark_message_seen(pool: &DbPool, id: i64, recipient_id: i64) -> Result<bool, DbError> {
    let result = sqlx::query("UPDATE messages SET seen = 1 WHERE id = ?1 AND recipient_id = ?2")
        .bind(id)
        .bind(recipient_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Mark everything `sender_id` sent to `recipient_id` as seen.
pub async fn mark_conversation_seen(
    pool: &DbPool,
    sender_id: i64,
    recipient_id: i64,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE messages SET seen = 1
         WHERE sender_id = ?1 AND recipient_id = ?2 AND seen = 0",
    )
    .bind(sender_id)
    .bind(recipient_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Unseen message counts for `recipient_id`, keyed by sender.
pub async fn count_unseen_by_sender(
    pool: &DbPool,
    recipient_id: i64,
) -> Result<Vec<(i64, i64)>, DbError> {
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT sender_id, COUNT(*) FROM messages
         WHERE recipient_id = ?1 AND seen = 0
         GROUP BY sender_id",
    )
    .bind(recipient_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
