use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use quickchat_core::message::{message_json, MessageDraft};
use quickchat_core::user::user_json;
use quickchat_core::AppState;
use quickchat_models::gateway::EVENT_MESSAGE_SEEN;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

use crate::error::ApiError;
use crate::middleware::AuthUser;

/// Contact sidebar: every other account, annotated with how many of their
/// messages the caller has not read yet.
pub async fn list_contacts(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let users = quickchat_db::users::list_other_users(&state.db, auth.user_id).await?;
    let unseen: HashMap<i64, i64> =
        quickchat_db::messages::count_unseen_by_sender(&state.db, auth.user_id)
            .await?
            .into_iter()
            .collect();

    let contacts: Vec<_> = users
        .iter()
        .map(|u| {
            let mut entry = user_json(u);
            entry["unseen_count"] = json!(unseen.get(&u.id).copied().unwrap_or(0));
            entry
        })
        .collect();
    Ok(Json(contacts))
}

/// Fetch both directions of a conversation, oldest first. Fetching marks the
/// other party's messages as seen and tells them so over the gateway.
pub async fn get_conversation(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    quickchat_db::users::get_user_by_id(&state.db, user_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let messages =
        quickchat_db::messages::get_conversation(&state.db, auth.user_id, user_id).await?;

    let marked =
        quickchat_db::messages::mark_conversation_seen(&state.db, user_id, auth.user_id).await?;
    if marked > 0 {
        state.event_bus.dispatch_to_users(
            EVENT_MESSAGE_SEEN,
            json!({
                "reader_id": auth.user_id.to_string(),
                "sender_id": user_id.to_string(),
                "count": marked,
            }),
            vec![user_id],
        );
    }

    let body: Vec<_> = messages.iter().map(message_json).collect();
    Ok(Json(body))
}

/// Mark a single received message as seen.
pub async fn mark_seen(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let message = quickchat_db::messages::get_message(&state.db, message_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if message.recipient_id != auth.user_id {
        return Err(ApiError::Forbidden);
    }

    let marked =
        quickchat_db::messages::mark_message_seen(&state.db, message_id, auth.user_id).await?;
    if marked {
        state.event_bus.dispatch_to_users(
            EVENT_MESSAGE_SEEN,
            json!({
                "reader_id": auth.user_id.to_string(),
                "message_id": message_id.to_string(),
            }),
            vec![message.sender_id],
        );
    }
    Ok(Json(json!({ "message_id": message_id.to_string(), "seen": true })))
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub text: Option<String>,
    /// Inline image as a `data:image/...;base64,` URI.
    pub image: Option<String>,
}

pub async fn send_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<i64>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (message, outcome) = quickchat_core::message::relay(
        &state.db,
        &state.registry,
        &state.event_bus,
        &state.storage,
        state.config.max_upload_size,
        auth.user_id,
        user_id,
        MessageDraft {
            text: req.text,
            image: req.image,
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": message_json(&message),
            "delivered_live": outcome.delivered_live(),
        })),
    ))
}
