use crate::error::CoreError;
use crate::events::EventBus;
use crate::presence::ConnectionRegistry;
use quickchat_db::messages::MessageRow;
use quickchat_db::DbPool;
use quickchat_media::{decode_data_uri, Storage};
use quickchat_models::gateway::EVENT_NEW_MESSAGE;
use serde_json::{json, Value};

/// Whether a message reached the recipient's live connection or only the
/// store. Informational: `StoredOnly` is a success, the recipient picks the
/// message up on their next conversation fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    DeliveredLive,
    StoredOnly,
}

impl DeliveryOutcome {
    pub fn delivered_live(self) -> bool {
        matches!(self, DeliveryOutcome::DeliveredLive)
    }
}

/// An unsent message as received from the client: text, an inline base64
/// image, or both.
#[derive(Debug, Clone, Default)]
pub struct MessageDraft {
    pub text: Option<String>,
    pub image: Option<String>,
}

pub fn message_json(msg: &MessageRow) -> Value {
    json!({
        "id": msg.id.to_string(),
        "sender_id": msg.sender_id.to_string(),
        "recipient_id": msg.recipient_id.to_string(),
        "text": msg.text,
        "image_url": msg.image_key.as_deref().map(file_url),
        "seen": msg.seen,
        "created_at": msg.created_at.to_rfc3339(),
    })
}

pub fn file_url(key: &str) -> String {
    format!("/api/files/{key}")
}

/// Validate, persist, and best-effort push a direct message.
///
/// The push is fire-and-forget: no ack, no retry, and never queued. An
/// unregistered recipient is not an error; the message is stored either way
/// and the outcome only reports whether a live push was attempted.
#[allow(clippy::too_many_arguments)]
pub async fn relay(
    pool: &DbPool,
    registry: &ConnectionRegistry,
    bus: &EventBus,
    storage: &Storage,
    max_image_bytes: u64,
    sender_id: i64,
    recipient_id: i64,
    draft: MessageDraft,
) -> Result<(MessageRow, DeliveryOutcome), CoreError> {
    let text = draft
        .text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if text.is_none() && draft.image.is_none() {
        return Err(CoreError::BadRequest(
            "Message must include text or an image".into(),
        ));
    }
    if let Some(text) = text {
        quickchat_util::validation::validate_message_text(text)
            .map_err(|e| CoreError::BadRequest(e.to_string()))?;
    }
    if recipient_id == sender_id {
        return Err(CoreError::BadRequest(
            "Cannot send a message to yourself".into(),
        ));
    }
    quickchat_db::users::get_user_by_id(pool, recipient_id)
        .await?
        .ok_or(CoreError::NotFound)?;

    let image_key = match draft.image.as_deref() {
        Some(uri) => {
            let image = decode_data_uri(uri, max_image_bytes)?;
            let key = image.storage_key("attachments");
            storage.store(&key, &image.bytes).await?;
            Some(key)
        }
        None => None,
    };

    let msg_id = quickchat_util::snowflake::generate(1);
    let msg = match quickchat_db::messages::create_message(
        pool,
        msg_id,
        sender_id,
        recipient_id,
        text,
        image_key.as_deref(),
    )
    .await
    {
        Ok(msg) => msg,
        Err(err) => {
            // The insert failed after the attachment was stored; drop the
            // now-unreferenced object so it cannot leak.
            if let Some(key) = image_key.as_deref() {
                if let Err(cleanup) = storage.delete(key).await {
                    tracing::warn!(key, error = %cleanup, "failed to remove orphaned attachment");
                }
            }
            return Err(err.into());
        }
    };

    let outcome = if registry.lookup(recipient_id).is_some() {
        bus.dispatch_to_users(EVENT_NEW_MESSAGE, message_json(&msg), vec![recipient_id]);
        DeliveryOutcome::DeliveredLive
    } else {
        tracing::debug!(
            recipient_id,
            message_id = msg.id,
            "recipient offline, stored only"
        );
        DeliveryOutcome::StoredOnly
    };

    Ok((msg, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use quickchat_media::LocalStorage;

    struct Fixture {
        pool: DbPool,
        registry: ConnectionRegistry,
        bus: EventBus,
        storage: Storage,
        _dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let pool = quickchat_db::create_pool("sqlite::memory:", 1)
            .await
            .expect("pool");
        quickchat_db::run_migrations(&pool).await.expect("migrations");
        quickchat_db::users::create_user(&pool, 1, "a@example.com", "Alice", "hash", None)
            .await
            .expect("alice");
        quickchat_db::users::create_user(&pool, 2, "b@example.com", "Bob", "hash", None)
            .await
            .expect("bob");
        let dir = tempfile::tempdir().expect("tempdir");
        Fixture {
            pool,
            registry: ConnectionRegistry::new(),
            bus: EventBus::default(),
            storage: Storage::Local(LocalStorage::new(dir.path())),
            _dir: dir,
        }
    }

    fn text_draft(text: &str) -> MessageDraft {
        MessageDraft {
            text: Some(text.to_string()),
            image: None,
        }
    }

    #[tokio::test]
    async fn online_recipient_gets_exactly_one_targeted_push() {
        let fx = fixture().await;
        fx.registry.register(2, "conn-bob");
        let mut rx = fx.bus.subscribe();

        let (msg, outcome) = relay(
            &fx.pool,
            &fx.registry,
            &fx.bus,
            &fx.storage,
            1024,
            1,
            2,
            text_draft("hello bob"),
        )
        .await
        .expect("relay");

        assert_eq!(outcome, DeliveryOutcome::DeliveredLive);
        let event = rx.recv().await.expect("push");
        assert_eq!(event.event_type, EVENT_NEW_MESSAGE);
        assert!(event.targets(2));
        assert!(!event.targets(1));
        assert_eq!(event.payload["text"], "hello bob");
        assert_eq!(event.payload["sender_id"], "1");
        assert!(
            rx.try_recv().is_err(),
            "exactly one push event per message"
        );
        assert_eq!(msg.text.as_deref(), Some("hello bob"));
    }

    #[tokio::test]
    async fn offline_recipient_is_stored_only_without_error() {
        let fx = fixture().await;
        let mut rx = fx.bus.subscribe();

        let (msg, outcome) = relay(
            &fx.pool,
            &fx.registry,
            &fx.bus,
            &fx.storage,
            1024,
            1,
            2,
            text_draft("hello"),
        )
        .await
        .expect("relay");

        assert_eq!(outcome, DeliveryOutcome::StoredOnly);
        assert!(!outcome.delivered_live());
        assert!(rx.try_recv().is_err(), "no push for offline recipient");

        // The message is still persisted and fetchable.
        let stored = quickchat_db::messages::get_message(&fx.pool, msg.id)
            .await
            .expect("query")
            .expect("stored");
        assert!(!stored.seen);
    }

    #[tokio::test]
    async fn image_draft_is_decoded_and_stored() {
        let fx = fixture().await;
        let uri = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(b"png-bytes")
        );
        let (msg, _) = relay(
            &fx.pool,
            &fx.registry,
            &fx.bus,
            &fx.storage,
            1024,
            1,
            2,
            MessageDraft {
                text: None,
                image: Some(uri),
            },
        )
        .await
        .expect("relay");

        let key = msg.image_key.expect("image key");
        assert_eq!(fx.storage.retrieve(&key).await.expect("data"), b"png-bytes");
    }

    #[tokio::test]
    async fn failed_insert_removes_stored_attachment() {
        let fx = fixture().await;
        let uri = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(b"png-bytes")
        );
        // Sender 999 has no account, so the insert trips the foreign key
        // after the attachment has already been written.
        let err = relay(
            &fx.pool,
            &fx.registry,
            &fx.bus,
            &fx.storage,
            1024,
            999,
            2,
            MessageDraft {
                text: None,
                image: Some(uri),
            },
        )
        .await
        .expect_err("insert must fail");
        assert!(matches!(err, CoreError::Database(_)));

        let attachments = fx._dir.path().join("attachments");
        let orphans = std::fs::read_dir(&attachments)
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(orphans, 0, "stored attachment must be cleaned up");
    }

    #[tokio::test]
    async fn rejects_empty_oversized_self_and_unknown() {
        let fx = fixture().await;
        let empty = relay(
            &fx.pool,
            &fx.registry,
            &fx.bus,
            &fx.storage,
            1024,
            1,
            2,
            MessageDraft::default(),
        )
        .await;
        assert!(matches!(empty, Err(CoreError::BadRequest(_))));

        let oversized = relay(
            &fx.pool,
            &fx.registry,
            &fx.bus,
            &fx.storage,
            1024,
            1,
            2,
            text_draft(&"x".repeat(4001)),
        )
        .await;
        assert!(matches!(oversized, Err(CoreError::BadRequest(_))));

        let to_self = relay(
            &fx.pool,
            &fx.registry,
            &fx.bus,
            &fx.storage,
            1024,
            1,
            1,
            text_draft("hi me"),
        )
        .await;
        assert!(matches!(to_self, Err(CoreError::BadRequest(_))));

        let unknown = relay(
            &fx.pool,
            &fx.registry,
            &fx.bus,
            &fx.storage,
            1024,
            1,
            999,
            text_draft("hi"),
        )
        .await;
        assert!(matches!(unknown, Err(CoreError::NotFound)));
    }
}
