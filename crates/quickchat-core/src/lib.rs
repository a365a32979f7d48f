pub mod auth;
pub mod error;
pub mod events;
pub mod message;
pub mod presence;
pub mod user;

use quickchat_db::DbPool;
use quickchat_media::Storage;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub event_bus: events::EventBus,
    pub config: AppConfig,
    /// Who is online right now: user id -> live connection id.
    pub registry: Arc<presence::ConnectionRegistry>,
    /// Pluggable object-storage backend for avatars and message images.
    pub storage: Arc<Storage>,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub jwt_expiry_seconds: u64,
    /// Upper bound for a decoded inline image upload, in bytes.
    pub max_upload_size: u64,
    /// Client reconnection policy advertised on the gateway handshake.
    pub reconnect_max_attempts: u32,
    pub reconnect_delay_ms: u64,
    pub reconnect_backoff_factor: f64,
}
