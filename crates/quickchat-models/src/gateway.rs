use serde::{Deserialize, Serialize};

// Dispatch event names. `getOnlineUsers` and `newMessage` are part of the
// wire contract with existing clients; the rest follow the same camelCase
// convention.
pub const EVENT_SESSION_READY: &str = "sessionReady";
pub const EVENT_ONLINE_USERS: &str = "getOnlineUsers";
pub const EVENT_NEW_MESSAGE: &str = "newMessage";
pub const EVENT_MESSAGE_SEEN: &str = "messageSeen";

/// One frame on the gateway socket: an event name plus its JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayFrame {
    pub event: String,
    pub data: serde_json::Value,
}

impl GatewayFrame {
    pub fn new(event: &str, data: serde_json::Value) -> Self {
        Self {
            event: event.to_string(),
            data,
        }
    }
}
