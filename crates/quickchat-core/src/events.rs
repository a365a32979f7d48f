use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub struct ServerEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
    /// When set, only deliver this event to the specified user IDs.
    /// `None` means every connected session receives it.
    pub target_user_ids: Option<Vec<i64>>,
}

impl ServerEvent {
    pub fn targets(&self, user_id: i64) -> bool {
        match &self.target_user_ids {
            None => true,
            Some(targets) => targets.contains(&user_id),
        }
    }
}

/// Broadcast-based event bus for real-time dispatch. Each gateway session
/// holds its own receiver, so a slow or dead socket never blocks delivery
/// to the others.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ServerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Publish to every connected session. No receivers is not an error.
    pub fn dispatch(&self, event_type: &str, payload: serde_json::Value) {
        let _ = self.sender.send(ServerEvent {
            event_type: event_type.to_string(),
            payload,
            target_user_ids: None,
        });
    }

    /// Publish a targeted event delivered only to the specified users.
    pub fn dispatch_to_users(
        &self,
        event_type: &str,
        payload: serde_json::Value,
        target_user_ids: Vec<i64>,
    ) {
        let _ = self.sender.send(ServerEvent {
            event_type: event_type.to_string(),
            payload,
            target_user_ids: Some(target_user_ids),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(4096)
    }
}
