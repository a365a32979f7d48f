use crate::events::EventBus;
use quickchat_models::gateway::EVENT_ONLINE_USERS;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;

/// Opaque identifier for one live gateway connection (a UUID string minted
/// at upgrade time).
pub type ConnectionId = String;

struct RegistryInner {
    entries: HashMap<i64, ConnectionId>,
    /// First-registration order, so snapshots are deterministic.
    order: Vec<i64>,
}

/// Maps each user to at most one live gateway connection.
///
/// Held in `AppState` behind an `Arc` so tests can build independent
/// instances; never a process-wide singleton. A mutex guards the map because
/// connection lifecycles run on a multi-threaded runtime; every operation is
/// a short synchronous critical section with no await points.
///
/// A newer connection for the same user silently replaces the older mapping
/// (last writer wins). Nothing here persists: a restart empties the registry,
/// which is accepted behavior.
pub struct ConnectionRegistry {
    inner: Mutex<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                entries: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }

    /// Insert or overwrite the mapping for `user_id`.
    pub fn register(&self, user_id: i64, connection_id: &str) {
        let mut inner = self.lock();
        if inner
            .entries
            .insert(user_id, connection_id.to_string())
            .is_none()
        {
            inner.order.push(user_id);
        }
    }

    /// Remove the mapping only while it still points at `connection_id`.
    ///
    /// A reconnect overwrites the mapping before the old socket's close frame
    /// arrives; matching on the connection id keeps that stale close from
    /// evicting the live session. Returns whether an entry was removed.
    pub fn unregister(&self, user_id: i64, connection_id: &str) -> bool {
        let mut inner = self.lock();
        match inner.entries.get(&user_id) {
            Some(current) if current == connection_id => {
                inner.entries.remove(&user_id);
                inner.order.retain(|id| *id != user_id);
                true
            }
            _ => false,
        }
    }

    pub fn lookup(&self, user_id: i64) -> Option<ConnectionId> {
        self.lock().entries.get(&user_id).cloned()
    }

    /// All currently-registered users in first-registration order.
    /// Recomputed on every call, never cached.
    pub fn snapshot(&self) -> Vec<i64> {
        self.lock().order.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Session gate for the connection handshake.
///
/// The token was already validated on the HTTP request that issued it; this
/// only filters malformed or placeholder identifiers. Web clients that lost
/// their auth state send the stringified JS sentinels `"undefined"` and
/// `"null"`, which must not become registry keys.
pub fn admit(raw_user_id: Option<&str>) -> Option<String> {
    let candidate = raw_user_id?.trim();
    if candidate.is_empty() || candidate == "undefined" || candidate == "null" {
        return None;
    }
    Some(candidate.to_string())
}

/// Fan the current online set out to every connected session.
///
/// Called exactly twice per connection lifecycle (after registration, after
/// unregistration). IDs go over the wire as strings in registration order.
pub fn broadcast_online(bus: &EventBus, registry: &ConnectionRegistry) {
    let online: Vec<String> = registry
        .snapshot()
        .into_iter()
        .map(|id| id.to_string())
        .collect();
    tracing::debug!(online = online.len(), "broadcasting online set");
    bus.dispatch(EVENT_ONLINE_USERS, json!(online));
}
