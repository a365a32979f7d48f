use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use quickchat_core::presence::{self, broadcast_online};
use quickchat_core::AppState;
use quickchat_models::gateway::{GatewayFrame, EVENT_SESSION_READY};
use serde_json::json;

use crate::reconnect::ReconnectPolicy;

async fn send_frame(
    sender: &mut (impl SinkExt<Message> + Unpin),
    frame: &GatewayFrame,
) -> Result<(), ()> {
    let payload = serde_json::to_string(frame).map_err(|_| ())?;
    sender
        .send(Message::Text(payload.into()))
        .await
        .map_err(|_| ())
}

async fn send_close(
    sender: &mut (impl SinkExt<Message> + Unpin),
    code: u16,
    reason: &str,
) -> Result<(), ()> {
    sender
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })))
        .await
        .map_err(|_| ())
}

pub async fn handle_connection(socket: WebSocket, state: AppState, raw_user_id: Option<String>) {
    // Handshake identifiers arrive as-is from the query string. Placeholder
    // values from clients that lost their auth state are filtered here; a
    // rejected socket still gets the hello frame but is never registered.
    let admitted = presence::admit(raw_user_id.as_deref());
    let connection_id = uuid::Uuid::new_v4().to_string();
    let (mut sender, mut receiver) = socket.split();

    let policy = ReconnectPolicy {
        max_attempts: state.config.reconnect_max_attempts,
        delay_ms: state.config.reconnect_delay_ms,
        backoff_factor: state.config.reconnect_backoff_factor,
    };
    let mut ready_data = json!({
        "connection_id": connection_id,
        "reconnect": policy,
    });
    if let Some(ref candidate) = admitted {
        ready_data["user_id"] = json!(candidate);
    }
    let ready = GatewayFrame::new(EVENT_SESSION_READY, ready_data);
    if send_frame(&mut sender, &ready).await.is_err() {
        return;
    }

    let Some(candidate) = admitted else {
        tracing::debug!(raw_user_id = ?raw_user_id, "rejected gateway handshake");
        drain_unadmitted(&mut receiver).await;
        return;
    };

    let user_id = match candidate.parse::<i64>() {
        Ok(id) => id,
        Err(_) => {
            let _ = send_close(&mut sender, 1008, "malformed user id").await;
            return;
        }
    };

    // Subscribe before registering so this session receives the online
    // broadcast triggered by its own registration.
    let mut event_rx = state.event_bus.subscribe();
    state.registry.register(user_id, &connection_id);
    broadcast_online(&state.event_bus, &state.registry);
    tracing::info!(user_id, connection_id = %connection_id, "gateway session opened");

    let disconnect_reason = loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        // The gateway is push-only; clients have no inbound
                        // events to send. Log and move on.
                        tracing::debug!(user_id, bytes = text.len(), "ignoring client frame");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break if let Some(frame) = frame {
                            format!("client close frame (code={}, reason={})", frame.code, frame.reason)
                        } else {
                            "client close frame (no code/reason)".to_string()
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        break format!("websocket receive error: {err}");
                    }
                    None => {
                        break "websocket stream ended".to_string();
                    }
                }
            }
            event = event_rx.recv() => {
                match event {
                    Ok(event) => {
                        if !event.targets(user_id) {
                            continue;
                        }
                        let frame = GatewayFrame::new(&event.event_type, event.payload);
                        if send_frame(&mut sender, &frame).await.is_err() {
                            break "websocket send error".to_string();
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            user_id,
                            skipped,
                            "event stream lagged; forcing reconnect"
                        );
                        let _ = send_close(
                            &mut sender,
                            1013,
                            "Gateway fell behind; reconnect required",
                        )
                        .await;
                        break format!("event stream lagged by {skipped} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        break "event stream closed".to_string();
                    }
                }
            }
        }
    };
    tracing::info!(user_id, connection_id = %connection_id, reason = %disconnect_reason, "gateway session closed");

    // A reconnect may already have replaced this mapping; only an actual
    // removal changes the online set, so only then does anyone get told.
    if state.registry.unregister(user_id, &connection_id) {
        broadcast_online(&state.event_bus, &state.registry);
    }
}

/// Sockets that fail the handshake gate never touch the registry; just wait
/// for the peer to hang up.
async fn drain_unadmitted(
    receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
) {
    while let Some(Ok(msg)) = receiver.next().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
    }
}
