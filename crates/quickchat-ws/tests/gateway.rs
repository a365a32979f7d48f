//! Gateway handshake tests driven over a real WebSocket connection.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use quickchat_core::{AppConfig, AppState};
use quickchat_media::{LocalStorage, Storage};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Serve the gateway router on a random local port and hand back the
/// `ws://` endpoint plus the shared state for registry assertions.
async fn start_gateway() -> anyhow::Result<(String, AppState, TempDir)> {
    let db = quickchat_db::create_pool("sqlite::memory:", 1).await?;
    quickchat_db::run_migrations(&db).await?;

    let storage_dir = tempfile::tempdir()?;
    let state = AppState {
        db,
        event_bus: quickchat_core::events::EventBus::default(),
        config: AppConfig {
            jwt_secret: "gateway-test-secret".to_string(),
            jwt_expiry_seconds: 3600,
            max_upload_size: 1024 * 1024,
            reconnect_max_attempts: 5,
            reconnect_delay_ms: 1000,
            reconnect_backoff_factor: 1.0,
        },
        registry: Arc::new(quickchat_core::presence::ConnectionRegistry::new()),
        storage: Arc::new(Storage::Local(LocalStorage::new(storage_dir.path()))),
    };

    let app = quickchat_ws::gateway_router().with_state(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .await
            .expect("serve");
    });

    Ok((format!("ws://{addr}/ws"), state, storage_dir))
}

/// Wait for the next text frame and parse it, skipping pings.
async fn next_frame<S>(stream: &mut S) -> Value
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("json frame");
        }
    }
}

#[tokio::test]
async fn admitted_session_gets_hello_then_online_snapshot() {
    let (url, state, _storage_dir) = start_gateway().await.expect("gateway");
    let (mut ws, _) = connect_async(format!("{url}?user_id=7"))
        .await
        .expect("connect");

    let hello = next_frame(&mut ws).await;
    assert_eq!(hello["event"], "sessionReady");
    assert_eq!(hello["data"]["user_id"], "7");
    assert!(hello["data"]["connection_id"]
        .as_str()
        .is_some_and(|id| !id.is_empty()));
    assert_eq!(hello["data"]["reconnect"]["max_attempts"], 5);
    assert_eq!(hello["data"]["reconnect"]["delay_ms"], 1000);

    let online = next_frame(&mut ws).await;
    assert_eq!(online["event"], "getOnlineUsers");
    assert_eq!(online["data"], json!(["7"]));
    assert!(state.registry.lookup(7).is_some());

    drop(ws);
    // The session unregisters once the server notices the hangup.
    for _ in 0..50 {
        if state.registry.lookup(7).is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(state.registry.lookup(7).is_none());
}

#[tokio::test]
async fn rejected_identifier_gets_hello_frame_only() {
    let (url, state, _storage_dir) = start_gateway().await.expect("gateway");
    let (mut ws, _) = connect_async(format!("{url}?user_id=undefined"))
        .await
        .expect("connect");

    let hello = next_frame(&mut ws).await;
    assert_eq!(hello["event"], "sessionReady");
    assert!(hello["data"].get("user_id").is_none());
    assert!(hello["data"]["connection_id"]
        .as_str()
        .is_some_and(|id| !id.is_empty()));
    assert!(hello["data"]["reconnect"].is_object());
    assert!(state.registry.snapshot().is_empty());

    // Another session coming online broadcasts a presence update; the
    // unadmitted socket must not receive it.
    let (mut admitted, _) = connect_async(format!("{url}?user_id=9"))
        .await
        .expect("connect");
    let ready = next_frame(&mut admitted).await;
    assert_eq!(ready["event"], "sessionReady");
    let online = next_frame(&mut admitted).await;
    assert_eq!(online["event"], "getOnlineUsers");
    assert_eq!(state.registry.snapshot(), vec![9]);

    let silent = tokio::time::timeout(Duration::from_millis(300), ws.next()).await;
    assert!(
        silent.is_err(),
        "unadmitted socket must stay silent after the hello frame"
    );
}

#[tokio::test]
async fn malformed_numeric_id_is_closed_after_hello() {
    let (url, state, _storage_dir) = start_gateway().await.expect("gateway");
    let (mut ws, _) = connect_async(format!("{url}?user_id=abc"))
        .await
        .expect("connect");

    let hello = next_frame(&mut ws).await;
    assert_eq!(hello["event"], "sessionReady");

    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for close")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Close(frame) = msg {
            let frame = frame.expect("close frame carries a code");
            assert_eq!(u16::from(frame.code), 1008);
            break;
        }
    }
    assert!(state.registry.snapshot().is_empty());
}
