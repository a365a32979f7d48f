mod handler;
mod reconnect;

pub use reconnect::ReconnectPolicy;

use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use quickchat_core::AppState;
use serde::Deserialize;

#[derive(Deserialize)]
struct WsParams {
    user_id: Option<String>,
}

pub fn gateway_router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handler::handle_connection(socket, state, params.user_id))
}
