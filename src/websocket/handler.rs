//! WebSocket upgrade handler (§6): `GET /room/ws/{room_type}/{room_id}?token=`.

use axum::extract::ws::{CloseFrame, Message, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use futures_util::SinkExt;
use serde::Deserialize;

use crate::protocol::RoomId;
use crate::server::AppState;

use super::connection::handle_socket;

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    token: Option<String>,
}

pub async fn websocket_handler(
    Path((room_type, room_id)): Path<(String, RoomId)>,
    Query(query): Query<TokenQuery>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    let room_type = match room_type.parse() {
        Ok(room_type) => room_type,
        Err(_) => {
            return ws.on_upgrade(move |mut socket| async move {
                let close = Message::Close(Some(CloseFrame {
                    code: 1008,
                    reason: "Invalid room type".into(),
                }));
                let _ = socket.send(close).await;
            });
        }
    };

    let now = chrono::Utc::now().timestamp();
    let identity = state.auth.resolve(query.token.as_deref(), now);
    let room = state.rooms.room(room_type, room_id);
    let metrics = state.metrics.clone();
    let max_message_size = state.config.security.max_message_size;

    ws.on_upgrade(move |socket| {
        handle_socket(socket, room, identity, metrics, max_message_size)
    })
}
