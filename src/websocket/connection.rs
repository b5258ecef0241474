//! Per-socket read/write loop (§4.1, §7). Grounded in the teacher's
//! split-sender/receiver connection task, reduced to this protocol's single
//! binary Envelope frame per message (no batching — LiveWar state frames are
//! already coalesced per tick by the room itself).

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::auth::Identity;
use crate::metrics::ServerMetrics;
use crate::protocol::Envelope;
use crate::rooms::RoomInstance;

const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

pub(super) async fn handle_socket(
    socket: WebSocket,
    room: RoomInstance,
    identity: Identity,
    metrics: Arc<ServerMetrics>,
    max_message_size: usize,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Bytes>(OUTBOUND_CHANNEL_CAPACITY);

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(Message::Binary(frame)).await.is_err() {
                break;
            }
        }
    });

    let connection_id = room.connect(identity, tx).await;

    while let Some(message) = ws_receiver.next().await {
        let message = match message {
            Ok(message) => message,
            Err(_) => break,
        };

        match message {
            Message::Binary(data) => {
                if data.len() > max_message_size {
                    metrics.record_frame_rejected();
                    continue;
                }
                match Envelope::decode(&data) {
                    Ok(envelope) => {
                        metrics.record_frame_decoded();
                        room.handle_envelope(connection_id, envelope).await;
                    }
                    Err(_) => metrics.record_frame_rejected(),
                }
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) | Message::Text(_) => {}
        }
    }

    room.disconnect(connection_id).await;
    send_task.abort();
}
