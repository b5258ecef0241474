//! Chat Room (§4.3): text relay, music-cue relay with aligned playback
//! delay, periodic occupancy announcements.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::trace;

use crate::auth::Identity;
use crate::broadcast::ConnectionRegistry;
use crate::config::Config;
use crate::metrics::ServerMetrics;
use crate::protocol::{ChatMessage, ConnectionId, Envelope, MessageType, RoomId};

use super::util::now_millis;

/// Playback alignment delay applied to `MUSIC` messages (§4.3) so every
/// client starts the same clip at the same wall-clock instant despite
/// network jitter.
const MUSIC_ALIGNMENT_DELAY_MS: i64 = 500;

#[derive(Default)]
struct ChatState {
    registry: ConnectionRegistry,
}

pub struct ChatRoom {
    room_id: RoomId,
    config: Arc<Config>,
    metrics: Arc<ServerMetrics>,
    state: Mutex<ChatState>,
    occupancy_task: Mutex<Option<JoinHandle<()>>>,
}

impl ChatRoom {
    pub fn new(room_id: RoomId, config: Arc<Config>, metrics: Arc<ServerMetrics>) -> Arc<Self> {
        Arc::new(Self {
            room_id,
            config,
            metrics,
            state: Mutex::new(ChatState {
                registry: Default::default(),
            }),
            occupancy_task: Mutex::new(None),
        })
    }

    pub async fn connect(
        self: &Arc<Self>,
        identity: Identity,
        sender: mpsc::Sender<Bytes>,
    ) -> ConnectionId {
        let id = ConnectionId::new_v4();
        let username = identity.username.clone();
        let is_first = {
            let mut state = self.state.lock().await;
            state
                .registry
                .insert(id, identity.username, identity.user_id, sender);
            state.registry.len() == 1
        };
        self.metrics.record_connect();
        if is_first {
            self.spawn_occupancy_task().await;
        }
        self.broadcast_system(format!("{username} joined room {}", self.room_id))
            .await;
        id
    }

    pub async fn disconnect(&self, id: ConnectionId) {
        let (username, now_empty) = {
            let mut state = self.state.lock().await;
            let username = state.registry.username(id).map(str::to_string);
            state.registry.remove(id);
            (username, state.registry.is_empty())
        };
        self.metrics.record_disconnect();
        if let Some(username) = username {
            self.broadcast_system(format!("{username} left room {}", self.room_id))
                .await;
        }
        if now_empty {
            self.stop_occupancy_task().await;
        }
    }

    /// Handle one decoded envelope from `id`. Only `ChatMessage` envelopes
    /// with `USER_TEXT` or `MUSIC` are meaningful here; everything else
    /// (including `GameMessage` envelopes, which belong to LiveWar) is a
    /// protocol mismatch and is dropped silently (§7).
    pub async fn handle_envelope(&self, id: ConnectionId, envelope: Envelope) {
        let Envelope::Chat(msg) = envelope else {
            trace!(room_id = self.room_id, "ignoring non-chat envelope in chat room");
            return;
        };

        let username = {
            let state = self.state.lock().await;
            match state.registry.username(id) {
                Some(u) => u.to_string(),
                None => return,
            }
        };

        match msg.message_type {
            MessageType::UserText => {
                let outgoing = ChatMessage {
                    user: username,
                    room_id: self.room_id,
                    content: msg.content,
                    timestamp: now_millis(),
                    message_type: MessageType::UserText,
                };
                self.broadcast_chat(outgoing).await;
            }
            MessageType::Music => {
                let outgoing = ChatMessage {
                    user: username,
                    room_id: self.room_id,
                    content: msg.content,
                    timestamp: now_millis() + MUSIC_ALIGNMENT_DELAY_MS,
                    message_type: MessageType::Music,
                };
                self.broadcast_chat(outgoing).await;
            }
            _ => trace!(room_id = self.room_id, "ignoring unhandled chat message type"),
        }
    }

    pub(super) async fn broadcast_system(&self, content: String) {
        let msg = ChatMessage::system(self.room_id, content, now_millis());
        self.broadcast_chat(msg).await;
    }

    async fn broadcast_chat(&self, msg: ChatMessage) {
        let frame = Bytes::from(Envelope::chat(msg).encode());
        let mut state = self.state.lock().await;
        let dead = state.registry.broadcast(frame);
        let recipients = state.registry.len();
        for id in &dead {
            state.registry.remove(*id);
        }
        drop(state);
        self.metrics.record_broadcast(recipients, dead.len());
    }

    async fn spawn_occupancy_task(self: &Arc<Self>) {
        let room = Arc::clone(self);
        let interval = Duration::from_secs(self.config.rooms.occupancy_interval_secs);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let count = {
                    let state = room.state.lock().await;
                    state.registry.len()
                };
                room.broadcast_chat(ChatMessage {
                    user: "System".to_string(),
                    room_id: room.room_id,
                    content: format!("当前房间人数: {count}"),
                    timestamp: now_millis(),
                    message_type: MessageType::RoomCount,
                })
                .await;
            }
        });
        *self.occupancy_task.lock().await = Some(handle);
    }

    async fn stop_occupancy_task(&self) {
        if let Some(handle) = self.occupancy_task.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::GameMessage;

    fn test_room() -> Arc<ChatRoom> {
        ChatRoom::new(1, Arc::new(Config::default()), Arc::new(ServerMetrics::new()))
    }

    #[tokio::test]
    async fn user_text_is_rebroadcast_with_server_username() {
        let room = test_room();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let a = room
            .connect(
                Identity {
                    username: "alice".into(),
                    user_id: None,
                },
                tx_a,
            )
            .await;
        let _b = room
            .connect(
                Identity {
                    username: "bob".into(),
                    user_id: None,
                },
                tx_b,
            )
            .await;

        // drain join announcements
        let _ = rx_a.try_recv();
        let _ = rx_a.try_recv();
        let _ = rx_b.try_recv();

        room.handle_envelope(
            a,
            Envelope::chat(ChatMessage {
                user: "ignored-client-supplied-name".into(),
                room_id: 1,
                content: "hi".into(),
                timestamp: 0,
                message_type: MessageType::UserText,
            }),
        )
        .await;

        let frame_a = rx_a.try_recv().unwrap();
        let frame_b = rx_b.try_recv().unwrap();
        assert_eq!(frame_a, frame_b);

        let decoded = Envelope::decode(&frame_a).unwrap();
        match decoded {
            Envelope::Chat(msg) => {
                assert_eq!(msg.user, "alice");
                assert_eq!(msg.content, "hi");
                assert_eq!(msg.message_type, MessageType::UserText);
            }
            Envelope::Game(_) => panic!("expected chat envelope"),
        }
    }

    #[tokio::test]
    async fn music_message_is_delayed_by_500ms() {
        let room = test_room();
        let (tx, mut rx) = mpsc::channel(8);
        let id = room
            .connect(
                Identity {
                    username: "alice".into(),
                    user_id: None,
                },
                tx,
            )
            .await;
        let _ = rx.try_recv(); // join announcement

        let sent_at = now_millis();
        room.handle_envelope(
            id,
            Envelope::chat(ChatMessage {
                user: "alice".into(),
                room_id: 1,
                content: "track-1".into(),
                timestamp: 0,
                message_type: MessageType::Music,
            }),
        )
        .await;

        let frame = rx.try_recv().unwrap();
        let Envelope::Chat(msg) = Envelope::decode(&frame).unwrap() else {
            panic!("expected chat envelope");
        };
        let delta = msg.timestamp - sent_at;
        assert!((495..=600).contains(&delta), "unexpected delta {delta}");
    }

    #[tokio::test]
    async fn non_chat_envelope_is_ignored() {
        let room = test_room();
        let (tx, mut rx) = mpsc::channel(8);
        let id = room
            .connect(
                Identity {
                    username: "alice".into(),
                    user_id: None,
                },
                tx,
            )
            .await;
        let _ = rx.try_recv();

        room.handle_envelope(id, Envelope::game(GameMessage::LeaveGame)).await;
        assert!(rx.try_recv().is_err());
    }
}
