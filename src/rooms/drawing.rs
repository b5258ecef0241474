//! Drawing Room (§4.4): single-drawer lease with a 10-minute auto-release
//! timer, canvas snapshot relay, request queue. Chat and music behave as in
//! the plain chat room.

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

struct DrawerLease {
    drawer: String,
    canvas: Option<String>,
    requests: Vec<String>,
    release_task: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct DrawingState {
    registry: ConnectionRegistry,
    lease: Option<DrawerLease>,
}

pub struct DrawingRoom {
    room_id: RoomId,
    config: Arc<Config>,
    metrics: Arc<ServerMetrics>,
    state: Mutex<DrawingState>,
}

impl DrawingRoom {
    pub fn new(room_id: RoomId, config: Arc<Config>, metrics: Arc<ServerMetrics>) -> Arc<Self> {
        Arc::new(Self {
            room_id,
            config,
            metrics,
            state: Mutex::new(DrawingState::default()),
        })
    }

    pub async fn connect(
        self: &Arc<Self>,
        identity: Identity,
        sender: mpsc::Sender<Bytes>,
    ) -> ConnectionId {
        let id = ConnectionId::new_v4();
        let username = identity.username.clone();
        {
            let mut state = self.state.lock().await;
            state
                .registry
                .insert(id, identity.username, identity.user_id, sender);
        }
        self.metrics.record_connect();
        self.send_initial_state(id).await;
        self.broadcast_system(format!("{username} joined room {}", self.room_id))
            .await;
        id
    }

    pub async fn disconnect(self: &Arc<Self>, id: ConnectionId) {
        let username = {
            let mut state = self.state.lock().await;
            let username = state.registry.username(id).map(str::to_string);
            state.registry.remove(id);
            if let Some(ref name) = username {
                if let Some(lease) = state.lease.as_mut() {
                    lease.requests.retain(|u| u != name);
                }
            }
            username
        };
        self.metrics.record_disconnect();

        let was_drawer = {
            let state = self.state.lock().await;
            matches!(&state.lease, Some(lease) if Some(lease.drawer.as_str()) == username.as_deref())
        };
        if was_drawer {
            self.release_drawer().await;
        }
        if let Some(username) = username {
            self.broadcast_system(format!("{username} left room {}", self.room_id))
                .await;
        }
    }

    pub async fn handle_envelope(self: &Arc<Self>, id: ConnectionId, envelope: Envelope) {
        let Envelope::Chat(msg) = envelope else {
            trace!(room_id = self.room_id, "ignoring non-chat envelope in drawing room");
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
            MessageType::UserText | MessageType::Music => {
                self.relay_chat(username, msg.message_type, msg.content).await;
            }
            MessageType::DrawingRequest => self.handle_request(username).await,
            MessageType::DrawingRequestApprove => {
                self.handle_approve(username, msg.content).await;
            }
            MessageType::Drawing => self.handle_drawing(username, msg.content).await,
            MessageType::DrawingClear => self.handle_clear(username).await,
            MessageType::DrawingStop => self.handle_stop(username).await,
            _ => trace!(room_id = self.room_id, "ignoring unhandled drawing message type"),
        }
    }

    async fn relay_chat(&self, username: String, message_type: MessageType, content: String) {
        let timestamp = match message_type {
            MessageType::Music => now_millis() + 500,
            _ => now_millis(),
        };
        self.broadcast_chat(ChatMessage {
            user: username,
            room_id: self.room_id,
            content,
            timestamp,
            message_type,
        })
        .await;
    }

    async fn handle_request(self: &Arc<Self>, username: String) {
        let current_drawer = {
            let state = self.state.lock().await;
            state.lease.as_ref().map(|l| l.drawer.clone())
        };
        match current_drawer {
            None => self.grant_drawer(username).await,
            Some(drawer) if drawer == username => {}
            Some(_) => {
                {
                    let mut state = self.state.lock().await;
                    if let Some(lease) = state.lease.as_mut() {
                        if !lease.requests.contains(&username) {
                            lease.requests.push(username.clone());
                        }
                    }
                }
                self.broadcast_chat(ChatMessage {
                    user: username.clone(),
                    room_id: self.room_id,
                    content: username,
                    timestamp: now_millis(),
                    message_type: MessageType::DrawingRequest,
                })
                .await;
            }
        }
    }

    async fn handle_approve(self: &Arc<Self>, approver: String, approved_user: String) {
        let (is_drawer, queued, still_connected) = {
            let state = self.state.lock().await;
            let is_drawer = matches!(&state.lease, Some(lease) if lease.drawer == approver);
            let queued = state
                .lease
                .as_ref()
                .map(|l| l.requests.contains(&approved_user))
                .unwrap_or(false);
            let still_connected = state.registry_usernames().contains(&approved_user);
            (is_drawer, queued, still_connected)
        };
        if is_drawer && queued && still_connected {
            {
                let mut state = self.state.lock().await;
                if let Some(lease) = state.lease.as_mut() {
                    lease.requests.retain(|u| u != &approved_user);
                }
            }
            self.grant_drawer(approved_user).await;
        }
    }

    async fn grant_drawer(self: &Arc<Self>, username: String) {
        {
            let mut state = self.state.lock().await;
            if let Some(mut old) = state.lease.take() {
                if let Some(task) = old.release_task.take() {
                    task.abort();
                }
            }
            state.lease = Some(DrawerLease {
                drawer: username.clone(),
                canvas: None,
                requests: Vec::new(),
                release_task: None,
            });
        }
        self.spawn_release_timer().await;
        self.broadcast_chat(ChatMessage {
            user: "System".to_string(),
            room_id: self.room_id,
            content: username,
            timestamp: now_millis(),
            message_type: MessageType::DrawingState,
        })
        .await;
    }

    async fn spawn_release_timer(self: &Arc<Self>) {
        let room = Arc::clone(self);
        let duration = Duration::from_secs(self.config.rooms.drawing_auto_release_secs);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            room.release_drawer().await;
        });
        let mut state = self.state.lock().await;
        if let Some(lease) = state.lease.as_mut() {
            lease.release_task = Some(handle);
        }
    }

    async fn release_drawer(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().await;
            if let Some(mut lease) = state.lease.take() {
                if let Some(task) = lease.release_task.take() {
                    task.abort();
                }
            } else {
                return;
            }
        }
        self.broadcast_chat(ChatMessage {
            user: "System".to_string(),
            room_id: self.room_id,
            content: String::new(),
            timestamp: now_millis(),
            message_type: MessageType::DrawingState,
        })
        .await;
    }

    async fn handle_drawing(&self, username: String, content: String) {
        let is_drawer = {
            let state = self.state.lock().await;
            matches!(&state.lease, Some(lease) if lease.drawer == username)
        };
        if !is_drawer {
            return;
        }
        {
            let mut state = self.state.lock().await;
            if let Some(lease) = state.lease.as_mut() {
                lease.canvas = Some(content.clone());
            }
        }
        self.broadcast_chat(ChatMessage {
            user: username,
            room_id: self.room_id,
            content,
            timestamp: now_millis(),
            message_type: MessageType::Drawing,
        })
        .await;
    }

    async fn handle_clear(&self, username: String) {
        let is_drawer = {
            let state = self.state.lock().await;
            matches!(&state.lease, Some(lease) if lease.drawer == username)
        };
        if !is_drawer {
            return;
        }
        {
            let mut state = self.state.lock().await;
            if let Some(lease) = state.lease.as_mut() {
                lease.canvas = None;
            }
        }
        self.broadcast_chat(ChatMessage {
            user: username,
            room_id: self.room_id,
            content: String::new(),
            timestamp: now_millis(),
            message_type: MessageType::DrawingClear,
        })
        .await;
    }

    async fn handle_stop(self: &Arc<Self>, username: String) {
        let is_drawer = {
            let state = self.state.lock().await;
            matches!(&state.lease, Some(lease) if lease.drawer == username)
        };
        if is_drawer {
            self.release_drawer().await;
        }
    }

    async fn send_initial_state(&self, id: ConnectionId) {
        let (drawer, canvas) = {
            let state = self.state.lock().await;
            match &state.lease {
                Some(lease) => (Some(lease.drawer.clone()), lease.canvas.clone()),
                None => (None, None),
            }
        };
        let Some(drawer) = drawer else { return };

        let state_frame = Bytes::from(
            Envelope::chat(ChatMessage {
                user: "System".to_string(),
                room_id: self.room_id,
                content: drawer.clone(),
                timestamp: now_millis(),
                message_type: MessageType::DrawingState,
            })
            .encode(),
        );
        let state_guard = self.state.lock().await;
        state_guard.registry.send_to(id, state_frame);
        drop(state_guard);

        if let Some(canvas) = canvas {
            let canvas_frame = Bytes::from(
                Envelope::chat(ChatMessage {
                    user: drawer,
                    room_id: self.room_id,
                    content: canvas,
                    timestamp: now_millis(),
                    message_type: MessageType::Drawing,
                })
                .encode(),
            );
            let state_guard = self.state.lock().await;
            state_guard.registry.send_to(id, canvas_frame);
        }
    }

    async fn broadcast_system(&self, content: String) {
        self.broadcast_chat(ChatMessage::system(self.room_id, content, now_millis()))
            .await;
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
}

impl DrawingState {
    fn registry_usernames(&self) -> Vec<String> {
        self.registry
            .ids()
            .into_iter()
            .filter_map(|id| self.registry.username(id).map(str::to_string))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_room() -> Arc<DrawingRoom> {
        DrawingRoom::new(1, Arc::new(Config::default()), Arc::new(ServerMetrics::new()))
    }

    fn identity(name: &str) -> Identity {
        Identity {
            username: name.to_string(),
            user_id: None,
        }
    }

    #[tokio::test]
    async fn drawing_lease_flow_matches_scenario() {
        let room = test_room();
        let (tx1, mut rx1) = mpsc::channel(16);
        let (tx2, mut rx2) = mpsc::channel(16);
        let u1 = room.connect(identity("u1"), tx1).await;
        let _u2 = room.connect(identity("u2"), tx2).await;
        let _ = rx1.try_recv();
        let _ = rx1.try_recv();
        let _ = rx2.try_recv();

        room.handle_envelope(
            u1,
            Envelope::chat(ChatMessage {
                user: "u1".into(),
                room_id: 1,
                content: String::new(),
                timestamp: 0,
                message_type: MessageType::DrawingRequest,
            }),
        )
        .await;

        let frame = rx1.try_recv().unwrap();
        let Envelope::Chat(msg) = Envelope::decode(&frame).unwrap() else {
            panic!("expected chat envelope")
        };
        assert_eq!(msg.message_type, MessageType::DrawingState);
        assert_eq!(msg.content, "u1");
        let _ = rx2.try_recv();
    }

    #[tokio::test]
    async fn non_drawer_cannot_send_drawing_data() {
        let room = test_room();
        let (tx1, mut rx1) = mpsc::channel(16);
        let (tx2, mut rx2) = mpsc::channel(16);
        let u1 = room.connect(identity("u1"), tx1).await;
        let u2 = room.connect(identity("u2"), tx2).await;
        let _ = rx1.try_recv();
        let _ = rx1.try_recv();
        let _ = rx2.try_recv();

        room.handle_envelope(
            u1,
            Envelope::chat(ChatMessage {
                user: "u1".into(),
                room_id: 1,
                content: String::new(),
                timestamp: 0,
                message_type: MessageType::DrawingRequest,
            }),
        )
        .await;
        let _ = rx1.try_recv();
        let _ = rx2.try_recv();

        room.handle_envelope(
            u2,
            Envelope::chat(ChatMessage {
                user: "u2".into(),
                room_id: 1,
                content: "pixels".into(),
                timestamp: 0,
                message_type: MessageType::Drawing,
            }),
        )
        .await;
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_err());
    }
}
