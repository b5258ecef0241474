//! Room Router and the four room managers (§2, §4.3–§4.6).
//!
//! Each room type owns its mutable state behind a `tokio::sync::Mutex`,
//! reached only from within its own handler methods — the "shared mutable
//! registry is single-owner" design note (§9), implemented concretely as
//! described in SPEC_FULL.md §5 rather than as a hand-rolled actor mailbox.

pub mod chat;
pub mod drawing;
pub mod gobang;
pub mod live_war;
mod util;

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::auth::Identity;
use crate::config::Config;
use crate::metrics::ServerMetrics;
use crate::protocol::{ConnectionId, Envelope, RoomId, RoomType};

pub use chat::ChatRoom;
pub use drawing::DrawingRoom;
pub use gobang::GobangRoom;
pub use live_war::LiveWarRoom;

/// The four kinds of errors a room handler can raise (§7). Protocol errors
/// are logged at `trace` and dropped; authorization/validation errors become
/// a targeted error delivered only to the offending connection; transport
/// errors are handled by the connection's own read/write loop, not here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoomError {
    #[error("protocol error")]
    Protocol,
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("validation error: {0}")]
    Validation(String),
}

/// One entry in the supervisor's room table. Each variant wraps the `Arc`
/// the websocket handler clones for the lifetime of its connection.
#[derive(Clone)]
pub enum RoomInstance {
    Chat(Arc<ChatRoom>),
    Drawing(Arc<DrawingRoom>),
    Gobang(Arc<GobangRoom>),
    LiveWar(Arc<LiveWarRoom>),
}

impl RoomInstance {
    /// Dispatches to the wrapped room's own `connect`, keeping the websocket
    /// handler ignorant of which of the four room types it is talking to.
    pub async fn connect(&self, identity: Identity, sender: mpsc::Sender<Bytes>) -> ConnectionId {
        match self {
            Self::Chat(room) => room.connect(identity, sender).await,
            Self::Drawing(room) => room.connect(identity, sender).await,
            Self::Gobang(room) => room.connect(identity, sender).await,
            Self::LiveWar(room) => room.connect(identity, sender).await,
        }
    }

    pub async fn disconnect(&self, id: ConnectionId) {
        match self {
            Self::Chat(room) => room.disconnect(id).await,
            Self::Drawing(room) => room.disconnect(id).await,
            Self::Gobang(room) => room.disconnect(id).await,
            Self::LiveWar(room) => room.disconnect(id).await,
        }
    }

    pub async fn handle_envelope(&self, id: ConnectionId, envelope: Envelope) {
        match self {
            Self::Chat(room) => room.handle_envelope(id, envelope).await,
            Self::Drawing(room) => room.handle_envelope(id, envelope).await,
            Self::Gobang(room) => room.handle_envelope(id, envelope).await,
            Self::LiveWar(room) => room.handle_envelope(id, envelope).await,
        }
    }
}

/// Owns every live room in the process, keyed by `(room_type, room_id)`
/// (§3: "at most one logical room per identity within a process"). Rooms
/// are created lazily on first connection and never removed from the map —
/// their per-connection resources (registries, background tasks) are torn
/// down to nothing when empty, but the lightweight `RoomInstance` itself is
/// cheap enough to keep for the process lifetime, avoiding a second
/// concurrent-removal race on top of the teardown logic each room already
/// implements.
pub struct RoomSupervisor {
    rooms: DashMap<(RoomType, RoomId), RoomInstance>,
    config: Arc<Config>,
    metrics: Arc<ServerMetrics>,
}

impl RoomSupervisor {
    pub fn new(config: Arc<Config>, metrics: Arc<ServerMetrics>) -> Self {
        Self {
            rooms: DashMap::new(),
            config,
            metrics,
        }
    }

    pub fn chat_room(&self, room_id: RoomId) -> Arc<ChatRoom> {
        let instance = self
            .rooms
            .entry((RoomType::Chat, room_id))
            .or_insert_with(|| {
                self.metrics.record_room_created();
                RoomInstance::Chat(ChatRoom::new(room_id, self.config.clone(), self.metrics.clone()))
            })
            .clone();
        match instance {
            RoomInstance::Chat(room) => room,
            _ => unreachable!("room identity is keyed by RoomType"),
        }
    }

    pub fn drawing_room(&self, room_id: RoomId) -> Arc<DrawingRoom> {
        let instance = self
            .rooms
            .entry((RoomType::Drawing, room_id))
            .or_insert_with(|| {
                self.metrics.record_room_created();
                RoomInstance::Drawing(DrawingRoom::new(
                    room_id,
                    self.config.clone(),
                    self.metrics.clone(),
                ))
            })
            .clone();
        match instance {
            RoomInstance::Drawing(room) => room,
            _ => unreachable!("room identity is keyed by RoomType"),
        }
    }

    pub fn gobang_room(&self, room_id: RoomId) -> Arc<GobangRoom> {
        let instance = self
            .rooms
            .entry((RoomType::Gobang, room_id))
            .or_insert_with(|| {
                self.metrics.record_room_created();
                RoomInstance::Gobang(GobangRoom::new(
                    room_id,
                    self.config.clone(),
                    self.metrics.clone(),
                ))
            })
            .clone();
        match instance {
            RoomInstance::Gobang(room) => room,
            _ => unreachable!("room identity is keyed by RoomType"),
        }
    }

    pub fn live_war_room(&self, room_id: RoomId) -> Arc<LiveWarRoom> {
        let instance = self
            .rooms
            .entry((RoomType::LiveWar, room_id))
            .or_insert_with(|| {
                self.metrics.record_room_created();
                RoomInstance::LiveWar(LiveWarRoom::new(
                    room_id,
                    self.config.clone(),
                    self.metrics.clone(),
                ))
            })
            .clone();
        match instance {
            RoomInstance::LiveWar(room) => room,
            _ => unreachable!("room identity is keyed by RoomType"),
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Resolves a parsed `{room_type}` path segment to its room instance,
    /// creating it on first use. The websocket handler uses this instead of
    /// the type-specific accessors once the room type is known only at
    /// runtime (from the URL), not at compile time.
    pub fn room(&self, room_type: RoomType, room_id: RoomId) -> RoomInstance {
        match room_type {
            RoomType::Chat => RoomInstance::Chat(self.chat_room(room_id)),
            RoomType::Drawing => RoomInstance::Drawing(self.drawing_room(room_id)),
            RoomType::Gobang => RoomInstance::Gobang(self.gobang_room(room_id)),
            RoomType::LiveWar => RoomInstance::LiveWar(self.live_war_room(room_id)),
        }
    }
}
