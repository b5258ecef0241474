//! Connection Registry and Broadcast Pipeline (§4.2).
//!
//! The registry is the per-room set of live connections plus the
//! `username`/`user_id` sidetables. Broadcast is best-effort: a `try_send`
//! that fails (the connection's outbound channel is full or closed) evicts
//! that connection immediately, mirroring the donor system's
//! `_send_to_connection` (close + disconnect on any send error) without
//! letting one slow reader stall the fan-out to everyone else.

use std::collections::HashMap;

use bytes::Bytes;
use smallvec::SmallVec;
use tokio::sync::mpsc;

use crate::protocol::{ConnectionId, UserId};

/// Typical room sizes stay small; stack-allocate the common case the way
/// the teacher's `PlayerIdList` does for its broadcast targets.
pub const TYPICAL_ROOM_SIZE: usize = 8;
pub type ConnectionIdList = SmallVec<[ConnectionId; TYPICAL_ROOM_SIZE]>;

struct ConnectionHandle {
    username: String,
    user_id: Option<UserId>,
    sender: mpsc::Sender<Bytes>,
}

/// Live connections for a single room, keyed by [`ConnectionId`].
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionHandle>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        id: ConnectionId,
        username: String,
        user_id: Option<UserId>,
        sender: mpsc::Sender<Bytes>,
    ) {
        self.connections.insert(
            id,
            ConnectionHandle {
                username,
                user_id,
                sender,
            },
        );
    }

    pub fn remove(&mut self, id: ConnectionId) -> bool {
        self.connections.remove(&id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn username(&self, id: ConnectionId) -> Option<&str> {
        self.connections.get(&id).map(|c| c.username.as_str())
    }

    pub fn user_id(&self, id: ConnectionId) -> Option<UserId> {
        self.connections.get(&id).and_then(|c| c.user_id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Any currently-connected socket belonging to `user_id`, used to detect
    /// reconnection (e.g. cancelling a Gobang disconnect-forfeit timer).
    pub fn find_by_user_id(&self, user_id: UserId) -> Option<ConnectionId> {
        self.connections
            .iter()
            .find(|(_, handle)| handle.user_id == Some(user_id))
            .map(|(id, _)| *id)
    }

    pub fn ids(&self) -> ConnectionIdList {
        self.connections.keys().copied().collect()
    }

    /// Best-effort delivery of an already-encoded frame to one connection.
    /// Returns `false` if the send failed, meaning the caller should evict
    /// this connection.
    pub fn send_to(&self, id: ConnectionId, frame: Bytes) -> bool {
        match self.connections.get(&id) {
            Some(handle) => handle.sender.try_send(frame).is_ok(),
            None => false,
        }
    }

    /// Fan out one encoded frame to every connection in the room. Dead
    /// connections (closed or full outbound channel) are collected and
    /// returned for the caller to evict — broadcast itself never mutates
    /// the registry, keeping it a pure read over the connection map.
    pub fn broadcast(&self, frame: Bytes) -> ConnectionIdList {
        self.broadcast_except(frame, None)
    }

    pub fn broadcast_except(
        &self,
        frame: Bytes,
        except: Option<ConnectionId>,
    ) -> ConnectionIdList {
        let mut dead = ConnectionIdList::new();
        for (id, handle) in &self.connections {
            if Some(*id) == except {
                continue;
            }
            if handle.sender.try_send(frame.clone()).is_err() {
                dead.push(*id);
            }
        }
        dead
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (mpsc::Sender<Bytes>, mpsc::Receiver<Bytes>) {
        mpsc::channel(8)
    }

    #[test]
    fn broadcast_reaches_every_connection_once() {
        let mut registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = handle();
        let (tx2, mut rx2) = handle();
        registry.insert(ConnectionId::new_v4(), "a".into(), None, tx1);
        registry.insert(ConnectionId::new_v4(), "b".into(), None, tx2);

        let dead = registry.broadcast(Bytes::from_static(b"hello"));
        assert!(dead.is_empty());
        assert_eq!(rx1.try_recv().unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(rx2.try_recv().unwrap(), Bytes::from_static(b"hello"));
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn broadcast_except_skips_one_connection() {
        let mut registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = handle();
        let (tx2, mut rx2) = handle();
        let id1 = ConnectionId::new_v4();
        registry.insert(id1, "a".into(), None, tx1);
        registry.insert(ConnectionId::new_v4(), "b".into(), None, tx2);

        registry.broadcast_except(Bytes::from_static(b"hi"), Some(id1));
        assert!(rx1.try_recv().is_err());
        assert_eq!(rx2.try_recv().unwrap(), Bytes::from_static(b"hi"));
    }

    #[test]
    fn closed_receiver_is_reported_dead() {
        let mut registry = ConnectionRegistry::new();
        let (tx, rx) = handle();
        let id = ConnectionId::new_v4();
        registry.insert(id, "a".into(), None, tx);
        drop(rx);

        let dead = registry.broadcast(Bytes::from_static(b"x"));
        assert_eq!(dead.as_slice(), [id]);
    }

    #[test]
    fn find_by_user_id_locates_reconnection() {
        let mut registry = ConnectionRegistry::new();
        let (tx, _rx) = handle();
        let id = ConnectionId::new_v4();
        registry.insert(id, "a".into(), Some(7), tx);

        assert_eq!(registry.find_by_user_id(7), Some(id));
        assert_eq!(registry.find_by_user_id(8), None);
    }

    #[test]
    fn remove_empties_registry() {
        let mut registry = ConnectionRegistry::new();
        let (tx, _rx) = handle();
        let id = ConnectionId::new_v4();
        registry.insert(id, "a".into(), None, tx);
        assert!(!registry.is_empty());
        assert!(registry.remove(id));
        assert!(registry.is_empty());
    }
}
