//! In-process metrics counters, exposed over the `/metrics` JSON endpoint.
//!
//! Scaled down from the teacher's distributed/dashboard-oriented
//! `ServerMetrics` (rate limiting, cross-instance dedup caches, distributed
//! locks, reconnection tokens) to the concerns this server actually has:
//! connections, rooms, broadcasts, and LiveWar simulation ticks. See
//! DESIGN.md for the drop rationale.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Process-wide counters, safe to share behind an `Arc` across every room
/// and connection task.
#[derive(Debug, Default)]
pub struct ServerMetrics {
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    disconnections: AtomicU64,

    rooms_active: AtomicU64,
    rooms_created: AtomicU64,
    rooms_torn_down: AtomicU64,

    frames_decoded: AtomicU64,
    frames_rejected: AtomicU64,
    broadcasts_sent: AtomicU64,
    broadcast_evictions: AtomicU64,

    live_war_ticks: AtomicU64,
    live_war_games_started: AtomicU64,
    live_war_games_finished: AtomicU64,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_connect(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disconnect(&self) {
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                current.checked_sub(1)
            });
        self.disconnections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_room_created(&self) {
        self.rooms_created.fetch_add(1, Ordering::Relaxed);
        self.rooms_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_room_torn_down(&self) {
        let _ = self
            .rooms_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                current.checked_sub(1)
            });
        self.rooms_torn_down.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_decoded(&self) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast(&self, recipients: usize, evicted: usize) {
        self.broadcasts_sent.fetch_add(recipients as u64, Ordering::Relaxed);
        self.broadcast_evictions
            .fetch_add(evicted as u64, Ordering::Relaxed);
    }

    pub fn record_live_war_tick(&self) {
        self.live_war_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_live_war_game_started(&self) {
        self.live_war_games_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_live_war_game_finished(&self) {
        self.live_war_games_finished.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            disconnections: self.disconnections.load(Ordering::Relaxed),
            rooms_active: self.rooms_active.load(Ordering::Relaxed),
            rooms_created: self.rooms_created.load(Ordering::Relaxed),
            rooms_torn_down: self.rooms_torn_down.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            broadcasts_sent: self.broadcasts_sent.load(Ordering::Relaxed),
            broadcast_evictions: self.broadcast_evictions.load(Ordering::Relaxed),
            live_war_ticks: self.live_war_ticks.load(Ordering::Relaxed),
            live_war_games_started: self.live_war_games_started.load(Ordering::Relaxed),
            live_war_games_finished: self.live_war_games_finished.load(Ordering::Relaxed),
        }
    }
}

/// JSON-serialisable point-in-time view, returned by the `/metrics` route.
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_connections: u64,
    pub active_connections: u64,
    pub disconnections: u64,
    pub rooms_active: u64,
    pub rooms_created: u64,
    pub rooms_torn_down: u64,
    pub frames_decoded: u64,
    pub frames_rejected: u64,
    pub broadcasts_sent: u64,
    pub broadcast_evictions: u64,
    pub live_war_ticks: u64,
    pub live_war_games_started: u64,
    pub live_war_games_finished: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_disconnect_tracks_active_count() {
        let metrics = ServerMetrics::new();
        metrics.record_connect();
        metrics.record_connect();
        metrics.record_disconnect();
        let snap = metrics.snapshot();
        assert_eq!(snap.total_connections, 2);
        assert_eq!(snap.active_connections, 1);
        assert_eq!(snap.disconnections, 1);
    }

    #[test]
    fn active_connections_does_not_underflow() {
        let metrics = ServerMetrics::new();
        metrics.record_disconnect();
        assert_eq!(metrics.snapshot().active_connections, 0);
    }

    #[test]
    fn room_lifecycle_counts() {
        let metrics = ServerMetrics::new();
        metrics.record_room_created();
        metrics.record_room_created();
        metrics.record_room_torn_down();
        let snap = metrics.snapshot();
        assert_eq!(snap.rooms_created, 2);
        assert_eq!(snap.rooms_active, 1);
        assert_eq!(snap.rooms_torn_down, 1);
    }
}
