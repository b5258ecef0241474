//! # RoomForge Server
//!
//! A realtime multi-room interactive server: chat, collaborative drawing,
//! Gobang, and a LiveWar real-time-strategy simulation, all multiplexed over
//! a single binary-framed websocket protocol.

/// Auth Resolver: bearer-token identity resolution (§4, §6).
pub mod auth;

/// Connection Registry and Broadcast Pipeline (§4.2).
pub mod broadcast;

/// Server configuration and environment variables.
pub mod config;

/// Structured logging configuration.
pub mod logging;

/// Metrics collection and the `/metrics` endpoint's response shape.
pub mod metrics;

/// Wire protocol: the Envelope codec and its inner payload kinds.
pub mod protocol;

/// Room Router and the four room managers.
pub mod rooms;

/// Shared application state.
pub mod server;

/// WebSocket upgrade handling and HTTP routes.
pub mod websocket;
