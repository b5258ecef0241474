//! Wire protocol: the outer [`Envelope`] and its two inner payload kinds.
//!
//! - [`ids`]: room/user/connection identifiers and `RoomType`
//! - [`chat`]: `ChatMessage`, reused by Chat, Drawing, and Gobang rooms
//! - [`game`]: `GameMessage` and the LiveWar state-view types
//! - [`envelope`]: the outer tagged union plus encode/decode

pub mod chat;
pub mod envelope;
pub mod game;
pub mod ids;

pub use chat::{ChatMessage, MessageType};
pub use envelope::{DecodeError, Envelope};
pub use game::{
    BaseView, BulletEffectView, EnergyDropView, GameMessage, GameStateView, HealEffectView,
    MineFieldView, PlayerSummary, PlayerView, RoomView, Team, TeamStatsView, UnitType, UnitView,
};
pub use ids::{ConnectionId, RoomId, RoomType, UserId};
