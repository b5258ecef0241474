//! Identifiers shared across the wire protocol and room state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Numeric room identifier, matching the donor system's integer primary key.
pub type RoomId = i64;

/// Numeric user identifier, resolved from a bearer token's `sub` claim.
pub type UserId = i64;

/// Process-local identifier for a live websocket, used as the connection
/// registry key. A single authenticated user may hold more than one
/// connection at once (e.g. a spectator tab and a player tab), so this is
/// distinct from [`UserId`].
pub type ConnectionId = Uuid;

/// The four room kinds a websocket path segment can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    Chat,
    Drawing,
    LiveWar,
    Gobang,
}

impl RoomType {
    pub fn as_path_segment(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Drawing => "drawing",
            Self::LiveWar => "live_war",
            Self::Gobang => "gobang",
        }
    }
}

impl std::str::FromStr for RoomType {
    type Err = UnknownRoomType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Self::Chat),
            "drawing" => Ok(Self::Drawing),
            "live_war" => Ok(Self::LiveWar),
            "gobang" => Ok(Self::Gobang),
            other => Err(UnknownRoomType(other.to_string())),
        }
    }
}

impl std::fmt::Display for RoomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_path_segment())
    }
}

/// Raised when the `{room_type}` path segment doesn't match one of the four
/// known room kinds; the router closes the socket with code 1008.
#[derive(Debug, Clone)]
pub struct UnknownRoomType(pub String);

impl std::fmt::Display for UnknownRoomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown room type {:?}", self.0)
    }
}

impl std::error::Error for UnknownRoomType {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_path_segments() {
        for rt in [RoomType::Chat, RoomType::Drawing, RoomType::LiveWar, RoomType::Gobang] {
            let parsed: RoomType = rt.as_path_segment().parse().unwrap();
            assert_eq!(parsed, rt);
        }
    }

    #[test]
    fn rejects_unknown_segment() {
        assert!("quiz".parse::<RoomType>().is_err());
    }
}
