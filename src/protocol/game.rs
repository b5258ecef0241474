//! `GameMessage` — the LiveWar inner payload of an [`super::envelope::Envelope`].

use serde::{Deserialize, Serialize};

use super::ids::UserId;

/// The two LiveWar factions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Red,
    Blue,
}

impl Team {
    pub fn opponent(self) -> Self {
        match self {
            Self::Red => Self::Blue,
            Self::Blue => Self::Red,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Red => "Red",
            Self::Blue => "Blue",
        }
    }
}

/// The four buildable unit kinds; see the unit type table in the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    Miner,
    Engineer,
    HeavyTank,
    AssaultTank,
}

/// Client-to-server and server-to-client LiveWar messages, carried inside
/// the envelope's `game` variant. Unknown tags decode into [`GameMessage::Unknown`]
/// so a protocol version skew never fails the whole frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GameMessage {
    /// Client requests to join a team.
    JoinGame { team: Team },
    /// Client leaves the game (keeps the socket open, observes as spectator).
    LeaveGame,
    /// Client changes which unit type the next `SPAWN_UNIT` will build.
    SelectUnit { unit_type: UnitType },
    /// Client requests a new unit of the currently selected type.
    SpawnUnit,
    /// Per-tick broadcast of the simulation (boxed: this is by far the
    /// largest variant and appears on every tick).
    GameState(Box<GameStateView>),
    /// Broadcast once when both teams have a player and the tick loop starts.
    GameStarted,
    /// Broadcast once when a base reaches 0 hp.
    GameOver {
        winner: Team,
        winner_display_name: String,
    },
    /// Broadcast when a player joins a team.
    PlayerJoined { player: PlayerSummary },
    /// Broadcast when a player leaves or disconnects.
    PlayerLeft { user_id: UserId },
    /// Targeted error, delivered only to the connection that caused it.
    Error { message: String },
    #[serde(other)]
    Unknown,
}

impl GameMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub user_id: UserId,
    pub username: String,
    pub team: Team,
}

/// Recipient-specific slice of the state frame. Spectators (no team joined)
/// receive `None` here rather than a populated block — the per-recipient
/// view builder must never synthesize a default team for them.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlayerView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<Team>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_unit_type: Option<UnitType>,
    #[serde(default)]
    pub energy: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseView {
    pub team: Team,
    pub x: f64,
    pub y: f64,
    pub hp: f64,
    pub hp_max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitView {
    pub id: String,
    pub unit_type: UnitType,
    pub team: Team,
    pub owner_id: UserId,
    pub x: f64,
    pub y: f64,
    pub hp: f64,
    pub hp_max: f64,
    pub attack: f64,
    pub speed: f64,
    pub attack_range: f64,
    pub carrying_energy: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_y: Option<f64>,
    pub is_mining: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MineFieldView {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub energy: f64,
    pub energy_max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyDropView {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub energy: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealEffectView {
    pub id: String,
    pub from_x: f64,
    pub from_y: f64,
    pub to_x: f64,
    pub to_y: f64,
    pub team: Team,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulletEffectView {
    pub id: String,
    pub from_x: f64,
    pub from_y: f64,
    pub to_x: f64,
    pub to_y: f64,
    pub team: Team,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TeamStatsView {
    pub red_units: u32,
    pub blue_units: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomView {
    pub width: u32,
    pub height: u32,
    pub bases: Vec<BaseView>,
    pub mines: Vec<MineFieldView>,
    pub energy_drops: Vec<EnergyDropView>,
    pub heal_effects: Vec<HealEffectView>,
    pub bullet_effects: Vec<BulletEffectView>,
    pub units: Vec<UnitView>,
}

/// The full per-tick state frame (§4.6). Built once per tick as the shared
/// substructure, then cloned per recipient with only `player` varying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameStateView {
    pub tick: u64,
    pub game_time: f64,
    pub game_started: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Team>,
    pub room: RoomView,
    pub logs: Vec<String>,
    pub team_stats: TeamStatsView,
    pub players: Vec<PlayerSummary>,
    pub player: PlayerView,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tag_decodes_to_unknown_variant() {
        let raw = serde_json::json!({"type": "SOME_FUTURE_TAG", "data": {"whatever": 1}});
        let decoded: GameMessage = serde_json::from_value(raw).unwrap();
        assert!(matches!(decoded, GameMessage::Unknown));
    }

    #[test]
    fn join_game_round_trips() {
        let msg = GameMessage::JoinGame { team: Team::Blue };
        let json = serde_json::to_string(&msg).unwrap();
        let decoded: GameMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            decoded,
            GameMessage::JoinGame { team: Team::Blue }
        ));
    }

    #[test]
    fn spectator_player_view_omits_team() {
        let view = PlayerView::default();
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("team").is_none());
        assert!(json.get("selected_unit_type").is_none());
    }
}
