//! Per-recipient state view construction (§4.6, §9). The shared substructure
//! is built once per tick; only the `player` block varies per recipient.

use crate::protocol::{
    BaseView, BulletEffectView, EnergyDropView, GameStateView, HealEffectView, MineFieldView,
    PlayerSummary, PlayerView, RoomView, Team, TeamStatsView, UnitView, UserId,
};

use super::state::SimState;

const MAX_LOGS_TOTAL: usize = 10;
const MAX_LOGS_PER_PLAYER: usize = 3;

/// Builds everything that is identical for every recipient this tick.
pub struct SharedFrame {
    pub tick: u64,
    pub game_time: f64,
    pub game_started: bool,
    pub winner: Option<Team>,
    pub room: RoomView,
    pub logs: Vec<String>,
    pub team_stats: TeamStatsView,
    pub players: Vec<PlayerSummary>,
}

pub fn build_shared_frame(sim: &SimState, tick: u64, game_time: f64) -> SharedFrame {
    let bases = sim
        .bases
        .values()
        .map(|b| BaseView {
            team: b.team,
            x: b.position.x,
            y: b.position.y,
            hp: b.hp,
            hp_max: super::state::BASE_HP_MAX,
        })
        .collect();

    let mines = sim
        .mines
        .values()
        .map(|m| MineFieldView {
            id: m.id.clone(),
            x: m.position.x,
            y: m.position.y,
            energy: m.energy,
            energy_max: super::state::MINE_ENERGY_MAX,
        })
        .collect();

    let energy_drops = sim
        .energy_drops
        .values()
        .map(|d| EnergyDropView {
            id: d.id.clone(),
            x: d.position.x,
            y: d.position.y,
            energy: d.energy,
        })
        .collect();

    let heal_effects = sim
        .heal_effects
        .values()
        .map(|e| HealEffectView {
            id: e.id.clone(),
            from_x: e.from.x,
            from_y: e.from.y,
            to_x: e.to.x,
            to_y: e.to.y,
            team: e.team,
        })
        .collect();

    let bullet_effects = sim
        .bullet_effects
        .values()
        .map(|e| BulletEffectView {
            id: e.id.clone(),
            from_x: e.from.x,
            from_y: e.from.y,
            to_x: e.to.x,
            to_y: e.to.y,
            team: e.team,
        })
        .collect();

    let units = sim
        .units
        .values()
        .filter(|u| !u.is_dead)
        .map(|u| UnitView {
            id: u.id.clone(),
            unit_type: u.unit_type,
            team: u.team,
            owner_id: u.owner_id,
            x: u.position.x,
            y: u.position.y,
            hp: u.hp,
            hp_max: u.hp_max,
            attack: u.attack,
            speed: u.speed,
            attack_range: u.attack_range,
            carrying_energy: u.carrying_energy,
            target_x: u.target.map(|p| p.x),
            target_y: u.target.map(|p| p.y),
            is_mining: u.is_mining,
        })
        .collect();

    let mut red_units = 0;
    let mut blue_units = 0;
    for unit in sim.units.values().filter(|u| !u.is_dead) {
        match unit.team {
            Team::Red => red_units += 1,
            Team::Blue => blue_units += 1,
        }
    }

    let players = sim
        .players
        .iter()
        .filter_map(|(uid, p)| {
            p.team.map(|team| PlayerSummary {
                user_id: *uid,
                username: p.username.clone(),
                team,
            })
        })
        .collect();

    SharedFrame {
        tick,
        game_time,
        game_started: sim.game_started,
        winner: sim.winner,
        room: RoomView {
            width: sim.map_width,
            height: sim.map_height,
            bases,
            mines,
            energy_drops,
            heal_effects,
            bullet_effects,
            units,
        },
        logs: aggregate_logs(sim),
        team_stats: TeamStatsView { red_units, blue_units },
        players,
    }
}

fn aggregate_logs(sim: &SimState) -> Vec<String> {
    let mut per_player_count: std::collections::HashMap<UserId, usize> = std::collections::HashMap::new();
    let mut out = Vec::new();
    for (user_id, message) in sim.logs.iter().rev() {
        if out.len() >= MAX_LOGS_TOTAL {
            break;
        }
        let count = per_player_count.entry(*user_id).or_insert(0);
        if *count >= MAX_LOGS_PER_PLAYER {
            continue;
        }
        *count += 1;
        out.push(message.clone());
    }
    out.reverse();
    out
}

/// Clones the shared frame and grafts in the recipient-specific `player`
/// block. Spectators (no user_id, or a user_id with no team) get
/// `PlayerView::default()`, which serializes with no `team`/`selected_unit_type`.
pub fn player_view(sim: &SimState, user_id: Option<UserId>) -> PlayerView {
    let Some(user_id) = user_id else {
        return PlayerView::default();
    };
    match sim.players.get(&user_id) {
        Some(player) => PlayerView {
            team: player.team,
            selected_unit_type: player.selected_unit_type,
            energy: player.energy,
        },
        None => PlayerView::default(),
    }
}

pub fn to_game_state_view(frame: &SharedFrame, player: PlayerView) -> GameStateView {
    GameStateView {
        tick: frame.tick,
        game_time: frame.game_time,
        game_started: frame.game_started,
        winner: frame.winner,
        room: frame.room.clone(),
        logs: frame.logs.clone(),
        team_stats: frame.team_stats.clone(),
        players: frame.players.clone(),
        player,
    }
}
