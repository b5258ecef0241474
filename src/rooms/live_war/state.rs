//! Entity model for the LiveWar simulation (§3). Fixed per-unit stat tables
//! are constants here, not configuration — balance tuning is out of scope.

use std::collections::HashMap;

use crate::protocol::{Team, UnitType, UserId};

pub const MAP_MARGIN: f64 = 2.0;

pub const BASE_HP_MAX: f64 = 1000.0;
pub const MINE_ENERGY_MAX: f64 = 1000.0;
pub const MINE_LIFETIME_SECS: f64 = 180.0;
pub const MINE_REGEN_PER_SEC: f64 = 30.0;
pub const ENERGY_DROP_LIFETIME_SECS: f64 = 60.0;
pub const MAIN_MINER_RESPAWN_DELAY_SECS: f64 = 5.0;
pub const ATTACK_COOLDOWN_SECS: f64 = 1.0;

pub struct UnitStats {
    pub hp_max: f64,
    pub attack: f64,
    pub speed: f64,
    pub attack_range: f64,
    pub spawn_cost: f64,
    pub energy_drop_on_death: f64,
}

pub fn unit_stats(unit_type: UnitType) -> UnitStats {
    match unit_type {
        UnitType::Miner => UnitStats {
            hp_max: 60.0,
            attack: 6.0,
            speed: 1.0,
            attack_range: 1.5,
            spawn_cost: 20.0,
            energy_drop_on_death: 10.0,
        },
        UnitType::Engineer => UnitStats {
            hp_max: 90.0,
            attack: 12.0,
            speed: 4.0,
            attack_range: 1.5,
            spawn_cost: 50.0,
            energy_drop_on_death: 10.0,
        },
        UnitType::HeavyTank => UnitStats {
            hp_max: 220.0,
            attack: 28.0,
            speed: 0.5,
            attack_range: 2.5,
            spawn_cost: 100.0,
            energy_drop_on_death: 10.0,
        },
        UnitType::AssaultTank => UnitStats {
            hp_max: 120.0,
            attack: 32.0,
            speed: 1.2,
            attack_range: 2.5,
            spawn_cost: 80.0,
            energy_drop_on_death: 10.0,
        },
    }
}

#[derive(Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn cell(&self) -> (i32, i32) {
        (self.x.floor() as i32, self.y.floor() as i32)
    }
}

pub struct Base {
    pub team: Team,
    pub position: Point,
    pub hp: f64,
}

impl Base {
    pub fn new(team: Team, position: Point) -> Self {
        Self {
            team,
            position,
            hp: BASE_HP_MAX,
        }
    }

    /// Starting positions per §3: red at `(8, H-8)`, blue at `(W-8, 8)`.
    pub fn spawn_positions(map_width: u32, map_height: u32) -> (Point, Point) {
        let red = Point::new(8.0, map_height as f64 - 8.0);
        let blue = Point::new(map_width as f64 - 8.0, 8.0);
        (red, blue)
    }
}

pub struct Unit {
    pub id: String,
    pub unit_type: UnitType,
    pub team: Team,
    pub owner_id: UserId,
    pub position: Point,
    pub hp: f64,
    pub hp_max: f64,
    pub attack: f64,
    pub speed: f64,
    pub attack_range: f64,
    pub is_dead: bool,
    pub carrying_energy: f64,
    pub target: Option<Point>,
    pub target_id: Option<String>,
    pub last_attack_time: f64,
    pub is_mining: bool,
    pub is_main_miner: bool,
}

impl Unit {
    pub fn spawn(id: String, unit_type: UnitType, team: Team, owner_id: UserId, position: Point) -> Self {
        let stats = unit_stats(unit_type);
        Self {
            id,
            unit_type,
            team,
            owner_id,
            position,
            hp: stats.hp_max,
            hp_max: stats.hp_max,
            attack: stats.attack,
            speed: stats.speed,
            attack_range: stats.attack_range,
            is_dead: false,
            carrying_energy: 0.0,
            target: None,
            target_id: None,
            last_attack_time: f64::NEG_INFINITY,
            is_mining: false,
            is_main_miner: false,
        }
    }

    pub fn hp_fraction(&self) -> f64 {
        if self.hp_max <= 0.0 {
            0.0
        } else {
            self.hp / self.hp_max
        }
    }
}

pub struct MineField {
    pub id: String,
    pub position: Point,
    pub energy: f64,
    pub created_at: f64,
}

pub struct EnergyDrop {
    pub id: String,
    pub position: Point,
    pub energy: f64,
    pub dropped_at: f64,
}

pub struct HealEffect {
    pub id: String,
    pub from: Point,
    pub to: Point,
    pub team: Team,
    pub created_at: f64,
    pub lifetime: f64,
}

pub struct BulletEffect {
    pub id: String,
    pub from: Point,
    pub to: Point,
    pub team: Team,
    pub created_at: f64,
    pub lifetime: f64,
}

pub struct PlayerState {
    pub username: String,
    pub team: Option<Team>,
    pub selected_unit_type: Option<UnitType>,
    pub energy: f64,
    pub main_miner_id: Option<String>,
    pub main_miner_died_at: Option<f64>,
}

impl PlayerState {
    pub fn new(username: String) -> Self {
        Self {
            username,
            team: None,
            selected_unit_type: None,
            energy: 100.0,
            main_miner_id: None,
            main_miner_died_at: None,
        }
    }
}

#[derive(Default)]
pub struct SimState {
    pub map_width: u32,
    pub map_height: u32,
    pub bases: HashMap<Team, Base>,
    pub units: HashMap<String, Unit>,
    pub mines: HashMap<String, MineField>,
    pub energy_drops: HashMap<String, EnergyDrop>,
    pub heal_effects: HashMap<String, HealEffect>,
    pub bullet_effects: HashMap<String, BulletEffect>,
    pub players: HashMap<UserId, PlayerState>,
    pub logs: Vec<(UserId, String)>,
    pub game_started: bool,
    pub game_start_time: Option<f64>,
    pub game_over_time: Option<f64>,
    pub winner: Option<Team>,
    pub next_id: u64,
}

impl SimState {
    pub fn new(map_width: u32, map_height: u32) -> Self {
        Self {
            map_width,
            map_height,
            ..Default::default()
        }
    }

    pub fn fresh_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    pub fn reset(&mut self) {
        let (map_width, map_height) = (self.map_width, self.map_height);
        *self = SimState::new(map_width, map_height);
    }

    pub fn living_units_for(&self, team: Team) -> impl Iterator<Item = &Unit> {
        self.units.values().filter(move |u| u.team == team && !u.is_dead)
    }
}
