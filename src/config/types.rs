//! Root configuration types.

use serde::{Deserialize, Serialize};

use super::defaults::*;
use super::logging::LoggingConfig;

/// Top-level server configuration, loaded by [`super::load`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub rooms: RoomsConfig,
    #[serde(default)]
    pub live_war: LiveWarConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            logging: LoggingConfig::default(),
            rooms: RoomsConfig::default(),
            live_war: LiveWarConfig::default(),
            auth: AuthConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

/// Timing knobs shared by Chat/Drawing/Gobang rooms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomsConfig {
    #[serde(default = "default_occupancy_interval_secs")]
    pub occupancy_interval_secs: u64,
    #[serde(default = "default_drawing_auto_release_secs")]
    pub drawing_auto_release_secs: u64,
    #[serde(default = "default_gobang_disconnect_timeout_secs")]
    pub gobang_disconnect_timeout_secs: u64,
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
    #[serde(default = "default_room_code_prefix")]
    pub room_code_prefix: Option<String>,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            occupancy_interval_secs: default_occupancy_interval_secs(),
            drawing_auto_release_secs: default_drawing_auto_release_secs(),
            gobang_disconnect_timeout_secs: default_gobang_disconnect_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            room_code_prefix: default_room_code_prefix(),
        }
    }
}

/// LiveWar simulation tuning. These are the only "balance" knobs exposed —
/// per-unit stat tables in [`crate::rooms::live_war::state`] are fixed constants
/// (spec.md explicitly treats balance tuning as a non-goal).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveWarConfig {
    #[serde(default = "default_live_war_tick_millis")]
    pub tick_millis: u64,
    #[serde(default = "default_live_war_grace_secs")]
    pub grace_secs: u64,
    #[serde(default = "default_live_war_game_over_reset_secs")]
    pub game_over_reset_secs: u64,
    #[serde(default = "default_map_width")]
    pub map_width: u32,
    #[serde(default = "default_map_height")]
    pub map_height: u32,
    #[serde(default = "default_mine_spawn_interval_secs")]
    pub mine_spawn_interval_secs: u64,
}

impl Default for LiveWarConfig {
    fn default() -> Self {
        Self {
            tick_millis: default_live_war_tick_millis(),
            grace_secs: default_live_war_grace_secs(),
            game_over_reset_secs: default_live_war_game_over_reset_secs(),
            map_width: default_map_width(),
            map_height: default_map_height(),
            mine_spawn_interval_secs: default_mine_spawn_interval_secs(),
        }
    }
}

/// Bearer-token verification settings for the Auth Resolver (§4, external
/// interface §6). `jwt_secret` is intentionally not validated for
/// non-emptiness here; [`super::validation::validate_config_security`] does
/// that so production misconfiguration is surfaced as a hard error at
/// startup rather than silently degrading every connection to anonymous.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default = "default_jwt_algorithm")]
    pub jwt_algorithm: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_algorithm: default_jwt_algorithm(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            cors_origins: default_cors_origins(),
            max_message_size: default_max_message_size(),
        }
    }
}
