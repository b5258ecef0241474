//! Default value functions used by `#[serde(default = "...")]` attributes.
//!
//! Kept as free functions (rather than inline const expressions) because
//! `serde`'s `default = "path"` attribute requires a function path.

pub fn default_port() -> u16 {
    8080
}

pub fn default_room_code_prefix() -> Option<String> {
    None
}

pub fn default_occupancy_interval_secs() -> u64 {
    10
}

pub fn default_drawing_auto_release_secs() -> u64 {
    600
}

pub fn default_gobang_disconnect_timeout_secs() -> u64 {
    300
}

pub fn default_live_war_tick_millis() -> u64 {
    100
}

pub fn default_live_war_grace_secs() -> u64 {
    60
}

pub fn default_live_war_game_over_reset_secs() -> u64 {
    10
}

pub fn default_map_width() -> u32 {
    60
}

pub fn default_map_height() -> u32 {
    60
}

pub fn default_mine_spawn_interval_secs() -> u64 {
    60
}

pub fn default_jwt_algorithm() -> String {
    "HS256".to_string()
}

pub fn default_cors_origins() -> String {
    "*".to_string()
}

pub fn default_max_message_size() -> usize {
    65536
}

pub fn default_event_channel_capacity() -> usize {
    64
}
