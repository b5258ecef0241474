//! Configuration module.
//!
//! - [`types`]: Root `Config` struct and its sub-configs (rooms, live_war, auth, security)
//! - [`logging`]: Logging configuration
//! - [`loader`]: Configuration loading functions
//! - [`validation`]: Configuration validation functions
//! - [`defaults`]: Default value functions

pub mod defaults;
pub mod loader;
pub mod logging;
pub mod types;
pub mod validation;

pub use loader::load;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use types::{AuthConfig, Config, LiveWarConfig, RoomsConfig, SecurityConfig};
pub use validation::{is_production_mode, validate_config_security};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();

        assert_eq!(config.port, 8080);
        assert_eq!(config.rooms.occupancy_interval_secs, 10);
        assert_eq!(config.rooms.drawing_auto_release_secs, 600);
        assert_eq!(config.rooms.gobang_disconnect_timeout_secs, 300);
        assert_eq!(config.live_war.tick_millis, 100);
        assert_eq!(config.live_war.grace_secs, 60);
        assert_eq!(config.live_war.game_over_reset_secs, 10);
        assert_eq!(config.live_war.map_width, 60);
        assert_eq!(config.live_war.map_height, 60);
        assert_eq!(config.auth.jwt_algorithm, "HS256");
        assert_eq!(config.security.cors_origins, "*");

        assert_eq!(config.logging.dir, "logs");
        assert_eq!(config.logging.filename, "server.log");
        assert_eq!(config.logging.rotation, "daily");
    }

    #[test]
    fn test_config_serialization_round_trips() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(config.port, deserialized.port);
        assert_eq!(
            config.rooms.occupancy_interval_secs,
            deserialized.rooms.occupancy_interval_secs
        );
        assert_eq!(
            config.live_war.map_width,
            deserialized.live_war.map_width
        );
    }

    #[test]
    fn test_log_level_display() {
        assert_eq!(LogLevel::Trace.to_string(), "trace");
        assert_eq!(LogLevel::Debug.to_string(), "debug");
        assert_eq!(LogLevel::Info.to_string(), "info");
        assert_eq!(LogLevel::Warn.to_string(), "warn");
        assert_eq!(LogLevel::Error.to_string(), "error");
    }

    #[test]
    fn test_partial_json_fills_in_defaults() {
        let partial = serde_json::json!({"port": 9001});
        let config: Config = serde_json::from_value(partial).unwrap();
        assert_eq!(config.port, 9001);
        assert_eq!(config.live_war.map_width, 60);
    }
}
