//! Process-wide shared state (§2, §5): the room supervisor, config, metrics,
//! and auth resolver every websocket connection is built against. Grounded in
//! the teacher's `EnhancedGameServer`, reduced to the collaborators this
//! server actually has — no database, no distributed coordination, no
//! reconnection manager (see DESIGN.md for the drop rationale).

use std::sync::Arc;

use crate::auth::AuthResolver;
use crate::config::Config;
use crate::metrics::ServerMetrics;
use crate::rooms::RoomSupervisor;

/// Shared application state, cloned cheaply into every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub metrics: Arc<ServerMetrics>,
    pub rooms: Arc<RoomSupervisor>,
    pub auth: Arc<AuthResolver>,
}

impl AppState {
    pub fn new(config: Arc<Config>) -> Self {
        let metrics = Arc::new(ServerMetrics::new());
        let rooms = Arc::new(RoomSupervisor::new(config.clone(), metrics.clone()));
        let secret = config
            .auth
            .jwt_secret
            .clone()
            .unwrap_or_default()
            .into_bytes();
        let auth = Arc::new(AuthResolver::new(secret));
        Self {
            config,
            metrics,
            rooms,
            auth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_default_config() {
        let state = AppState::new(Arc::new(Config::default()));
        assert_eq!(state.rooms.room_count(), 0);
    }
}
