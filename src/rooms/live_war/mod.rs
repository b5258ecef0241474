//! LiveWar Game Manager (§4.6): matchmaking gate, economy, and the 100ms
//! tick loop built from [`state`], [`ai`], and [`sim`].

mod ai;
mod sim;
mod state;
mod view;

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::trace;

use crate::auth::Identity;
use crate::broadcast::ConnectionRegistry;
use crate::config::Config;
use crate::metrics::ServerMetrics;
use crate::protocol::{
    ConnectionId, Envelope, GameMessage, PlayerSummary, RoomId, Team, UserId,
};

use state::{Base, PlayerState, SimState};

struct LiveWarState {
    registry: ConnectionRegistry,
    sim: SimState,
    tick_task: Option<JoinHandle<()>>,
    teardown_task: Option<JoinHandle<()>>,
    next_periodic_mine_at: f64,
}

impl LiveWarState {
    fn new(config: &Config) -> Self {
        let mut sim = SimState::new(config.live_war.map_width, config.live_war.map_height);
        let (red_pos, blue_pos) = Base::spawn_positions(sim.map_width, sim.map_height);
        sim.bases.insert(Team::Red, Base::new(Team::Red, red_pos));
        sim.bases.insert(Team::Blue, Base::new(Team::Blue, blue_pos));
        Self {
            registry: ConnectionRegistry::new(),
            sim,
            tick_task: None,
            teardown_task: None,
            next_periodic_mine_at: config.live_war.mine_spawn_interval_secs as f64,
        }
    }
}

pub struct LiveWarRoom {
    room_id: RoomId,
    config: Arc<Config>,
    metrics: Arc<ServerMetrics>,
    state: Mutex<LiveWarState>,
}

impl LiveWarRoom {
    pub fn new(room_id: RoomId, config: Arc<Config>, metrics: Arc<ServerMetrics>) -> Arc<Self> {
        let state = LiveWarState::new(&config);
        Arc::new(Self {
            room_id,
            config,
            metrics,
            state: Mutex::new(state),
        })
    }

    pub async fn connect(
        self: &Arc<Self>,
        identity: Identity,
        sender: mpsc::Sender<Bytes>,
    ) -> ConnectionId {
        let id = ConnectionId::new_v4();
        let username = identity.username.clone();
        let user_id = identity.user_id;

        {
            let mut state = self.state.lock().await;
            state.registry.insert(id, username.clone(), user_id, sender);
            if let Some(task) = state.teardown_task.take() {
                task.abort();
            }
            if let Some(uid) = user_id {
                state
                    .sim
                    .players
                    .entry(uid)
                    .or_insert_with(|| PlayerState::new(username.clone()));
            }
        }
        self.metrics.record_connect();
        self.send_state_to(id, user_id).await;
        id
    }

    pub async fn disconnect(self: &Arc<Self>, id: ConnectionId) {
        let user_id = {
            let state = self.state.lock().await;
            state.registry.user_id(id)
        };
        let now_empty = {
            let mut state = self.state.lock().await;
            state.registry.remove(id);
            state.registry.is_empty()
        };
        self.metrics.record_disconnect();

        if let Some(uid) = user_id {
            self.broadcast_game(GameMessage::PlayerLeft { user_id: uid }).await;
        }
        if now_empty {
            self.start_teardown_timer().await;
        }
    }

    pub async fn handle_envelope(self: &Arc<Self>, id: ConnectionId, envelope: Envelope) {
        let Envelope::Game(msg) = envelope else {
            trace!(room_id = self.room_id, "ignoring non-game envelope in live_war room");
            return;
        };

        match msg {
            GameMessage::JoinGame { team } => self.handle_join(id, team).await,
            GameMessage::LeaveGame => self.handle_leave(id).await,
            GameMessage::SelectUnit { unit_type } => self.handle_select_unit(id, unit_type).await,
            GameMessage::SpawnUnit => self.handle_spawn_unit(id).await,
            _ => trace!(room_id = self.room_id, "ignoring unhandled live_war message type"),
        }
    }

    async fn handle_join(self: &Arc<Self>, id: ConnectionId, team: Team) {
        let Some((uid, username)) = self.identity_of(id).await else {
            self.send_error(id, "anonymous connections cannot join a team").await;
            return;
        };

        let should_start = {
            let mut state = self.state.lock().await;
            if state.sim.winner.is_some() {
                drop(state);
                self.send_error(id, "a new game cannot start yet, the previous match is resetting")
                    .await;
                return;
            }
            let player = state
                .sim
                .players
                .entry(uid)
                .or_insert_with(|| PlayerState::new(username.clone()));
            player.team = Some(team);

            if state.sim.game_started {
                sim::spawn_main_miner(&mut state.sim, uid, team);
                false
            } else {
                let red_ready = state.sim.players.values().any(|p| p.team == Some(Team::Red));
                let blue_ready = state.sim.players.values().any(|p| p.team == Some(Team::Blue));
                red_ready && blue_ready
            }
        };

        self.broadcast_game(GameMessage::PlayerJoined {
            player: PlayerSummary { user_id: uid, username, team },
        })
        .await;

        if should_start {
            self.start_game().await;
        }
    }

    async fn handle_leave(self: &Arc<Self>, id: ConnectionId) {
        let Some((uid, _)) = self.identity_of(id).await else {
            return;
        };
        let mut state = self.state.lock().await;
        if let Some(player) = state.sim.players.get_mut(&uid) {
            player.team = None;
        }
    }

    async fn handle_select_unit(self: &Arc<Self>, id: ConnectionId, unit_type: crate::protocol::UnitType) {
        let Some((uid, _)) = self.identity_of(id).await else {
            self.send_error(id, "anonymous connections cannot select a unit").await;
            return;
        };
        let mut state = self.state.lock().await;
        if let Some(player) = state.sim.players.get_mut(&uid) {
            player.selected_unit_type = Some(unit_type);
        }
    }

    async fn handle_spawn_unit(self: &Arc<Self>, id: ConnectionId) {
        let Some((uid, _)) = self.identity_of(id).await else {
            self.send_error(id, "anonymous connections cannot spawn units").await;
            return;
        };
        let outcome = {
            let mut state = self.state.lock().await;
            sim::spawn_unit(&mut state.sim, uid)
        };
        if let Err(reason) = outcome {
            self.send_error(id, reason).await;
        }
    }

    /// Starts the tick loop once both teams have at least one player.
    /// Guarded at the call site by `game_started`/`winner` so a game cannot
    /// restart while the post-GAME_OVER reset window is still pending.
    async fn start_game(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().await;
            state.sim.game_started = true;
            state.sim.game_start_time = Some(0.0);
            let team_players: Vec<(UserId, Team)> = state
                .sim
                .players
                .iter()
                .filter_map(|(uid, p)| p.team.map(|t| (*uid, t)))
                .collect();
            for (uid, team) in team_players {
                sim::spawn_main_miner(&mut state.sim, uid, team);
            }
            sim::seed_initial_mines(&mut state.sim, 0.0);
            state.next_periodic_mine_at = self.config.live_war.mine_spawn_interval_secs as f64;
        }
        self.metrics.record_live_war_game_started();
        self.broadcast_game(GameMessage::GameStarted).await;
        self.spawn_tick_task().await;
    }

    /// Runs the tick loop until either a game-over reset completes or the
    /// room empties. The handle is stashed in `tick_task` purely so the
    /// grace-period teardown can abort it if the room empties mid-game;
    /// once the loop returns on its own the stashed handle is simply stale
    /// and gets replaced by the next game's handle.
    async fn spawn_tick_task(self: &Arc<Self>) {
        let room = Arc::clone(self);
        let tick_millis = self.config.live_war.tick_millis;
        let game_over_reset_secs = self.config.live_war.game_over_reset_secs;
        let mine_spawn_interval_secs = self.config.live_war.mine_spawn_interval_secs as f64;
        let handle = tokio::spawn(async move {
            let start = Instant::now();
            let mut interval = tokio::time::interval(Duration::from_millis(tick_millis));
            let mut tick_index: u64 = 0;
            loop {
                interval.tick().await;
                let elapsed = start.elapsed().as_secs_f64();
                tick_index += 1;

                let (just_finished, winner, game_time) = {
                    let mut state = room.state.lock().await;
                    let was_running = state.sim.winner.is_none();
                    if elapsed >= state.next_periodic_mine_at {
                        sim::spawn_periodic_mine(&mut state.sim, elapsed);
                        state.next_periodic_mine_at += mine_spawn_interval_secs;
                    }
                    sim::tick(&mut state.sim, elapsed, tick_index);
                    let just_finished = was_running && state.sim.winner.is_some();
                    (just_finished, state.sim.winner, elapsed)
                };
                room.metrics.record_live_war_tick();
                room.broadcast_state(tick_index, game_time).await;

                if just_finished {
                    if let Some(winner) = winner {
                        room.metrics.record_live_war_game_finished();
                        room.broadcast_game(GameMessage::GameOver {
                            winner,
                            winner_display_name: winner.display_name().to_string(),
                        })
                        .await;
                    }
                    tokio::time::sleep(Duration::from_secs(game_over_reset_secs)).await;
                    let mut state = room.state.lock().await;
                    state.sim.reset();
                    let (red_pos, blue_pos) = Base::spawn_positions(state.sim.map_width, state.sim.map_height);
                    state.sim.bases.insert(Team::Red, Base::new(Team::Red, red_pos));
                    state.sim.bases.insert(Team::Blue, Base::new(Team::Blue, blue_pos));
                    return;
                }

                if room.state.lock().await.registry.is_empty() {
                    return;
                }
            }
        });
        self.state.lock().await.tick_task = Some(handle);
    }

    async fn start_teardown_timer(self: &Arc<Self>) {
        let room = Arc::clone(self);
        let duration = Duration::from_secs(self.config.live_war.grace_secs);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let mut state = room.state.lock().await;
            if !state.registry.is_empty() {
                return;
            }
            if let Some(task) = state.tick_task.take() {
                task.abort();
            }
            state.sim.reset();
            let (red_pos, blue_pos) = Base::spawn_positions(state.sim.map_width, state.sim.map_height);
            state.sim.bases.insert(Team::Red, Base::new(Team::Red, red_pos));
            state.sim.bases.insert(Team::Blue, Base::new(Team::Blue, blue_pos));
        });
        let mut state = self.state.lock().await;
        if let Some(old) = state.teardown_task.replace(handle) {
            old.abort();
        }
    }

    async fn identity_of(&self, id: ConnectionId) -> Option<(UserId, String)> {
        let state = self.state.lock().await;
        let uid = state.registry.user_id(id)?;
        let username = state.registry.username(id)?.to_string();
        Some((uid, username))
    }

    async fn send_error(&self, id: ConnectionId, reason: &str) {
        let frame = Bytes::from(Envelope::game(GameMessage::error(reason)).encode());
        let state = self.state.lock().await;
        state.registry.send_to(id, frame);
    }

    async fn send_state_to(&self, id: ConnectionId, user_id: Option<UserId>) {
        let state = self.state.lock().await;
        let frame = self.build_frame(&state.sim, 0, 0.0, user_id);
        state.registry.send_to(id, frame);
    }

    async fn broadcast_state(&self, tick: u64, game_time: f64) {
        let state = self.state.lock().await;
        let ids = state.registry.ids();
        let mut dead = Vec::new();
        for id in ids {
            let user_id = state.registry.user_id(id);
            let frame = self.build_frame(&state.sim, tick, game_time, user_id);
            if !state.registry.send_to(id, frame) {
                dead.push(id);
            }
        }
        drop(state);
        if !dead.is_empty() {
            let mut state = self.state.lock().await;
            for id in dead {
                state.registry.remove(id);
            }
        }
    }

    fn build_frame(&self, sim: &SimState, tick: u64, game_time: f64, user_id: Option<UserId>) -> Bytes {
        let shared = view::build_shared_frame(sim, tick, game_time);
        let player = view::player_view(sim, user_id);
        let state_view = view::to_game_state_view(&shared, player);
        Bytes::from(Envelope::game(GameMessage::GameState(Box::new(state_view))).encode())
    }

    async fn broadcast_game(&self, msg: GameMessage) {
        let frame = Bytes::from(Envelope::game(msg).encode());
        let mut state = self.state.lock().await;
        let dead = state.registry.broadcast(frame);
        let recipients = state.registry.len();
        for id in &dead {
            state.registry.remove(*id);
        }
        drop(state);
        self.metrics.record_broadcast(recipients, dead.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::UnitType;

    fn test_room() -> Arc<LiveWarRoom> {
        LiveWarRoom::new(1, Arc::new(Config::default()), Arc::new(ServerMetrics::new()))
    }

    fn identity(name: &str, user_id: UserId) -> Identity {
        Identity {
            username: name.to_string(),
            user_id: Some(user_id),
        }
    }

    #[tokio::test]
    async fn joining_both_teams_starts_the_game() {
        let room = test_room();
        let (tx1, mut rx1) = mpsc::channel(64);
        let (tx2, mut rx2) = mpsc::channel(64);
        let a = room.connect(identity("alice", 1), tx1).await;
        let b = room.connect(identity("bob", 2), tx2).await;
        while rx1.try_recv().is_ok() {}
        while rx2.try_recv().is_ok() {}

        room.handle_envelope(a, Envelope::game(GameMessage::JoinGame { team: Team::Red })).await;
        assert!(!room.state.lock().await.sim.game_started);

        room.handle_envelope(b, Envelope::game(GameMessage::JoinGame { team: Team::Blue })).await;
        assert!(room.state.lock().await.sim.game_started);

        let has_main_miners = {
            let state = room.state.lock().await;
            state.sim.units.values().filter(|u| u.is_main_miner).count() == 2
        };
        assert!(has_main_miners);
    }

    #[tokio::test]
    async fn spawn_unit_without_selection_is_rejected() {
        let room = test_room();
        let (tx, mut rx) = mpsc::channel(64);
        let a = room.connect(identity("alice", 1), tx).await;
        while rx.try_recv().is_ok() {}

        room.handle_envelope(a, Envelope::game(GameMessage::JoinGame { team: Team::Red })).await;
        room.handle_envelope(a, Envelope::game(GameMessage::SpawnUnit)).await;

        let mut saw_error = false;
        while let Ok(frame) = rx.try_recv() {
            if let Ok(Envelope::Game(GameMessage::Error { .. })) = Envelope::decode(&frame) {
                saw_error = true;
            }
        }
        assert!(saw_error);
    }

    #[tokio::test]
    async fn spawn_unit_deducts_energy_after_selection() {
        let room = test_room();
        let (tx, mut rx) = mpsc::channel(64);
        let a = room.connect(identity("alice", 1), tx).await;
        while rx.try_recv().is_ok() {}

        room.handle_envelope(a, Envelope::game(GameMessage::JoinGame { team: Team::Red })).await;
        room.handle_envelope(
            a,
            Envelope::game(GameMessage::SelectUnit { unit_type: UnitType::Miner }),
        )
        .await;
        let energy_before = { room.state.lock().await.sim.players[&1].energy };
        room.handle_envelope(a, Envelope::game(GameMessage::SpawnUnit)).await;
        let energy_after = { room.state.lock().await.sim.players[&1].energy };
        assert!(energy_after < energy_before);
    }
}
