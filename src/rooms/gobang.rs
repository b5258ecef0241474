//! Gobang Room (§4.5): one 15x15 match per room for the process lifetime,
//! seats gated on authenticated user_id, disconnect-forfeit timer.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::trace;

use crate::auth::Identity;
use crate::broadcast::ConnectionRegistry;
use crate::config::Config;
use crate::metrics::ServerMetrics;
use crate::protocol::{ChatMessage, ConnectionId, Envelope, MessageType, RoomId, UserId};

use super::util::now_millis;

pub const BOARD_SIZE: usize = 15;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Stone {
    Empty,
    Black,
    White,
}

impl Stone {
    fn as_u8(self) -> u8 {
        match self {
            Stone::Empty => 0,
            Stone::Black => 1,
            Stone::White => 2,
        }
    }
}

struct Match {
    black: Option<UserId>,
    white: Option<UserId>,
    joined: Vec<UserId>,
    started: bool,
    board: Vec<Vec<Stone>>,
    current_turn: Stone,
    winner: Option<Stone>,
}

impl Default for Match {
    fn default() -> Self {
        Self {
            black: None,
            white: None,
            joined: Vec::new(),
            started: false,
            board: vec![vec![Stone::Empty; BOARD_SIZE]; BOARD_SIZE],
            current_turn: Stone::Black,
            winner: None,
        }
    }
}

impl Match {
    fn reset(&mut self) {
        *self = Match::default();
    }

    fn role_for(&self, user_id: Option<UserId>) -> &'static str {
        match user_id {
            Some(uid) if Some(uid) == self.black => "black",
            Some(uid) if Some(uid) == self.white => "white",
            Some(uid) if self.joined.contains(&uid) => "waiting_player",
            _ => "spectator",
        }
    }
}

#[derive(Serialize, Deserialize)]
struct GobangStatePayload {
    board: Vec<Vec<u8>>,
    current_turn: u8,
    finished: bool,
    winner: String,
    role: String,
    room_id: RoomId,
    started: bool,
}

#[derive(Deserialize)]
struct GobangMovePayload {
    x: i32,
    y: i32,
}

#[derive(Default)]
struct GobangState {
    registry: ConnectionRegistry,
    game: Match,
    forfeit_task: Option<JoinHandle<()>>,
    forfeit_for: Option<UserId>,
}

pub struct GobangRoom {
    room_id: RoomId,
    config: Arc<Config>,
    metrics: Arc<ServerMetrics>,
    state: Mutex<GobangState>,
}

impl GobangRoom {
    pub fn new(room_id: RoomId, config: Arc<Config>, metrics: Arc<ServerMetrics>) -> Arc<Self> {
        Arc::new(Self {
            room_id,
            config,
            metrics,
            state: Mutex::new(GobangState::default()),
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

        if let Some(uid) = user_id {
            self.cancel_forfeit_if_reconnect(uid).await;
        }

        {
            let mut state = self.state.lock().await;
            state.registry.insert(id, identity.username, user_id, sender);
        }
        self.metrics.record_connect();
        self.send_state_to(id).await;
        self.broadcast_system(format!("{username} joined room {}", self.room_id))
            .await;
        id
    }

    pub async fn disconnect(self: &Arc<Self>, id: ConnectionId) {
        let (username, user_id) = {
            let state = self.state.lock().await;
            (
                state.registry.username(id).map(str::to_string),
                state.registry.user_id(id),
            )
        };
        {
            let mut state = self.state.lock().await;
            state.registry.remove(id);
        }
        self.metrics.record_disconnect();

        let should_start_forfeit = {
            let state = self.state.lock().await;
            let game = &state.game;
            game.started
                && game.winner.is_none()
                && user_id.is_some()
                && (user_id == game.black || user_id == game.white)
        };
        if let (true, Some(uid)) = (should_start_forfeit, user_id) {
            self.start_forfeit_timer(uid).await;
        }
        if let Some(username) = username {
            self.broadcast_system(format!("{username} left room {}", self.room_id))
                .await;
        }
    }

    pub async fn handle_envelope(self: &Arc<Self>, id: ConnectionId, envelope: Envelope) {
        let Envelope::Chat(msg) = envelope else {
            trace!(room_id = self.room_id, "ignoring non-chat envelope in gobang room");
            return;
        };

        let (username, user_id) = {
            let state = self.state.lock().await;
            match state.registry.username(id) {
                Some(u) => (u.to_string(), state.registry.user_id(id)),
                None => return,
            }
        };

        match msg.message_type {
            MessageType::UserText | MessageType::Music => {
                let timestamp = if msg.message_type == MessageType::Music {
                    now_millis() + 500
                } else {
                    now_millis()
                };
                self.broadcast_chat(ChatMessage {
                    user: username,
                    room_id: self.room_id,
                    content: msg.content,
                    timestamp,
                    message_type: msg.message_type,
                })
                .await;
            }
            MessageType::GobangJoin => self.handle_join(id, username, user_id).await,
            MessageType::GobangLeave => self.handle_leave(id, username, user_id).await,
            MessageType::GobangMove => self.handle_move(id, username, user_id, &msg.content).await,
            _ => trace!(room_id = self.room_id, "ignoring unhandled gobang message type"),
        }
    }

    async fn handle_join(self: &Arc<Self>, id: ConnectionId, username: String, user_id: Option<UserId>) {
        let Some(uid) = user_id else {
            self.send_error(id, "anonymous connections cannot join a match").await;
            return;
        };

        let outcome = {
            let mut state = self.state.lock().await;
            let game = &mut state.game;
            if game.winner.is_some() && game.started {
                Err("the match just ended; wait for the reset")
            } else if Some(uid) == game.black || Some(uid) == game.white || game.joined.contains(&uid) {
                Err("already in this match")
            } else if game.black.is_some() && game.white.is_some() {
                Err("both seats are taken; you can only spectate")
            } else {
                game.joined.push(uid);
                if game.joined.len() == 2 {
                    let mut players = game.joined.clone();
                    players.shuffle(&mut rand::rng());
                    game.black = Some(players[0]);
                    game.white = Some(players[1]);
                    game.started = true;
                    game.current_turn = Stone::Black;
                }
                Ok(())
            }
        };

        match outcome {
            Ok(()) => {
                self.broadcast_system(format!("{username} joined the match"))
                    .await;
                self.broadcast_state().await;
            }
            Err(reason) => self.send_error(id, reason).await,
        }
    }

    async fn handle_leave(self: &Arc<Self>, id: ConnectionId, username: String, user_id: Option<UserId>) {
        let Some(uid) = user_id else {
            self.send_error(id, "anonymous connections have nothing to leave").await;
            return;
        };
        let outcome = {
            let mut state = self.state.lock().await;
            let game = &mut state.game;
            if game.started {
                Err("the match has already started")
            } else if !game.joined.contains(&uid) {
                Err("you are not waiting to join")
            } else {
                game.joined.retain(|j| *j != uid);
                Ok(())
            }
        };
        match outcome {
            Ok(()) => {
                self.broadcast_system(format!("{username} left the waiting queue"))
                    .await;
                self.broadcast_state().await;
            }
            Err(reason) => self.send_error(id, reason).await,
        }
    }

    async fn handle_move(
        self: &Arc<Self>,
        id: ConnectionId,
        username: String,
        user_id: Option<UserId>,
        content: &str,
    ) {
        let Some(uid) = user_id else {
            self.send_error(id, "anonymous connections cannot place stones").await;
            return;
        };

        let parsed: Result<GobangMovePayload, _> = serde_json::from_str(content);
        let Ok(mv) = parsed else {
            self.send_error(id, "malformed move, expected {\"x\":..,\"y\":..}").await;
            return;
        };

        let outcome = {
            let mut state = self.state.lock().await;
            let game = &mut state.game;
            if !game.started || game.black.is_none() || game.white.is_none() {
                Err("the match has not started yet")
            } else if game.winner.is_some() {
                Err("the match has already finished")
            } else {
                let seat = if Some(uid) == game.black {
                    Some(Stone::Black)
                } else if Some(uid) == game.white {
                    Some(Stone::White)
                } else {
                    None
                };
                match seat {
                    None => Err("you are not a player in this match"),
                    Some(stone) if stone != game.current_turn => Err("it is not your turn"),
                    Some(stone) => {
                        if !(0..BOARD_SIZE as i32).contains(&mv.x) || !(0..BOARD_SIZE as i32).contains(&mv.y) {
                            Err("move is out of bounds")
                        } else if game.board[mv.y as usize][mv.x as usize] != Stone::Empty {
                            Err("that cell is already occupied")
                        } else {
                            game.board[mv.y as usize][mv.x as usize] = stone;
                            if check_winner(&game.board, mv.x as usize, mv.y as usize, stone) {
                                game.winner = Some(stone);
                            } else {
                                game.current_turn = match stone {
                                    Stone::Black => Stone::White,
                                    Stone::White => Stone::Black,
                                    Stone::Empty => Stone::Black,
                                };
                            }
                            Ok(())
                        }
                    }
                }
            }
        };

        match outcome {
            Ok(()) => {
                let finished = { self.state.lock().await.game.winner.is_some() };
                if finished {
                    self.announce_winner_and_reset().await;
                } else {
                    self.broadcast_system(format!(
                        "{username} placed a stone at ({}, {})",
                        mv.x, mv.y
                    ))
                    .await;
                }
                self.broadcast_state().await;
            }
            Err(reason) => self.send_error(id, reason).await,
        }
    }

    async fn announce_winner_and_reset(&self) {
        let (winner_name, loser_name, winner_stone) = {
            let mut state = self.state.lock().await;
            let game = &state.game;
            let winner_uid = match game.winner {
                Some(Stone::Black) => game.black,
                Some(Stone::White) => game.white,
                _ => None,
            };
            let winner_name = winner_uid
                .and_then(|uid| state.registry.find_by_user_id(uid))
                .and_then(|cid| state.registry.username(cid).map(str::to_string))
                .unwrap_or_else(|| "a player".to_string());
            let winner_stone = game.winner;
            let loser_name = "the opponent".to_string();
            drop(game);
            state.game.reset();
            (winner_name, loser_name, winner_stone)
        };
        let stone_label = match winner_stone {
            Some(Stone::Black) => "black",
            Some(Stone::White) => "white",
            _ => "unknown",
        };
        let message = format!(
            "game over: {winner_name} ({stone_label}) wins against {loser_name}; a new match can now begin"
        );
        self.broadcast_system(message.clone()).await;
        self.broadcast_chat(ChatMessage {
            user: "System".to_string(),
            room_id: self.room_id,
            content: message,
            timestamp: now_millis(),
            message_type: MessageType::UserText,
        })
        .await;
    }

    /// Only cancels the pending forfeit timer when the reconnecting user is
    /// the same seat holder it was started for — an unrelated user (a new
    /// spectator, or the other seat) connecting must not save the
    /// disconnected player from forfeiting.
    async fn cancel_forfeit_if_reconnect(&self, user_id: UserId) {
        let mut state = self.state.lock().await;
        if state.forfeit_for == Some(user_id) {
            if let Some(task) = state.forfeit_task.take() {
                task.abort();
            }
            state.forfeit_for = None;
        }
    }

    async fn start_forfeit_timer(self: &Arc<Self>, disconnected: UserId) {
        {
            let mut state = self.state.lock().await;
            if let Some(task) = state.forfeit_task.take() {
                task.abort();
            }
        }
        let room = Arc::clone(self);
        let duration = Duration::from_secs(self.config.rooms.gobang_disconnect_timeout_secs);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            room.forfeit(disconnected).await;
        });
        let mut state = self.state.lock().await;
        state.forfeit_task = Some(handle);
        state.forfeit_for = Some(disconnected);
    }

    async fn forfeit(&self, disconnected: UserId) {
        let still_pending = {
            let state = self.state.lock().await;
            let game = &state.game;
            game.started
                && game.winner.is_none()
                && (Some(disconnected) == game.black || Some(disconnected) == game.white)
        };
        if !still_pending {
            return;
        }
        {
            let mut state = self.state.lock().await;
            let winner_stone = if Some(disconnected) == state.game.black {
                Stone::White
            } else {
                Stone::Black
            };
            state.game.winner = Some(winner_stone);
            state.forfeit_task = None;
            state.forfeit_for = None;
        }
        self.announce_winner_and_reset().await;
        self.broadcast_state().await;
    }

    async fn send_error(&self, id: ConnectionId, reason: &str) {
        let frame = Bytes::from(
            Envelope::chat(ChatMessage::system(self.room_id, reason.to_string(), now_millis())).encode(),
        );
        let state = self.state.lock().await;
        state.registry.send_to(id, frame);
    }

    async fn send_state_to(&self, id: ConnectionId) {
        let state = self.state.lock().await;
        let user_id = state.registry.user_id(id);
        let payload = build_state_payload(self.room_id, &state.game, user_id);
        let frame = Bytes::from(
            Envelope::chat(ChatMessage {
                user: "System".to_string(),
                room_id: self.room_id,
                content: serde_json::to_string(&payload).unwrap_or_default(),
                timestamp: now_millis(),
                message_type: MessageType::GobangState,
            })
            .encode(),
        );
        state.registry.send_to(id, frame);
    }

    async fn broadcast_state(&self) {
        let state = self.state.lock().await;
        let ids = state.registry.ids();
        let mut dead = Vec::new();
        for id in ids {
            let user_id = state.registry.user_id(id);
            let payload = build_state_payload(self.room_id, &state.game, user_id);
            let frame = Bytes::from(
                Envelope::chat(ChatMessage {
                    user: "System".to_string(),
                    room_id: self.room_id,
                    content: serde_json::to_string(&payload).unwrap_or_default(),
                    timestamp: now_millis(),
                    message_type: MessageType::GobangState,
                })
                .encode(),
            );
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

    async fn broadcast_system(&self, content: String) {
        self.broadcast_chat(ChatMessage::system(self.room_id, content, now_millis()))
            .await;
    }

    async fn broadcast_chat(&self, msg: ChatMessage) {
        let frame = Bytes::from(Envelope::chat(msg).encode());
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

fn build_state_payload(room_id: RoomId, game: &Match, user_id: Option<UserId>) -> GobangStatePayload {
    GobangStatePayload {
        board: game
            .board
            .iter()
            .map(|row| row.iter().map(|s| s.as_u8()).collect())
            .collect(),
        current_turn: game.current_turn.as_u8(),
        finished: game.winner.is_some(),
        winner: match game.winner {
            Some(Stone::Black) => "black".to_string(),
            Some(Stone::White) => "white".to_string(),
            _ => String::new(),
        },
        role: game.role_for(user_id).to_string(),
        room_id,
        started: game.started,
    }
}

/// Bidirectional four-direction scan for five-in-a-row through the
/// just-placed stone at `(x, y)`.
fn check_winner(board: &[Vec<Stone>], x: usize, y: usize, color: Stone) -> bool {
    const DIRECTIONS: [(i32, i32); 4] = [(1, 0), (0, 1), (1, 1), (1, -1)];
    for (dx, dy) in DIRECTIONS {
        let mut count = 1;
        count += count_direction(board, x, y, dx, dy, color);
        count += count_direction(board, x, y, -dx, -dy, color);
        if count >= 5 {
            return true;
        }
    }
    false
}

fn count_direction(board: &[Vec<Stone>], x: usize, y: usize, dx: i32, dy: i32, color: Stone) -> i32 {
    let mut count = 0;
    let mut cx = x as i32 + dx;
    let mut cy = y as i32 + dy;
    while cx >= 0 && cy >= 0 && (cx as usize) < BOARD_SIZE && (cy as usize) < BOARD_SIZE {
        if board[cy as usize][cx as usize] != color {
            break;
        }
        count += 1;
        cx += dx;
        cy += dy;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn horizontal_five_in_a_row_is_detected() {
        let mut board = vec![vec![Stone::Empty; BOARD_SIZE]; BOARD_SIZE];
        for x in 0..4 {
            board[7][x] = Stone::Black;
        }
        board[7][4] = Stone::Black;
        assert!(check_winner(&board, 4, 7, Stone::Black));
    }

    #[test]
    fn four_in_a_row_is_not_a_win() {
        let mut board = vec![vec![Stone::Empty; BOARD_SIZE]; BOARD_SIZE];
        for x in 0..4 {
            board[7][x] = Stone::Black;
        }
        assert!(!check_winner(&board, 3, 7, Stone::Black));
    }

    #[test]
    fn diagonal_five_in_a_row_is_detected() {
        let mut board = vec![vec![Stone::Empty; BOARD_SIZE]; BOARD_SIZE];
        for i in 0..5 {
            board[i][i] = Stone::White;
        }
        assert!(check_winner(&board, 2, 2, Stone::White));
    }

    fn test_room() -> Arc<GobangRoom> {
        GobangRoom::new(1, Arc::new(Config::default()), Arc::new(ServerMetrics::new()))
    }

    fn identity(name: &str, user_id: UserId) -> Identity {
        Identity {
            username: name.to_string(),
            user_id: Some(user_id),
        }
    }

    #[tokio::test]
    async fn full_match_ends_with_reset() {
        let room = test_room();
        let (tx1, mut rx1) = mpsc::channel(64);
        let (tx2, mut rx2) = mpsc::channel(64);
        let a = room.connect(identity("alice", 1), tx1).await;
        let b = room.connect(identity("bob", 2), tx2).await;
        while rx1.try_recv().is_ok() {}
        while rx2.try_recv().is_ok() {}

        fn join_envelope() -> Envelope {
            Envelope::chat(ChatMessage {
                user: String::new(),
                room_id: 1,
                content: String::new(),
                timestamp: 0,
                message_type: MessageType::GobangJoin,
            })
        }
        room.handle_envelope(a, join_envelope()).await;
        room.handle_envelope(b, join_envelope()).await;
        while rx1.try_recv().is_ok() {}
        while rx2.try_recv().is_ok() {}

        let (black_id, white_id) = {
            let state = room.state.lock().await;
            (state.game.black, state.game.white)
        };
        assert!(black_id.is_some() && white_id.is_some());

        let black_conn = if black_id == Some(1) { a } else { b };
        let white_conn = if black_conn == a { b } else { a };

        let make_move = |x: i32, y: i32| {
            Envelope::chat(ChatMessage {
                user: String::new(),
                room_id: 1,
                content: format!("{{\"x\":{x},\"y\":{y}}}"),
                timestamp: 0,
                message_type: MessageType::GobangMove,
            })
        };

        for i in 0..4 {
            room.handle_envelope(black_conn, make_move(i, 7)).await;
            room.handle_envelope(white_conn, make_move(i, 8)).await;
        }
        room.handle_envelope(black_conn, make_move(4, 7)).await;

        let finished = { room.state.lock().await.game.winner.is_none() };
        assert!(finished, "match should have reset after a win");
        let board_is_clear = {
            let state = room.state.lock().await;
            state.game.board.iter().all(|row| row.iter().all(|c| *c == Stone::Empty))
        };
        assert!(board_is_clear);
    }
}
