//! Lobby: rooms, matchmaking queue, and connection index under one owner
//!
//! `Lobby` is synchronous and never touches the network or the clock. Every
//! handler takes the current time as an argument and records what should
//! happen next (messages to deliver, timers to arm or cancel) as [`Effect`]s,
//! which the [`LobbyService`] task carries out.

pub mod service;
pub mod session;
pub mod timer;

use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Config, GameConfig, MatchmakingConfig};
use crate::game::{JoinError, PlayerProfile, Room, RoomPhase, RoomRegistry, ShotOutcome, ShotRejection};
use crate::matchmaking::{MatchmakingQueue, OldestFirstWindow, QueueError, QueuedPlayer};
use crate::util::time::secs_between;
use crate::ws::protocol::{PlayerData, ServerMsg, Seat};

pub use service::{ClientInput, LobbyCommand, LobbyHandle, LobbyService, LobbyStats};
pub use session::SessionIndex;
pub use timer::{Timer, TimerId};

/// Side effect requested by the lobby
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Deliver a message to one connection
    Send { to: Uuid, msg: ServerMsg },
    /// Arm a timer that feeds `timer` back into [`Lobby::on_timer`]
    Schedule {
        id: TimerId,
        after: Duration,
        timer: Timer,
    },
    /// Disarm a previously scheduled timer
    Cancel(TimerId),
}

/// Buffered effects plus the timer id counter
#[derive(Debug, Default)]
struct Outbox {
    effects: Vec<Effect>,
    next_timer: u64,
}

impl Outbox {
    fn send(&mut self, to: Uuid, msg: ServerMsg) {
        self.effects.push(Effect::Send { to, msg });
    }

    fn broadcast(&mut self, room: &Room, msg: ServerMsg) {
        for to in room.connection_ids() {
            self.send(to, msg.clone());
        }
    }

    fn schedule(&mut self, after: Duration, timer: Timer) -> TimerId {
        self.next_timer += 1;
        let id = TimerId(self.next_timer);
        self.effects.push(Effect::Schedule { id, after, timer });
        id
    }

    fn cancel(&mut self, id: TimerId) {
        self.effects.push(Effect::Cancel(id));
    }
}

/// Request rejections. Each is reported only to the requester.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    #[error("room not found")]
    RoomNotFound,

    #[error("room full")]
    RoomFull,

    #[error("game in progress")]
    GameInProgress,

    #[error("already in queue")]
    AlreadyInQueue,

    #[error("already in a room")]
    AlreadyInRoom,
}

impl LobbyError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            LobbyError::RoomNotFound => "room_not_found",
            LobbyError::RoomFull => "room_full",
            LobbyError::GameInProgress => "game_in_progress",
            LobbyError::AlreadyInQueue => "already_in_queue",
            LobbyError::AlreadyInRoom => "already_in_room",
        }
    }
}

impl From<QueueError> for LobbyError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::AlreadyQueued => LobbyError::AlreadyInQueue,
        }
    }
}

impl From<JoinError> for LobbyError {
    fn from(err: JoinError) -> Self {
        match err {
            JoinError::RoomFull => LobbyError::RoomFull,
            JoinError::GameInProgress => LobbyError::GameInProgress,
        }
    }
}

impl From<LobbyError> for ServerMsg {
    fn from(err: LobbyError) -> Self {
        ServerMsg::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Every room, the matchmaking queue, and the connection index
pub struct Lobby {
    game: GameConfig,
    matchmaking: MatchmakingConfig,
    rooms: RoomRegistry,
    queue: MatchmakingQueue,
    sessions: SessionIndex,
    rng: ChaCha8Rng,
    outbox: Outbox,
    repair_scheduled: bool,
}

impl Lobby {
    pub fn new(game: GameConfig, matchmaking: MatchmakingConfig, seed: u64) -> Self {
        let strategy = OldestFirstWindow::from_config(&matchmaking);
        Self {
            game,
            matchmaking,
            rooms: RoomRegistry::new(),
            queue: MatchmakingQueue::new(Box::new(strategy)),
            sessions: SessionIndex::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            outbox: Outbox::default(),
            repair_scheduled: false,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.game.clone(),
            config.matchmaking.clone(),
            rand::random::<u64>(),
        )
    }

    /// Take every effect recorded since the last call
    pub fn drain_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.outbox.effects)
    }

    pub fn room(&self, code: &str) -> Option<&Room> {
        self.rooms.get(code)
    }

    /// The room a connection currently occupies
    pub fn room_of(&self, connection_id: Uuid) -> Option<&Room> {
        self.sessions
            .room_of(connection_id)
            .and_then(|code| self.rooms.get(code))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Connections currently seated in a room
    pub fn player_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_queued(&self, connection_id: Uuid) -> bool {
        self.queue.contains(&connection_id)
    }

    // ------------------------------------------------------------------
    // Requests with replies
    // ------------------------------------------------------------------

    /// Open a room with the requester in seat 1
    pub fn create_room(
        &mut self,
        connection_id: Uuid,
        player: PlayerData,
        now: u64,
    ) -> Result<ServerMsg, LobbyError> {
        self.check_free(connection_id)?;
        self.leave_finished_room(connection_id);
        self.queue.dequeue(connection_id);

        let profile = PlayerProfile::from_data(player);
        let username = profile.username.clone();
        let max_rounds = self.game.rounds_per_match;
        let code = self.rooms.create(&mut self.rng, |code| {
            Room::new(code, connection_id, profile, max_rounds, now)
        });
        self.sessions.attach(connection_id, &code);

        info!(
            connection_id = %connection_id,
            room_code = %code,
            username = %username,
            rooms = self.rooms.len(),
            seated = self.rooms.total_players(),
            "Room created"
        );

        Ok(ServerMsg::RoomCreated {
            room_code: code,
            seat: Seat::One,
        })
    }

    /// Take the free seat in an existing room
    pub fn join_room(
        &mut self,
        connection_id: Uuid,
        room_code: &str,
        player: PlayerData,
    ) -> Result<ServerMsg, LobbyError> {
        let code = room_code.trim();
        self.check_free(connection_id)?;

        let room = self.rooms.get(code).ok_or(LobbyError::RoomNotFound)?;
        room.check_joinable()?;
        let (host_id, host_info) = room
            .members
            .first()
            .map(|host| (host.connection_id, host.profile.info()))
            .ok_or(LobbyError::RoomNotFound)?;

        self.leave_finished_room(connection_id);
        self.queue.dequeue(connection_id);

        let profile = PlayerProfile::from_data(player);
        let joiner_info = profile.info();
        let room = self.rooms.get_mut(code).ok_or(LobbyError::RoomNotFound)?;
        let seat = room.seat_player(connection_id, profile)?;
        self.sessions.attach(connection_id, code);

        self.outbox.send(
            host_id,
            ServerMsg::PlayerJoined {
                seat,
                player: joiner_info.clone(),
            },
        );

        info!(
            connection_id = %connection_id,
            room_code = %code,
            username = %joiner_info.username,
            "Player joined room"
        );

        Ok(ServerMsg::RoomJoined {
            room_code: code.to_string(),
            seat,
            opponent: host_info,
        })
    }

    /// Enter the matchmaking queue and try to pair right away
    pub fn join_queue(
        &mut self,
        connection_id: Uuid,
        player: PlayerData,
        now: u64,
    ) -> Result<ServerMsg, LobbyError> {
        if self.queue.contains(&connection_id) {
            return Err(LobbyError::AlreadyInQueue);
        }
        self.check_free(connection_id)?;
        self.leave_finished_room(connection_id);

        let profile = PlayerProfile::from_data(player);
        let rating = profile.rating;
        self.queue
            .enqueue(QueuedPlayer::new(connection_id, profile, now))?;

        info!(
            connection_id = %connection_id,
            rating,
            queue_size = self.queue.len(),
            "Player joined matchmaking queue"
        );

        self.run_pairing(now);
        Ok(ServerMsg::QueueJoined { success: true })
    }

    // ------------------------------------------------------------------
    // Fire-and-forget events
    // ------------------------------------------------------------------

    pub fn leave_queue(&mut self, connection_id: Uuid) {
        if self.queue.dequeue(connection_id).is_some() {
            info!(connection_id = %connection_id, queue_size = self.queue.len(), "Player left queue");
        }
    }

    pub fn player_ready(&mut self, connection_id: Uuid) {
        let Some(code) = self.sessions.room_of(connection_id).map(str::to_owned) else {
            return;
        };
        let should_start = match self.rooms.get_mut(&code) {
            Some(room) => room.mark_ready(connection_id),
            None => false,
        };
        if should_start {
            self.start_round(&code);
        }
    }

    /// Apply a reported reaction time measured at `received_at` (unix ms)
    pub fn player_shot(&mut self, connection_id: Uuid, reaction_ms: f64, received_at: u64) {
        let Some(code) = self.sessions.room_of(connection_id).map(str::to_owned) else {
            return;
        };
        let Some(room) = self.rooms.get_mut(&code) else {
            return;
        };

        let outcome = room.resolve_shot(connection_id, reaction_ms, received_at, &self.game);
        let (record, scores, match_over) = match outcome {
            ShotOutcome::RoundWon {
                record,
                scores,
                match_over,
            } => (record, scores, match_over),
            ShotOutcome::Rejected(ShotRejection::Implausible(verdict)) => {
                warn!(
                    connection_id = %connection_id,
                    room_code = %code,
                    reaction_ms,
                    ?verdict,
                    "Dropped implausible reaction time"
                );
                return;
            }
            ShotOutcome::Rejected(reason) => {
                debug!(connection_id = %connection_id, room_code = %code, ?reason, "Shot ignored");
                return;
            }
        };

        // An early fire can decide the round before the cue goes out
        if let Some(cue) = room.pending_cue.take() {
            self.outbox.cancel(cue);
        }

        self.outbox.broadcast(
            room,
            ServerMsg::RoundEnd {
                winner: record.winner,
                reaction_time: record.time,
                early_fire: record.early_fire,
                scores,
            },
        );

        info!(
            room_code = %code,
            round = record.round,
            winner = u8::from(record.winner),
            reaction_ms = record.time,
            early_fire = record.early_fire,
            "Round decided"
        );

        if match_over {
            let winner = room.final_winner();
            self.outbox.broadcast(
                room,
                ServerMsg::GameEnd {
                    winner,
                    draw: winner.is_none(),
                    scores,
                    results: room.results.clone(),
                },
            );
            self.outbox.schedule(
                self.game.finished_room_ttl,
                Timer::ReapFinished {
                    code: code.clone(),
                    instance: room.instance,
                },
            );
            info!(room_code = %code, winner = ?winner.map(u8::from), "Game ended");
        } else {
            self.outbox.schedule(
                self.game.next_round_delay,
                Timer::NextRound {
                    code: code.clone(),
                    instance: room.instance,
                    round: record.round,
                },
            );
        }
    }

    /// Handle an abrupt or graceful disconnect
    pub fn disconnect(&mut self, connection_id: Uuid) {
        if self.queue.dequeue(connection_id).is_some() {
            info!(connection_id = %connection_id, queue_size = self.queue.len(), "Removed from queue");
        }

        let Some(code) = self.sessions.detach(connection_id) else {
            return;
        };
        let Some(room) = self.rooms.remove(&code) else {
            return;
        };
        if let Some(cue) = room.pending_cue {
            self.outbox.cancel(cue);
        }

        for member in room.members.iter().filter(|m| m.connection_id != connection_id) {
            if self.sessions.room_of(member.connection_id) == Some(code.as_str()) {
                self.sessions.detach(member.connection_id);
                self.outbox.send(member.connection_id, ServerMsg::PlayerDisconnected);
            }
        }

        info!(connection_id = %connection_id, room_code = %code, "Room closed by disconnect");
    }

    // ------------------------------------------------------------------
    // Matchmaking
    // ------------------------------------------------------------------

    /// Periodic pairing pass
    pub fn sweep(&mut self, now: u64) {
        if self.queue.len() >= 2 {
            self.run_pairing(now);
        }
    }

    /// Pair at most one couple now; if more could follow, schedule another pass
    pub fn run_pairing(&mut self, now: u64) {
        let Some((first, second)) = self.queue.try_pair(now) else {
            return;
        };
        self.form_match(first, second, now);

        if self.queue.len() >= 2 && !self.repair_scheduled {
            self.repair_scheduled = true;
            self.outbox
                .schedule(self.matchmaking.repair_delay, Timer::Repair);
        }
    }

    fn form_match(&mut self, host: QueuedPlayer, guest: QueuedPlayer, now: u64) {
        let host_id = host.connection_id;
        let guest_id = guest.connection_id;
        let host_info = host.profile.info();
        let guest_info = guest.profile.info();
        let avg_wait = (host.wait_secs(now) + guest.wait_secs(now)) / 2.0;

        let max_rounds = self.game.rounds_per_match;
        let host_profile = host.profile;
        let code = self.rooms.create(&mut self.rng, |code| {
            Room::new(code, host_id, host_profile, max_rounds, now)
        });
        let Some(room) = self.rooms.get_mut(&code) else {
            return;
        };
        let instance = room.instance;
        if let Err(err) = room.seat_player(guest_id, guest.profile) {
            warn!(room_code = %code, error = %err, "Could not seat matched player");
            self.rooms.remove(&code);
            return;
        }

        self.sessions.attach(host_id, &code);
        self.sessions.attach(guest_id, &code);

        self.outbox.send(
            host_id,
            ServerMsg::MatchFound {
                room_code: code.clone(),
                seat: Seat::One,
                opponent_rating: guest_info.rating,
                opponent: guest_info.clone(),
            },
        );
        self.outbox.send(
            guest_id,
            ServerMsg::MatchFound {
                room_code: code.clone(),
                seat: Seat::Two,
                opponent_rating: host_info.rating,
                opponent: host_info.clone(),
            },
        );

        self.outbox.schedule(
            self.matchmaking.auto_ready_delay,
            Timer::AutoReady {
                code: code.clone(),
                instance,
            },
        );

        info!(
            room_code = %code,
            host_rating = host_info.rating,
            guest_rating = guest_info.rating,
            rating_gap = host_info.rating.abs_diff(guest_info.rating),
            avg_wait_secs = avg_wait,
            rooms = self.rooms.len(),
            seated = self.rooms.total_players(),
            "Match created"
        );
    }

    // ------------------------------------------------------------------
    // Rounds and timers
    // ------------------------------------------------------------------

    fn start_round(&mut self, code: &str) {
        let Some(room) = self.rooms.get_mut(code) else {
            return;
        };
        let Some(round) = room.begin_round() else {
            return;
        };

        let map_index = self.rng.gen_range(0..self.game.map_count.max(1));
        self.outbox
            .broadcast(room, ServerMsg::RoundStart { round, map_index });

        let delay = random_between(&mut self.rng, self.game.cue_delay_min, self.game.cue_delay_max);
        let cue = self.outbox.schedule(
            delay,
            Timer::Cue {
                code: code.to_string(),
                instance: room.instance,
                round,
            },
        );
        room.pending_cue = Some(cue);

        debug!(room_code = %code, round, map_index, cue_delay_ms = delay.as_millis() as u64, "Round started");
    }

    /// Feed back a fired timer. Each kind re-checks that its room still
    /// exists and is in the state the timer was armed for.
    pub fn on_timer(&mut self, id: TimerId, timer: Timer, now: u64) {
        match timer {
            Timer::Cue {
                code,
                instance,
                round,
            } => self.fire_cue(id, &code, instance, round, now),
            Timer::NextRound {
                code,
                instance,
                round,
            } => {
                let due = self.rooms.get(&code).is_some_and(|room| {
                    room.instance == instance
                        && room.phase == RoomPhase::Playing
                        && room.round == round
                        && room.round_winner.is_some()
                });
                if due {
                    self.start_round(&code);
                }
            }
            Timer::AutoReady { code, instance } => {
                let should_start = match self.rooms.get_mut(&code) {
                    Some(room) if room.instance == instance => room.mark_all_ready(),
                    _ => false,
                };
                if should_start {
                    self.start_round(&code);
                }
            }
            Timer::ReapFinished { code, instance } => {
                let created_at = self
                    .rooms
                    .get(&code)
                    .filter(|room| room.instance == instance && room.phase == RoomPhase::Finished)
                    .map(|room| room.created_at);
                if let Some(created_at) = created_at {
                    self.close_room(&code);
                    debug!(
                        room_code = %code,
                        age_secs = secs_between(created_at, now),
                        "Finished room reaped"
                    );
                }
            }
            Timer::Repair => {
                self.repair_scheduled = false;
                self.run_pairing(now);
            }
        }
    }

    fn fire_cue(&mut self, id: TimerId, code: &str, instance: Uuid, round: u32, now: u64) {
        let Some(room) = self.rooms.get_mut(code) else {
            return;
        };
        let armed_for_this_round = room.instance == instance
            && room.round == round
            && room.pending_cue == Some(id)
            && room.cue_time.is_none()
            && room.round_is_live();
        if !armed_for_this_round {
            return;
        }

        room.arm_cue(now);
        self.outbox
            .broadcast(room, ServerMsg::CueTrigger { server_time: now });
    }

    // ------------------------------------------------------------------
    // Membership helpers
    // ------------------------------------------------------------------

    /// A connection seated in a room that is not finished cannot start anything new
    fn check_free(&self, connection_id: Uuid) -> Result<(), LobbyError> {
        match self.room_of(connection_id) {
            Some(room) if room.phase != RoomPhase::Finished => Err(LobbyError::AlreadyInRoom),
            _ => Ok(()),
        }
    }

    /// Release a connection from a finished (or already removed) room
    fn leave_finished_room(&mut self, connection_id: Uuid) {
        if let Some(code) = self.sessions.detach(connection_id) {
            debug!(connection_id = %connection_id, room_code = %code, "Left finished room");
        }
    }

    /// Remove a room silently, unindexing members still pointing at it
    fn close_room(&mut self, code: &str) {
        let Some(room) = self.rooms.remove(code) else {
            return;
        };
        if let Some(cue) = room.pending_cue {
            self.outbox.cancel(cue);
        }
        for member in &room.members {
            if self.sessions.room_of(member.connection_id) == Some(code) {
                self.sessions.detach(member.connection_id);
            }
        }
    }
}

fn random_between<R: Rng + ?Sized>(rng: &mut R, min: Duration, max: Duration) -> Duration {
    if min >= max {
        return min;
    }
    let ms = rng.gen_range(min.as_millis() as u64..=max.as_millis() as u64);
    Duration::from_millis(ms)
}
