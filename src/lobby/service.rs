//! Lobby service - the single task that owns every room and the queue
//!
//! Gateways talk to it through a cloneable [`LobbyHandle`]. The task applies
//! each command to the [`Lobby`], then carries out the recorded effects:
//! outbound messages go to per-connection channels, timers become sleeping
//! tasks that report back on an internal channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::game::{Room, RoomPhase};
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::{Effect, Lobby, Timer, TimerId};

/// Pending commands before gateways start waiting
pub const COMMAND_CHANNEL_CAPACITY: usize = 1024;

/// Per-connection outbound buffer
pub const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

/// A parsed client message stamped with its arrival time
#[derive(Debug, Clone)]
pub struct ClientInput {
    pub connection_id: Uuid,
    pub msg: ClientMsg,
    /// Server receive time (unix ms)
    pub received_at: u64,
}

/// Commands accepted by the lobby task
#[derive(Debug)]
pub enum LobbyCommand {
    Connect {
        connection_id: Uuid,
        outbound: mpsc::Sender<ServerMsg>,
    },
    Input(ClientInput),
    Disconnect {
        connection_id: Uuid,
    },
    RoomStatus {
        code: String,
        reply: oneshot::Sender<Option<RoomSummary>>,
    },
}

/// Read-only view of a room for HTTP lookups
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomSummary {
    pub room_code: String,
    pub phase: RoomPhase,
    pub players: usize,
    pub round: u32,
    pub max_rounds: u32,
    /// Unix millis
    pub created_at: u64,
}

impl RoomSummary {
    fn from_room(room: &Room) -> Self {
        Self {
            room_code: room.code.clone(),
            phase: room.phase,
            players: room.members.len(),
            round: room.round,
            max_rounds: room.max_rounds,
            created_at: room.created_at,
        }
    }
}

/// Counters published by the lobby task after every event
#[derive(Debug, Default)]
pub struct LobbyStats {
    rooms: AtomicUsize,
    players: AtomicUsize,
    queued: AtomicUsize,
    connections: AtomicUsize,
}

impl LobbyStats {
    pub fn rooms(&self) -> usize {
        self.rooms.load(Ordering::Relaxed)
    }

    pub fn players(&self) -> usize {
        self.players.load(Ordering::Relaxed)
    }

    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }
}

/// The lobby task has stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("lobby service is not running")]
pub struct LobbyClosed;

/// Cloneable sender side of the lobby task
#[derive(Debug, Clone)]
pub struct LobbyHandle {
    cmd_tx: mpsc::Sender<LobbyCommand>,
    stats: Arc<LobbyStats>,
}

impl LobbyHandle {
    /// Register a connection. The returned receiver yields everything the
    /// lobby sends to it, starting with `welcome`.
    pub async fn connect(&self, connection_id: Uuid) -> Result<mpsc::Receiver<ServerMsg>, LobbyClosed> {
        let (outbound, rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        self.send(LobbyCommand::Connect {
            connection_id,
            outbound,
        })
        .await?;
        Ok(rx)
    }

    pub async fn submit(&self, input: ClientInput) -> Result<(), LobbyClosed> {
        self.send(LobbyCommand::Input(input)).await
    }

    pub async fn disconnect(&self, connection_id: Uuid) -> Result<(), LobbyClosed> {
        self.send(LobbyCommand::Disconnect { connection_id }).await
    }

    /// Look up a room by code
    pub async fn room_status(&self, code: &str) -> Result<Option<RoomSummary>, LobbyClosed> {
        let (reply, rx) = oneshot::channel();
        self.send(LobbyCommand::RoomStatus {
            code: code.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| LobbyClosed)
    }

    pub fn stats(&self) -> &LobbyStats {
        &self.stats
    }

    async fn send(&self, cmd: LobbyCommand) -> Result<(), LobbyClosed> {
        self.cmd_tx.send(cmd).await.map_err(|_| LobbyClosed)
    }
}

/// Owner of the lobby state
pub struct LobbyService {
    lobby: Lobby,
    cmd_rx: mpsc::Receiver<LobbyCommand>,
    timer_tx: mpsc::UnboundedSender<(TimerId, Timer)>,
    timer_rx: mpsc::UnboundedReceiver<(TimerId, Timer)>,
    timers: HashMap<TimerId, JoinHandle<()>>,
    connections: HashMap<Uuid, mpsc::Sender<ServerMsg>>,
    stats: Arc<LobbyStats>,
    sweep_interval: Duration,
}

impl LobbyService {
    pub fn new(lobby: Lobby, sweep_interval: Duration) -> (Self, LobbyHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let stats = Arc::new(LobbyStats::default());

        let service = Self {
            lobby,
            cmd_rx,
            timer_tx,
            timer_rx,
            timers: HashMap::new(),
            connections: HashMap::new(),
            stats: stats.clone(),
            sweep_interval,
        };
        (service, LobbyHandle { cmd_tx, stats })
    }

    /// Build the lobby from config and run it on a new task
    pub fn spawn(config: &Config) -> LobbyHandle {
        let (service, handle) = Self::new(
            Lobby::from_config(config),
            config.matchmaking.sweep_interval,
        );
        tokio::spawn(service.run());
        handle
    }

    /// Run until every handle is dropped
    pub async fn run(mut self) {
        info!(sweep_ms = self.sweep_interval.as_millis() as u64, "Lobby service started");

        let mut sweep = interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                Some((id, timer)) = self.timer_rx.recv() => {
                    self.timers.remove(&id);
                    self.lobby.on_timer(id, timer, unix_millis());
                }
                _ = sweep.tick() => {
                    self.lobby.sweep(unix_millis());
                }
            }

            self.flush();
            self.publish_stats();
        }

        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
        info!("Lobby service stopped");
    }

    fn handle_command(&mut self, cmd: LobbyCommand) {
        match cmd {
            LobbyCommand::Connect {
                connection_id,
                outbound,
            } => {
                self.connections.insert(connection_id, outbound);
                self.deliver(
                    connection_id,
                    ServerMsg::Welcome {
                        connection_id,
                        server_time: unix_millis(),
                    },
                );
                info!(
                    connection_id = %connection_id,
                    connections = self.connections.len(),
                    "Client connected"
                );
            }
            LobbyCommand::Input(input) => self.handle_input(input),
            LobbyCommand::Disconnect { connection_id } => {
                self.connections.remove(&connection_id);
                self.lobby.disconnect(connection_id);
                info!(
                    connection_id = %connection_id,
                    connections = self.connections.len(),
                    "Client disconnected"
                );
            }
            LobbyCommand::RoomStatus { code, reply } => {
                let summary = self.lobby.room(code.trim()).map(RoomSummary::from_room);
                let _ = reply.send(summary);
            }
        }
    }

    fn handle_input(&mut self, input: ClientInput) {
        let ClientInput {
            connection_id,
            msg,
            received_at,
        } = input;
        let now = unix_millis();

        let reply = match msg {
            ClientMsg::CreateRoom { player } => Some(self.lobby.create_room(connection_id, player, now)),
            ClientMsg::JoinRoom { room_code, player } => {
                Some(self.lobby.join_room(connection_id, &room_code, player))
            }
            ClientMsg::JoinQueue { player } => Some(self.lobby.join_queue(connection_id, player, now)),
            ClientMsg::LeaveQueue => {
                self.lobby.leave_queue(connection_id);
                None
            }
            ClientMsg::PlayerReady => {
                self.lobby.player_ready(connection_id);
                None
            }
            ClientMsg::PlayerShot { reaction_time } => {
                self.lobby.player_shot(connection_id, reaction_time, received_at);
                None
            }
            ClientMsg::Ping { t } => Some(Ok(ServerMsg::Pong { t, server_time: now })),
        };

        // The reply goes out before any effect the request caused
        if let Some(reply) = reply {
            if let Err(err) = &reply {
                debug!(connection_id = %connection_id, error = %err, "Request rejected");
            }
            self.deliver(connection_id, reply.unwrap_or_else(ServerMsg::from));
        }
    }

    fn flush(&mut self) {
        for effect in self.lobby.drain_effects() {
            match effect {
                Effect::Send { to, msg } => self.deliver(to, msg),
                Effect::Schedule { id, after, timer } => self.schedule(id, after, timer),
                Effect::Cancel(id) => {
                    if let Some(handle) = self.timers.remove(&id) {
                        handle.abort();
                    }
                }
            }
        }
    }

    fn schedule(&mut self, id: TimerId, after: Duration, timer: Timer) {
        let timer_tx = self.timer_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = timer_tx.send((id, timer));
        });
        self.timers.insert(id, handle);
    }

    /// Queue a message without waiting; drops it if the client is not keeping up
    fn deliver(&self, to: Uuid, msg: ServerMsg) {
        let Some(outbound) = self.connections.get(&to) else {
            debug!(connection_id = %to, "No outbound channel, dropping message");
            return;
        };
        match outbound.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(connection_id = %to, "Outbound channel full, dropping message");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(connection_id = %to, "Outbound channel closed");
            }
        }
    }

    fn publish_stats(&self) {
        self.stats.rooms.store(self.lobby.room_count(), Ordering::Relaxed);
        self.stats.players.store(self.lobby.player_count(), Ordering::Relaxed);
        self.stats.queued.store(self.lobby.queue_len(), Ordering::Relaxed);
        self.stats
            .connections
            .store(self.connections.len(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GameConfig, MatchmakingConfig};
    use crate::ws::protocol::{PlayerData, Seat};

    fn spawn_service() -> LobbyHandle {
        let lobby = Lobby::new(GameConfig::default(), MatchmakingConfig::default(), 7);
        let (service, handle) = LobbyService::new(lobby, Duration::from_secs(1));
        tokio::spawn(service.run());
        handle
    }

    fn input(connection_id: Uuid, msg: ClientMsg) -> ClientInput {
        ClientInput {
            connection_id,
            msg,
            received_at: unix_millis(),
        }
    }

    fn player(name: &str, rating: f64) -> PlayerData {
        PlayerData {
            username: Some(name.to_string()),
            rating: Some(rating),
            character: None,
        }
    }

    async fn connect(handle: &LobbyHandle) -> (Uuid, mpsc::Receiver<ServerMsg>) {
        let id = Uuid::new_v4();
        let mut rx = handle.connect(id).await.unwrap();
        match rx.recv().await.unwrap() {
            ServerMsg::Welcome { connection_id, .. } => assert_eq!(connection_id, id),
            other => panic!("expected welcome, got {other:?}"),
        }
        (id, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn ping_is_answered_with_pong() {
        let handle = spawn_service();
        let (id, mut rx) = connect(&handle).await;

        handle.submit(input(id, ClientMsg::Ping { t: 1234 })).await.unwrap();
        match rx.recv().await.unwrap() {
            ServerMsg::Pong { t, server_time } => {
                assert_eq!(t, 1234);
                assert!(server_time > 0);
            }
            other => panic!("expected pong, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn duel_round_runs_through_timers() {
        let handle = spawn_service();
        let (host, mut host_rx) = connect(&handle).await;
        let (guest, mut guest_rx) = connect(&handle).await;

        handle
            .submit(input(host, ClientMsg::CreateRoom { player: player("Host", 1000.0) }))
            .await
            .unwrap();
        let room_code = match host_rx.recv().await.unwrap() {
            ServerMsg::RoomCreated { room_code, .. } => room_code,
            other => panic!("expected room_created, got {other:?}"),
        };

        handle
            .submit(input(
                guest,
                ClientMsg::JoinRoom {
                    room_code: room_code.clone(),
                    player: player("Guest", 1000.0),
                },
            ))
            .await
            .unwrap();
        assert!(matches!(guest_rx.recv().await.unwrap(), ServerMsg::RoomJoined { seat: Seat::Two, .. }));
        assert!(matches!(host_rx.recv().await.unwrap(), ServerMsg::PlayerJoined { .. }));

        handle.submit(input(host, ClientMsg::PlayerReady)).await.unwrap();
        handle.submit(input(guest, ClientMsg::PlayerReady)).await.unwrap();
        for rx in [&mut host_rx, &mut guest_rx] {
            assert!(matches!(rx.recv().await.unwrap(), ServerMsg::RoundStart { round: 1, .. }));
        }

        // Paused clock auto-advances to the cue
        for rx in [&mut host_rx, &mut guest_rx] {
            assert!(matches!(rx.recv().await.unwrap(), ServerMsg::CueTrigger { .. }));
        }

        handle
            .submit(input(guest, ClientMsg::PlayerShot { reaction_time: 60.0 }))
            .await
            .unwrap();
        for rx in [&mut host_rx, &mut guest_rx] {
            match rx.recv().await.unwrap() {
                ServerMsg::RoundEnd { winner, early_fire, .. } => {
                    assert_eq!(winner, Seat::Two);
                    assert!(!early_fire);
                }
                other => panic!("expected round_end, got {other:?}"),
            }
        }

        // The next round follows on its own
        assert!(matches!(host_rx.recv().await.unwrap(), ServerMsg::RoundStart { round: 2, .. }));
        let status = handle.room_status(&room_code).await.unwrap().unwrap();
        assert_eq!(status.round, 2);
        assert_eq!(status.phase, RoomPhase::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_notifies_opponent_and_updates_stats() {
        let handle = spawn_service();
        let (host, mut host_rx) = connect(&handle).await;
        let (guest, mut guest_rx) = connect(&handle).await;

        handle
            .submit(input(host, ClientMsg::CreateRoom { player: PlayerData::default() }))
            .await
            .unwrap();
        let room_code = match host_rx.recv().await.unwrap() {
            ServerMsg::RoomCreated { room_code, .. } => room_code,
            other => panic!("expected room_created, got {other:?}"),
        };
        handle
            .submit(input(
                guest,
                ClientMsg::JoinRoom {
                    room_code: room_code.clone(),
                    player: PlayerData::default(),
                },
            ))
            .await
            .unwrap();
        guest_rx.recv().await.unwrap();

        // Round-trip through the task so the stats are current
        handle.room_status(&room_code).await.unwrap();
        assert_eq!(handle.stats().rooms(), 1);
        assert_eq!(handle.stats().players(), 2);
        assert_eq!(handle.stats().connections(), 2);

        handle.disconnect(guest).await.unwrap();
        assert!(matches!(host_rx.recv().await.unwrap(), ServerMsg::PlayerJoined { .. }));
        assert_eq!(host_rx.recv().await.unwrap(), ServerMsg::PlayerDisconnected);

        assert!(handle.room_status(&room_code).await.unwrap().is_none());
        assert_eq!(handle.stats().rooms(), 0);
        assert_eq!(handle.stats().players(), 0);
        assert_eq!(handle.stats().connections(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn queue_pairs_and_auto_readies() {
        let handle = spawn_service();
        let (a, mut a_rx) = connect(&handle).await;
        let (b, mut b_rx) = connect(&handle).await;

        handle
            .submit(input(a, ClientMsg::JoinQueue { player: player("A", 1000.0) }))
            .await
            .unwrap();
        assert_eq!(a_rx.recv().await.unwrap(), ServerMsg::QueueJoined { success: true });

        handle
            .submit(input(b, ClientMsg::JoinQueue { player: player("B", 1050.0) }))
            .await
            .unwrap();
        assert_eq!(b_rx.recv().await.unwrap(), ServerMsg::QueueJoined { success: true });

        match a_rx.recv().await.unwrap() {
            ServerMsg::MatchFound { seat, opponent_rating, .. } => {
                assert_eq!(seat, Seat::One);
                assert_eq!(opponent_rating, 1050);
            }
            other => panic!("expected match_found, got {other:?}"),
        }
        assert!(matches!(b_rx.recv().await.unwrap(), ServerMsg::MatchFound { seat: Seat::Two, .. }));

        // Nobody sends player_ready; the auto-ready timer starts the match
        assert!(matches!(a_rx.recv().await.unwrap(), ServerMsg::RoundStart { round: 1, .. }));
        assert!(matches!(b_rx.recv().await.unwrap(), ServerMsg::RoundStart { round: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_request_gets_error_reply() {
        let handle = spawn_service();
        let (id, mut rx) = connect(&handle).await;

        handle
            .submit(input(
                id,
                ClientMsg::JoinRoom {
                    room_code: "123456".into(),
                    player: PlayerData::default(),
                },
            ))
            .await
            .unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            ServerMsg::Error {
                code: "room_not_found".into(),
                message: "room not found".into(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn full_outbound_channel_does_not_block_lobby() {
        let handle = spawn_service();
        let id = Uuid::new_v4();
        let (outbound, mut rx) = mpsc::channel(1);
        handle
            .send(LobbyCommand::Connect {
                connection_id: id,
                outbound,
            })
            .await
            .unwrap();

        for t in 0..5 {
            handle.submit(input(id, ClientMsg::Ping { t })).await.unwrap();
        }
        // Still responsive
        assert!(handle.room_status("000000").await.unwrap().is_none());

        assert!(matches!(rx.recv().await.unwrap(), ServerMsg::Welcome { .. }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn handle_reports_closed_service() {
        let lobby = Lobby::new(GameConfig::default(), MatchmakingConfig::default(), 1);
        let (service, handle) = LobbyService::new(lobby, Duration::from_secs(1));
        drop(service);
        assert_eq!(handle.connect(Uuid::new_v4()).await.unwrap_err(), LobbyClosed);
        assert_eq!(handle.room_status("123456").await.unwrap_err(), LobbyClosed);
    }
}
