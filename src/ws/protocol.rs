//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A player's role within a room, used for scoring and addressing.
/// Serialized as the bare number 1 or 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Seat {
    One,
    Two,
}

impl Seat {
    pub fn opponent(self) -> Self {
        match self {
            Seat::One => Seat::Two,
            Seat::Two => Seat::One,
        }
    }
}

impl From<Seat> for u8 {
    fn from(seat: Seat) -> Self {
        match seat {
            Seat::One => 1,
            Seat::Two => 2,
        }
    }
}

impl TryFrom<u8> for Seat {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Seat::One),
            2 => Ok(Seat::Two),
            other => Err(format!("invalid seat {other}")),
        }
    }
}

/// Player data as supplied by the client. Every field is optional and
/// sanitized into a `PlayerProfile` before the lobby uses it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerData {
    #[serde(default)]
    pub username: Option<String>,
    /// Skill rating as known to the client's profile store
    #[serde(default, alias = "elo")]
    pub rating: Option<f64>,
    /// Cosmetic character configuration, forwarded untouched
    #[serde(default)]
    pub character: Option<serde_json::Value>,
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Open a new room and take seat 1
    CreateRoom {
        #[serde(default)]
        player: PlayerData,
    },

    /// Take seat 2 in an existing room
    JoinRoom {
        room_code: String,
        #[serde(default)]
        player: PlayerData,
    },

    /// Mark self ready; the first round starts once both seats are ready
    PlayerReady,

    /// Report a reaction time in milliseconds
    PlayerShot { reaction_time: f64 },

    /// Enter the matchmaking queue
    JoinQueue {
        #[serde(default)]
        player: PlayerData,
    },

    /// Leave the matchmaking queue
    LeaveQueue,

    /// Ping for latency and clock offset measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        connection_id: Uuid,
        server_time: u64,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
        server_time: u64,
    },

    /// Reply to `create_room`
    RoomCreated { room_code: String, seat: Seat },

    /// Reply to `join_room`
    RoomJoined {
        room_code: String,
        seat: Seat,
        opponent: PlayerInfo,
    },

    /// Reply to `join_queue`
    QueueJoined { success: bool },

    /// Request rejected. Only ever sent to the requester.
    Error { code: String, message: String },

    /// Sent to the host when the second seat is taken
    PlayerJoined { seat: Seat, player: PlayerInfo },

    /// Sent to each matched player when the queue pairs them
    MatchFound {
        room_code: String,
        seat: Seat,
        opponent: PlayerInfo,
        opponent_rating: u32,
    },

    /// A round has begun; the cue follows after a random delay
    RoundStart { round: u32, map_index: u32 },

    /// Players may now fire
    CueTrigger { server_time: u64 },

    /// A round has been decided
    RoundEnd {
        winner: Seat,
        /// Winning reaction time in ms, 0 on an early fire
        reaction_time: f64,
        early_fire: bool,
        scores: Scores,
    },

    /// The match is over
    GameEnd {
        /// `None` on a draw
        winner: Option<Seat>,
        draw: bool,
        scores: Scores,
        results: Vec<RoundRecord>,
    },

    /// The opponent left; the room is gone
    PlayerDisconnected,
}

/// Public view of a player, shown to the opponent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub username: String,
    pub rating: u32,
    pub character: serde_json::Value,
}

/// Running score per seat
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scores {
    pub player1: u32,
    pub player2: u32,
}

/// Outcome of one completed round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round: u32,
    pub winner: Seat,
    /// Winning reaction time in ms, 0 on an early fire
    pub time: f64,
    #[serde(default)]
    pub early_fire: bool,
}
