//! Duel rules: rooms, rounds, and shot validation

pub mod anticheat;
pub mod player;
pub mod registry;
pub mod room;

pub use anticheat::{judge_reaction, Verdict};
pub use player::{PlayerProfile, RoomMember};
pub use registry::RoomRegistry;
pub use room::{JoinError, Room, RoomPhase, ShotOutcome, ShotRejection, TimerId};
