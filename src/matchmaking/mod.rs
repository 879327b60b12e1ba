//! Skill-windowed matchmaking queue

pub mod queue;
pub mod window;

pub use queue::{MatchmakingQueue, QueueError, QueuedPlayer};
pub use window::{OldestFirstWindow, PairingStrategy};
