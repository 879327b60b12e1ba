//! Deferred lobby work

use uuid::Uuid;

pub use crate::game::TimerId;

/// Work to perform when a timer fires.
///
/// Room timers carry the room's instance id (and round where relevant) so a
/// timer outliving its room, or its round, does nothing when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Timer {
    /// Issue the cue for `round`
    Cue { code: String, instance: Uuid, round: u32 },
    /// Start the round after `round`
    NextRound { code: String, instance: Uuid, round: u32 },
    /// Mark both matched players ready
    AutoReady { code: String, instance: Uuid },
    /// Drop a finished room
    ReapFinished { code: String, instance: Uuid },
    /// Run another pairing pass
    Repair,
}
