//! Matchmaking queue implementation

use std::collections::VecDeque;
use uuid::Uuid;

use crate::game::PlayerProfile;
use crate::util::time::secs_between;

use super::window::{OldestFirstWindow, PairingStrategy};

/// Player in the matchmaking queue
#[derive(Debug, Clone)]
pub struct QueuedPlayer {
    pub connection_id: Uuid,
    pub profile: PlayerProfile,
    /// Enqueue time (unix ms)
    pub queued_at: u64,
}

impl QueuedPlayer {
    pub fn new(connection_id: Uuid, profile: PlayerProfile, queued_at: u64) -> Self {
        Self {
            connection_id,
            profile,
            queued_at,
        }
    }

    /// How long this player has been waiting, in seconds
    pub fn wait_secs(&self, now: u64) -> f64 {
        secs_between(self.queued_at, now)
    }
}

/// Queue errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("already in queue")]
    AlreadyQueued,
}

/// The matchmaking queue
pub struct MatchmakingQueue {
    queue: VecDeque<QueuedPlayer>,
    strategy: Box<dyn PairingStrategy>,
}

impl MatchmakingQueue {
    pub fn new(strategy: Box<dyn PairingStrategy>) -> Self {
        Self {
            queue: VecDeque::new(),
            strategy,
        }
    }

    /// Add a player to the queue. A connection may only be queued once.
    pub fn enqueue(&mut self, player: QueuedPlayer) -> Result<(), QueueError> {
        if self.contains(&player.connection_id) {
            return Err(QueueError::AlreadyQueued);
        }
        self.queue.push_back(player);
        Ok(())
    }

    /// Remove a player from the queue; no-op when absent
    pub fn dequeue(&mut self, connection_id: Uuid) -> Option<QueuedPlayer> {
        if let Some(pos) = self.queue.iter().position(|p| p.connection_id == connection_id) {
            self.queue.remove(pos)
        } else {
            None
        }
    }

    /// Check if a player is in the queue
    pub fn contains(&self, connection_id: &Uuid) -> bool {
        self.queue.iter().any(|p| &p.connection_id == connection_id)
    }

    /// Get queue length
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if queue is empty
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Try to pair two queued players.
    /// Returns `(earlier, later)` by enqueue time, both removed from the queue.
    pub fn try_pair(&mut self, now: u64) -> Option<(QueuedPlayer, QueuedPlayer)> {
        if self.queue.len() < 2 {
            return None;
        }

        // Stable sort keeps arrival order among equal timestamps
        let entries = self.queue.make_contiguous();
        entries.sort_by_key(|p| p.queued_at);

        let (i, j) = self.strategy.find_pair(entries, now)?;
        if i >= j || j >= self.queue.len() {
            return None;
        }

        // Remove the later index first so the earlier one stays valid
        let later = self.queue.remove(j)?;
        let earlier = self.queue.remove(i)?;
        Some((earlier, later))
    }
}

impl Default for MatchmakingQueue {
    fn default() -> Self {
        Self::new(Box::new(OldestFirstWindow::default()))
    }
}
