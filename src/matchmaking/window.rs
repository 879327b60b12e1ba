//! Pairing rules for the matchmaking queue

use crate::config::MatchmakingConfig;
use crate::util::time::secs_between;

use super::queue::QueuedPlayer;

/// Chooses which two queued players to pair.
///
/// `entries` is ordered oldest first. Implementations return indices `(i, j)`
/// with `i < j`, or `None` when no pair is acceptable yet.
pub trait PairingStrategy: Send {
    fn find_pair(&self, entries: &[QueuedPlayer], now: u64) -> Option<(usize, usize)>;
}

/// Scan oldest to newest and take the first pair whose rating gap fits a
/// window that widens with the pair's average wait.
///
/// The first acceptable pair wins even when a closer-rated pair exists
/// further down the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OldestFirstWindow {
    pub base: u32,
    pub step_secs: u32,
    pub step_increment: u32,
}

impl OldestFirstWindow {
    pub fn from_config(config: &MatchmakingConfig) -> Self {
        Self {
            base: config.window_base,
            step_secs: config.window_step_secs,
            step_increment: config.window_step_increment,
        }
    }

    /// Allowed rating gap after `avg_wait_secs` of average waiting
    pub fn window(&self, avg_wait_secs: f64) -> u32 {
        let steps = (avg_wait_secs / self.step_secs.max(1) as f64).floor().max(0.0) as u32;
        self.base
            .saturating_add(steps.saturating_mul(self.step_increment))
    }

    fn accepts(&self, a: &QueuedPlayer, b: &QueuedPlayer, now: u64) -> bool {
        let avg_wait = (secs_between(a.queued_at, now) + secs_between(b.queued_at, now)) / 2.0;
        a.profile.rating.abs_diff(b.profile.rating) <= self.window(avg_wait)
    }
}

impl Default for OldestFirstWindow {
    fn default() -> Self {
        Self::from_config(&MatchmakingConfig::default())
    }
}

impl PairingStrategy for OldestFirstWindow {
    fn find_pair(&self, entries: &[QueuedPlayer], now: u64) -> Option<(usize, usize)> {
        for (i, first) in entries.iter().enumerate() {
            for (offset, second) in entries[i + 1..].iter().enumerate() {
                if self.accepts(first, second, now) {
                    return Some((i, i + 1 + offset));
                }
            }
        }
        None
    }
}
