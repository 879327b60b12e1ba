//! Reaction time plausibility check
//!
//! A client measures its own reaction time and reports it. The server only
//! knows when it issued the cue, so a claim is accepted when it lies inside
//! the human range and does not exceed the time that has actually passed on
//! the server since the cue, plus a small allowance for clock and network skew.

use crate::config::ReactionLimits;

/// Result of judging one reported reaction time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    /// Below the human reflex floor
    TooFast,
    /// Above the staleness ceiling
    TooSlow,
    /// Claims more time than has elapsed since the cue
    AheadOfClock,
}

impl Verdict {
    pub fn is_accepted(self) -> bool {
        self == Verdict::Accepted
    }
}

/// Judge `reaction_ms` against a cue issued at `cue_time` (unix ms), as seen at `now`.
pub fn judge_reaction(reaction_ms: f64, cue_time: u64, now: u64, limits: &ReactionLimits) -> Verdict {
    let elapsed = now.saturating_sub(cue_time) as f64;

    if reaction_ms < limits.min_ms {
        Verdict::TooFast
    } else if reaction_ms > limits.max_ms {
        Verdict::TooSlow
    } else if reaction_ms > elapsed + limits.slack_ms {
        Verdict::AheadOfClock
    } else {
        Verdict::Accepted
    }
}
