//! Per-match room state machine

use serde::Serialize;
use uuid::Uuid;

use crate::config::GameConfig;
use crate::ws::protocol::{RoundRecord, Scores, Seat};

use super::anticheat::{judge_reaction, Verdict};
use super::player::{PlayerProfile, RoomMember};

/// Identifies one scheduled timer so it can be cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Why a player could not take a seat
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("room full")]
    RoomFull,

    #[error("game in progress")]
    GameInProgress,
}

/// Room lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomPhase {
    /// Seats filling or players not yet ready
    Waiting,
    /// Rounds in progress (including the pause between rounds)
    Playing,
    /// All rounds done; no further gameplay events are accepted
    Finished,
}

/// Why a shot did not decide the round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotRejection {
    NotPlaying,
    NotMember,
    RoundDecided,
    /// NaN, infinite, or negative
    Malformed,
    CueNotIssued,
    NoOpponent,
    Implausible(Verdict),
}

/// Result of applying a shot to a room
#[derive(Debug, Clone, PartialEq)]
pub enum ShotOutcome {
    Rejected(ShotRejection),
    RoundWon {
        record: RoundRecord,
        scores: Scores,
        /// The room moved to `Finished` with this round
        match_over: bool,
    },
}

/// One two-player match
#[derive(Debug, Clone)]
pub struct Room {
    pub code: String,
    /// Distinguishes this room from a later room reusing the same code
    pub instance: Uuid,
    pub phase: RoomPhase,
    /// Current round, 0 before the first round starts
    pub round: u32,
    pub max_rounds: u32,
    pub round_winner: Option<Seat>,
    pub members: Vec<RoomMember>,
    pub results: Vec<RoundRecord>,
    /// When the current round's cue was issued (unix ms)
    pub cue_time: Option<u64>,
    /// Scheduled cue trigger for the current round, if not yet fired
    pub pending_cue: Option<TimerId>,
    pub created_at: u64,
}

impl Room {
    pub fn new(code: String, host_id: Uuid, host: PlayerProfile, max_rounds: u32, now: u64) -> Self {
        Self {
            code,
            instance: Uuid::new_v4(),
            phase: RoomPhase::Waiting,
            round: 0,
            max_rounds,
            round_winner: None,
            members: vec![RoomMember::new(host_id, Seat::One, host)],
            results: Vec::new(),
            cue_time: None,
            pending_cue: None,
            created_at: now,
        }
    }

    /// Check whether a second player could take a seat
    pub fn check_joinable(&self) -> Result<(), JoinError> {
        if self.members.len() >= 2 {
            return Err(JoinError::RoomFull);
        }
        if self.phase != RoomPhase::Waiting {
            return Err(JoinError::GameInProgress);
        }
        Ok(())
    }

    /// Seat a new player in the free seat
    pub fn seat_player(&mut self, connection_id: Uuid, profile: PlayerProfile) -> Result<Seat, JoinError> {
        self.check_joinable()?;
        let seat = match self.members.first() {
            Some(existing) => existing.seat.opponent(),
            None => Seat::One,
        };
        self.members.push(RoomMember::new(connection_id, seat, profile));
        Ok(seat)
    }

    pub fn member(&self, connection_id: Uuid) -> Option<&RoomMember> {
        self.members.iter().find(|m| m.connection_id == connection_id)
    }

    pub fn member_by_seat(&self, seat: Seat) -> Option<&RoomMember> {
        self.members.iter().find(|m| m.seat == seat)
    }

    pub fn opponent_of(&self, connection_id: Uuid) -> Option<&RoomMember> {
        self.members.iter().find(|m| m.connection_id != connection_id)
    }

    pub fn connection_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.members.iter().map(|m| m.connection_id)
    }

    /// Flag a member ready. Returns true when the first round should start.
    pub fn mark_ready(&mut self, connection_id: Uuid) -> bool {
        if let Some(member) = self.members.iter_mut().find(|m| m.connection_id == connection_id) {
            member.ready = true;
        }
        self.ready_to_start()
    }

    /// Flag every member ready. Returns true when the first round should start.
    pub fn mark_all_ready(&mut self) -> bool {
        for member in &mut self.members {
            member.ready = true;
        }
        self.ready_to_start()
    }

    fn ready_to_start(&self) -> bool {
        self.phase == RoomPhase::Waiting
            && self.members.len() == 2
            && self.members.iter().all(|m| m.ready)
    }

    /// Advance to the next round. Returns the new round number, or `None`
    /// when the match is finished or the round limit is reached.
    pub fn begin_round(&mut self) -> Option<u32> {
        if self.phase == RoomPhase::Finished || self.round >= self.max_rounds {
            return None;
        }
        self.round += 1;
        self.phase = RoomPhase::Playing;
        self.round_winner = None;
        self.cue_time = None;
        self.pending_cue = None;
        Some(self.round)
    }

    /// True while a round is running and undecided
    pub fn round_is_live(&self) -> bool {
        self.phase == RoomPhase::Playing && self.round_winner.is_none()
    }

    pub fn arm_cue(&mut self, now: u64) {
        self.cue_time = Some(now);
        self.pending_cue = None;
    }

    /// Apply a reported reaction time from `connection_id`.
    ///
    /// The round winner is set in the same call that accepts a shot, so any
    /// later shot in the round sees `RoundDecided`.
    pub fn resolve_shot(
        &mut self,
        connection_id: Uuid,
        reaction_ms: f64,
        now: u64,
        config: &GameConfig,
    ) -> ShotOutcome {
        if self.phase != RoomPhase::Playing {
            return ShotOutcome::Rejected(ShotRejection::NotPlaying);
        }
        if self.round_winner.is_some() {
            return ShotOutcome::Rejected(ShotRejection::RoundDecided);
        }
        let Some(shooter) = self.member(connection_id) else {
            return ShotOutcome::Rejected(ShotRejection::NotMember);
        };
        if !reaction_ms.is_finite() || reaction_ms < 0.0 {
            return ShotOutcome::Rejected(ShotRejection::Malformed);
        }

        if reaction_ms >= config.early_fire_sentinel {
            let Some(opponent) = self.opponent_of(connection_id) else {
                return ShotOutcome::Rejected(ShotRejection::NoOpponent);
            };
            let winner = opponent.seat;
            return self.record_win(winner, 0.0, true);
        }

        let Some(cue_time) = self.cue_time else {
            return ShotOutcome::Rejected(ShotRejection::CueNotIssued);
        };
        let verdict = judge_reaction(reaction_ms, cue_time, now, &config.reaction);
        if !verdict.is_accepted() {
            return ShotOutcome::Rejected(ShotRejection::Implausible(verdict));
        }

        let winner = shooter.seat;
        self.record_win(winner, reaction_ms, false)
    }

    fn record_win(&mut self, winner: Seat, time: f64, early_fire: bool) -> ShotOutcome {
        self.round_winner = Some(winner);
        if let Some(member) = self.members.iter_mut().find(|m| m.seat == winner) {
            member.score += 1;
        }

        let record = RoundRecord {
            round: self.round,
            winner,
            time,
            early_fire,
        };
        self.results.push(record.clone());

        let match_over = self.round >= self.max_rounds;
        if match_over {
            self.phase = RoomPhase::Finished;
        }

        ShotOutcome::RoundWon {
            record,
            scores: self.scores(),
            match_over,
        }
    }

    pub fn scores(&self) -> Scores {
        let score_of = |seat| self.member_by_seat(seat).map(|m| m.score).unwrap_or(0);
        Scores {
            player1: score_of(Seat::One),
            player2: score_of(Seat::Two),
        }
    }

    /// Match winner by score, `None` on a draw
    pub fn final_winner(&self) -> Option<Seat> {
        let scores = self.scores();
        match scores.player1.cmp(&scores.player2) {
            std::cmp::Ordering::Greater => Some(Seat::One),
            std::cmp::Ordering::Less => Some(Seat::Two),
            std::cmp::Ordering::Equal => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GameConfig {
        GameConfig::default()
    }

    fn two_player_room() -> (Room, Uuid, Uuid) {
        let host = Uuid::new_v4();
        let guest = Uuid::new_v4();
        let mut room = Room::new("123456".into(), host, PlayerProfile::new("Host", 1000), 5, 0);
        room.seat_player(guest, PlayerProfile::new("Guest", 1000)).unwrap();
        (room, host, guest)
    }

    #[test]
    fn second_player_takes_seat_two() {
        let (room, host, guest) = two_player_room();
        assert_eq!(room.member(host).unwrap().seat, Seat::One);
        assert_eq!(room.member(guest).unwrap().seat, Seat::Two);
    }

    #[test]
    fn third_player_is_refused() {
        let (mut room, _, _) = two_player_room();
        let err = room
            .seat_player(Uuid::new_v4(), PlayerProfile::new("Late", 1000))
            .unwrap_err();
        assert_eq!(err, JoinError::RoomFull);
        assert_eq!(room.members.len(), 2);
    }

    #[test]
    fn join_refused_once_playing() {
        let host = Uuid::new_v4();
        let mut room = Room::new("123456".into(), host, PlayerProfile::new("Host", 1000), 5, 0);
        room.begin_round();
        assert_eq!(room.check_joinable(), Err(JoinError::GameInProgress));
    }

    #[test]
    fn start_needs_both_ready() {
        let (mut room, host, guest) = two_player_room();
        assert!(!room.mark_ready(host));
        assert!(room.mark_ready(guest));
        room.begin_round();
        // Ready again mid-match does not restart anything
        assert!(!room.mark_ready(host));
    }

    #[test]
    fn single_member_never_starts() {
        let host = Uuid::new_v4();
        let mut room = Room::new("123456".into(), host, PlayerProfile::new("Host", 1000), 5, 0);
        assert!(!room.mark_ready(host));
        assert!(!room.mark_all_ready());
    }

    #[test]
    fn shot_before_cue_is_rejected() {
        let (mut room, host, _) = two_player_room();
        room.begin_round();
        let outcome = room.resolve_shot(host, 200.0, 1_000, &config());
        assert_eq!(outcome, ShotOutcome::Rejected(ShotRejection::CueNotIssued));
        assert!(room.round_is_live());
    }

    #[test]
    fn first_valid_shot_wins_and_later_shots_drop() {
        let (mut room, host, guest) = two_player_room();
        room.begin_round();
        room.arm_cue(10_000);

        let outcome = room.resolve_shot(guest, 220.0, 10_250, &config());
        match outcome {
            ShotOutcome::RoundWon { record, scores, match_over } => {
                assert_eq!(record.winner, Seat::Two);
                assert_eq!(record.time, 220.0);
                assert!(!record.early_fire);
                assert_eq!(scores, Scores { player1: 0, player2: 1 });
                assert!(!match_over);
            }
            other => panic!("expected a win, got {other:?}"),
        }

        let late = room.resolve_shot(host, 230.0, 10_260, &config());
        assert_eq!(late, ShotOutcome::Rejected(ShotRejection::RoundDecided));
        assert_eq!(room.results.len(), 1);
    }

    #[test]
    fn implausible_shot_changes_nothing() {
        let (mut room, host, _) = two_player_room();
        room.begin_round();
        room.arm_cue(10_000);

        let outcome = room.resolve_shot(host, 20.0, 10_300, &config());
        assert_eq!(
            outcome,
            ShotOutcome::Rejected(ShotRejection::Implausible(Verdict::TooFast))
        );
        assert!(room.round_winner.is_none());
        assert_eq!(room.scores(), Scores::default());
    }

    #[test]
    fn malformed_reaction_rejected() {
        let (mut room, host, _) = two_player_room();
        room.begin_round();
        room.arm_cue(10_000);
        for bad in [f64::NAN, f64::INFINITY, -5.0] {
            assert_eq!(
                room.resolve_shot(host, bad, 10_300, &config()),
                ShotOutcome::Rejected(ShotRejection::Malformed)
            );
        }
    }

    #[test]
    fn early_fire_awards_opponent() {
        let (mut room, host, _) = two_player_room();
        room.begin_round();

        let outcome = room.resolve_shot(host, 99_999.0, 500, &config());
        match outcome {
            ShotOutcome::RoundWon { record, scores, .. } => {
                assert_eq!(record.winner, Seat::Two);
                assert_eq!(record.time, 0.0);
                assert!(record.early_fire);
                assert_eq!(scores.player1, 0);
                assert_eq!(scores.player2, 1);
            }
            other => panic!("expected early fire win, got {other:?}"),
        }
    }

    #[test]
    fn finishes_exactly_on_last_round() {
        let (mut room, host, _) = two_player_room();
        for expected in 1..=5 {
            assert_eq!(room.begin_round(), Some(expected));
            room.arm_cue(expected as u64 * 10_000);
            let outcome = room.resolve_shot(host, 200.0, expected as u64 * 10_000 + 250, &config());
            let ShotOutcome::RoundWon { match_over, .. } = outcome else {
                panic!("round {expected} not won");
            };
            assert_eq!(match_over, expected == 5);
        }
        assert_eq!(room.phase, RoomPhase::Finished);
        assert_eq!(room.begin_round(), None);
        assert_eq!(room.round, 5);
        assert_eq!(room.final_winner(), Some(Seat::One));
        assert_eq!(
            room.resolve_shot(host, 200.0, 60_000, &config()),
            ShotOutcome::Rejected(ShotRejection::NotPlaying)
        );
    }

    #[test]
    fn equal_scores_are_a_draw() {
        let (mut room, host, guest) = two_player_room();
        room.members.iter_mut().for_each(|m| m.score = 2);
        assert_eq!(room.final_winner(), None);
        assert!(room.member(host).is_some() && room.member(guest).is_some());
    }
}
