//! Match row: score accumulators and the active → completed state machine
//!
//! Scores only move while the match is `Active`, and only through
//! [`BattleMatch::accumulate`], which the store calls under its write lock
//! so concurrent gift events never lose an increment. Completion freezes
//! the accumulators and stamps the winner exactly once; rematches create a
//! new match and never touch a completed row.

use crate::error::{BattleError, Result};
use crate::lobby::instance::Lobby;
use crate::types::{
    BattleFormat, GiftEvent, LobbyId, MatchId, MatchStatus, RematchState, TeamSide, UserId, Winner,
};
use crate::utils::{current_timestamp, generate_match_id};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A paired, active competitive session between two full teams
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleMatch {
    pub id: MatchId,
    pub lobby_a_id: LobbyId,
    pub lobby_b_id: LobbyId,
    pub format: BattleFormat,
    /// Roster snapshots taken at creation
    pub team_a_players: Vec<UserId>,
    pub team_b_players: Vec<UserId>,
    /// Leaders are fixed for the match's lifetime even if lobby
    /// leadership later changes
    pub team_a_leader_id: UserId,
    pub team_b_leader_id: UserId,
    /// Weighted battle points, monotonically non-decreasing while active
    pub team_a_score: i64,
    pub team_b_score: i64,
    /// Raw gifted value in öre, tracked separately because score
    /// weighting may differ from currency value
    pub team_a_gifts_ore: i64,
    pub team_b_gifts_ore: i64,
    /// Per-recipient öre, the pro-rata basis for reward payout
    pub player_gifts_ore: HashMap<UserId, i64>,
    pub status: MatchStatus,
    /// Set exactly once, at the active → completed transition
    pub winner: Option<Winner>,
    pub rematch: RematchState,
    pub rematch_requested_at: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BattleMatch {
    /// Promote a single lobby whose both sides are staffed (direct
    /// challenge). The match references that lobby on both slots.
    pub fn from_single_lobby(lobby: &Lobby, duration: Duration) -> Result<Self> {
        let team_a_leader_id = required_leader(lobby, TeamSide::TeamA)?;
        let team_b_leader_id = required_leader(lobby, TeamSide::TeamB)?;
        Ok(Self::build(
            lobby.id,
            lobby.id,
            lobby.format,
            lobby.team_a_players.clone(),
            lobby.team_b_players.clone(),
            team_a_leader_id,
            team_b_leader_id,
            duration,
        ))
    }

    /// Promote a FIFO-paired counterpart pair: each lobby contributes its
    /// home squad, the older lobby taking the team A slot.
    pub fn from_lobby_pair(lobby_a: &Lobby, lobby_b: &Lobby, duration: Duration) -> Result<Self> {
        if lobby_a.format != lobby_b.format {
            return Err(BattleError::InvalidRequest {
                reason: format!(
                    "cannot pair {} lobby with {} lobby",
                    lobby_a.format, lobby_b.format
                ),
            }
            .into());
        }
        let team_a_leader_id = required_leader(lobby_a, TeamSide::TeamA)?;
        let team_b_leader_id = required_leader(lobby_b, TeamSide::TeamA)?;
        Ok(Self::build(
            lobby_a.id,
            lobby_b.id,
            lobby_a.format,
            lobby_a.team_a_players.clone(),
            lobby_b.team_a_players.clone(),
            team_a_leader_id,
            team_b_leader_id,
            duration,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        lobby_a_id: LobbyId,
        lobby_b_id: LobbyId,
        format: BattleFormat,
        team_a_players: Vec<UserId>,
        team_b_players: Vec<UserId>,
        team_a_leader_id: UserId,
        team_b_leader_id: UserId,
        duration: Duration,
    ) -> Self {
        let now = current_timestamp();
        Self {
            id: generate_match_id(),
            lobby_a_id,
            lobby_b_id,
            format,
            team_a_players,
            team_b_players,
            team_a_leader_id,
            team_b_leader_id,
            team_a_score: 0,
            team_b_score: 0,
            team_a_gifts_ore: 0,
            team_b_gifts_ore: 0,
            player_gifts_ore: HashMap::new(),
            status: MatchStatus::Active,
            winner: None,
            rematch: RematchState::None,
            rematch_requested_at: None,
            started_at: now,
            ends_at: now + duration,
            completed_at: None,
        }
    }

    /// Which side a participant fights on, if any
    pub fn side_of(&self, user_id: &str) -> Option<TeamSide> {
        if self.team_a_players.iter().any(|p| p == user_id) {
            Some(TeamSide::TeamA)
        } else if self.team_b_players.iter().any(|p| p == user_id) {
            Some(TeamSide::TeamB)
        } else {
            None
        }
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.side_of(user_id).is_some()
    }

    /// The side a recorded leader leads, if the user is one of the two
    pub fn leader_side(&self, user_id: &str) -> Option<TeamSide> {
        if self.team_a_leader_id == user_id {
            Some(TeamSide::TeamA)
        } else if self.team_b_leader_id == user_id {
            Some(TeamSide::TeamB)
        } else {
            None
        }
    }

    pub fn roster(&self, side: TeamSide) -> &[UserId] {
        match side {
            TeamSide::TeamA => &self.team_a_players,
            TeamSide::TeamB => &self.team_b_players,
        }
    }

    pub fn team_score(&self, side: TeamSide) -> i64 {
        match side {
            TeamSide::TeamA => self.team_a_score,
            TeamSide::TeamB => self.team_b_score,
        }
    }

    pub fn team_gifts_ore(&self, side: TeamSide) -> i64 {
        match side {
            TeamSide::TeamA => self.team_a_gifts_ore,
            TeamSide::TeamB => self.team_b_gifts_ore,
        }
    }

    /// Fold one gift event into the accumulators.
    ///
    /// Pure accumulator arithmetic: commutative and associative across
    /// events, so interleaving order never changes the totals. Event-id
    /// dedup is the store's job; this rejects only inactive matches and
    /// recipients outside the rosters.
    pub fn accumulate(&mut self, event: &GiftEvent) -> Result<TeamSide> {
        if self.status != MatchStatus::Active {
            return Err(BattleError::Conflict {
                message: format!("match {} is already completed", self.id),
            }
            .into());
        }

        let side = self
            .side_of(&event.recipient_id)
            .ok_or_else(|| BattleError::InvalidRequest {
                reason: format!(
                    "recipient {} is not a participant of match {}",
                    event.recipient_id, self.id
                ),
            })?;

        if event.score < 0 || event.value_ore < 0 {
            return Err(BattleError::InvalidRequest {
                reason: "gift score and value must be non-negative".to_string(),
            }
            .into());
        }

        match side {
            TeamSide::TeamA => {
                self.team_a_score += event.score;
                self.team_a_gifts_ore += event.value_ore;
            }
            TeamSide::TeamB => {
                self.team_b_score += event.score;
                self.team_b_gifts_ore += event.value_ore;
            }
        }
        *self
            .player_gifts_ore
            .entry(event.recipient_id.clone())
            .or_insert(0) += event.value_ore;

        Ok(side)
    }

    /// Freeze the accumulators and stamp the winner. Returns `Conflict`
    /// when the match is already completed; the store maps that to an
    /// idempotent outcome for racing end-match callers.
    pub fn complete(&mut self) -> Result<Winner> {
        if self.status != MatchStatus::Active {
            return Err(BattleError::Conflict {
                message: format!("match {} is already completed", self.id),
            }
            .into());
        }
        let winner = Winner::from_scores(self.team_a_score, self.team_b_score);
        self.status = MatchStatus::Completed;
        self.winner = Some(winner);
        self.completed_at = Some(current_timestamp());
        Ok(winner)
    }

    /// Whether the match deadline has passed
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        self.status == MatchStatus::Active && now >= self.ends_at
    }
}

fn required_leader(lobby: &Lobby, side: TeamSide) -> Result<UserId> {
    lobby
        .leader(side)
        .cloned()
        .ok_or_else(|| {
            BattleError::InternalError {
                message: format!("lobby {} has no {} leader at promotion", lobby.id, side),
            }
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_v_one_match() -> BattleMatch {
        let mut lobby = Lobby::new("u1".to_string(), BattleFormat::OneVsOne, false, None);
        lobby
            .admit("u2".to_string(), Some(TeamSide::TeamB))
            .unwrap();
        BattleMatch::from_single_lobby(&lobby, Duration::seconds(300)).unwrap()
    }

    fn gift(m: &BattleMatch, recipient: &str, ore: i64, score: i64) -> GiftEvent {
        GiftEvent {
            event_id: uuid::Uuid::new_v4(),
            match_id: m.id,
            sender_id: "viewer".to_string(),
            recipient_id: recipient.to_string(),
            value_ore: ore,
            score,
            timestamp: current_timestamp(),
        }
    }

    #[test]
    fn test_promotion_copies_leaders_and_rosters() {
        let m = one_v_one_match();
        assert_eq!(m.team_a_leader_id, "u1");
        assert_eq!(m.team_b_leader_id, "u2");
        assert_eq!(m.lobby_a_id, m.lobby_b_id);
        assert_eq!(m.status, MatchStatus::Active);
        assert!(m.winner.is_none());
    }

    #[test]
    fn test_pairing_requires_same_format() {
        let a = Lobby::new("u1".to_string(), BattleFormat::TwoVsTwo, false, None);
        let b = Lobby::new("u2".to_string(), BattleFormat::ThreeVsThree, false, None);
        assert!(BattleMatch::from_lobby_pair(&a, &b, Duration::seconds(300)).is_err());
    }

    #[test]
    fn test_accumulate_routes_to_recipient_side() {
        let mut m = one_v_one_match();

        let side = m.accumulate(&gift(&m, "u1", 1000, 10)).unwrap();
        assert_eq!(side, TeamSide::TeamA);
        let side = m.accumulate(&gift(&m, "u2", 500, 5)).unwrap();
        assert_eq!(side, TeamSide::TeamB);

        assert_eq!(m.team_a_score, 10);
        assert_eq!(m.team_b_score, 5);
        assert_eq!(m.team_a_gifts_ore, 1000);
        assert_eq!(m.team_b_gifts_ore, 500);
        assert_eq!(m.player_gifts_ore["u1"], 1000);
        assert_eq!(m.player_gifts_ore["u2"], 500);
    }

    #[test]
    fn test_accumulate_rejects_outsiders() {
        let mut m = one_v_one_match();
        assert!(m.accumulate(&gift(&m, "stranger", 100, 1)).is_err());
    }

    #[test]
    fn test_complete_stamps_winner_once() {
        let mut m = one_v_one_match();
        m.accumulate(&gift(&m, "u1", 12000, 120)).unwrap();
        m.accumulate(&gift(&m, "u2", 9500, 95)).unwrap();

        let winner = m.complete().unwrap();
        assert_eq!(winner, Winner::TeamA);
        assert_eq!(m.status, MatchStatus::Completed);
        assert_eq!(m.winner, Some(Winner::TeamA));

        // Terminal: no further completion, no further scoring
        assert!(m.complete().is_err());
        assert!(m.accumulate(&gift(&m, "u1", 100, 1)).is_err());
        assert_eq!(m.winner, Some(Winner::TeamA));
    }

    #[test]
    fn test_equal_scores_are_a_draw() {
        let mut m = one_v_one_match();
        m.accumulate(&gift(&m, "u1", 10000, 100)).unwrap();
        m.accumulate(&gift(&m, "u2", 10000, 100)).unwrap();
        assert_eq!(m.complete().unwrap(), Winner::Draw);
    }

    #[test]
    fn test_expiry() {
        let m = one_v_one_match();
        assert!(!m.expired(m.started_at));
        assert!(m.expired(m.ends_at + Duration::seconds(1)));
    }
}
