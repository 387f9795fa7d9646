//! Lobby entity and roster/leadership rules
//!
//! A lobby holds both team rosters while a battle is forming. The first
//! player to join a side becomes that side's leader; leadership transfers
//! to the next-joined member when the leader leaves. All mutation goes
//! through the methods here so the capacity and leadership invariants hold.

use crate::error::{BattleError, Result};
use crate::types::{BattleFormat, LobbyId, LobbyState, StreamId, TeamSide, UserId};
use crate::utils::{current_timestamp, generate_lobby_id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a player leaving a lobby
#[derive(Debug, Clone)]
pub struct Departure {
    pub side: TeamSide,
    /// Set when leadership transferred to the next-joined member
    pub new_leader: Option<UserId>,
    /// The leaver emptied their side, dissolving the lobby
    pub dissolved: bool,
}

/// A pre-match container holding up to two teams of players
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lobby {
    pub id: LobbyId,
    pub format: BattleFormat,
    pub state: LobbyState,
    pub is_private: bool,
    /// Join order is preserved; it drives leadership succession
    pub team_a_players: Vec<UserId>,
    pub team_b_players: Vec<UserId>,
    pub team_a_leader_id: Option<UserId>,
    pub team_b_leader_id: Option<UserId>,
    /// Set when the lobby was spawned from an existing solo stream, so
    /// ending the battle can resume that stream
    pub return_to_solo_stream: bool,
    pub original_stream_id: Option<StreamId>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Lobby {
    /// Create a lobby with the creator seated as team A leader
    pub fn new(
        creator_id: UserId,
        format: BattleFormat,
        is_private: bool,
        original_stream_id: Option<StreamId>,
    ) -> Self {
        let now = current_timestamp();
        Self {
            id: generate_lobby_id(),
            format,
            state: LobbyState::Open,
            is_private,
            team_a_players: vec![creator_id.clone()],
            team_b_players: Vec::new(),
            team_a_leader_id: Some(creator_id),
            team_b_leader_id: None,
            return_to_solo_stream: original_stream_id.is_some(),
            original_stream_id,
            created_at: now,
            last_activity: now,
        }
    }

    /// Create a lobby pre-seeded with full rosters, bypassing open join.
    /// Used when a rematch respawns the previous match's teams.
    pub fn seeded(
        format: BattleFormat,
        team_a_players: Vec<UserId>,
        team_a_leader_id: Option<UserId>,
        team_b_players: Vec<UserId>,
        team_b_leader_id: Option<UserId>,
        original_stream_id: Option<StreamId>,
    ) -> Self {
        let now = current_timestamp();
        Self {
            id: generate_lobby_id(),
            format,
            state: LobbyState::Open,
            is_private: true,
            team_a_players,
            team_b_players,
            team_a_leader_id,
            team_b_leader_id,
            return_to_solo_stream: original_stream_id.is_some(),
            original_stream_id,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn roster(&self, side: TeamSide) -> &[UserId] {
        match side {
            TeamSide::TeamA => &self.team_a_players,
            TeamSide::TeamB => &self.team_b_players,
        }
    }

    pub fn leader(&self, side: TeamSide) -> Option<&UserId> {
        match side {
            TeamSide::TeamA => self.team_a_leader_id.as_ref(),
            TeamSide::TeamB => self.team_b_leader_id.as_ref(),
        }
    }

    /// Which side a user sits on, if any
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

    /// All members across both sides
    pub fn members(&self) -> Vec<UserId> {
        self.team_a_players
            .iter()
            .chain(self.team_b_players.iter())
            .cloned()
            .collect()
    }

    pub fn side_full(&self, side: TeamSide) -> bool {
        self.roster(side).len() >= self.format.per_side()
    }

    /// Team A staffed, team B untouched: eligible for FIFO pairing with a
    /// counterpart lobby of the same format. Private lobbies never enter
    /// the open pairing pool.
    pub fn awaiting_counterpart(&self) -> bool {
        self.state == LobbyState::Open
            && !self.is_private
            && self.side_full(TeamSide::TeamA)
            && self.team_b_players.is_empty()
    }

    /// Both sides staffed inside this one lobby (direct-challenge flow):
    /// promotable into a match without a counterpart.
    pub fn ready_for_direct_promotion(&self) -> bool {
        self.state == LobbyState::Open
            && self.side_full(TeamSide::TeamA)
            && self.side_full(TeamSide::TeamB)
    }

    fn touch(&mut self) {
        self.last_activity = current_timestamp();
    }

    /// Seat a user, honoring the preferred side when it has capacity and
    /// falling back to the other side otherwise.
    ///
    /// The first joiner of a previously empty side becomes its leader.
    /// Cross-lobby double-booking is enforced by the store, not here.
    pub fn admit(&mut self, user_id: UserId, preferred: Option<TeamSide>) -> Result<TeamSide> {
        if self.state != LobbyState::Open {
            return Err(BattleError::InvalidRequest {
                reason: format!("lobby {} is no longer open", self.id),
            }
            .into());
        }

        if self.contains(&user_id) {
            return Err(BattleError::AlreadyInLobby {
                user_id,
                lobby_id: self.id.to_string(),
            }
            .into());
        }

        let first_choice = preferred.unwrap_or(TeamSide::TeamA);
        let side = if !self.side_full(first_choice) {
            first_choice
        } else if !self.side_full(first_choice.opposite()) {
            first_choice.opposite()
        } else {
            return Err(BattleError::LobbyFull {
                lobby_id: self.id.to_string(),
            }
            .into());
        };

        let roster = match side {
            TeamSide::TeamA => &mut self.team_a_players,
            TeamSide::TeamB => &mut self.team_b_players,
        };
        let becomes_leader = roster.is_empty();
        roster.push(user_id.clone());

        if becomes_leader {
            match side {
                TeamSide::TeamA => self.team_a_leader_id = Some(user_id),
                TeamSide::TeamB => self.team_b_leader_id = Some(user_id),
            }
        }

        self.touch();
        Ok(side)
    }

    /// Remove a user from the lobby before pairing.
    ///
    /// Leadership transfers to the next-joined remaining member of the
    /// side; if the side becomes empty the lobby dissolves.
    pub fn depart(&mut self, user_id: &str) -> Result<Departure> {
        if self.state != LobbyState::Open {
            return Err(BattleError::Conflict {
                message: format!("lobby {} is already paired", self.id),
            }
            .into());
        }

        let side = self
            .side_of(user_id)
            .ok_or_else(|| BattleError::InvalidRequest {
                reason: format!("user {} is not in lobby {}", user_id, self.id),
            })?;

        let was_leader = self.leader(side).map(|l| l == user_id).unwrap_or(false);

        let roster = match side {
            TeamSide::TeamA => &mut self.team_a_players,
            TeamSide::TeamB => &mut self.team_b_players,
        };
        roster.retain(|p| p != user_id);

        let mut departure = Departure {
            side,
            new_leader: None,
            dissolved: false,
        };

        if self.roster(side).is_empty() {
            self.state = LobbyState::Dissolved;
            self.team_a_leader_id = None;
            self.team_b_leader_id = None;
            departure.dissolved = true;
        } else if was_leader {
            let successor = self.roster(side).first().cloned();
            match side {
                TeamSide::TeamA => self.team_a_leader_id = successor.clone(),
                TeamSide::TeamB => self.team_b_leader_id = successor.clone(),
            }
            departure.new_leader = successor;
        }

        self.touch();
        Ok(departure)
    }

    /// CAS-style transition into the paired state
    pub fn mark_paired(&mut self) -> Result<()> {
        if self.state != LobbyState::Open {
            return Err(BattleError::Conflict {
                message: format!("lobby {} is not open, cannot pair", self.id),
            }
            .into());
        }
        self.state = LobbyState::Paired;
        self.touch();
        Ok(())
    }

    /// Soft-delete; the row is retained for history and rematch seeding
    pub fn archive(&mut self) {
        self.state = LobbyState::Dissolved;
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_lobby(format: BattleFormat) -> Lobby {
        Lobby::new("creator".to_string(), format, false, None)
    }

    #[test]
    fn test_creator_is_team_a_leader() {
        let lobby = open_lobby(BattleFormat::TwoVsTwo);
        assert_eq!(lobby.state, LobbyState::Open);
        assert_eq!(lobby.team_a_players, vec!["creator".to_string()]);
        assert_eq!(lobby.team_a_leader_id.as_deref(), Some("creator"));
        assert!(lobby.team_b_leader_id.is_none());
    }

    #[test]
    fn test_admit_respects_preference() {
        let mut lobby = open_lobby(BattleFormat::TwoVsTwo);

        let side = lobby
            .admit("u2".to_string(), Some(TeamSide::TeamB))
            .unwrap();
        assert_eq!(side, TeamSide::TeamB);
        // First joiner of the empty B side becomes its leader
        assert_eq!(lobby.team_b_leader_id.as_deref(), Some("u2"));
    }

    #[test]
    fn test_admit_falls_back_to_other_side() {
        let mut lobby = open_lobby(BattleFormat::OneVsOne);

        // Team A already holds the creator; a preference for A lands on B
        let side = lobby
            .admit("u2".to_string(), Some(TeamSide::TeamA))
            .unwrap();
        assert_eq!(side, TeamSide::TeamB);
    }

    #[test]
    fn test_capacity_is_bounded_per_side() {
        let mut lobby = open_lobby(BattleFormat::TwoVsTwo);

        lobby.admit("a2".to_string(), Some(TeamSide::TeamA)).unwrap();
        lobby.admit("b1".to_string(), Some(TeamSide::TeamB)).unwrap();
        lobby.admit("b2".to_string(), Some(TeamSide::TeamB)).unwrap();

        // Both sides full: fifth player is rejected outright
        let err = lobby
            .admit("late".to_string(), Some(TeamSide::TeamA))
            .unwrap_err();
        let err = err.downcast::<BattleError>().unwrap();
        assert!(matches!(err, BattleError::LobbyFull { .. }));
        assert_eq!(lobby.team_a_players.len(), 2);
        assert_eq!(lobby.team_b_players.len(), 2);
    }

    #[test]
    fn test_duplicate_member_rejected() {
        let mut lobby = open_lobby(BattleFormat::TwoVsTwo);
        let err = lobby.admit("creator".to_string(), None).unwrap_err();
        let err = err.downcast::<BattleError>().unwrap();
        assert!(matches!(err, BattleError::AlreadyInLobby { .. }));
    }

    #[test]
    fn test_leader_transfer_on_depart() {
        let mut lobby = open_lobby(BattleFormat::ThreeVsThree);
        lobby.admit("a2".to_string(), Some(TeamSide::TeamA)).unwrap();
        lobby.admit("a3".to_string(), Some(TeamSide::TeamA)).unwrap();

        let departure = lobby.depart("creator").unwrap();
        assert_eq!(departure.side, TeamSide::TeamA);
        // Leadership passes to the next-joined member
        assert_eq!(departure.new_leader.as_deref(), Some("a2"));
        assert_eq!(lobby.team_a_leader_id.as_deref(), Some("a2"));
        assert!(!departure.dissolved);
    }

    #[test]
    fn test_dissolve_when_side_empties() {
        let mut lobby = open_lobby(BattleFormat::OneVsOne);
        let departure = lobby.depart("creator").unwrap();
        assert!(departure.dissolved);
        assert_eq!(lobby.state, LobbyState::Dissolved);
    }

    #[test]
    fn test_direct_promotion_readiness() {
        let mut lobby = open_lobby(BattleFormat::OneVsOne);
        assert!(!lobby.ready_for_direct_promotion());
        assert!(lobby.awaiting_counterpart());

        lobby.admit("u2".to_string(), Some(TeamSide::TeamB)).unwrap();
        assert!(lobby.ready_for_direct_promotion());
        assert!(!lobby.awaiting_counterpart());
    }

    #[test]
    fn test_private_lobby_never_awaits_counterpart() {
        let lobby = Lobby::new(
            "creator".to_string(),
            BattleFormat::OneVsOne,
            true,
            None,
        );
        assert!(!lobby.awaiting_counterpart());
    }

    #[test]
    fn test_no_join_after_pairing() {
        let mut lobby = open_lobby(BattleFormat::OneVsOne);
        lobby.admit("u2".to_string(), Some(TeamSide::TeamB)).unwrap();
        lobby.mark_paired().unwrap();

        assert!(lobby.admit("u3".to_string(), None).is_err());
        assert!(lobby.mark_paired().is_err());
    }

    #[test]
    fn test_stream_origin_recorded() {
        let stream_id = uuid::Uuid::new_v4();
        let lobby = Lobby::new(
            "creator".to_string(),
            BattleFormat::OneVsOne,
            false,
            Some(stream_id),
        );
        assert!(lobby.return_to_solo_stream);
        assert_eq!(lobby.original_stream_id, Some(stream_id));
    }
}
