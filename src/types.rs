//! Common types used throughout the battle engine
//!
//! Monetary values are carried as integer öre (1 SEK = 100 öre) so that
//! accumulation and payout-split arithmetic stay exact and deterministic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for users (broadcasters and viewers)
pub type UserId = String;

/// Unique identifier for lobbies
pub type LobbyId = Uuid;

/// Unique identifier for matches
pub type MatchId = Uuid;

/// Unique identifier for solo streams a battle may have been spawned from
pub type StreamId = Uuid;

/// Team-battle format, fixed set supported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BattleFormat {
    #[serde(rename = "1v1")]
    OneVsOne,
    #[serde(rename = "2v2")]
    TwoVsTwo,
    #[serde(rename = "3v3")]
    ThreeVsThree,
    #[serde(rename = "4v4")]
    FourVsFour,
    #[serde(rename = "5v5")]
    FiveVsFive,
}

impl BattleFormat {
    /// Number of players each side holds
    pub fn per_side(&self) -> usize {
        match self {
            BattleFormat::OneVsOne => 1,
            BattleFormat::TwoVsTwo => 2,
            BattleFormat::ThreeVsThree => 3,
            BattleFormat::FourVsFour => 4,
            BattleFormat::FiveVsFive => 5,
        }
    }

    /// All supported formats
    pub fn all() -> [BattleFormat; 5] {
        [
            BattleFormat::OneVsOne,
            BattleFormat::TwoVsTwo,
            BattleFormat::ThreeVsThree,
            BattleFormat::FourVsFour,
            BattleFormat::FiveVsFive,
        ]
    }
}

impl std::fmt::Display for BattleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            BattleFormat::OneVsOne => "1v1",
            BattleFormat::TwoVsTwo => "2v2",
            BattleFormat::ThreeVsThree => "3v3",
            BattleFormat::FourVsFour => "4v4",
            BattleFormat::FiveVsFive => "5v5",
        };
        write!(f, "{}", tag)
    }
}

impl std::str::FromStr for BattleFormat {
    type Err = crate::error::BattleError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "1v1" => Ok(BattleFormat::OneVsOne),
            "2v2" => Ok(BattleFormat::TwoVsTwo),
            "3v3" => Ok(BattleFormat::ThreeVsThree),
            "4v4" => Ok(BattleFormat::FourVsFour),
            "5v5" => Ok(BattleFormat::FiveVsFive),
            other => Err(crate::error::BattleError::InvalidFormat {
                value: other.to_string(),
            }),
        }
    }
}

/// One of the two sides of a lobby or match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamSide {
    TeamA,
    TeamB,
}

impl TeamSide {
    pub fn opposite(&self) -> TeamSide {
        match self {
            TeamSide::TeamA => TeamSide::TeamB,
            TeamSide::TeamB => TeamSide::TeamA,
        }
    }
}

impl std::fmt::Display for TeamSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TeamSide::TeamA => write!(f, "team_a"),
            TeamSide::TeamB => write!(f, "team_b"),
        }
    }
}

/// Outcome of a completed match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    TeamA,
    TeamB,
    Draw,
}

impl Winner {
    /// The single winner rule: strict greater score wins, exact equality is a
    /// draw. No secondary tiebreak (gift count, time-to-score) is applied.
    pub fn from_scores(team_a_score: i64, team_b_score: i64) -> Winner {
        match team_a_score.cmp(&team_b_score) {
            std::cmp::Ordering::Greater => Winner::TeamA,
            std::cmp::Ordering::Less => Winner::TeamB,
            std::cmp::Ordering::Equal => Winner::Draw,
        }
    }

    /// Whether a player on `side` won under this outcome
    pub fn is_winning_side(&self, side: TeamSide) -> bool {
        matches!(
            (self, side),
            (Winner::TeamA, TeamSide::TeamA) | (Winner::TeamB, TeamSide::TeamB)
        )
    }
}

impl std::fmt::Display for Winner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Winner::TeamA => write!(f, "team_a"),
            Winner::TeamB => write!(f, "team_b"),
            Winner::Draw => write!(f, "draw"),
        }
    }
}

/// Lifecycle state of a lobby
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LobbyState {
    /// Accepting joins
    Open,
    /// Promoted into an active match
    Paired,
    /// Soft-deleted; retained for history and rematch seeding
    Dissolved,
}

/// Lifecycle state of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Active,
    /// Terminal; scores are frozen and the winner is stamped
    Completed,
}

/// Two-leader rematch handshake state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RematchState {
    None,
    TeamA,
    TeamB,
    Both,
}

impl RematchState {
    pub fn requested_by(side: TeamSide) -> RematchState {
        match side {
            TeamSide::TeamA => RematchState::TeamA,
            TeamSide::TeamB => RematchState::TeamB,
        }
    }
}

/// What caused a match to end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndTrigger {
    TimerExpired,
    LeaderAction,
    Forced,
}

/// Where a participant is routed after a battle ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExitDestination {
    /// Resume the solo stream the lobby was spawned from
    SoloStream { stream_id: StreamId },
    /// Default home destination
    Home,
}

/// A qualifying gift purchase aimed at one battler in an active match.
///
/// `score` carries the weighted battle points for the gift; `value_ore` the
/// raw monetary value. The weighting happens upstream in the gift catalog,
/// so both are carried per event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiftEvent {
    /// Dedup key: retried deliveries of the same purchase reuse this id
    pub event_id: Uuid,
    pub match_id: MatchId,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub value_ore: i64,
    pub score: i64,
    pub timestamp: DateTime<Utc>,
}

/// Temporary matchmaking block, e.g. for declining an offered match.
///
/// The expiry here is authoritative; callers must not substitute a
/// hardcoded cooldown for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchmakingBlock {
    pub user_id: UserId,
    pub reason: String,
    pub blocked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Event emitted when a player joins a lobby
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerJoinedLobby {
    pub lobby_id: LobbyId,
    pub user_id: UserId,
    pub side: TeamSide,
    pub team_a_players: Vec<UserId>,
    pub team_b_players: Vec<UserId>,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when a player leaves a lobby before pairing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerLeftLobby {
    pub lobby_id: LobbyId,
    pub user_id: UserId,
    pub new_leader: Option<UserId>,
    pub dissolved: bool,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when a paired match goes live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchStarted {
    pub match_id: MatchId,
    pub lobby_a_id: LobbyId,
    pub lobby_b_id: LobbyId,
    pub format: BattleFormat,
    pub team_a_players: Vec<UserId>,
    pub team_b_players: Vec<UserId>,
    pub ends_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted after a gift has been durably accumulated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreUpdated {
    pub match_id: MatchId,
    pub side: TeamSide,
    pub team_a_score: i64,
    pub team_b_score: i64,
    pub team_a_gifts_ore: i64,
    pub team_b_gifts_ore: i64,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted once a match reaches its terminal state.
///
/// Reward rows already exist by the time this is broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCompleted {
    pub match_id: MatchId,
    pub winner: Winner,
    pub trigger: EndTrigger,
    pub team_a_score: i64,
    pub team_b_score: i64,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted after reward rows were written for a completed match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardsDistributed {
    pub match_id: MatchId,
    pub total_paid_ore: i64,
    pub participant_count: usize,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted on rematch handshake progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RematchRequested {
    pub match_id: MatchId,
    pub requested_by: UserId,
    pub state: RematchState,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when both leaders agreed and a new match was spawned
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RematchAccepted {
    pub previous_match_id: MatchId,
    pub new_match_id: MatchId,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when a pending single-sided request expired
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RematchExpired {
    pub match_id: MatchId,
    pub expired_state: RematchState,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when a participant ends the battle and is routed away
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleEnded {
    pub match_id: MatchId,
    pub ended_by: UserId,
    pub destination: ExitDestination,
    pub timestamp: DateTime<Utc>,
}

/// Union type for all broadcast events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BattleEvent {
    PlayerJoinedLobby(PlayerJoinedLobby),
    PlayerLeftLobby(PlayerLeftLobby),
    MatchStarted(MatchStarted),
    ScoreUpdated(ScoreUpdated),
    MatchCompleted(MatchCompleted),
    RewardsDistributed(RewardsDistributed),
    RematchRequested(RematchRequested),
    RematchAccepted(RematchAccepted),
    RematchExpired(RematchExpired),
    BattleEnded(BattleEnded),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_format_capacity() {
        assert_eq!(BattleFormat::OneVsOne.per_side(), 1);
        assert_eq!(BattleFormat::ThreeVsThree.per_side(), 3);
        assert_eq!(BattleFormat::FiveVsFive.per_side(), 5);
    }

    #[test]
    fn test_format_parse_roundtrip() {
        for format in BattleFormat::all() {
            let parsed = BattleFormat::from_str(&format.to_string()).unwrap();
            assert_eq!(parsed, format);
        }
        assert!(BattleFormat::from_str("6v6").is_err());
        assert!(BattleFormat::from_str("").is_err());
    }

    #[test]
    fn test_winner_from_scores() {
        assert_eq!(Winner::from_scores(120, 95), Winner::TeamA);
        assert_eq!(Winner::from_scores(95, 120), Winner::TeamB);
        assert_eq!(Winner::from_scores(100, 100), Winner::Draw);
        assert_eq!(Winner::from_scores(0, 0), Winner::Draw);
    }

    #[test]
    fn test_winning_side() {
        assert!(Winner::TeamA.is_winning_side(TeamSide::TeamA));
        assert!(!Winner::TeamA.is_winning_side(TeamSide::TeamB));
        assert!(!Winner::Draw.is_winning_side(TeamSide::TeamA));
        assert!(!Winner::Draw.is_winning_side(TeamSide::TeamB));
    }

    #[test]
    fn test_team_side_opposite() {
        assert_eq!(TeamSide::TeamA.opposite(), TeamSide::TeamB);
        assert_eq!(TeamSide::TeamB.opposite(), TeamSide::TeamA);
    }
}
