//! Persistence boundary for lobby, match, and reward rows
//!
//! The engine owns no durable state of its own; everything goes through
//! [`BattleStore`]. The contract mirrors a transactional row store:
//! score increments are atomic accumulator operations with event-id
//! dedup, the terminal match transition is a compare-and-set, and reward
//! rows are insert-once. Writes must be durable before the corresponding
//! broadcast is emitted, so publishers are invoked only after these calls
//! return.

pub mod memory;

pub use memory::InMemoryStore;

use crate::battle::state::BattleMatch;
use crate::error::Result;
use crate::lobby::instance::{Departure, Lobby};
use crate::reward::Reward;
use crate::types::{BattleFormat, GiftEvent, LobbyId, MatchId, RematchState, TeamSide};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Outcome of an atomic gift accumulation
#[derive(Debug, Clone)]
pub struct GiftApplication {
    pub battle: BattleMatch,
    /// False when the event id was already seen (idempotent redelivery)
    pub applied: bool,
    /// The side credited, when applied
    pub side: Option<TeamSide>,
}

/// Outcome of the active → completed compare-and-set
#[derive(Debug, Clone)]
pub struct MatchCompletion {
    pub battle: BattleMatch,
    /// False when a racing caller completed the match first
    pub newly_completed: bool,
}

/// Outcome of the insert-once reward write
#[derive(Debug, Clone)]
pub struct RewardInsertion {
    pub rewards: Vec<Reward>,
    /// False when rows already existed; `rewards` then holds the stored set
    pub inserted: bool,
}

/// Row-oriented storage for the battle engine's entities.
///
/// Every operation may suspend on the underlying store and may fail
/// transiently; callers treat failures independently per operation.
#[async_trait]
pub trait BattleStore: Send + Sync {
    // Lobby rows

    /// Insert a new lobby, registering every seeded member. Fails with
    /// `AlreadyInLobby` if any member is active in another lobby.
    async fn insert_lobby(&self, lobby: Lobby) -> Result<Lobby>;

    async fn fetch_lobby(&self, lobby_id: LobbyId) -> Result<Option<Lobby>>;

    /// The non-dissolved lobby a user currently occupies, if any
    async fn lobby_for_user(&self, user_id: &str) -> Result<Option<Lobby>>;

    /// Seat a user atomically, enforcing the one-active-lobby invariant
    async fn join_lobby(
        &self,
        lobby_id: LobbyId,
        user_id: &str,
        preferred: Option<TeamSide>,
    ) -> Result<(Lobby, TeamSide)>;

    /// Remove a user atomically, transferring leadership or dissolving
    async fn leave_lobby(&self, lobby_id: LobbyId, user_id: &str) -> Result<(Lobby, Departure)>;

    /// Open public lobbies with a full home squad awaiting a counterpart,
    /// ordered oldest first (FIFO pairing policy)
    async fn pairable_lobbies(&self, format: BattleFormat) -> Result<Vec<Lobby>>;

    /// Compare-and-set open → paired
    async fn mark_lobby_paired(&self, lobby_id: LobbyId) -> Result<Lobby>;

    /// Soft-delete; frees the members for new matchmaking, keeps the row
    async fn archive_lobby(&self, lobby_id: LobbyId) -> Result<Option<Lobby>>;

    /// Open lobbies without activity since the cutoff
    async fn idle_open_lobbies(&self, cutoff: DateTime<Utc>) -> Result<Vec<LobbyId>>;

    // Match rows

    async fn insert_match(&self, battle: BattleMatch) -> Result<BattleMatch>;

    async fn fetch_match(&self, match_id: MatchId) -> Result<Option<BattleMatch>>;

    /// Atomically fold a gift into the match accumulators, deduplicating
    /// by event id so redeliveries never double-count
    async fn apply_gift(&self, event: &GiftEvent) -> Result<GiftApplication>;

    /// Atomically stop accepting increments, freeze the scores, and stamp
    /// the winner. Idempotent for racing callers.
    async fn complete_match(&self, match_id: MatchId) -> Result<MatchCompletion>;

    /// Active matches whose deadline passed
    async fn expired_matches(&self, now: DateTime<Utc>) -> Result<Vec<MatchId>>;

    /// Compare-and-set on the rematch handshake state. Setting the same
    /// state twice is a no-op success; any other mismatch is a conflict.
    async fn transition_rematch(
        &self,
        match_id: MatchId,
        from: RematchState,
        to: RematchState,
    ) -> Result<BattleMatch>;

    /// Matches stuck in a single-sided rematch request since the cutoff
    async fn stale_rematch_requests(&self, cutoff: DateTime<Utc>) -> Result<Vec<MatchId>>;

    // Reward rows

    async fn fetch_rewards(&self, match_id: MatchId) -> Result<Vec<Reward>>;

    /// Insert the reward set for a match exactly once; a second call
    /// returns the stored rows untouched
    async fn insert_rewards(
        &self,
        match_id: MatchId,
        rewards: Vec<Reward>,
    ) -> Result<RewardInsertion>;
}
