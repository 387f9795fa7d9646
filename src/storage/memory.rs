//! In-memory `BattleStore` implementation
//!
//! Backs tests and single-node deployments. Atomicity comes from doing
//! each row mutation under one table write lock; a durable backend
//! implements the same trait with transactions instead.

use crate::battle::state::BattleMatch;
use crate::error::{BattleError, Result};
use crate::lobby::instance::{Departure, Lobby};
use crate::reward::Reward;
use crate::storage::{BattleStore, GiftApplication, MatchCompletion, RewardInsertion};
use crate::types::{
    BattleFormat, GiftEvent, LobbyId, LobbyState, MatchId, MatchStatus, RematchState, TeamSide,
    UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct LobbyTable {
    rows: HashMap<LobbyId, Lobby>,
    /// One active lobby per user, the double-booking invariant
    membership: HashMap<UserId, LobbyId>,
}

#[derive(Debug, Default)]
struct MatchTable {
    rows: HashMap<MatchId, BattleMatch>,
    /// Seen gift event ids per match, the accumulation dedup set
    seen_gifts: HashMap<MatchId, HashSet<Uuid>>,
}

/// In-memory row store with per-table locking
#[derive(Debug, Default)]
pub struct InMemoryStore {
    lobbies: RwLock<LobbyTable>,
    matches: RwLock<MatchTable>,
    rewards: RwLock<HashMap<MatchId, Vec<Reward>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_err() -> BattleError {
    BattleError::InternalError {
        message: "Failed to acquire store lock".to_string(),
    }
}

#[async_trait]
impl BattleStore for InMemoryStore {
    async fn insert_lobby(&self, lobby: Lobby) -> Result<Lobby> {
        let mut table = self.lobbies.write().map_err(|_| lock_err())?;

        for member in lobby.members() {
            if let Some(existing) = table.membership.get(&member) {
                return Err(BattleError::AlreadyInLobby {
                    user_id: member,
                    lobby_id: existing.to_string(),
                }
                .into());
            }
        }
        for member in lobby.members() {
            table.membership.insert(member, lobby.id);
        }
        table.rows.insert(lobby.id, lobby.clone());
        Ok(lobby)
    }

    async fn fetch_lobby(&self, lobby_id: LobbyId) -> Result<Option<Lobby>> {
        let table = self.lobbies.read().map_err(|_| lock_err())?;
        Ok(table.rows.get(&lobby_id).cloned())
    }

    async fn lobby_for_user(&self, user_id: &str) -> Result<Option<Lobby>> {
        let table = self.lobbies.read().map_err(|_| lock_err())?;
        Ok(table
            .membership
            .get(user_id)
            .and_then(|lobby_id| table.rows.get(lobby_id))
            .cloned())
    }

    async fn join_lobby(
        &self,
        lobby_id: LobbyId,
        user_id: &str,
        preferred: Option<TeamSide>,
    ) -> Result<(Lobby, TeamSide)> {
        let mut table = self.lobbies.write().map_err(|_| lock_err())?;

        if let Some(existing) = table.membership.get(user_id) {
            return Err(BattleError::AlreadyInLobby {
                user_id: user_id.to_string(),
                lobby_id: existing.to_string(),
            }
            .into());
        }

        let lobby = table
            .rows
            .get_mut(&lobby_id)
            .ok_or_else(|| BattleError::LobbyNotFound {
                lobby_id: lobby_id.to_string(),
            })?;

        let side = lobby.admit(user_id.to_string(), preferred)?;
        let snapshot = lobby.clone();
        table.membership.insert(user_id.to_string(), lobby_id);
        Ok((snapshot, side))
    }

    async fn leave_lobby(&self, lobby_id: LobbyId, user_id: &str) -> Result<(Lobby, Departure)> {
        let mut table = self.lobbies.write().map_err(|_| lock_err())?;

        let lobby = table
            .rows
            .get_mut(&lobby_id)
            .ok_or_else(|| BattleError::LobbyNotFound {
                lobby_id: lobby_id.to_string(),
            })?;

        let departure = lobby.depart(user_id)?;
        let snapshot = lobby.clone();

        table.membership.remove(user_id);
        if departure.dissolved {
            for member in snapshot.members() {
                table.membership.remove(&member);
            }
        }
        Ok((snapshot, departure))
    }

    async fn pairable_lobbies(&self, format: BattleFormat) -> Result<Vec<Lobby>> {
        let table = self.lobbies.read().map_err(|_| lock_err())?;
        let mut candidates: Vec<Lobby> = table
            .rows
            .values()
            .filter(|lobby| lobby.format == format && lobby.awaiting_counterpart())
            .cloned()
            .collect();
        candidates.sort_by_key(|lobby| lobby.created_at);
        Ok(candidates)
    }

    async fn mark_lobby_paired(&self, lobby_id: LobbyId) -> Result<Lobby> {
        let mut table = self.lobbies.write().map_err(|_| lock_err())?;
        let lobby = table
            .rows
            .get_mut(&lobby_id)
            .ok_or_else(|| BattleError::LobbyNotFound {
                lobby_id: lobby_id.to_string(),
            })?;
        lobby.mark_paired()?;
        Ok(lobby.clone())
    }

    async fn archive_lobby(&self, lobby_id: LobbyId) -> Result<Option<Lobby>> {
        let mut table = self.lobbies.write().map_err(|_| lock_err())?;
        let lobby = match table.rows.get_mut(&lobby_id) {
            Some(lobby) => lobby,
            None => return Ok(None),
        };
        lobby.archive();
        let snapshot = lobby.clone();
        for member in snapshot.members() {
            if table.membership.get(&member) == Some(&lobby_id) {
                table.membership.remove(&member);
            }
        }
        Ok(Some(snapshot))
    }

    async fn idle_open_lobbies(&self, cutoff: DateTime<Utc>) -> Result<Vec<LobbyId>> {
        let table = self.lobbies.read().map_err(|_| lock_err())?;
        Ok(table
            .rows
            .values()
            .filter(|lobby| lobby.state == LobbyState::Open && lobby.last_activity < cutoff)
            .map(|lobby| lobby.id)
            .collect())
    }

    async fn insert_match(&self, battle: BattleMatch) -> Result<BattleMatch> {
        let mut table = self.matches.write().map_err(|_| lock_err())?;
        table.rows.insert(battle.id, battle.clone());
        Ok(battle)
    }

    async fn fetch_match(&self, match_id: MatchId) -> Result<Option<BattleMatch>> {
        let table = self.matches.read().map_err(|_| lock_err())?;
        Ok(table.rows.get(&match_id).cloned())
    }

    async fn apply_gift(&self, event: &GiftEvent) -> Result<GiftApplication> {
        let mut table = self.matches.write().map_err(|_| lock_err())?;

        let seen = table.seen_gifts.entry(event.match_id).or_default();
        if seen.contains(&event.event_id) {
            let battle = table
                .rows
                .get(&event.match_id)
                .cloned()
                .ok_or_else(|| BattleError::MatchNotFound {
                    match_id: event.match_id.to_string(),
                })?;
            return Ok(GiftApplication {
                battle,
                applied: false,
                side: None,
            });
        }

        let battle = table
            .rows
            .get_mut(&event.match_id)
            .ok_or_else(|| BattleError::MatchNotFound {
                match_id: event.match_id.to_string(),
            })?;

        let side = battle.accumulate(event)?;
        let snapshot = battle.clone();
        table
            .seen_gifts
            .entry(event.match_id)
            .or_default()
            .insert(event.event_id);

        Ok(GiftApplication {
            battle: snapshot,
            applied: true,
            side: Some(side),
        })
    }

    async fn complete_match(&self, match_id: MatchId) -> Result<MatchCompletion> {
        let mut table = self.matches.write().map_err(|_| lock_err())?;
        let battle = table
            .rows
            .get_mut(&match_id)
            .ok_or_else(|| BattleError::MatchNotFound {
                match_id: match_id.to_string(),
            })?;

        if battle.status == MatchStatus::Completed {
            return Ok(MatchCompletion {
                battle: battle.clone(),
                newly_completed: false,
            });
        }

        battle.complete()?;
        Ok(MatchCompletion {
            battle: battle.clone(),
            newly_completed: true,
        })
    }

    async fn expired_matches(&self, now: DateTime<Utc>) -> Result<Vec<MatchId>> {
        let table = self.matches.read().map_err(|_| lock_err())?;
        Ok(table
            .rows
            .values()
            .filter(|battle| battle.expired(now))
            .map(|battle| battle.id)
            .collect())
    }

    async fn transition_rematch(
        &self,
        match_id: MatchId,
        from: RematchState,
        to: RematchState,
    ) -> Result<BattleMatch> {
        let mut table = self.matches.write().map_err(|_| lock_err())?;
        let battle = table
            .rows
            .get_mut(&match_id)
            .ok_or_else(|| BattleError::MatchNotFound {
                match_id: match_id.to_string(),
            })?;

        if battle.rematch == to {
            return Ok(battle.clone());
        }
        if battle.rematch != from {
            return Err(BattleError::Conflict {
                message: format!(
                    "rematch state of match {} changed concurrently (expected {:?}, found {:?})",
                    match_id, from, battle.rematch
                ),
            }
            .into());
        }

        battle.rematch = to;
        battle.rematch_requested_at = match to {
            RematchState::TeamA | RematchState::TeamB => Some(crate::utils::current_timestamp()),
            RematchState::None | RematchState::Both => None,
        };
        Ok(battle.clone())
    }

    async fn stale_rematch_requests(&self, cutoff: DateTime<Utc>) -> Result<Vec<MatchId>> {
        let table = self.matches.read().map_err(|_| lock_err())?;
        Ok(table
            .rows
            .values()
            .filter(|battle| {
                matches!(battle.rematch, RematchState::TeamA | RematchState::TeamB)
                    && battle
                        .rematch_requested_at
                        .map(|at| at < cutoff)
                        .unwrap_or(false)
            })
            .map(|battle| battle.id)
            .collect())
    }

    async fn fetch_rewards(&self, match_id: MatchId) -> Result<Vec<Reward>> {
        let rewards = self.rewards.read().map_err(|_| lock_err())?;
        Ok(rewards.get(&match_id).cloned().unwrap_or_default())
    }

    async fn insert_rewards(
        &self,
        match_id: MatchId,
        rewards: Vec<Reward>,
    ) -> Result<RewardInsertion> {
        let mut table = self.rewards.write().map_err(|_| lock_err())?;

        if let Some(existing) = table.get(&match_id) {
            return Ok(RewardInsertion {
                rewards: existing.clone(),
                inserted: false,
            });
        }

        table.insert(match_id, rewards.clone());
        Ok(RewardInsertion {
            rewards,
            inserted: true,
        })
    }
}
