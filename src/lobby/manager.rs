//! Lobby manager: creation, joining, leaving, and promotion into matches
//!
//! All lobby mutation funnels through here so the lobby invariants hold:
//! one active lobby per user, bounded team sizes, leaders tracked per side.
//! Every broadcast goes out only after the corresponding row write.

use crate::battle::state::BattleMatch;
use crate::config::BattleSettings;
use crate::error::{BattleError, Result};
use crate::gate::MatchmakingGate;
use crate::lobby::instance::Lobby;
use crate::lobby::pairing::LobbyPairer;
use crate::amqp::publisher::EventPublisher;
use crate::metrics::MetricsCollector;
use crate::storage::BattleStore;
use crate::types::{
    BattleEvent, BattleFormat, LobbyId, MatchStarted, PlayerJoinedLobby, PlayerLeftLobby,
    StreamId, TeamSide, UserId,
};
use crate::utils::current_timestamp;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Statistics about lobby manager operations
#[derive(Debug, Clone, Default)]
pub struct LobbyManagerStats {
    /// Total number of lobbies created
    pub lobbies_created: u64,
    /// Total number of lobbies dissolved
    pub lobbies_dissolved: u64,
    /// Total number of players seated
    pub players_joined: u64,
    /// Total number of matches started
    pub matches_started: u64,
}

/// The main lobby manager
#[derive(Clone)]
pub struct LobbyManager {
    store: Arc<dyn BattleStore>,
    gate: Arc<MatchmakingGate>,
    pairer: Arc<dyn LobbyPairer>,
    event_publisher: Arc<dyn EventPublisher>,
    metrics: Arc<MetricsCollector>,
    stats: Arc<RwLock<LobbyManagerStats>>,
    settings: BattleSettings,
}

impl LobbyManager {
    pub fn new(
        store: Arc<dyn BattleStore>,
        gate: Arc<MatchmakingGate>,
        pairer: Arc<dyn LobbyPairer>,
        event_publisher: Arc<dyn EventPublisher>,
        metrics: Arc<MetricsCollector>,
        settings: BattleSettings,
    ) -> Self {
        Self {
            store,
            gate,
            pairer,
            event_publisher,
            metrics,
            stats: Arc::new(RwLock::new(LobbyManagerStats::default())),
            settings,
        }
    }

    /// Create a lobby for the chosen format with the creator as team A
    /// leader. Denied while the creator is under a matchmaking block.
    pub async fn create_lobby(
        &self,
        creator_id: UserId,
        format: BattleFormat,
        is_private: bool,
        original_stream_id: Option<StreamId>,
    ) -> Result<Lobby> {
        self.gate.require_allowed(&creator_id).await?;

        let lobby = Lobby::new(creator_id.clone(), format, is_private, original_stream_id);
        let lobby = self.store.insert_lobby(lobby).await?;

        info!(
            "Created {} lobby {} - creator: '{}', private: {}, from_stream: {}",
            format, lobby.id, creator_id, is_private, lobby.return_to_solo_stream
        );

        {
            let mut stats = self.stats.write().map_err(|_| BattleError::InternalError {
                message: "Failed to acquire stats lock".to_string(),
            })?;
            stats.lobbies_created += 1;
            stats.players_joined += 1;
        }
        self.metrics.record_lobby_created(format);
        self.metrics.record_player_joined();

        self.event_publisher
            .publish(BattleEvent::PlayerJoinedLobby(PlayerJoinedLobby {
                lobby_id: lobby.id,
                user_id: creator_id,
                side: TeamSide::TeamA,
                team_a_players: lobby.team_a_players.clone(),
                team_b_players: lobby.team_b_players.clone(),
                timestamp: current_timestamp(),
            }))
            .await?;

        self.check_lobby_progress(lobby.id).await?;
        self.refreshed(lobby).await
    }

    /// Seat a user, preferring the requested side, falling back to the
    /// other, failing with `LobbyFull` when neither has capacity.
    pub async fn join_lobby(
        &self,
        lobby_id: LobbyId,
        user_id: UserId,
        preferred: Option<TeamSide>,
    ) -> Result<Lobby> {
        let (lobby, side) = self.store.join_lobby(lobby_id, &user_id, preferred).await?;

        info!(
            "User '{}' joined lobby {} on {} ({}/{} vs {}/{})",
            user_id,
            lobby_id,
            side,
            lobby.team_a_players.len(),
            lobby.format.per_side(),
            lobby.team_b_players.len(),
            lobby.format.per_side(),
        );

        {
            let mut stats = self.stats.write().map_err(|_| BattleError::InternalError {
                message: "Failed to acquire stats lock".to_string(),
            })?;
            stats.players_joined += 1;
        }
        self.metrics.record_player_joined();

        self.event_publisher
            .publish(BattleEvent::PlayerJoinedLobby(PlayerJoinedLobby {
                lobby_id,
                user_id,
                side,
                team_a_players: lobby.team_a_players.clone(),
                team_b_players: lobby.team_b_players.clone(),
                timestamp: current_timestamp(),
            }))
            .await?;

        self.check_lobby_progress(lobby_id).await?;
        self.refreshed(lobby).await
    }

    /// Remove a user from an unpaired lobby. Leadership transfers to the
    /// next-joined member; an emptied side dissolves the lobby.
    pub async fn leave_lobby(&self, lobby_id: LobbyId, user_id: &str) -> Result<Lobby> {
        let (lobby, departure) = self.store.leave_lobby(lobby_id, user_id).await?;

        if departure.dissolved {
            info!(
                "User '{}' left lobby {}, side {} emptied - lobby dissolved",
                user_id, lobby_id, departure.side
            );
            {
                let mut stats = self.stats.write().map_err(|_| BattleError::InternalError {
                    message: "Failed to acquire stats lock".to_string(),
                })?;
                stats.lobbies_dissolved += 1;
            }
            self.metrics.record_lobby_dissolved();
        } else {
            info!(
                "User '{}' left lobby {} (new {} leader: {:?})",
                user_id, lobby_id, departure.side, departure.new_leader
            );
        }

        self.event_publisher
            .publish(BattleEvent::PlayerLeftLobby(PlayerLeftLobby {
                lobby_id,
                user_id: user_id.to_string(),
                new_leader: departure.new_leader,
                dissolved: departure.dissolved,
                timestamp: current_timestamp(),
            }))
            .await?;

        Ok(lobby)
    }

    /// Pair two fully-staffed counterpart lobbies into an active match.
    /// Formats must match exactly.
    pub async fn pair_lobbies(&self, lobby_a: LobbyId, lobby_b: LobbyId) -> Result<BattleMatch> {
        let a = self.require_lobby(lobby_a).await?;
        let b = self.require_lobby(lobby_b).await?;

        if !a.awaiting_counterpart() || !b.awaiting_counterpart() {
            return Err(BattleError::InvalidRequest {
                reason: "both lobbies must be fully staffed and awaiting a counterpart"
                    .to_string(),
            }
            .into());
        }

        self.promote_pair(&a, &b).await
    }

    /// Promote pre-seeded rematch lobbies, bypassing the open-join pool.
    /// One lobby means both rosters sit inside it; two means one squad each.
    pub async fn promote_for_rematch(&self, lobbies: &[Lobby]) -> Result<BattleMatch> {
        match lobbies {
            [single] => self.promote_single(single).await,
            [a, b] => self.promote_pair(a, b).await,
            _ => Err(BattleError::InternalError {
                message: format!("rematch respawn got {} lobbies", lobbies.len()),
            }
            .into()),
        }
    }

    /// Dissolve open lobbies without activity past the idle timeout
    pub async fn dissolve_idle_lobbies(&self) -> Result<usize> {
        let cutoff = current_timestamp() - self.settings.lobby_idle_timeout();
        let idle = self.store.idle_open_lobbies(cutoff).await?;
        let mut dissolved = 0;

        for lobby_id in idle {
            match self.store.archive_lobby(lobby_id).await {
                Ok(Some(_)) => {
                    dissolved += 1;
                    self.metrics.record_lobby_dissolved();
                    debug!("Dissolved idle lobby {}", lobby_id);
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to dissolve idle lobby {}: {}", lobby_id, e),
            }
        }

        if dissolved > 0 {
            let mut stats = self.stats.write().map_err(|_| BattleError::InternalError {
                message: "Failed to acquire stats lock".to_string(),
            })?;
            stats.lobbies_dissolved += dissolved as u64;
            info!("Dissolved {} idle lobbies", dissolved);
        }

        Ok(dissolved)
    }

    /// Get information about a specific lobby
    pub async fn get_lobby_info(&self, lobby_id: LobbyId) -> Result<Option<Lobby>> {
        self.store.fetch_lobby(lobby_id).await
    }

    /// Get current manager statistics
    pub fn get_stats(&self) -> Result<LobbyManagerStats> {
        let stats = self.stats.read().map_err(|_| BattleError::InternalError {
            message: "Failed to acquire stats lock".to_string(),
        })?;
        Ok(stats.clone())
    }

    /// Promote the lobby when staffed, or try the FIFO pairing pool.
    async fn check_lobby_progress(&self, lobby_id: LobbyId) -> Result<Option<BattleMatch>> {
        let lobby = match self.store.fetch_lobby(lobby_id).await? {
            Some(lobby) => lobby,
            None => return Ok(None),
        };

        if lobby.ready_for_direct_promotion() {
            let battle = self.promote_single(&lobby).await?;
            return Ok(Some(battle));
        }

        if lobby.awaiting_counterpart() {
            let candidates = self.store.pairable_lobbies(lobby.format).await?;
            if let Some((a_id, b_id)) = self.pairer.select_pair(&candidates) {
                let a = self.require_lobby(a_id).await?;
                let b = self.require_lobby(b_id).await?;
                let battle = self.promote_pair(&a, &b).await?;
                return Ok(Some(battle));
            }
            debug!(
                "Lobby {} awaiting counterpart ({} candidate(s) for {})",
                lobby_id,
                candidates.len(),
                lobby.format
            );
        }

        Ok(None)
    }

    /// Direct-challenge promotion: both rosters live in one lobby
    async fn promote_single(&self, lobby: &Lobby) -> Result<BattleMatch> {
        let battle = BattleMatch::from_single_lobby(lobby, self.settings.match_duration())?;
        let battle = self.store.insert_match(battle).await?;
        self.store.mark_lobby_paired(lobby.id).await?;
        self.announce_match(&battle, 1).await?;
        Ok(battle)
    }

    /// Counterpart promotion: each lobby contributes its home squad
    async fn promote_pair(&self, lobby_a: &Lobby, lobby_b: &Lobby) -> Result<BattleMatch> {
        let battle =
            BattleMatch::from_lobby_pair(lobby_a, lobby_b, self.settings.match_duration())?;
        let battle = self.store.insert_match(battle).await?;
        self.store.mark_lobby_paired(lobby_a.id).await?;
        self.store.mark_lobby_paired(lobby_b.id).await?;
        self.announce_match(&battle, 2).await?;
        Ok(battle)
    }

    async fn announce_match(&self, battle: &BattleMatch, paired_lobbies: u64) -> Result<()> {
        info!(
            "Match {} started - format: {}, teams: {:?} vs {:?}, ends_at: {}",
            battle.id, battle.format, battle.team_a_players, battle.team_b_players, battle.ends_at
        );

        {
            let mut stats = self.stats.write().map_err(|_| BattleError::InternalError {
                message: "Failed to acquire stats lock".to_string(),
            })?;
            stats.matches_started += 1;
        }
        self.metrics.record_match_started(paired_lobbies);

        self.event_publisher
            .publish(BattleEvent::MatchStarted(MatchStarted {
                match_id: battle.id,
                lobby_a_id: battle.lobby_a_id,
                lobby_b_id: battle.lobby_b_id,
                format: battle.format,
                team_a_players: battle.team_a_players.clone(),
                team_b_players: battle.team_b_players.clone(),
                ends_at: battle.ends_at,
                timestamp: current_timestamp(),
            }))
            .await
    }

    async fn require_lobby(&self, lobby_id: LobbyId) -> Result<Lobby> {
        self.store
            .fetch_lobby(lobby_id)
            .await?
            .ok_or_else(|| {
                BattleError::LobbyNotFound {
                    lobby_id: lobby_id.to_string(),
                }
                .into()
            })
    }

    async fn refreshed(&self, lobby: Lobby) -> Result<Lobby> {
        Ok(self.store.fetch_lobby(lobby.id).await?.unwrap_or(lobby))
    }
}
