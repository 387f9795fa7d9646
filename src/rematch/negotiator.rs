//! Rematch negotiation and battle exit routing
//!
//! A small two-party handshake: each team's recorded leader may request a
//! rematch on a completed match; when both have requested, a pre-seeded
//! lobby pair respawns with the same rosters and a fresh match starts.
//! The old match stays terminal and untouched. A single-sided request
//! expires after a configured TTL so the negotiation can never hang.

use crate::amqp::publisher::EventPublisher;
use crate::battle::engine::MatchEngine;
use crate::battle::state::BattleMatch;
use crate::config::BattleSettings;
use crate::error::{BattleError, Result};
use crate::lobby::instance::Lobby;
use crate::lobby::manager::LobbyManager;
use crate::metrics::MetricsCollector;
use crate::storage::BattleStore;
use crate::types::{
    BattleEvent, BattleEnded, EndTrigger, ExitDestination, MatchId, MatchStatus, RematchAccepted,
    RematchExpired, RematchRequested, RematchState, TeamSide, UserId,
};
use crate::utils::current_timestamp;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one rematch request
#[derive(Debug, Clone)]
pub struct RematchOutcome {
    pub state: RematchState,
    /// Set when this request completed the handshake
    pub new_match_id: Option<MatchId>,
}

/// Drives the rematch handshake and the end-battle exit path
pub struct RematchNegotiator {
    store: Arc<dyn BattleStore>,
    engine: Arc<MatchEngine>,
    manager: Arc<LobbyManager>,
    event_publisher: Arc<dyn EventPublisher>,
    metrics: Arc<MetricsCollector>,
    settings: BattleSettings,
}

impl RematchNegotiator {
    pub fn new(
        store: Arc<dyn BattleStore>,
        engine: Arc<MatchEngine>,
        manager: Arc<LobbyManager>,
        event_publisher: Arc<dyn EventPublisher>,
        metrics: Arc<MetricsCollector>,
        settings: BattleSettings,
    ) -> Self {
        Self {
            store,
            engine,
            manager,
            event_publisher,
            metrics,
            settings,
        }
    }

    /// Register a leader's rematch request.
    ///
    /// `None → requesting team`; a request from the other team's leader
    /// while one is pending transitions to `Both` and respawns the teams
    /// into a fresh match. Requests from non-leaders are rejected and
    /// leave the state unchanged.
    pub async fn request_rematch(
        &self,
        match_id: MatchId,
        requester_id: &str,
    ) -> Result<RematchOutcome> {
        let battle = self.engine.require_match(match_id).await?;

        if battle.status != MatchStatus::Completed {
            return Err(BattleError::InvalidRequest {
                reason: format!("match {} has not completed, cannot request rematch", match_id),
            }
            .into());
        }

        let side = battle
            .leader_side(requester_id)
            .ok_or_else(|| BattleError::PermissionDenied {
                reason: format!(
                    "user {} is not a recorded leader of match {}",
                    requester_id, match_id
                ),
            })?;

        // A conflicting concurrent transition re-reads the now-current
        // state and retries against it.
        let mut attempts = 0;
        let updated = loop {
            let current = self.engine.require_match(match_id).await?.rematch;
            let target = match (current, side) {
                (RematchState::None, s) => RematchState::requested_by(s),
                (RematchState::TeamA, TeamSide::TeamA)
                | (RematchState::TeamB, TeamSide::TeamB) => {
                    debug!(
                        "Leader '{}' repeated a pending rematch request on {}",
                        requester_id, match_id
                    );
                    return Ok(RematchOutcome {
                        state: current,
                        new_match_id: None,
                    });
                }
                (RematchState::TeamA, TeamSide::TeamB)
                | (RematchState::TeamB, TeamSide::TeamA) => RematchState::Both,
                (RematchState::Both, _) => {
                    return Ok(RematchOutcome {
                        state: RematchState::Both,
                        new_match_id: None,
                    });
                }
            };

            match self.store.transition_rematch(match_id, current, target).await {
                Ok(battle) => break battle,
                Err(e) => {
                    attempts += 1;
                    let retryable = e
                        .downcast_ref::<BattleError>()
                        .map(|err| err.is_retryable())
                        .unwrap_or(false);
                    if !retryable || attempts >= 3 {
                        return Err(e);
                    }
                    debug!(
                        "Rematch transition on {} raced (attempt {}), retrying",
                        match_id, attempts
                    );
                }
            }
        };

        self.metrics.record_rematch_requested();
        self.event_publisher
            .publish(BattleEvent::RematchRequested(RematchRequested {
                match_id,
                requested_by: requester_id.to_string(),
                state: updated.rematch,
                timestamp: current_timestamp(),
            }))
            .await?;

        if updated.rematch != RematchState::Both {
            info!(
                "Rematch on {} pending - {} requested, waiting for the other leader",
                match_id, side
            );
            return Ok(RematchOutcome {
                state: updated.rematch,
                new_match_id: None,
            });
        }

        let new_match = self.respawn(&updated).await?;
        self.metrics.record_rematch_accepted();
        info!(
            "Rematch accepted on {} - new match {} with the same rosters",
            match_id, new_match.id
        );

        self.event_publisher
            .publish(BattleEvent::RematchAccepted(RematchAccepted {
                previous_match_id: match_id,
                new_match_id: new_match.id,
                timestamp: current_timestamp(),
            }))
            .await?;

        Ok(RematchOutcome {
            state: RematchState::Both,
            new_match_id: Some(new_match.id),
        })
    }

    /// Force-end the battle and route the caller out.
    ///
    /// Either leader may end at any time; a non-leader participant may
    /// only when their side's leader has already left the lobby. Routes
    /// back to the originating solo stream when the caller's lobby was
    /// spawned from one.
    pub async fn end_battle(&self, match_id: MatchId, user_id: &str) -> Result<ExitDestination> {
        let battle = self.engine.require_match(match_id).await?;

        let side = battle
            .side_of(user_id)
            .ok_or_else(|| BattleError::PermissionDenied {
                reason: format!(
                    "user {} is not a participant of match {}",
                    user_id, match_id
                ),
            })?;

        let is_leader = battle.leader_side(user_id).is_some();
        if !is_leader && self.side_leader_present(&battle, side).await? {
            return Err(BattleError::PermissionDenied {
                reason: format!(
                    "only the {} leader may end battle {} while present",
                    side, match_id
                ),
            }
            .into());
        }

        if battle.status == MatchStatus::Active {
            let trigger = if is_leader {
                EndTrigger::LeaderAction
            } else {
                EndTrigger::Forced
            };
            self.engine.end_match(match_id, trigger).await?;
        }

        // Leaving the post-match screen supersedes a pending one-sided
        // request; an accepted rematch already moved the players on.
        let battle = self.engine.require_match(match_id).await?;
        if matches!(battle.rematch, RematchState::TeamA | RematchState::TeamB) {
            if let Err(e) = self
                .store
                .transition_rematch(match_id, battle.rematch, RematchState::None)
                .await
            {
                debug!("Pending rematch on {} already resolved: {}", match_id, e);
            }
        }

        let destination = self.exit_destination(&battle, side).await?;

        if battle.rematch != RematchState::Both {
            self.archive_match_lobbies(&battle).await;
        }

        self.event_publisher
            .publish(BattleEvent::BattleEnded(BattleEnded {
                match_id,
                ended_by: user_id.to_string(),
                destination: destination.clone(),
                timestamp: current_timestamp(),
            }))
            .await?;

        info!(
            "Battle {} ended by '{}' - routing to {:?}",
            match_id, user_id, destination
        );
        Ok(destination)
    }

    /// Reset single-sided requests that outlived the expiry TTL
    pub async fn expire_stale_requests(&self) -> Result<usize> {
        let cutoff = current_timestamp() - self.settings.rematch_expiry();
        let stale = self.store.stale_rematch_requests(cutoff).await?;
        let mut expired = 0;

        for match_id in stale {
            let battle = match self.store.fetch_match(match_id).await? {
                Some(battle) => battle,
                None => continue,
            };
            let pending = battle.rematch;
            if !matches!(pending, RematchState::TeamA | RematchState::TeamB) {
                continue;
            }

            match self
                .store
                .transition_rematch(match_id, pending, RematchState::None)
                .await
            {
                Ok(_) => {
                    expired += 1;
                    self.metrics.record_rematch_expired();
                    self.event_publisher
                        .publish(BattleEvent::RematchExpired(RematchExpired {
                            match_id,
                            expired_state: pending,
                            timestamp: current_timestamp(),
                        }))
                        .await?;
                }
                Err(e) => {
                    // The other leader accepted in the meantime
                    debug!("Skipping rematch expiry on {}: {}", match_id, e);
                }
            }
        }

        if expired > 0 {
            info!("Expired {} stale rematch requests", expired);
        }
        Ok(expired)
    }

    /// Spawn the pre-seeded lobby shape of the previous match and promote
    /// it straight into a new match.
    async fn respawn(&self, previous: &BattleMatch) -> Result<BattleMatch> {
        let lobby_a = self.store.archive_lobby(previous.lobby_a_id).await?;
        let lobby_b = if previous.lobby_b_id != previous.lobby_a_id {
            self.store.archive_lobby(previous.lobby_b_id).await?
        } else {
            None
        };

        let seeded: Vec<Lobby> = if previous.lobby_a_id == previous.lobby_b_id {
            // Direct challenge shape: both rosters in one lobby
            let origin = lobby_a.and_then(|l| l.original_stream_id);
            vec![Lobby::seeded(
                previous.format,
                previous.team_a_players.clone(),
                Some(previous.team_a_leader_id.clone()),
                previous.team_b_players.clone(),
                Some(previous.team_b_leader_id.clone()),
                origin,
            )]
        } else {
            // Counterpart shape: one squad per lobby, origins preserved
            // per side so end-battle still routes each broadcaster home
            let origin_a = lobby_a.and_then(|l| l.original_stream_id);
            let origin_b = lobby_b.and_then(|l| l.original_stream_id);
            vec![
                Lobby::seeded(
                    previous.format,
                    previous.team_a_players.clone(),
                    Some(previous.team_a_leader_id.clone()),
                    Vec::new(),
                    None,
                    origin_a,
                ),
                Lobby::seeded(
                    previous.format,
                    previous.team_b_players.clone(),
                    Some(previous.team_b_leader_id.clone()),
                    Vec::new(),
                    None,
                    origin_b,
                ),
            ]
        };

        let mut inserted = Vec::with_capacity(seeded.len());
        for lobby in seeded {
            inserted.push(self.store.insert_lobby(lobby).await?);
        }

        self.manager.promote_for_rematch(&inserted).await
    }

    /// Whether the recorded leader of a side still occupies their lobby
    async fn side_leader_present(&self, battle: &BattleMatch, side: TeamSide) -> Result<bool> {
        let leader: &UserId = match side {
            TeamSide::TeamA => &battle.team_a_leader_id,
            TeamSide::TeamB => &battle.team_b_leader_id,
        };
        let lobby_id = match side {
            TeamSide::TeamA => battle.lobby_a_id,
            TeamSide::TeamB => battle.lobby_b_id,
        };
        match self.store.fetch_lobby(lobby_id).await? {
            Some(lobby) if lobby.state != crate::types::LobbyState::Dissolved => {
                Ok(lobby.contains(leader))
            }
            _ => Ok(false),
        }
    }

    async fn exit_destination(
        &self,
        battle: &BattleMatch,
        side: TeamSide,
    ) -> Result<ExitDestination> {
        let lobby_id = match side {
            TeamSide::TeamA => battle.lobby_a_id,
            TeamSide::TeamB => battle.lobby_b_id,
        };
        let destination = match self.store.fetch_lobby(lobby_id).await? {
            Some(lobby) if lobby.return_to_solo_stream => match lobby.original_stream_id {
                Some(stream_id) => ExitDestination::SoloStream { stream_id },
                None => ExitDestination::Home,
            },
            _ => ExitDestination::Home,
        };
        Ok(destination)
    }

    async fn archive_match_lobbies(&self, battle: &BattleMatch) {
        for lobby_id in [battle.lobby_a_id, battle.lobby_b_id] {
            if let Err(e) = self.store.archive_lobby(lobby_id).await {
                warn!("Failed to archive lobby {} after battle: {}", lobby_id, e);
            }
            if battle.lobby_a_id == battle.lobby_b_id {
                break;
            }
        }
    }
}
