//! AMQP message definitions and serialization

use crate::error::{BattleError, Result};
use crate::types::*;
use serde::{Deserialize, Serialize};
use serde_json;

/// Queue the engine consumes gift events and end-match commands from
pub const ENGINE_COMMAND_QUEUE: &str = "battle.engine_commands";
/// Exchange for lobby lifecycle events
pub const LOBBY_EVENTS_EXCHANGE: &str = "battle.lobby_events";
/// Exchange for match events; routing keys carry the match id so each
/// client session can bind a per-match topic
pub const MATCH_EVENTS_EXCHANGE: &str = "battle.match_events";

/// Commands arriving on the engine queue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineCommand {
    Gift(GiftEvent),
    EndMatch(EndMatchCommand),
}

/// Request to end a match ahead of (or at) its deadline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndMatchCommand {
    pub match_id: MatchId,
    /// Present for leader-initiated ends; absent for platform-forced ends
    pub requested_by: Option<UserId>,
}

/// Message envelope with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope<T> {
    pub payload: T,
    pub correlation_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub routing_key: String,
}

impl<T> MessageEnvelope<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    /// Create a new message envelope
    pub fn new(payload: T, routing_key: String) -> Self {
        Self {
            payload,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now(),
            routing_key,
        }
    }

    /// Serialize the envelope to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            BattleError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }

    /// Deserialize envelope from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            BattleError::InvalidRequest {
                reason: format!("Failed to deserialize message: {}", e),
            }
            .into()
        })
    }
}

/// Message serialization and validation utilities
pub struct MessageUtils;

impl MessageUtils {
    /// Deserialize an engine command from queue bytes
    pub fn deserialize_command(bytes: &[u8]) -> Result<EngineCommand> {
        let command: EngineCommand =
            serde_json::from_slice(bytes).map_err(|e| BattleError::InvalidRequest {
                reason: format!("Failed to deserialize engine command: {}", e),
            })?;

        if let EngineCommand::Gift(event) = &command {
            Self::validate_gift_event(event)?;
        }
        Ok(command)
    }

    /// Serialize an engine command to bytes
    pub fn serialize_command(command: &EngineCommand) -> Result<Vec<u8>> {
        serde_json::to_vec(command).map_err(|e| {
            BattleError::InternalError {
                message: format!("Failed to serialize engine command: {}", e),
            }
            .into()
        })
    }

    /// Validate a gift event before it reaches the accumulators
    pub fn validate_gift_event(event: &GiftEvent) -> Result<()> {
        if event.sender_id.is_empty() || event.recipient_id.is_empty() {
            return Err(BattleError::InvalidRequest {
                reason: "Gift sender and recipient cannot be empty".to_string(),
            }
            .into());
        }
        if event.value_ore < 0 || event.score < 0 {
            return Err(BattleError::InvalidRequest {
                reason: "Gift value and score cannot be negative".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Which exchange a broadcast event belongs on
    pub fn exchange_for(event: &BattleEvent) -> &'static str {
        match event {
            BattleEvent::PlayerJoinedLobby(_) | BattleEvent::PlayerLeftLobby(_) => {
                LOBBY_EVENTS_EXCHANGE
            }
            _ => MATCH_EVENTS_EXCHANGE,
        }
    }

    /// Routing key for a broadcast event. Match events embed the match id
    /// so per-match subscriptions can bind `match.<id>.*`.
    pub fn routing_key_for(event: &BattleEvent) -> String {
        match event {
            BattleEvent::PlayerJoinedLobby(e) => format!("lobby.{}.joined", e.lobby_id),
            BattleEvent::PlayerLeftLobby(e) => format!("lobby.{}.left", e.lobby_id),
            BattleEvent::MatchStarted(e) => format!("match.{}.started", e.match_id),
            BattleEvent::ScoreUpdated(e) => format!("match.{}.score", e.match_id),
            BattleEvent::MatchCompleted(e) => format!("match.{}.completed", e.match_id),
            BattleEvent::RewardsDistributed(e) => format!("match.{}.rewards", e.match_id),
            BattleEvent::RematchRequested(e) => format!("match.{}.rematch", e.match_id),
            BattleEvent::RematchAccepted(e) => {
                format!("match.{}.rematch", e.previous_match_id)
            }
            BattleEvent::RematchExpired(e) => format!("match.{}.rematch", e.match_id),
            BattleEvent::BattleEnded(e) => format!("match.{}.ended", e.match_id),
        }
    }

    /// Binding pattern covering every event of one match
    pub fn match_binding_pattern(match_id: MatchId) -> String {
        format!("match.{}.*", match_id)
    }
}
