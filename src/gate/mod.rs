//! Matchmaking gate: temporary-block check before lobby creation
//!
//! The block records themselves belong to the moderation collaborator;
//! this module only consumes the single "is user X currently blocked"
//! query. The gate fails closed: if the lookup itself errors, creation is
//! denied with a retryable error rather than silently allowed.

use crate::error::{BattleError, Result};
use crate::types::{MatchmakingBlock, UserId};
use crate::utils::current_timestamp;
use async_trait::async_trait;
use chrono::Duration;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, warn};

/// Read-only lookup of matchmaking blocks
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// The current block record for a user, expired or not
    async fn matchmaking_block(&self, user_id: &str) -> Result<Option<MatchmakingBlock>>;
}

/// Gate decision surfaced to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateDecision {
    pub allowed: bool,
    /// Remaining cooldown when denied, read from the authoritative
    /// block-expiry record
    pub cooldown_remaining: Option<Duration>,
}

impl GateDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            cooldown_remaining: None,
        }
    }
}

/// Checks whether an initiating user may create a lobby
pub struct MatchmakingGate {
    blocks: std::sync::Arc<dyn BlockStore>,
}

impl MatchmakingGate {
    pub fn new(blocks: std::sync::Arc<dyn BlockStore>) -> Self {
        Self { blocks }
    }

    /// Read-only check; no side effects.
    pub async fn check(&self, user_id: &str) -> Result<GateDecision> {
        let block = match self.blocks.matchmaking_block(user_id).await {
            Ok(block) => block,
            Err(e) => {
                // Fail closed: an unverifiable block status denies entry
                warn!(
                    "Block lookup failed for user '{}', denying matchmaking: {}",
                    user_id, e
                );
                return Err(BattleError::Storage {
                    message: format!("block lookup failed: {}", e),
                }
                .into());
            }
        };

        match block {
            Some(block) => {
                let now = current_timestamp();
                if block.expires_at <= now {
                    debug!("Block for user '{}' expired, allowing", user_id);
                    return Ok(GateDecision::allow());
                }
                let remaining = block.expires_at - now;
                debug!(
                    "User '{}' blocked from matchmaking for {}s ({})",
                    user_id,
                    remaining.num_seconds(),
                    block.reason
                );
                Ok(GateDecision {
                    allowed: false,
                    cooldown_remaining: Some(remaining),
                })
            }
            None => Ok(GateDecision::allow()),
        }
    }

    /// Deny-or-pass helper used by the lobby manager
    pub async fn require_allowed(&self, user_id: &str) -> Result<()> {
        let decision = self.check(user_id).await?;
        if !decision.allowed {
            let seconds_remaining = decision
                .cooldown_remaining
                .map(|d| d.num_seconds())
                .unwrap_or(0);
            return Err(BattleError::MatchmakingBlocked {
                user_id: user_id.to_string(),
                seconds_remaining,
            }
            .into());
        }
        Ok(())
    }
}

/// In-memory block records for tests and single-node deployments
#[derive(Debug, Default)]
pub struct InMemoryBlockStore {
    blocks: RwLock<HashMap<UserId, MatchmakingBlock>>,
}

impl InMemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a temporary block, e.g. after a declined match offer
    pub fn block_user(&self, user_id: &str, duration: Duration, reason: &str) {
        let now = current_timestamp();
        if let Ok(mut blocks) = self.blocks.write() {
            blocks.insert(
                user_id.to_string(),
                MatchmakingBlock {
                    user_id: user_id.to_string(),
                    reason: reason.to_string(),
                    blocked_at: now,
                    expires_at: now + duration,
                },
            );
        }
    }

    pub fn clear(&self, user_id: &str) {
        if let Ok(mut blocks) = self.blocks.write() {
            blocks.remove(user_id);
        }
    }
}

#[async_trait]
impl BlockStore for InMemoryBlockStore {
    async fn matchmaking_block(&self, user_id: &str) -> Result<Option<MatchmakingBlock>> {
        let blocks = self.blocks.read().map_err(|_| BattleError::InternalError {
            message: "Failed to acquire block store lock".to_string(),
        })?;
        Ok(blocks.get(user_id).cloned())
    }
}

/// Block store that always fails, for exercising the fail-closed path
#[cfg(test)]
pub struct FailingBlockStore;

#[cfg(test)]
#[async_trait]
impl BlockStore for FailingBlockStore {
    async fn matchmaking_block(&self, _user_id: &str) -> Result<Option<MatchmakingBlock>> {
        Err(BattleError::Storage {
            message: "block backend unreachable".to_string(),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_unblocked_user_allowed() {
        let gate = MatchmakingGate::new(Arc::new(InMemoryBlockStore::new()));
        let decision = gate.check("u1").await.unwrap();
        assert!(decision.allowed);
        assert!(decision.cooldown_remaining.is_none());
    }

    #[tokio::test]
    async fn test_blocked_user_sees_cooldown() {
        let blocks = Arc::new(InMemoryBlockStore::new());
        blocks.block_user("u1", Duration::minutes(3), "declined match offer");
        let gate = MatchmakingGate::new(blocks);

        let decision = gate.check("u1").await.unwrap();
        assert!(!decision.allowed);
        let remaining = decision.cooldown_remaining.unwrap();
        assert!(remaining.num_seconds() > 170 && remaining.num_seconds() <= 180);

        let err = gate
            .require_allowed("u1")
            .await
            .unwrap_err()
            .downcast::<BattleError>()
            .unwrap();
        assert!(matches!(err, BattleError::MatchmakingBlocked { .. }));
    }

    #[tokio::test]
    async fn test_expired_block_allows() {
        let blocks = Arc::new(InMemoryBlockStore::new());
        blocks.block_user("u1", Duration::seconds(-1), "declined match offer");
        let gate = MatchmakingGate::new(blocks);
        assert!(gate.check("u1").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_lookup_failure_fails_closed() {
        let gate = MatchmakingGate::new(Arc::new(FailingBlockStore));
        let err = gate
            .check("u1")
            .await
            .unwrap_err()
            .downcast::<BattleError>()
            .unwrap();
        assert!(matches!(err, BattleError::Storage { .. }));
        assert!(err.is_retryable());
    }
}
