//! Reward distribution for completed matches
//!
//! Pays each participant their pro-rata share of the team's gifted value
//! under the applicable creator/platform split, with the winner bonus on
//! top. Distribution is idempotent: reward rows are written exactly once
//! per match, so retries after partial failures never double-pay.

use crate::battle::state::BattleMatch;
use crate::error::{BattleError, Result};
use crate::reward::policy::{PremiumDirectory, RewardPolicy, BPS_SCALE};
use crate::reward::Reward;
use crate::storage::BattleStore;
use crate::types::{MatchId, MatchStatus, TeamSide};
use crate::utils::{current_timestamp, format_sek};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of one distribution attempt
#[derive(Debug, Clone)]
pub struct DistributionOutcome {
    pub rewards: Vec<Reward>,
    /// False when the rows already existed and nothing was written
    pub freshly_written: bool,
}

/// Computes and persists the payout rows for completed matches
pub struct RewardDistributor {
    store: Arc<dyn BattleStore>,
    premium: Arc<dyn PremiumDirectory>,
    policy: RewardPolicy,
}

impl RewardDistributor {
    pub fn new(
        store: Arc<dyn BattleStore>,
        premium: Arc<dyn PremiumDirectory>,
        policy: RewardPolicy,
    ) -> Self {
        Self {
            store,
            premium,
            policy,
        }
    }

    pub fn policy(&self) -> &RewardPolicy {
        &self.policy
    }

    /// Pure payout computation from a frozen match row.
    ///
    /// Deterministic integer arithmetic: recomputation after a partial
    /// failure always yields the same rows. Every participant gets a row,
    /// zero-amount when their team received nothing.
    pub fn compute(&self, battle: &BattleMatch) -> Result<Vec<Reward>> {
        if battle.status != MatchStatus::Completed {
            return Err(BattleError::Conflict {
                message: format!("match {} has not completed, cannot distribute", battle.id),
            }
            .into());
        }
        let winner = battle.winner.ok_or_else(|| BattleError::InternalError {
            message: format!("completed match {} has no winner stamped", battle.id),
        })?;

        let now = current_timestamp();
        let mut rewards = Vec::new();

        for side in [TeamSide::TeamA, TeamSide::TeamB] {
            let is_winner = winner.is_winning_side(side);
            for player_id in battle.roster(side) {
                let gifts_ore = battle
                    .player_gifts_ore
                    .get(player_id)
                    .copied()
                    .unwrap_or(0);

                let share_bps = self
                    .policy
                    .share_for(self.premium.is_premium(player_id));
                let mut amount_ore = gifts_ore * share_bps as i64 / BPS_SCALE;
                if is_winner {
                    amount_ore = amount_ore * self.policy.winner_bonus_bps as i64 / BPS_SCALE;
                }

                rewards.push(Reward {
                    match_id: battle.id,
                    player_id: player_id.clone(),
                    amount_ore,
                    is_winner,
                    creator_share_bps: share_bps,
                    created_at: now,
                });
            }
        }

        Ok(rewards)
    }

    /// Distribute rewards for a completed match row already in hand.
    ///
    /// Re-invocation for an already-rewarded match is a no-op returning
    /// the stored rows.
    pub async fn distribute_for(&self, battle: &BattleMatch) -> Result<DistributionOutcome> {
        let existing = self.store.fetch_rewards(battle.id).await?;
        if !existing.is_empty() {
            debug!(
                "Match {} already has {} reward rows, skipping distribution",
                battle.id,
                existing.len()
            );
            return Ok(DistributionOutcome {
                rewards: existing,
                freshly_written: false,
            });
        }

        let computed = self.compute(battle)?;
        let insertion = self.store.insert_rewards(battle.id, computed).await?;

        if insertion.inserted {
            let total: i64 = insertion.rewards.iter().map(|r| r.amount_ore).sum();
            info!(
                "Distributed rewards for match {} - participants: {}, total: {}",
                battle.id,
                insertion.rewards.len(),
                format_sek(total)
            );
        } else {
            debug!(
                "Reward rows for match {} were written by a concurrent caller",
                battle.id
            );
        }

        Ok(DistributionOutcome {
            rewards: insertion.rewards,
            freshly_written: insertion.inserted,
        })
    }

    /// Distribute rewards by match id
    pub async fn distribute(&self, match_id: MatchId) -> Result<Vec<Reward>> {
        let battle = self
            .store
            .fetch_match(match_id)
            .await?
            .ok_or_else(|| BattleError::MatchNotFound {
                match_id: match_id.to_string(),
            })?;
        Ok(self.distribute_for(&battle).await?.rewards)
    }
}
