//! Payout split policy and premium membership lookup
//!
//! The creator/platform split and the winner bonus are injected
//! configuration, never constants at the call sites: premium senders and
//! recipients get a reduced platform cut elsewhere in the system, so the
//! distributor resolves an effective split per player.

use crate::types::UserId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Basis points in a whole (10_000 bps = 100%)
pub const BPS_SCALE: i64 = 10_000;

/// Injectable payout parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardPolicy {
    /// Creator share of gifted value for standard members (70%)
    pub creator_share_bps: u32,
    /// Creator share for premium members (platform cut drops to 22%)
    pub premium_creator_share_bps: u32,
    /// Multiplier applied on top of the winning team's payouts
    pub winner_bonus_bps: u32,
}

impl Default for RewardPolicy {
    fn default() -> Self {
        Self {
            creator_share_bps: 7_000,
            premium_creator_share_bps: 7_800,
            winner_bonus_bps: 15_000,
        }
    }
}

impl RewardPolicy {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.creator_share_bps > BPS_SCALE as u32
            || self.premium_creator_share_bps > BPS_SCALE as u32
        {
            return Err(crate::error::BattleError::ConfigurationError {
                message: "creator share cannot exceed 10000 bps".to_string(),
            }
            .into());
        }
        if self.winner_bonus_bps < BPS_SCALE as u32 {
            return Err(crate::error::BattleError::ConfigurationError {
                message: "winner bonus must be at least 10000 bps (1.0x)".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Effective creator share for one player
    pub fn share_for(&self, premium: bool) -> u32 {
        if premium {
            self.premium_creator_share_bps
        } else {
            self.creator_share_bps
        }
    }
}

/// Read-only lookup of premium membership, owned by the (out-of-scope)
/// subscription subsystem
pub trait PremiumDirectory: Send + Sync {
    fn is_premium(&self, user_id: &str) -> bool;
}

/// Fixed membership set, used by tests and single-node deployments
#[derive(Debug, Default)]
pub struct StaticPremiumDirectory {
    members: HashSet<UserId>,
}

impl StaticPremiumDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_members<I: IntoIterator<Item = UserId>>(members: I) -> Self {
        Self {
            members: members.into_iter().collect(),
        }
    }
}

impl PremiumDirectory for StaticPremiumDirectory {
    fn is_premium(&self, user_id: &str) -> bool {
        self.members.contains(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_valid() {
        let policy = RewardPolicy::default();
        assert!(policy.validate().is_ok());
        assert_eq!(policy.creator_share_bps, 7_000);
        assert_eq!(policy.premium_creator_share_bps, 7_800);
    }

    #[test]
    fn test_invalid_shares_rejected() {
        let policy = RewardPolicy {
            creator_share_bps: 12_000,
            ..RewardPolicy::default()
        };
        assert!(policy.validate().is_err());

        let policy = RewardPolicy {
            winner_bonus_bps: 5_000,
            ..RewardPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_per_player_effective_share() {
        let policy = RewardPolicy::default();
        let directory =
            StaticPremiumDirectory::with_members(vec!["premium_user".to_string()]);

        assert_eq!(
            policy.share_for(directory.is_premium("premium_user")),
            7_800
        );
        assert_eq!(policy.share_for(directory.is_premium("regular_user")), 7_000);
    }
}
