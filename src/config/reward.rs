//! Reward payout settings

use crate::reward::RewardPolicy;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Payout split settings, all in basis points
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardSettings {
    /// Creator share of gifted value for standard members
    pub creator_share_bps: u32,
    /// Creator share for premium members
    pub premium_creator_share_bps: u32,
    /// Multiplier applied to winning-team payouts
    pub winner_bonus_bps: u32,
}

impl Default for RewardSettings {
    fn default() -> Self {
        let policy = RewardPolicy::default();
        Self {
            creator_share_bps: policy.creator_share_bps,
            premium_creator_share_bps: policy.premium_creator_share_bps,
            winner_bonus_bps: policy.winner_bonus_bps,
        }
    }
}

impl RewardSettings {
    pub fn to_policy(&self) -> RewardPolicy {
        RewardPolicy {
            creator_share_bps: self.creator_share_bps,
            premium_creator_share_bps: self.premium_creator_share_bps,
            winner_bonus_bps: self.winner_bonus_bps,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.to_policy().validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_policy() {
        let settings = RewardSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.creator_share_bps, 7_000);
        assert_eq!(settings.premium_creator_share_bps, 7_800);
    }
}
