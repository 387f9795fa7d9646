//! Reward computation and payout for completed matches
//!
//! The distributor owns the `Reward` rows: created exactly once per
//! participant after a match completes, append-only afterwards.

pub mod distributor;
pub mod policy;

pub use distributor::{DistributionOutcome, RewardDistributor};
pub use policy::{PremiumDirectory, RewardPolicy, StaticPremiumDirectory};

use crate::types::{MatchId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The computed payout credited to one participant of a completed match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub match_id: MatchId,
    pub player_id: UserId,
    /// Payout in öre
    pub amount_ore: i64,
    pub is_winner: bool,
    /// The creator share actually applied, in basis points
    pub creator_share_bps: u32,
    pub created_at: DateTime<Utc>,
}
