//! Battle lifecycle settings
//!
//! Durations governing the match clock, the rematch handshake expiry, and
//! the background sweeps.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Battle lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleSettings {
    /// Length of a timed match in seconds
    pub match_duration_seconds: u64,
    /// How long a single-sided rematch request stays pending before the
    /// sweep resets it
    pub rematch_expiry_seconds: u64,
    /// Matchmaking cooldown applied when a user declines an offered match
    pub decline_block_seconds: u64,
    /// Open lobbies without activity beyond this are dissolved
    pub lobby_idle_timeout_seconds: u64,
    /// Interval of the match-deadline and rematch-expiry sweeps
    pub sweep_interval_seconds: u64,
}

impl Default for BattleSettings {
    fn default() -> Self {
        Self {
            match_duration_seconds: 300,   // 5 minutes
            rematch_expiry_seconds: 120,   // 2 minutes
            decline_block_seconds: 180,    // 3 minutes
            lobby_idle_timeout_seconds: 1800, // 30 minutes
            sweep_interval_seconds: 5,
        }
    }
}

impl BattleSettings {
    pub fn validate(&self) -> Result<()> {
        if self.match_duration_seconds == 0 {
            return Err(anyhow!("Match duration must be greater than 0"));
        }
        if self.rematch_expiry_seconds == 0 {
            return Err(anyhow!("Rematch expiry must be greater than 0"));
        }
        if self.sweep_interval_seconds == 0 {
            return Err(anyhow!("Sweep interval must be greater than 0"));
        }
        Ok(())
    }

    pub fn match_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.match_duration_seconds as i64)
    }

    pub fn rematch_expiry(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.rematch_expiry_seconds as i64)
    }

    pub fn lobby_idle_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lobby_idle_timeout_seconds as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}
