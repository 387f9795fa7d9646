//! Main application configuration
//!
//! Configuration loads from environment variables with fallback to
//! defaults, or from a TOML file; CLI flags may override on top.

use crate::config::battle::BattleSettings;
use crate::config::reward::RewardSettings;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub amqp: AmqpSettings,
    pub battle: BattleSettings,
    pub reward: RewardSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for the health/metrics endpoint
    pub health_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// AMQP connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmqpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vhost: String,
    /// Queue name for inbound gift events and end-match commands
    pub command_queue: String,
    /// Connection timeout in seconds
    pub connection_timeout_seconds: u64,
    /// Maximum retry attempts for failed operations
    pub max_retry_attempts: u32,
    /// Retry delay in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "roast-battle".to_string(),
            log_level: "info".to_string(),
            health_port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for AmqpSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            username: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
            command_queue: crate::amqp::messages::ENGINE_COMMAND_QUEUE.to_string(),
            connection_timeout_seconds: 30,
            max_retry_attempts: 5,
            retry_delay_ms: 1000,
        }
    }
}

impl AmqpSettings {
    /// Connection parameters for the AMQP layer
    pub fn to_connection_config(&self) -> crate::amqp::AmqpConfig {
        crate::amqp::AmqpConfig {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            vhost: self.vhost.clone(),
            max_retries: self.max_retry_attempts,
            retry_delay_ms: self.retry_delay_ms,
            connection_timeout_ms: self.connection_timeout_seconds * 1000,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.service.log_level = log_level;
        }
        if let Ok(port) = env::var("HEALTH_PORT") {
            config.service.health_port = port
                .parse()
                .map_err(|_| anyhow!("Invalid HEALTH_PORT value: {}", port))?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            config.service.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        // AMQP settings
        if let Ok(host) = env::var("AMQP_HOST") {
            config.amqp.host = host;
        }
        if let Ok(port) = env::var("AMQP_PORT") {
            config.amqp.port = port
                .parse()
                .map_err(|_| anyhow!("Invalid AMQP_PORT value: {}", port))?;
        }
        if let Ok(username) = env::var("AMQP_USERNAME") {
            config.amqp.username = username;
        }
        if let Ok(password) = env::var("AMQP_PASSWORD") {
            config.amqp.password = password;
        }
        if let Ok(vhost) = env::var("AMQP_VHOST") {
            config.amqp.vhost = vhost;
        }
        if let Ok(queue) = env::var("AMQP_COMMAND_QUEUE") {
            config.amqp.command_queue = queue;
        }
        if let Ok(retries) = env::var("AMQP_MAX_RETRY_ATTEMPTS") {
            config.amqp.max_retry_attempts = retries
                .parse()
                .map_err(|_| anyhow!("Invalid AMQP_MAX_RETRY_ATTEMPTS value: {}", retries))?;
        }
        if let Ok(delay) = env::var("AMQP_RETRY_DELAY_MS") {
            config.amqp.retry_delay_ms = delay
                .parse()
                .map_err(|_| anyhow!("Invalid AMQP_RETRY_DELAY_MS value: {}", delay))?;
        }

        // Battle settings
        if let Ok(duration) = env::var("MATCH_DURATION_SECONDS") {
            config.battle.match_duration_seconds = duration
                .parse()
                .map_err(|_| anyhow!("Invalid MATCH_DURATION_SECONDS value: {}", duration))?;
        }
        if let Ok(expiry) = env::var("REMATCH_EXPIRY_SECONDS") {
            config.battle.rematch_expiry_seconds = expiry
                .parse()
                .map_err(|_| anyhow!("Invalid REMATCH_EXPIRY_SECONDS value: {}", expiry))?;
        }
        if let Ok(block) = env::var("DECLINE_BLOCK_SECONDS") {
            config.battle.decline_block_seconds = block
                .parse()
                .map_err(|_| anyhow!("Invalid DECLINE_BLOCK_SECONDS value: {}", block))?;
        }

        // Reward settings
        if let Ok(share) = env::var("CREATOR_SHARE_BPS") {
            config.reward.creator_share_bps = share
                .parse()
                .map_err(|_| anyhow!("Invalid CREATOR_SHARE_BPS value: {}", share))?;
        }
        if let Ok(share) = env::var("PREMIUM_CREATOR_SHARE_BPS") {
            config.reward.premium_creator_share_bps = share
                .parse()
                .map_err(|_| anyhow!("Invalid PREMIUM_CREATOR_SHARE_BPS value: {}", share))?;
        }
        if let Ok(bonus) = env::var("WINNER_BONUS_BPS") {
            config.reward.winner_bonus_bps = bonus
                .parse()
                .map_err(|_| anyhow!("Invalid WINNER_BONUS_BPS value: {}", bonus))?;
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;
        let config: AppConfig =
            toml::from_str(&content).context("Failed to parse TOML configuration")?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    // Validate ports
    if config.service.health_port == 0 {
        return Err(anyhow!("Health port cannot be 0"));
    }

    // Validate timeouts
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }
    if config.amqp.connection_timeout_seconds == 0 {
        return Err(anyhow!("AMQP connection timeout must be greater than 0"));
    }

    // Validate AMQP settings
    if config.amqp.host.is_empty() {
        return Err(anyhow!("AMQP host cannot be empty"));
    }
    if config.amqp.command_queue.is_empty() {
        return Err(anyhow!("AMQP command queue name cannot be empty"));
    }

    config.battle.validate()?;
    config.reward.validate()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.service.name, "roast-battle");
        assert_eq!(config.amqp.command_queue, "battle.engine_commands");
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut config = AppConfig::default();
        config.service.log_level = "verbose".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_reward_split_rejected() {
        let mut config = AppConfig::default();
        config.reward.creator_share_bps = 20_000;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = AppConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.service.name, config.service.name);
        assert_eq!(
            parsed.battle.match_duration_seconds,
            config.battle.match_duration_seconds
        );
    }
}
