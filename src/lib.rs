//! Roast Battle - Battle matchmaking and live reward-scoring engine
//!
//! This crate provides the battle subsystem of the Roast Live streaming
//! platform: matchmaking gate, lobby lifecycle, real-time gift-driven
//! scoring, proportional reward payout, and rematch negotiation.

pub mod amqp;
pub mod battle;
pub mod config;
pub mod error;
pub mod gate;
pub mod lobby;
pub mod metrics;
pub mod rematch;
pub mod reward;
pub mod service;
pub mod storage;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{BattleError, Result};
pub use types::*;

// Re-export key components
pub use amqp::publisher::EventPublisher;
pub use battle::{BattleMatch, MatchEngine};
pub use gate::MatchmakingGate;
pub use lobby::{Lobby, LobbyManager};
pub use rematch::RematchNegotiator;
pub use reward::RewardDistributor;
pub use storage::{BattleStore, InMemoryStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
