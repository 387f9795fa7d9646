//! AMQP integration for the battle engine
//!
//! Handles the broker connection, inbound command consumption, outbound
//! event publishing, and per-match topic subscriptions.

pub mod connection;
pub mod handlers;
pub mod messages;
pub mod publisher;
pub mod subscription;

// Re-export commonly used types
pub use connection::{AmqpConfig, AmqpConnection};
pub use handlers::MessageHandler;
pub use messages::*;
pub use publisher::EventPublisher;
pub use subscription::MatchSubscription;
