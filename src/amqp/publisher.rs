//! AMQP event publisher for outbound events
//!
//! The engine's contract with the broadcast boundary: the corresponding
//! row write must have been acknowledged durable before `publish` is
//! called. Publishing never precedes persistence.

use crate::amqp::messages::{MessageEnvelope, MessageUtils};
use crate::error::{BattleError, Result};
use crate::types::BattleEvent;
use amqprs::{
    channel::{BasicPublishArguments, Channel, ExchangeDeclareArguments},
    BasicProperties,
};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Trait for publishing battle events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one durable-state-change event to its per-entity topic
    async fn publish(&self, event: BattleEvent) -> Result<()>;
}

/// Configuration for event publishing
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub enable_deduplication: bool,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 500,
            enable_deduplication: true,
        }
    }
}

/// AMQP-based event publisher implementation
pub struct AmqpEventPublisher {
    channel: Channel,
    config: PublisherConfig,
    published_messages: std::sync::Mutex<std::collections::HashSet<String>>, // For deduplication
}

impl AmqpEventPublisher {
    /// Create a new event publisher
    pub async fn new(channel: Channel, config: PublisherConfig) -> Result<Self> {
        let publisher = Self {
            channel,
            config,
            published_messages: std::sync::Mutex::new(std::collections::HashSet::new()),
        };

        publisher.setup_exchanges().await?;
        Ok(publisher)
    }

    /// Set up AMQP topic exchanges for events
    async fn setup_exchanges(&self) -> Result<()> {
        for exchange in [
            crate::amqp::messages::LOBBY_EVENTS_EXCHANGE,
            crate::amqp::messages::MATCH_EVENTS_EXCHANGE,
        ] {
            let args = ExchangeDeclareArguments::new(exchange, "topic");
            self.channel.exchange_declare(args).await.map_err(|e| {
                BattleError::BrokerConnectionFailed {
                    message: format!("Failed to declare exchange {}: {}", exchange, e),
                }
            })?;
        }

        info!("Successfully set up AMQP exchanges");
        Ok(())
    }

    /// Publish to an exchange with retry logic
    async fn publish_to_exchange(
        &self,
        exchange: &str,
        envelope: &MessageEnvelope<BattleEvent>,
    ) -> Result<()> {
        if self.config.enable_deduplication {
            let published_messages =
                self.published_messages
                    .lock()
                    .map_err(|_| BattleError::InternalError {
                        message: "Failed to acquire published messages lock".to_string(),
                    })?;
            if published_messages.contains(&envelope.correlation_id) {
                debug!(
                    "Message {} already published, skipping",
                    envelope.correlation_id
                );
                return Ok(());
            }
        }

        let mut retry_count = 0;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        loop {
            match self.try_publish(exchange, envelope).await {
                Ok(_) => {
                    if self.config.enable_deduplication {
                        let mut published_messages =
                            self.published_messages.lock().map_err(|_| {
                                BattleError::InternalError {
                                    message: "Failed to acquire published messages lock"
                                        .to_string(),
                                }
                            })?;
                        published_messages.insert(envelope.correlation_id.clone());
                    }

                    debug!(
                        "Published message {} to exchange {} (key: {})",
                        envelope.correlation_id, exchange, envelope.routing_key
                    );
                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        error!(
                            "Failed to publish message {} after {} retries: {}",
                            envelope.correlation_id, self.config.max_retries, e
                        );
                        return Err(e);
                    }

                    warn!(
                        "Publish attempt {} failed for message {}: {}. Retrying in {:?}",
                        retry_count, envelope.correlation_id, e, delay
                    );

                    sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as u64 * 2).min(5000));
                }
            }
        }
    }

    /// Single publish attempt
    async fn try_publish(
        &self,
        exchange: &str,
        envelope: &MessageEnvelope<BattleEvent>,
    ) -> Result<()> {
        let payload = envelope.to_bytes()?;

        let args = BasicPublishArguments::new(exchange, &envelope.routing_key);
        let mut properties = BasicProperties::default();
        properties
            .with_message_id(&envelope.correlation_id)
            .with_timestamp(envelope.timestamp.timestamp() as u64)
            .with_content_type("application/json");

        self.channel
            .basic_publish(properties, payload, args)
            .await
            .map_err(|e| BattleError::BrokerConnectionFailed {
                message: format!("Failed to publish message: {}", e),
            })?;

        Ok(())
    }

    /// Clear deduplication cache (useful for testing or memory management)
    pub fn clear_deduplication_cache(&self) {
        if let Ok(mut published_messages) = self.published_messages.lock() {
            published_messages.clear();
        }
    }
}

#[async_trait]
impl EventPublisher for AmqpEventPublisher {
    async fn publish(&self, event: BattleEvent) -> Result<()> {
        let exchange = MessageUtils::exchange_for(&event);
        let routing_key = MessageUtils::routing_key_for(&event);
        let envelope = MessageEnvelope::new(event, routing_key);
        self.publish_to_exchange(exchange, &envelope).await
    }
}

/// Mock event publisher for testing
#[derive(Debug, Default)]
pub struct MockEventPublisher {
    published_events: std::sync::Mutex<Vec<BattleEvent>>,
}

impl MockEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all published events (for testing)
    pub fn published_events(&self) -> Vec<BattleEvent> {
        self.published_events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Count events matching a predicate (for testing)
    pub fn count_events<F: Fn(&BattleEvent) -> bool>(&self, predicate: F) -> usize {
        self.published_events()
            .iter()
            .filter(|e| predicate(e))
            .count()
    }

    /// Clear published events (for testing)
    pub fn clear_events(&self) {
        if let Ok(mut events) = self.published_events.lock() {
            events.clear();
        }
    }
}

#[async_trait]
impl EventPublisher for MockEventPublisher {
    async fn publish(&self, event: BattleEvent) -> Result<()> {
        if let Ok(mut events) = self.published_events.lock() {
            events.push(event);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PlayerJoinedLobby, TeamSide};
    use crate::utils;

    fn test_event() -> BattleEvent {
        BattleEvent::PlayerJoinedLobby(PlayerJoinedLobby {
            lobby_id: utils::generate_lobby_id(),
            user_id: "u1".to_string(),
            side: TeamSide::TeamA,
            team_a_players: vec!["u1".to_string()],
            team_b_players: vec![],
            timestamp: utils::current_timestamp(),
        })
    }

    #[test]
    fn test_publisher_config_default() {
        let config = PublisherConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_ms, 500);
        assert!(config.enable_deduplication);
    }

    #[tokio::test]
    async fn test_mock_publisher_records_events() {
        let publisher = MockEventPublisher::new();
        publisher.publish(test_event()).await.unwrap();

        assert_eq!(publisher.published_events().len(), 1);
        assert_eq!(
            publisher.count_events(|e| matches!(e, BattleEvent::PlayerJoinedLobby(_))),
            1
        );

        publisher.clear_events();
        assert!(publisher.published_events().is_empty());
    }

    // Integration tests with an actual AMQP broker live in tests/
}
