//! AMQP message handlers for inbound engine commands
//!
//! Every viewer's gift purchase arrives as an independent message on the
//! engine command queue; the consumer forwards each to the handler, which
//! applies it through the match engine's atomic accumulators.

use crate::amqp::messages::{EndMatchCommand, EngineCommand, MessageUtils};
use crate::error::{BattleError, Result};
use crate::types::GiftEvent;
use amqprs::{
    channel::{BasicCancelArguments, BasicConsumeArguments, Channel},
    consumer::AsyncConsumer,
    BasicProperties, Deliver,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Trait defining the interface for handling inbound engine commands
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle a qualifying gift event for an active match
    async fn handle_gift(&self, event: GiftEvent) -> Result<()>;

    /// Handle an end-match request (leader action or platform-forced)
    async fn handle_end_match(&self, command: EndMatchCommand) -> Result<()>;

    /// Handle processing errors
    async fn handle_error(&self, error: BattleError, message_data: &[u8]);
}

/// Consumer for the engine command queue
pub struct EngineCommandConsumer {
    handler: Arc<dyn MessageHandler>,
    channel: Channel,
    consumer_tag: String,
}

impl EngineCommandConsumer {
    /// Create a new engine command consumer
    pub fn new(handler: Arc<dyn MessageHandler>, channel: Channel) -> Self {
        let consumer_tag = format!("engine-consumer-{}", uuid::Uuid::new_v4());

        Self {
            handler,
            channel,
            consumer_tag,
        }
    }

    /// Start consuming messages from the queue
    pub async fn start_consuming(&self, queue_name: &str) -> Result<()> {
        let args = BasicConsumeArguments::new(queue_name, &self.consumer_tag);

        self.channel
            .basic_consume(CommandConsumer::new(self.handler.clone()), args)
            .await
            .map_err(|e| BattleError::BrokerConnectionFailed {
                message: format!("Failed to start consuming: {}", e),
            })?;

        info!("Started consuming commands from queue: {}", queue_name);
        Ok(())
    }

    /// Stop consuming messages
    pub async fn stop_consuming(&self) -> Result<()> {
        let args = BasicCancelArguments::new(&self.consumer_tag);

        self.channel.basic_cancel(args).await.map_err(|e| {
            BattleError::BrokerConnectionFailed {
                message: format!("Failed to stop consuming: {}", e),
            }
        })?;

        info!("Stopped consuming commands");
        Ok(())
    }
}

/// Internal consumer implementation
struct CommandConsumer {
    handler: Arc<dyn MessageHandler>,
}

impl CommandConsumer {
    fn new(handler: Arc<dyn MessageHandler>) -> Self {
        Self { handler }
    }

    /// Process an incoming message
    async fn process_message(&self, content: &[u8]) -> Result<()> {
        let command = MessageUtils::deserialize_command(content)?;

        match command {
            EngineCommand::Gift(event) => {
                debug!(
                    "Gift event parsed - event_id: {}, match: {}, recipient: '{}', value: {} öre",
                    event.event_id, event.match_id, event.recipient_id, event.value_ore
                );
                self.handler.handle_gift(event).await
            }
            EngineCommand::EndMatch(command) => {
                debug!(
                    "End-match command parsed - match: {}, requested_by: {:?}",
                    command.match_id, command.requested_by
                );
                self.handler.handle_end_match(command).await
            }
        }
    }
}

#[async_trait]
impl AsyncConsumer for CommandConsumer {
    async fn consume(
        &mut self,
        _channel: &Channel,
        deliver: Deliver,
        _basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        let delivery_tag = deliver.delivery_tag();
        let routing_key = deliver.routing_key();

        debug!(
            "AMQP message received - delivery_tag: {}, routing_key: '{}', size: {} bytes",
            delivery_tag,
            routing_key,
            content.len()
        );

        if let Err(e) = self.process_message(&content).await {
            error!(
                "Command processing failed - delivery_tag: {}, error: {}",
                delivery_tag, e
            );
            self.handler
                .handle_error(
                    BattleError::InternalError {
                        message: e.to_string(),
                    },
                    &content,
                )
                .await;
        }
    }
}
