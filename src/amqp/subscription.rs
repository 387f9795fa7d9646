//! Per-match topic subscriptions for connected client sessions
//!
//! Each session binds a private auto-delete queue to the match events
//! exchange with the `match.<id>.*` pattern and tears it down explicitly
//! on disconnect, so abandoned sessions never leak bindings.

use crate::amqp::messages::{MessageEnvelope, MessageUtils, MATCH_EVENTS_EXCHANGE};
use crate::error::{BattleError, Result};
use crate::types::{BattleEvent, MatchId};
use amqprs::{
    channel::{
        BasicCancelArguments, BasicConsumeArguments, Channel, QueueBindArguments,
        QueueDeclareArguments,
    },
    consumer::AsyncConsumer,
    BasicProperties, Deliver,
};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

/// Live subscription to one match's event topic
pub struct MatchSubscription {
    channel: Channel,
    match_id: MatchId,
    queue_name: String,
    consumer_tag: String,
    receiver: Option<mpsc::UnboundedReceiver<MessageEnvelope<BattleEvent>>>,
}

impl MatchSubscription {
    /// Bind a private queue to the match topic and start delivering events
    pub async fn subscribe(channel: Channel, match_id: MatchId) -> Result<Self> {
        let queue_name = format!("match.{}.session-{}", match_id, uuid::Uuid::new_v4());
        let consumer_tag = format!("match-subscriber-{}", uuid::Uuid::new_v4());

        let mut declare_args = QueueDeclareArguments::new(&queue_name);
        declare_args.exclusive(true).auto_delete(true);
        channel.queue_declare(declare_args).await.map_err(|e| {
            BattleError::BrokerConnectionFailed {
                message: format!("Failed to declare subscription queue: {}", e),
            }
        })?;

        let pattern = MessageUtils::match_binding_pattern(match_id);
        channel
            .queue_bind(QueueBindArguments::new(
                &queue_name,
                MATCH_EVENTS_EXCHANGE,
                &pattern,
            ))
            .await
            .map_err(|e| BattleError::BrokerConnectionFailed {
                message: format!("Failed to bind subscription queue: {}", e),
            })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let consume_args = BasicConsumeArguments::new(&queue_name, &consumer_tag);
        channel
            .basic_consume(ForwardingConsumer { tx }, consume_args)
            .await
            .map_err(|e| BattleError::BrokerConnectionFailed {
                message: format!("Failed to start subscription consumer: {}", e),
            })?;

        info!(
            "Subscribed to match {} events (queue: {}, pattern: {})",
            match_id, queue_name, pattern
        );

        Ok(Self {
            channel,
            match_id,
            queue_name,
            consumer_tag,
            receiver: Some(rx),
        })
    }

    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    /// Take the event stream; yields each broadcast envelope in order of
    /// delivery. Can be taken once.
    pub fn events(&mut self) -> Option<UnboundedReceiverStream<MessageEnvelope<BattleEvent>>> {
        self.receiver.take().map(UnboundedReceiverStream::new)
    }

    /// Explicit teardown: cancel the consumer so the auto-delete queue and
    /// its binding are released immediately.
    pub async fn unsubscribe(self) -> Result<()> {
        self.channel
            .basic_cancel(BasicCancelArguments::new(&self.consumer_tag))
            .await
            .map_err(|e| BattleError::BrokerConnectionFailed {
                message: format!("Failed to cancel subscription consumer: {}", e),
            })?;

        info!(
            "Unsubscribed from match {} events (queue: {})",
            self.match_id, self.queue_name
        );
        Ok(())
    }
}

/// Forwards delivered envelopes into the session's event stream
struct ForwardingConsumer {
    tx: mpsc::UnboundedSender<MessageEnvelope<BattleEvent>>,
}

#[async_trait]
impl AsyncConsumer for ForwardingConsumer {
    async fn consume(
        &mut self,
        _channel: &Channel,
        deliver: Deliver,
        _basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        match MessageEnvelope::<BattleEvent>::from_bytes(&content) {
            Ok(envelope) => {
                debug!(
                    "Delivering event {} to subscriber (key: {})",
                    envelope.correlation_id, envelope.routing_key
                );
                if self.tx.send(envelope).is_err() {
                    // Session stream dropped without unsubscribe
                    warn!(
                        "Subscriber stream closed, dropping delivery {}",
                        deliver.delivery_tag()
                    );
                }
            }
            Err(e) => {
                warn!(
                    "Failed to decode broadcast envelope (delivery_tag {}): {}",
                    deliver.delivery_tag(),
                    e
                );
            }
        }
    }
}
