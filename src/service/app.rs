//! Main application state and service coordination
//!
//! Wires the engine components together once at startup and injects them
//! into the AMQP consumer and background sweeps. Nothing here is a
//! global: callers receive handles, which is also what lets tests swap a
//! fake store or publisher underneath.

use crate::amqp::connection::AmqpConnection;
use crate::amqp::handlers::{EngineCommandConsumer, MessageHandler};
use crate::amqp::messages::EndMatchCommand;
use crate::amqp::publisher::{AmqpEventPublisher, EventPublisher, PublisherConfig};
use crate::battle::engine::MatchEngine;
use crate::config::AppConfig;
use crate::error::{BattleError, Result as BattleResult};
use crate::gate::{InMemoryBlockStore, MatchmakingGate};
use crate::lobby::manager::LobbyManager;
use crate::lobby::pairing::FifoLobbyPairer;
use crate::metrics::MetricsCollector;
use crate::rematch::negotiator::RematchNegotiator;
use crate::reward::policy::StaticPremiumDirectory;
use crate::reward::RewardDistributor;
use crate::storage::{BattleStore, InMemoryStore};
use crate::types::{EndTrigger, GiftEvent};
use amqprs::channel::QueueDeclareArguments;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Routes inbound AMQP commands into the engine
struct ProductionMessageHandler {
    match_engine: Arc<MatchEngine>,
    rematch_negotiator: Arc<RematchNegotiator>,
    metrics: Arc<MetricsCollector>,
}

#[async_trait]
impl MessageHandler for ProductionMessageHandler {
    async fn handle_gift(&self, event: GiftEvent) -> BattleResult<()> {
        let result = self.match_engine.record_gift(event.clone()).await;
        self.metrics.record_amqp_message("gift", result.is_ok());

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(
                    "Gift event {} for match {} failed: {}",
                    event.event_id, event.match_id, e
                );
                Err(e)
            }
        }
    }

    async fn handle_end_match(&self, command: EndMatchCommand) -> BattleResult<()> {
        let result = match &command.requested_by {
            Some(user_id) => self
                .rematch_negotiator
                .end_battle(command.match_id, user_id)
                .await
                .map(|_| ()),
            None => self
                .match_engine
                .end_match(command.match_id, EndTrigger::Forced)
                .await
                .map(|_| ()),
        };
        self.metrics
            .record_amqp_message("end_match", result.is_ok());
        result
    }

    async fn handle_error(&self, error: BattleError, message_data: &[u8]) {
        error!(
            "Message handler error - type: '{}', message_size: {} bytes",
            error,
            message_data.len()
        );

        if !message_data.is_empty() {
            let preview_len = std::cmp::min(100, message_data.len());
            let preview = String::from_utf8_lossy(&message_data[..preview_len]);
            error!("Message preview: {:?}", preview);
        }
    }
}

/// Production application state coordinating all service components
pub struct AppState {
    config: AppConfig,
    store: Arc<dyn BattleStore>,
    lobby_manager: Arc<LobbyManager>,
    match_engine: Arc<MatchEngine>,
    reward_distributor: Arc<RewardDistributor>,
    rematch_negotiator: Arc<RematchNegotiator>,
    metrics: Arc<MetricsCollector>,
    amqp_connection: Option<AmqpConnection>,
    consumer: Option<EngineCommandConsumer>,
    running: Arc<RwLock<bool>>,
    started_at: Instant,
    background_tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl AppState {
    /// Initialize all components and connect to the broker
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("Initializing battle engine components...");

        let metrics = Arc::new(MetricsCollector::new()?);

        // Broker connection and publisher
        let amqp_connection = AmqpConnection::new(config.amqp.to_connection_config()).await?;
        let publisher_channel = amqp_connection.open_channel().await?;
        let event_publisher: Arc<dyn EventPublisher> = Arc::new(
            AmqpEventPublisher::new(publisher_channel, PublisherConfig::default()).await?,
        );

        // Inbound command queue
        let consumer_channel = amqp_connection.open_channel().await?;
        let mut queue_args = QueueDeclareArguments::new(&config.amqp.command_queue);
        queue_args.durable(true);
        consumer_channel
            .queue_declare(queue_args)
            .await
            .map_err(|e| BattleError::BrokerConnectionFailed {
                message: format!("Failed to declare command queue: {}", e),
            })?;

        // Single-node row store; a durable backend implements the same
        // BattleStore trait
        let store: Arc<dyn BattleStore> = Arc::new(InMemoryStore::new());
        let gate = Arc::new(MatchmakingGate::new(Arc::new(InMemoryBlockStore::new())));
        let premium = Arc::new(StaticPremiumDirectory::new());

        let lobby_manager = Arc::new(LobbyManager::new(
            store.clone(),
            gate,
            Arc::new(FifoLobbyPairer::new()),
            event_publisher.clone(),
            metrics.clone(),
            config.battle.clone(),
        ));
        let reward_distributor = Arc::new(RewardDistributor::new(
            store.clone(),
            premium,
            config.reward.to_policy(),
        ));
        let match_engine = Arc::new(MatchEngine::new(
            store.clone(),
            event_publisher.clone(),
            reward_distributor.clone(),
            metrics.clone(),
        ));
        let rematch_negotiator = Arc::new(RematchNegotiator::new(
            store.clone(),
            match_engine.clone(),
            lobby_manager.clone(),
            event_publisher,
            metrics.clone(),
            config.battle.clone(),
        ));

        let handler = Arc::new(ProductionMessageHandler {
            match_engine: match_engine.clone(),
            rematch_negotiator: rematch_negotiator.clone(),
            metrics: metrics.clone(),
        });
        let consumer = EngineCommandConsumer::new(handler, consumer_channel);

        Ok(Self {
            config,
            store,
            lobby_manager,
            match_engine,
            reward_distributor,
            rematch_negotiator,
            metrics,
            amqp_connection: Some(amqp_connection),
            consumer: Some(consumer),
            running: Arc::new(RwLock::new(false)),
            started_at: Instant::now(),
            background_tasks: std::sync::Mutex::new(Vec::new()),
        })
    }

    fn track_task(&self, task: JoinHandle<()>) {
        if let Ok(mut tasks) = self.background_tasks.lock() {
            tasks.push(task);
        }
    }

    /// Start consuming commands and run the background sweeps
    pub async fn start(&self) -> Result<()> {
        {
            let mut running = self.running.write().await;
            *running = true;
        }

        if let Some(consumer) = &self.consumer {
            consumer
                .start_consuming(&self.config.amqp.command_queue)
                .await?;
        }

        // Match deadline and rematch expiry sweep
        {
            let engine = self.match_engine.clone();
            let negotiator = self.rematch_negotiator.clone();
            let running = self.running.clone();
            let interval_duration = self.config.battle.sweep_interval();
            self.track_task(tokio::spawn(async move {
                let mut interval = tokio::time::interval(interval_duration);
                loop {
                    interval.tick().await;
                    if !*running.read().await {
                        break;
                    }
                    if let Err(e) = engine.sweep_expired_matches().await {
                        error!("Match deadline sweep failed: {}", e);
                    }
                    if let Err(e) = negotiator.expire_stale_requests().await {
                        error!("Rematch expiry sweep failed: {}", e);
                    }
                }
                debug!("Sweep task stopped");
            }));
        }

        // Idle lobby cleanup, once a minute
        {
            let manager = self.lobby_manager.clone();
            let running = self.running.clone();
            self.track_task(tokio::spawn(async move {
                let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
                loop {
                    interval.tick().await;
                    if !*running.read().await {
                        break;
                    }
                    if let Err(e) = manager.dissolve_idle_lobbies().await {
                        error!("Idle lobby cleanup failed: {}", e);
                    }
                }
                debug!("Lobby cleanup task stopped");
            }));
        }

        // Uptime gauge
        {
            let metrics = self.metrics.clone();
            let running = self.running.clone();
            let started_at = self.started_at;
            self.track_task(tokio::spawn(async move {
                let mut interval = tokio::time::interval(std::time::Duration::from_secs(15));
                loop {
                    interval.tick().await;
                    if !*running.read().await {
                        break;
                    }
                    metrics
                        .service()
                        .uptime_seconds
                        .set(started_at.elapsed().as_secs() as i64);
                }
            }));
        }

        info!("Battle engine service started");
        Ok(())
    }

    /// Stop consumers and background tasks
    pub async fn stop(&self) -> Result<()> {
        {
            let mut running = self.running.write().await;
            *running = false;
        }

        if let Some(consumer) = &self.consumer {
            if let Err(e) = consumer.stop_consuming().await {
                warn!("Failed to stop consumer cleanly: {}", e);
            }
        }

        if let Ok(mut tasks) = self.background_tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }

        info!("Battle engine service stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn BattleStore> {
        self.store.clone()
    }

    pub fn lobby_manager(&self) -> Arc<LobbyManager> {
        self.lobby_manager.clone()
    }

    pub fn match_engine(&self) -> Arc<MatchEngine> {
        self.match_engine.clone()
    }

    pub fn reward_distributor(&self) -> Arc<RewardDistributor> {
        self.reward_distributor.clone()
    }

    pub fn rematch_negotiator(&self) -> Arc<RematchNegotiator> {
        self.rematch_negotiator.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    pub fn has_broker_connection(&self) -> bool {
        self.amqp_connection.is_some()
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}
