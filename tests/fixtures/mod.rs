//! Test fixtures wiring a complete in-memory battle system

use roast_battle::amqp::publisher::MockEventPublisher;
use roast_battle::battle::engine::MatchEngine;
use roast_battle::config::BattleSettings;
use roast_battle::gate::{InMemoryBlockStore, MatchmakingGate};
use roast_battle::lobby::manager::LobbyManager;
use roast_battle::lobby::pairing::FifoLobbyPairer;
use roast_battle::metrics::MetricsCollector;
use roast_battle::rematch::negotiator::RematchNegotiator;
use roast_battle::reward::policy::{RewardPolicy, StaticPremiumDirectory};
use roast_battle::reward::RewardDistributor;
use roast_battle::storage::InMemoryStore;
use roast_battle::types::{BattleEvent, GiftEvent, MatchId, UserId};
use roast_battle::utils::current_timestamp;
use std::sync::Arc;
use uuid::Uuid;

/// A fully wired engine over the in-memory store and a mock broker
pub struct BattleSystem {
    pub store: Arc<InMemoryStore>,
    pub blocks: Arc<InMemoryBlockStore>,
    pub publisher: Arc<MockEventPublisher>,
    pub manager: Arc<LobbyManager>,
    pub engine: Arc<MatchEngine>,
    pub distributor: Arc<RewardDistributor>,
    pub negotiator: Arc<RematchNegotiator>,
}

impl BattleSystem {
    pub fn new() -> Self {
        Self::with_premium_members(Vec::new())
    }

    pub fn with_premium_members(premium_members: Vec<UserId>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let blocks = Arc::new(InMemoryBlockStore::new());
        let publisher = Arc::new(MockEventPublisher::new());
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let settings = BattleSettings::default();

        let gate = Arc::new(MatchmakingGate::new(blocks.clone()));
        let manager = Arc::new(LobbyManager::new(
            store.clone(),
            gate,
            Arc::new(FifoLobbyPairer::new()),
            publisher.clone(),
            metrics.clone(),
            settings.clone(),
        ));
        let distributor = Arc::new(RewardDistributor::new(
            store.clone(),
            Arc::new(StaticPremiumDirectory::with_members(premium_members)),
            RewardPolicy::default(),
        ));
        let engine = Arc::new(MatchEngine::new(
            store.clone(),
            publisher.clone(),
            distributor.clone(),
            metrics.clone(),
        ));
        let negotiator = Arc::new(RematchNegotiator::new(
            store.clone(),
            engine.clone(),
            manager.clone(),
            publisher.clone(),
            metrics,
            settings,
        ));

        Self {
            store,
            blocks,
            publisher,
            manager,
            engine,
            distributor,
            negotiator,
        }
    }

    /// The most recently started match, read from the broadcast stream
    pub fn latest_started_match(&self) -> Option<MatchId> {
        self.publisher
            .published_events()
            .into_iter()
            .rev()
            .find_map(|event| match event {
                BattleEvent::MatchStarted(started) => Some(started.match_id),
                _ => None,
            })
    }
}

/// A gift aimed at one battler, with score pegged to öre / 100
pub fn gift(match_id: MatchId, recipient: &str, value_ore: i64) -> GiftEvent {
    GiftEvent {
        event_id: Uuid::new_v4(),
        match_id,
        sender_id: format!("viewer-{}", Uuid::new_v4()),
        recipient_id: recipient.to_string(),
        value_ore,
        score: value_ore / 100,
        timestamp: current_timestamp(),
    }
}
