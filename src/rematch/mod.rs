//! Rematch negotiation between team leaders

pub mod negotiator;

pub use negotiator::{RematchNegotiator, RematchOutcome};

#[cfg(test)]
mod tests {
    use crate::amqp::publisher::MockEventPublisher;
    use crate::battle::engine::MatchEngine;
    use crate::config::BattleSettings;
    use crate::error::BattleError;
    use crate::gate::{InMemoryBlockStore, MatchmakingGate};
    use crate::lobby::manager::LobbyManager;
    use crate::lobby::pairing::FifoLobbyPairer;
    use crate::metrics::MetricsCollector;
    use crate::rematch::negotiator::RematchNegotiator;
    use crate::reward::policy::{RewardPolicy, StaticPremiumDirectory};
    use crate::reward::RewardDistributor;
    use crate::storage::{BattleStore, InMemoryStore};
    use crate::types::{
        BattleEvent, BattleFormat, EndTrigger, ExitDestination, MatchId, RematchState, TeamSide,
    };
    use std::sync::Arc;

    struct TestRig {
        negotiator: RematchNegotiator,
        engine: Arc<MatchEngine>,
        manager: Arc<LobbyManager>,
        store: Arc<InMemoryStore>,
        publisher: Arc<MockEventPublisher>,
    }

    fn test_rig() -> TestRig {
        let store = Arc::new(InMemoryStore::new());
        let publisher = Arc::new(MockEventPublisher::new());
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let gate = Arc::new(MatchmakingGate::new(Arc::new(InMemoryBlockStore::new())));
        let settings = BattleSettings::default();

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
            Arc::new(StaticPremiumDirectory::new()),
            RewardPolicy::default(),
        ));
        let engine = Arc::new(MatchEngine::new(
            store.clone(),
            publisher.clone(),
            distributor,
            metrics.clone(),
        ));
        let negotiator = RematchNegotiator::new(
            store.clone(),
            engine.clone(),
            manager.clone(),
            publisher.clone(),
            metrics,
            settings,
        );

        TestRig {
            negotiator,
            engine,
            manager,
            store,
            publisher,
        }
    }

    /// Direct 1v1 challenge driven to completion
    async fn completed_match(rig: &TestRig) -> MatchId {
        let lobby = rig
            .manager
            .create_lobby("u1".to_string(), BattleFormat::OneVsOne, true, None)
            .await
            .unwrap();
        rig.manager
            .join_lobby(lobby.id, "u2".to_string(), Some(TeamSide::TeamB))
            .await
            .unwrap();

        // The promoted match is the only one in the store
        let started = rig
            .publisher
            .published_events()
            .into_iter()
            .find_map(|e| match e {
                BattleEvent::MatchStarted(started) => Some(started.match_id),
                _ => None,
            })
            .unwrap();

        rig.engine
            .end_match(started, EndTrigger::LeaderAction)
            .await
            .unwrap();
        started
    }

    #[tokio::test]
    async fn test_one_sided_request_waits() {
        let rig = test_rig();
        let match_id = completed_match(&rig).await;

        let outcome = rig.negotiator.request_rematch(match_id, "u1").await.unwrap();
        assert_eq!(outcome.state, RematchState::TeamA);
        assert!(outcome.new_match_id.is_none());

        // Repeating the same request changes nothing
        let again = rig.negotiator.request_rematch(match_id, "u1").await.unwrap();
        assert_eq!(again.state, RematchState::TeamA);
    }

    #[tokio::test]
    async fn test_non_leader_rejected_with_state_unchanged() {
        let rig = test_rig();
        let match_id = completed_match(&rig).await;

        let err = rig
            .negotiator
            .request_rematch(match_id, "viewer_99")
            .await
            .unwrap_err()
            .downcast::<BattleError>()
            .unwrap();
        assert!(matches!(err, BattleError::PermissionDenied { .. }));

        let battle = rig.engine.require_match(match_id).await.unwrap();
        assert_eq!(battle.rematch, RematchState::None);
    }

    #[tokio::test]
    async fn test_active_match_cannot_rematch() {
        let rig = test_rig();
        let lobby = rig
            .manager
            .create_lobby("u1".to_string(), BattleFormat::OneVsOne, true, None)
            .await
            .unwrap();
        rig.manager
            .join_lobby(lobby.id, "u2".to_string(), Some(TeamSide::TeamB))
            .await
            .unwrap();
        let match_id = rig
            .publisher
            .published_events()
            .into_iter()
            .find_map(|e| match e {
                BattleEvent::MatchStarted(started) => Some(started.match_id),
                _ => None,
            })
            .unwrap();

        assert!(rig.negotiator.request_rematch(match_id, "u1").await.is_err());
    }

    #[tokio::test]
    async fn test_both_leaders_spawn_new_match() {
        let rig = test_rig();
        let match_id = completed_match(&rig).await;

        rig.negotiator.request_rematch(match_id, "u1").await.unwrap();
        let outcome = rig.negotiator.request_rematch(match_id, "u2").await.unwrap();

        assert_eq!(outcome.state, RematchState::Both);
        let new_match_id = outcome.new_match_id.unwrap();
        assert_ne!(new_match_id, match_id);

        // The new match carries the same rosters and starts active
        let new_match = rig.engine.require_match(new_match_id).await.unwrap();
        assert_eq!(new_match.team_a_players, vec!["u1".to_string()]);
        assert_eq!(new_match.team_b_players, vec!["u2".to_string()]);

        // The old match is left untouched, terminal and historical
        let old = rig.engine.require_match(match_id).await.unwrap();
        assert!(old.winner.is_some());
        assert_eq!(old.rematch, RematchState::Both);

        assert_eq!(
            rig.publisher
                .count_events(|e| matches!(e, BattleEvent::RematchAccepted(_))),
            1
        );
    }

    #[tokio::test]
    async fn test_end_battle_routes_home_and_clears_pending() {
        let rig = test_rig();
        let match_id = completed_match(&rig).await;

        rig.negotiator.request_rematch(match_id, "u1").await.unwrap();
        let destination = rig.negotiator.end_battle(match_id, "u2").await.unwrap();
        assert_eq!(destination, ExitDestination::Home);

        let battle = rig.engine.require_match(match_id).await.unwrap();
        assert_eq!(battle.rematch, RematchState::None);

        // With the lobby archived, both users are free to matchmake again
        assert!(rig.store.lobby_for_user("u1").await.unwrap().is_none());
        assert!(rig.store.lobby_for_user("u2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_end_battle_routes_back_to_solo_stream() {
        let rig = test_rig();
        let stream_id = uuid::Uuid::new_v4();

        let lobby = rig
            .manager
            .create_lobby(
                "u1".to_string(),
                BattleFormat::OneVsOne,
                true,
                Some(stream_id),
            )
            .await
            .unwrap();
        rig.manager
            .join_lobby(lobby.id, "u2".to_string(), Some(TeamSide::TeamB))
            .await
            .unwrap();
        let match_id = rig
            .publisher
            .published_events()
            .into_iter()
            .find_map(|e| match e {
                BattleEvent::MatchStarted(started) => Some(started.match_id),
                _ => None,
            })
            .unwrap();

        // Force-end during the active match routes to the original stream
        let destination = rig.negotiator.end_battle(match_id, "u1").await.unwrap();
        assert_eq!(destination, ExitDestination::SoloStream { stream_id });

        let battle = rig.engine.require_match(match_id).await.unwrap();
        assert!(battle.winner.is_some());
    }

    #[tokio::test]
    async fn test_non_leader_cannot_end_while_leader_present() {
        let rig = test_rig();
        let lobby = rig
            .manager
            .create_lobby("u1".to_string(), BattleFormat::TwoVsTwo, true, None)
            .await
            .unwrap();
        rig.manager
            .join_lobby(lobby.id, "u2".to_string(), Some(TeamSide::TeamA))
            .await
            .unwrap();
        rig.manager
            .join_lobby(lobby.id, "u3".to_string(), Some(TeamSide::TeamB))
            .await
            .unwrap();
        rig.manager
            .join_lobby(lobby.id, "u4".to_string(), Some(TeamSide::TeamB))
            .await
            .unwrap();

        let match_id = rig
            .publisher
            .published_events()
            .into_iter()
            .find_map(|e| match e {
                BattleEvent::MatchStarted(started) => Some(started.match_id),
                _ => None,
            })
            .unwrap();

        // u2 is a participant but not a leader, and u1 still holds the lobby
        let err = rig
            .negotiator
            .end_battle(match_id, "u2")
            .await
            .unwrap_err()
            .downcast::<BattleError>()
            .unwrap();
        assert!(matches!(err, BattleError::PermissionDenied { .. }));

        // The leader may end at any time
        assert!(rig.negotiator.end_battle(match_id, "u1").await.is_ok());
    }

    #[tokio::test]
    async fn test_stale_request_expires() {
        let rig = test_rig();
        let match_id = completed_match(&rig).await;

        rig.negotiator.request_rematch(match_id, "u1").await.unwrap();

        // Nothing stale yet
        assert_eq!(rig.negotiator.expire_stale_requests().await.unwrap(), 0);

        // Backdate the pending request beyond the TTL
        {
            let battle = rig.engine.require_match(match_id).await.unwrap();
            let mut aged = battle.clone();
            aged.rematch_requested_at = Some(
                crate::utils::current_timestamp() - chrono::Duration::seconds(600),
            );
            rig.store.insert_match(aged).await.unwrap();
        }

        assert_eq!(rig.negotiator.expire_stale_requests().await.unwrap(), 1);
        let battle = rig.engine.require_match(match_id).await.unwrap();
        assert_eq!(battle.rematch, RematchState::None);
        assert_eq!(
            rig.publisher
                .count_events(|e| matches!(e, BattleEvent::RematchExpired(_))),
            1
        );
    }
}
