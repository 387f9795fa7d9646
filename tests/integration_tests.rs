//! Integration tests for the battle engine
//!
//! These validate the system working end to end: lobby formation across
//! formats, gift-driven scoring, winner resolution with reward payout,
//! and the rematch handshake.

mod fixtures;

use fixtures::{gift, BattleSystem};
use roast_battle::error::BattleError;
use roast_battle::storage::BattleStore;
use roast_battle::types::{
    BattleEvent, BattleFormat, EndTrigger, ExitDestination, LobbyState, MatchStatus, RematchState,
    TeamSide, Winner,
};

#[tokio::test]
async fn test_one_v_one_battle_end_to_end() {
    let system = BattleSystem::new();

    // U1 opens a 1v1 lobby, U2 takes the challenger seat on team B
    let lobby = system
        .manager
        .create_lobby("U1".to_string(), BattleFormat::OneVsOne, true, None)
        .await
        .unwrap();
    let lobby = system
        .manager
        .join_lobby(lobby.id, "U2".to_string(), Some(TeamSide::TeamB))
        .await
        .unwrap();
    assert_eq!(lobby.state, LobbyState::Paired);

    let match_id = system.latest_started_match().unwrap();

    // Three scored gifts to team A totalling 50 SEK, two to team B for 30
    for value_ore in [2000, 2000, 1000] {
        system
            .engine
            .record_gift(gift(match_id, "U1", value_ore))
            .await
            .unwrap();
    }
    for value_ore in [1500, 1500] {
        system
            .engine
            .record_gift(gift(match_id, "U2", value_ore))
            .await
            .unwrap();
    }

    let (battle, rewards) = system
        .engine
        .end_match(match_id, EndTrigger::LeaderAction)
        .await
        .unwrap();

    assert_eq!(battle.status, MatchStatus::Completed);
    assert_eq!(battle.winner, Some(Winner::TeamA));
    assert_eq!(battle.team_a_gifts_ore, 5000);
    assert_eq!(battle.team_b_gifts_ore, 3000);

    // Exactly two reward rows, amounts derived from the 70/30 split
    assert_eq!(rewards.len(), 2);
    let u1 = rewards.iter().find(|r| r.player_id == "U1").unwrap();
    let u2 = rewards.iter().find(|r| r.player_id == "U2").unwrap();
    assert!(u1.is_winner);
    assert!(!u2.is_winner);
    // 50 SEK * 70% * 1.5 winner bonus = 52.50 SEK
    assert_eq!(u1.amount_ore, 5250);
    // 30 SEK * 70% = 21 SEK
    assert_eq!(u2.amount_ore, 2100);

    // Completion was broadcast after rewards existed
    assert_eq!(
        system
            .publisher
            .count_events(|e| matches!(e, BattleEvent::MatchCompleted(_))),
        1
    );
    assert_eq!(
        system
            .publisher
            .count_events(|e| matches!(e, BattleEvent::RewardsDistributed(_))),
        1
    );
}

#[tokio::test]
async fn test_equal_scores_resolve_to_draw() {
    let system = BattleSystem::new();
    let lobby = system
        .manager
        .create_lobby("U1".to_string(), BattleFormat::OneVsOne, true, None)
        .await
        .unwrap();
    system
        .manager
        .join_lobby(lobby.id, "U2".to_string(), Some(TeamSide::TeamB))
        .await
        .unwrap();
    let match_id = system.latest_started_match().unwrap();

    system
        .engine
        .record_gift(gift(match_id, "U1", 10000))
        .await
        .unwrap();
    system
        .engine
        .record_gift(gift(match_id, "U2", 10000))
        .await
        .unwrap();

    let (battle, rewards) = system
        .engine
        .end_match(match_id, EndTrigger::TimerExpired)
        .await
        .unwrap();
    assert_eq!(battle.winner, Some(Winner::Draw));
    assert!(rewards.iter().all(|r| !r.is_winner));
}

#[tokio::test]
async fn test_team_capacity_across_formats() {
    for format in BattleFormat::all() {
        let system = BattleSystem::new();
        let per_side = format.per_side();

        let lobby = system
            .manager
            .create_lobby("creator".to_string(), format, true, None)
            .await
            .unwrap();

        // Fill the rest of team A
        for i in 1..per_side {
            system
                .manager
                .join_lobby(lobby.id, format!("a{}", i), Some(TeamSide::TeamA))
                .await
                .unwrap();
        }

        // The (N+1)th player preferring the full side routes to team B
        let routed = system
            .manager
            .join_lobby(lobby.id, "overflow".to_string(), Some(TeamSide::TeamA))
            .await
            .unwrap();
        assert!(routed.team_b_players.contains(&"overflow".to_string()));
        assert_eq!(routed.team_a_players.len(), per_side);
    }
}

#[tokio::test]
async fn test_fifo_pairing_prefers_oldest_lobby() {
    let system = BattleSystem::new();

    // Three public 2v2 squads filling up in order
    let mut lobby_ids = Vec::new();
    for squad in 0..3 {
        let creator = format!("s{}p0", squad);
        let lobby = system
            .manager
            .create_lobby(creator, BattleFormat::TwoVsTwo, false, None)
            .await
            .unwrap();
        lobby_ids.push(lobby.id);
        system
            .manager
            .join_lobby(lobby.id, format!("s{}p1", squad), Some(TeamSide::TeamA))
            .await
            .unwrap();
    }

    // Squads 0 and 1 paired; squad 2 still waits
    let first = system
        .manager
        .get_lobby_info(lobby_ids[0])
        .await
        .unwrap()
        .unwrap();
    let second = system
        .manager
        .get_lobby_info(lobby_ids[1])
        .await
        .unwrap()
        .unwrap();
    let third = system
        .manager
        .get_lobby_info(lobby_ids[2])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.state, LobbyState::Paired);
    assert_eq!(second.state, LobbyState::Paired);
    assert_eq!(third.state, LobbyState::Open);

    let started = system.latest_started_match().unwrap();
    let battle = system.engine.require_match(started).await.unwrap();
    assert_eq!(battle.team_a_players, vec!["s0p0", "s0p1"]);
    assert_eq!(battle.team_b_players, vec!["s1p0", "s1p1"]);
}

#[tokio::test]
async fn test_matchmaking_block_shows_cooldown() {
    let system = BattleSystem::new();
    system
        .blocks
        .block_user("U1", chrono::Duration::minutes(3), "declined match offer");

    let err = system
        .manager
        .create_lobby("U1".to_string(), BattleFormat::OneVsOne, false, None)
        .await
        .unwrap_err()
        .downcast::<BattleError>()
        .unwrap();

    match err {
        BattleError::MatchmakingBlocked {
            user_id,
            seconds_remaining,
        } => {
            assert_eq!(user_id, "U1");
            assert!(seconds_remaining > 170 && seconds_remaining <= 180);
        }
        other => panic!("expected MatchmakingBlocked, got {:?}", other),
    }

    // Other users are unaffected
    assert!(system
        .manager
        .create_lobby("U2".to_string(), BattleFormat::OneVsOne, false, None)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_reward_distribution_idempotent_after_completion() {
    let system = BattleSystem::new();
    let lobby = system
        .manager
        .create_lobby("U1".to_string(), BattleFormat::OneVsOne, true, None)
        .await
        .unwrap();
    system
        .manager
        .join_lobby(lobby.id, "U2".to_string(), Some(TeamSide::TeamB))
        .await
        .unwrap();
    let match_id = system.latest_started_match().unwrap();

    system
        .engine
        .record_gift(gift(match_id, "U1", 4200))
        .await
        .unwrap();
    system
        .engine
        .end_match(match_id, EndTrigger::LeaderAction)
        .await
        .unwrap();

    let first = system.distributor.distribute(match_id).await.unwrap();
    let second = system.distributor.distribute(match_id).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
}

#[tokio::test]
async fn test_rematch_handshake_spawns_linked_match() {
    let system = BattleSystem::new();
    let lobby = system
        .manager
        .create_lobby("U1".to_string(), BattleFormat::OneVsOne, true, None)
        .await
        .unwrap();
    system
        .manager
        .join_lobby(lobby.id, "U2".to_string(), Some(TeamSide::TeamB))
        .await
        .unwrap();
    let match_id = system.latest_started_match().unwrap();

    system
        .engine
        .record_gift(gift(match_id, "U2", 2500))
        .await
        .unwrap();
    system
        .engine
        .end_match(match_id, EndTrigger::LeaderAction)
        .await
        .unwrap();

    // One side alone leaves the handshake pending
    let pending = system
        .negotiator
        .request_rematch(match_id, "U2")
        .await
        .unwrap();
    assert_eq!(pending.state, RematchState::TeamB);
    assert!(pending.new_match_id.is_none());

    // A non-leader cannot participate in the handshake
    let err = system
        .negotiator
        .request_rematch(match_id, "random_viewer")
        .await
        .unwrap_err()
        .downcast::<BattleError>()
        .unwrap();
    assert!(matches!(err, BattleError::PermissionDenied { .. }));

    // The other leader completes it
    let accepted = system
        .negotiator
        .request_rematch(match_id, "U1")
        .await
        .unwrap();
    assert_eq!(accepted.state, RematchState::Both);
    let new_match_id = accepted.new_match_id.unwrap();

    let new_match = system.engine.require_match(new_match_id).await.unwrap();
    assert_eq!(new_match.status, MatchStatus::Active);
    assert_eq!(new_match.team_a_players, vec!["U1"]);
    assert_eq!(new_match.team_b_players, vec!["U2"]);
    assert_eq!(new_match.team_a_score, 0);

    // The original match is terminal history
    let old = system.engine.require_match(match_id).await.unwrap();
    assert_eq!(old.winner, Some(Winner::TeamB));
}

#[tokio::test]
async fn test_end_battle_returns_to_original_stream() {
    let system = BattleSystem::new();
    let stream_id = uuid::Uuid::new_v4();

    let lobby = system
        .manager
        .create_lobby(
            "U1".to_string(),
            BattleFormat::OneVsOne,
            true,
            Some(stream_id),
        )
        .await
        .unwrap();
    system
        .manager
        .join_lobby(lobby.id, "U2".to_string(), Some(TeamSide::TeamB))
        .await
        .unwrap();
    let match_id = system.latest_started_match().unwrap();

    // Leader ends mid-match; the match resolves and routing resumes the stream
    let destination = system.negotiator.end_battle(match_id, "U1").await.unwrap();
    assert_eq!(destination, ExitDestination::SoloStream { stream_id });

    let battle = system.engine.require_match(match_id).await.unwrap();
    assert_eq!(battle.status, MatchStatus::Completed);

    // Lobby archived; both players free for new matchmaking
    assert!(system.store.lobby_for_user("U1").await.unwrap().is_none());
    assert!(system
        .manager
        .create_lobby("U2".to_string(), BattleFormat::OneVsOne, false, None)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_premium_member_split_in_full_flow() {
    let system = BattleSystem::with_premium_members(vec!["U2".to_string()]);
    let lobby = system
        .manager
        .create_lobby("U1".to_string(), BattleFormat::OneVsOne, true, None)
        .await
        .unwrap();
    system
        .manager
        .join_lobby(lobby.id, "U2".to_string(), Some(TeamSide::TeamB))
        .await
        .unwrap();
    let match_id = system.latest_started_match().unwrap();

    system
        .engine
        .record_gift(gift(match_id, "U2", 10000))
        .await
        .unwrap();
    let (_, rewards) = system
        .engine
        .end_match(match_id, EndTrigger::LeaderAction)
        .await
        .unwrap();

    let u2 = rewards.iter().find(|r| r.player_id == "U2").unwrap();
    // Premium keeps 78%, then the 1.5x winner bonus: 100 * 0.78 * 1.5 = 117 SEK
    assert_eq!(u2.creator_share_bps, 7800);
    assert_eq!(u2.amount_ore, 11700);
}
