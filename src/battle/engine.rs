//! Match engine: live score accrual and the end-match transition
//!
//! Many concurrent writers hit the same match row: every viewer's gift
//! purchase is an independent score-update request. Increments go through
//! the store's atomic accumulator with event-id dedup, never a
//! read-modify-write from a stale snapshot. Ending a match stops further
//! increments first and reads the frozen totals after, so a late gift is
//! either counted or rejected, never silently dropped.

use crate::amqp::publisher::EventPublisher;
use crate::battle::state::BattleMatch;
use crate::error::{BattleError, Result};
use crate::metrics::MetricsCollector;
use crate::reward::distributor::RewardDistributor;
use crate::reward::Reward;
use crate::storage::BattleStore;
use crate::types::{
    BattleEvent, EndTrigger, GiftEvent, MatchCompleted, MatchId, RewardsDistributed, ScoreUpdated,
};
use crate::utils::{current_timestamp, format_sek};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Coordinates score accumulation, winner resolution, and payout for
/// active matches. Construct once at application start and inject into
/// callers; screens never mutate match rows directly.
pub struct MatchEngine {
    store: Arc<dyn BattleStore>,
    event_publisher: Arc<dyn EventPublisher>,
    distributor: Arc<RewardDistributor>,
    metrics: Arc<MetricsCollector>,
}

impl MatchEngine {
    pub fn new(
        store: Arc<dyn BattleStore>,
        event_publisher: Arc<dyn EventPublisher>,
        distributor: Arc<RewardDistributor>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            store,
            event_publisher,
            distributor,
            metrics,
        }
    }

    /// Apply one qualifying gift event to its match.
    ///
    /// Idempotent per event id: redelivered purchases accumulate once.
    /// The score broadcast goes out only after the increment is durable.
    pub async fn record_gift(&self, event: GiftEvent) -> Result<BattleMatch> {
        let start_time = Instant::now();

        let application = self.store.apply_gift(&event).await?;

        if !application.applied {
            debug!(
                "Duplicate gift event {} for match {}, already counted",
                event.event_id, event.match_id
            );
            self.metrics.record_duplicate_gift();
            return Ok(application.battle);
        }

        let battle = application.battle;
        let side = application.side.ok_or_else(|| BattleError::InternalError {
            message: "applied gift without a credited side".to_string(),
        })?;

        debug!(
            "Gift {} credited to {} of match {} - scores now {} : {} ({} gifted)",
            event.event_id,
            side,
            battle.id,
            battle.team_a_score,
            battle.team_b_score,
            format_sek(battle.team_a_gifts_ore + battle.team_b_gifts_ore),
        );
        self.metrics
            .record_gift(event.value_ore, start_time.elapsed());

        self.event_publisher
            .publish(BattleEvent::ScoreUpdated(ScoreUpdated {
                match_id: battle.id,
                side,
                team_a_score: battle.team_a_score,
                team_b_score: battle.team_b_score,
                team_a_gifts_ore: battle.team_a_gifts_ore,
                team_b_gifts_ore: battle.team_b_gifts_ore,
                timestamp: current_timestamp(),
            }))
            .await?;

        Ok(battle)
    }

    /// Drive a match to its terminal state and pay out.
    ///
    /// The transition freezes the accumulators and stamps the winner in
    /// one atomic store operation. Rewards are distributed synchronously
    /// before anything is broadcast, so a reward row exists for every
    /// participant by the time a client observes `completed`. Racing
    /// callers converge on the same outcome instead of failing.
    pub async fn end_match(
        &self,
        match_id: MatchId,
        trigger: EndTrigger,
    ) -> Result<(BattleMatch, Vec<Reward>)> {
        let start_time = Instant::now();

        let completion = self.store.complete_match(match_id).await?;
        let battle = completion.battle;

        // Retries after a partial failure re-run distribution; it is a
        // no-op once the rows exist and recomputation is deterministic
        // from the frozen scores.
        let outcome = self.distributor.distribute_for(&battle).await?;

        if completion.newly_completed {
            let winner = battle.winner.ok_or_else(|| BattleError::InternalError {
                message: format!("completed match {} has no winner stamped", battle.id),
            })?;

            info!(
                "Match {} completed ({:?}) - winner: {}, final scores {} : {}",
                battle.id, trigger, winner, battle.team_a_score, battle.team_b_score
            );
            self.metrics.record_match_completed(winner, trigger);

            self.event_publisher
                .publish(BattleEvent::MatchCompleted(MatchCompleted {
                    match_id: battle.id,
                    winner,
                    trigger,
                    team_a_score: battle.team_a_score,
                    team_b_score: battle.team_b_score,
                    timestamp: current_timestamp(),
                }))
                .await?;
        } else {
            debug!(
                "Match {} was already completed, end-match call converged",
                battle.id
            );
            self.metrics.record_distribution_skipped();
        }

        if outcome.freshly_written {
            let total: i64 = outcome.rewards.iter().map(|r| r.amount_ore).sum();
            self.metrics
                .record_rewards_distributed(outcome.rewards.len(), total);

            self.event_publisher
                .publish(BattleEvent::RewardsDistributed(RewardsDistributed {
                    match_id: battle.id,
                    total_paid_ore: total,
                    participant_count: outcome.rewards.len(),
                    timestamp: current_timestamp(),
                }))
                .await?;
        }

        self.metrics.record_end_match_duration(start_time.elapsed());
        Ok((battle, outcome.rewards))
    }

    /// End every active match whose deadline has passed. Runs from the
    /// periodic sweep; an abandoned match resolves to `completed` with
    /// whatever scores exist.
    pub async fn sweep_expired_matches(&self) -> Result<usize> {
        let now = current_timestamp();
        let expired = self.store.expired_matches(now).await?;
        let mut ended = 0;

        for match_id in expired {
            match self.end_match(match_id, EndTrigger::TimerExpired).await {
                Ok(_) => {
                    ended += 1;
                }
                Err(e) => {
                    // Next sweep retries; the transition is idempotent
                    error!("Failed to end expired match {}: {}", match_id, e);
                }
            }
        }

        if ended > 0 {
            info!("Sweep ended {} expired matches", ended);
        }
        Ok(ended)
    }

    /// Fetch a match row
    pub async fn get_match(&self, match_id: MatchId) -> Result<Option<BattleMatch>> {
        self.store.fetch_match(match_id).await
    }

    /// Fetch a match row, failing when absent
    pub async fn require_match(&self, match_id: MatchId) -> Result<BattleMatch> {
        self.store
            .fetch_match(match_id)
            .await?
            .ok_or_else(|| {
                warn!("Match {} not found", match_id);
                BattleError::MatchNotFound {
                    match_id: match_id.to_string(),
                }
                .into()
            })
    }
}
