//! Metrics collection using Prometheus
//!
//! Grouped metric families covering the lobby lifecycle, live scoring,
//! reward payout, and the AMQP boundary.

use crate::types::{BattleFormat, EndTrigger, Winner};
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::Arc;
use std::time::Duration;

/// Main metrics collector for the battle engine
#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<Registry>,
    service_metrics: ServiceMetrics,
    lobby_metrics: LobbyMetrics,
    match_metrics: MatchMetrics,
    reward_metrics: RewardMetrics,
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,
    /// Total AMQP messages processed, by kind and outcome
    pub amqp_messages_total: IntCounterVec,
    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,
}

/// Lobby-related metrics
#[derive(Clone)]
pub struct LobbyMetrics {
    pub active_lobbies: IntGauge,
    pub lobbies_created_total: IntCounterVec,
    pub lobbies_paired_total: IntCounter,
    pub lobbies_dissolved_total: IntCounter,
    pub players_joined_total: IntCounter,
}

/// Match-related metrics
#[derive(Clone)]
pub struct MatchMetrics {
    pub active_matches: IntGauge,
    pub matches_started_total: IntCounter,
    pub matches_completed_total: IntCounterVec,
    pub match_end_triggers_total: IntCounterVec,
    pub gift_events_total: IntCounter,
    pub duplicate_gift_events_total: IntCounter,
    pub gift_value_ore_total: IntCounter,
}

/// Reward and rematch metrics
#[derive(Clone)]
pub struct RewardMetrics {
    pub reward_rows_total: IntCounter,
    pub reward_paid_ore_total: IntCounter,
    pub distributions_skipped_total: IntCounter,
    pub rematch_requests_total: IntCounter,
    pub rematches_accepted_total: IntCounter,
    pub rematches_expired_total: IntCounter,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    pub gift_processing_duration: Histogram,
    pub end_match_duration: Histogram,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let lobby_metrics = LobbyMetrics::new(&registry)?;
        let match_metrics = MatchMetrics::new(&registry)?;
        let reward_metrics = RewardMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            lobby_metrics,
            match_metrics,
            reward_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn lobby(&self) -> &LobbyMetrics {
        &self.lobby_metrics
    }

    pub fn battle(&self) -> &MatchMetrics {
        &self.match_metrics
    }

    pub fn reward(&self) -> &RewardMetrics {
        &self.reward_metrics
    }

    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    pub fn record_lobby_created(&self, format: BattleFormat) {
        self.lobby_metrics
            .lobbies_created_total
            .with_label_values(&[&format.to_string()])
            .inc();
        self.lobby_metrics.active_lobbies.inc();
    }

    pub fn record_player_joined(&self) {
        self.lobby_metrics.players_joined_total.inc();
    }

    pub fn record_lobby_dissolved(&self) {
        self.lobby_metrics.lobbies_dissolved_total.inc();
        self.lobby_metrics.active_lobbies.dec();
    }

    pub fn record_match_started(&self, paired_lobbies: u64) {
        self.match_metrics.matches_started_total.inc();
        self.match_metrics.active_matches.inc();
        self.lobby_metrics.lobbies_paired_total.inc_by(paired_lobbies);
    }

    pub fn record_match_completed(&self, winner: Winner, trigger: EndTrigger) {
        self.match_metrics
            .matches_completed_total
            .with_label_values(&[&winner.to_string()])
            .inc();
        let trigger_label = match trigger {
            EndTrigger::TimerExpired => "timer_expired",
            EndTrigger::LeaderAction => "leader_action",
            EndTrigger::Forced => "forced",
        };
        self.match_metrics
            .match_end_triggers_total
            .with_label_values(&[trigger_label])
            .inc();
        self.match_metrics.active_matches.dec();
    }

    pub fn record_gift(&self, value_ore: i64, duration: Duration) {
        self.match_metrics.gift_events_total.inc();
        self.match_metrics
            .gift_value_ore_total
            .inc_by(value_ore.max(0) as u64);
        self.performance_metrics
            .gift_processing_duration
            .observe(duration.as_secs_f64());
    }

    pub fn record_duplicate_gift(&self) {
        self.match_metrics.duplicate_gift_events_total.inc();
    }

    pub fn record_rewards_distributed(&self, rows: usize, total_ore: i64) {
        self.reward_metrics.reward_rows_total.inc_by(rows as u64);
        self.reward_metrics
            .reward_paid_ore_total
            .inc_by(total_ore.max(0) as u64);
    }

    pub fn record_distribution_skipped(&self) {
        self.reward_metrics.distributions_skipped_total.inc();
    }

    pub fn record_rematch_requested(&self) {
        self.reward_metrics.rematch_requests_total.inc();
    }

    pub fn record_rematch_accepted(&self) {
        self.reward_metrics.rematches_accepted_total.inc();
    }

    pub fn record_rematch_expired(&self) {
        self.reward_metrics.rematches_expired_total.inc();
    }

    pub fn record_end_match_duration(&self, duration: Duration) {
        self.performance_metrics
            .end_match_duration
            .observe(duration.as_secs_f64());
    }

    pub fn record_amqp_message(&self, kind: &str, success: bool) {
        let outcome = if success { "ok" } else { "error" };
        self.service_metrics
            .amqp_messages_total
            .with_label_values(&[kind, outcome])
            .inc();
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds = IntGauge::new("battle_uptime_seconds", "Service uptime in seconds")?;
        let amqp_messages_total = IntCounterVec::new(
            Opts::new("battle_amqp_messages_total", "AMQP messages processed"),
            &["kind", "outcome"],
        )?;
        let health_status = IntGauge::new(
            "battle_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;

        registry.register(Box::new(uptime_seconds.clone()))?;
        registry.register(Box::new(amqp_messages_total.clone()))?;
        registry.register(Box::new(health_status.clone()))?;

        Ok(Self {
            uptime_seconds,
            amqp_messages_total,
            health_status,
        })
    }
}

impl LobbyMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_lobbies =
            IntGauge::new("battle_active_lobbies", "Number of non-dissolved lobbies")?;
        let lobbies_created_total = IntCounterVec::new(
            Opts::new("battle_lobbies_created_total", "Lobbies created"),
            &["format"],
        )?;
        let lobbies_paired_total =
            IntCounter::new("battle_lobbies_paired_total", "Lobbies promoted into matches")?;
        let lobbies_dissolved_total =
            IntCounter::new("battle_lobbies_dissolved_total", "Lobbies dissolved")?;
        let players_joined_total =
            IntCounter::new("battle_players_joined_total", "Players seated in lobbies")?;

        registry.register(Box::new(active_lobbies.clone()))?;
        registry.register(Box::new(lobbies_created_total.clone()))?;
        registry.register(Box::new(lobbies_paired_total.clone()))?;
        registry.register(Box::new(lobbies_dissolved_total.clone()))?;
        registry.register(Box::new(players_joined_total.clone()))?;

        Ok(Self {
            active_lobbies,
            lobbies_created_total,
            lobbies_paired_total,
            lobbies_dissolved_total,
            players_joined_total,
        })
    }
}

impl MatchMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_matches = IntGauge::new("battle_active_matches", "Matches currently live")?;
        let matches_started_total =
            IntCounter::new("battle_matches_started_total", "Matches started")?;
        let matches_completed_total = IntCounterVec::new(
            Opts::new("battle_matches_completed_total", "Matches completed"),
            &["winner"],
        )?;
        let match_end_triggers_total = IntCounterVec::new(
            Opts::new("battle_match_end_triggers_total", "What ended each match"),
            &["trigger"],
        )?;
        let gift_events_total =
            IntCounter::new("battle_gift_events_total", "Gift events accumulated")?;
        let duplicate_gift_events_total = IntCounter::new(
            "battle_duplicate_gift_events_total",
            "Gift events dropped by event-id dedup",
        )?;
        let gift_value_ore_total =
            IntCounter::new("battle_gift_value_ore_total", "Gifted value in öre")?;

        registry.register(Box::new(active_matches.clone()))?;
        registry.register(Box::new(matches_started_total.clone()))?;
        registry.register(Box::new(matches_completed_total.clone()))?;
        registry.register(Box::new(match_end_triggers_total.clone()))?;
        registry.register(Box::new(gift_events_total.clone()))?;
        registry.register(Box::new(duplicate_gift_events_total.clone()))?;
        registry.register(Box::new(gift_value_ore_total.clone()))?;

        Ok(Self {
            active_matches,
            matches_started_total,
            matches_completed_total,
            match_end_triggers_total,
            gift_events_total,
            duplicate_gift_events_total,
            gift_value_ore_total,
        })
    }
}

impl RewardMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let reward_rows_total =
            IntCounter::new("battle_reward_rows_total", "Reward rows written")?;
        let reward_paid_ore_total =
            IntCounter::new("battle_reward_paid_ore_total", "Rewards paid in öre")?;
        let distributions_skipped_total = IntCounter::new(
            "battle_distributions_skipped_total",
            "Reward distributions skipped as already written",
        )?;
        let rematch_requests_total =
            IntCounter::new("battle_rematch_requests_total", "Rematch requests")?;
        let rematches_accepted_total =
            IntCounter::new("battle_rematches_accepted_total", "Rematches accepted")?;
        let rematches_expired_total =
            IntCounter::new("battle_rematches_expired_total", "Rematch requests expired")?;

        registry.register(Box::new(reward_rows_total.clone()))?;
        registry.register(Box::new(reward_paid_ore_total.clone()))?;
        registry.register(Box::new(distributions_skipped_total.clone()))?;
        registry.register(Box::new(rematch_requests_total.clone()))?;
        registry.register(Box::new(rematches_accepted_total.clone()))?;
        registry.register(Box::new(rematches_expired_total.clone()))?;

        Ok(Self {
            reward_rows_total,
            reward_paid_ore_total,
            distributions_skipped_total,
            rematch_requests_total,
            rematches_accepted_total,
            rematches_expired_total,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let gift_processing_duration = Histogram::with_opts(HistogramOpts::new(
            "battle_gift_processing_duration_seconds",
            "Gift accumulation latency",
        ))?;
        let end_match_duration = Histogram::with_opts(HistogramOpts::new(
            "battle_end_match_duration_seconds",
            "End-match transition latency including reward distribution",
        ))?;

        registry.register(Box::new(gift_processing_duration.clone()))?;
        registry.register(Box::new(end_match_duration.clone()))?;

        Ok(Self {
            gift_processing_duration,
            end_match_duration,
        })
    }
}
