//! Health check functionality: readiness and liveness probes

use crate::service::app::AppState;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    /// Service version
    pub version: String,
    /// Current timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    pub lobbies_created: u64,
    pub lobbies_dissolved: u64,
    pub players_joined: u64,
    pub matches_started: u64,
    pub uptime_info: String,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(app_state: Arc<AppState>) -> Result<Self> {
        let mut checks = Vec::new();
        let mut overall_status = HealthStatus::Healthy;

        let service_check = Self::check_service_running(&app_state).await;
        if service_check.status != HealthStatus::Healthy {
            overall_status = HealthStatus::Unhealthy;
        }
        checks.push(service_check);

        let store_check = Self::check_store(&app_state).await;
        if store_check.status == HealthStatus::Unhealthy {
            overall_status = HealthStatus::Unhealthy;
        }
        checks.push(store_check);

        let broker_check = Self::check_broker(&app_state);
        if broker_check.status == HealthStatus::Degraded
            && overall_status == HealthStatus::Healthy
        {
            overall_status = HealthStatus::Degraded;
        }
        checks.push(broker_check);

        let stats = Self::gather_service_stats(&app_state);

        Ok(HealthCheck {
            status: overall_status,
            service: app_state.config().service.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
        })
    }

    /// Lightweight liveness probe
    pub async fn liveness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        debug!("Liveness check");
        if app_state.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness probe: the service can take traffic
    pub async fn readiness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        debug!("Readiness check");
        if !app_state.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }
        if !app_state.has_broker_connection() {
            return Ok(HealthStatus::Degraded);
        }
        Ok(HealthStatus::Healthy)
    }

    async fn check_service_running(app_state: &Arc<AppState>) -> ComponentCheck {
        let running = app_state.is_running().await;
        ComponentCheck {
            name: "service".to_string(),
            status: if running {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            message: (!running).then(|| "service is not running".to_string()),
        }
    }

    async fn check_store(app_state: &Arc<AppState>) -> ComponentCheck {
        // A read of a nonexistent row exercises the store roundtrip
        let probe = crate::utils::generate_lobby_id();
        match app_state.store().fetch_lobby(probe).await {
            Ok(_) => ComponentCheck {
                name: "store".to_string(),
                status: HealthStatus::Healthy,
                message: None,
            },
            Err(e) => ComponentCheck {
                name: "store".to_string(),
                status: HealthStatus::Unhealthy,
                message: Some(e.to_string()),
            },
        }
    }

    fn check_broker(app_state: &Arc<AppState>) -> ComponentCheck {
        if app_state.has_broker_connection() {
            ComponentCheck {
                name: "amqp".to_string(),
                status: HealthStatus::Healthy,
                message: None,
            }
        } else {
            ComponentCheck {
                name: "amqp".to_string(),
                status: HealthStatus::Degraded,
                message: Some("no broker connection".to_string()),
            }
        }
    }

    fn gather_service_stats(app_state: &Arc<AppState>) -> ServiceStats {
        let manager_stats = app_state.lobby_manager().get_stats().unwrap_or_default();
        let uptime = app_state.uptime();

        ServiceStats {
            lobbies_created: manager_stats.lobbies_created,
            lobbies_dissolved: manager_stats.lobbies_dissolved,
            players_joined: manager_stats.players_joined,
            matches_started: manager_stats.matches_started,
            uptime_info: format!("{}s", uptime.as_secs()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_display() {
        assert_eq!(HealthStatus::Healthy.to_string(), "healthy");
        assert_eq!(HealthStatus::Degraded.to_string(), "degraded");
        assert_eq!(HealthStatus::Unhealthy.to_string(), "unhealthy");
    }

    #[test]
    fn test_health_status_serialization() {
        let status = HealthStatus::Healthy;
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, "\"healthy\"");
    }
}
