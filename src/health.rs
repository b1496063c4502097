//! Health check module
//! Provides health status for the application and its dependencies

use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::error;

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ComponentState {
    Up,
    Down,
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: String) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details: Some(details),
        }
    }
}

/// Run the health checks against the ledger database.
pub async fn check_health(pool: Option<&PgPool>) -> HealthStatus {
    let mut checks = HashMap::new();

    if let Some(pool) = pool {
        let started = Instant::now();
        let ping = timeout(Duration::from_secs(5), sqlx::query("SELECT 1").execute(pool)).await;
        let component = match ping {
            Ok(Ok(_)) => ComponentHealth::up(Some(started.elapsed().as_millis())),
            Ok(Err(e)) => {
                error!(error = %e, "database health check failed");
                ComponentHealth::down(e.to_string())
            }
            Err(_) => ComponentHealth::down("database ping timed out".to_string()),
        };
        checks.insert("database".to_string(), component);
    }

    let status = if checks.values().all(|c| c.status == ComponentState::Up) {
        HealthState::Healthy
    } else {
        HealthState::Unhealthy
    };

    HealthStatus {
        status,
        checks,
        timestamp: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_without_database_is_healthy() {
        let status = check_health(None).await;
        assert_eq!(status.status, HealthState::Healthy);
        assert!(status.checks.is_empty());
    }

    #[test]
    fn component_health_constructors() {
        let up = ComponentHealth::up(Some(12));
        assert_eq!(up.status, ComponentState::Up);
        assert_eq!(up.response_time_ms, Some(12));

        let down = ComponentHealth::down("refused".to_string());
        assert_eq!(down.status, ComponentState::Down);
        assert_eq!(down.details.as_deref(), Some("refused"));
    }
}
