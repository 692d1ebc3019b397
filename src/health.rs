//! Health check module
//! Provides health status for the application and its dependencies

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, info};

use crate::database::repository::DonationStore;
use crate::workers::reconciliation_poller::PollerRegistry;

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
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
pub enum ComponentState {
    Up,
    Down,
    Warning,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy)
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }

    pub fn warning(response_time_ms: Option<u128>, details: Option<String>) -> Self {
        Self {
            status: ComponentState::Warning,
            response_time_ms,
            details,
        }
    }
}

/// Health checker for the application
#[derive(Clone)]
pub struct HealthChecker {
    store: Arc<dyn DonationStore>,
    gateway: &'static str,
    poller: Option<Arc<PollerRegistry>>,
    store_timeout: Duration,
}

impl HealthChecker {
    pub fn new(store: Arc<dyn DonationStore>, gateway: &'static str) -> Self {
        Self {
            store,
            gateway,
            poller: None,
            store_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_poller(mut self, poller: Arc<PollerRegistry>) -> Self {
        self.poller = Some(poller);
        self
    }

    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    /// Perform comprehensive health check
    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();

        let start = Instant::now();
        let store_health = match timeout(self.store_timeout, self.store.ping()).await {
            Ok(Ok(())) => {
                let elapsed = start.elapsed().as_millis();
                info!("Database health check: OK ({}ms)", elapsed);
                ComponentHealth::up(Some(elapsed))
            }
            Ok(Err(e)) => {
                error!("Database health check failed: {}", e);
                ComponentHealth::down(Some(e.to_string()))
            }
            Err(_) => {
                error!("Database health check timed out");
                ComponentHealth::down(Some("Timeout".to_string()))
            }
        };
        let store_up = store_health.status == ComponentState::Up;
        health_status
            .checks
            .insert("database".to_string(), store_health);

        health_status.checks.insert(
            "gateway".to_string(),
            ComponentHealth {
                status: ComponentState::Up,
                response_time_ms: None,
                details: Some(self.gateway.to_string()),
            },
        );

        if let Some(poller) = &self.poller {
            let active = poller.active_count().await;
            health_status.checks.insert(
                "reconciliation".to_string(),
                ComponentHealth {
                    status: ComponentState::Up,
                    response_time_ms: None,
                    details: Some(format!("{} active watch(es)", active)),
                },
            );
        }

        health_status.status = if store_up {
            HealthState::Healthy
        } else {
            HealthState::Unhealthy
        };

        health_status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryDonationStore;

    #[tokio::test]
    async fn test_health_status_creation() {
        let health_status = HealthStatus::new();
        assert!(matches!(health_status.status, HealthState::Healthy));
        assert!(health_status.checks.is_empty());
        assert!(health_status.timestamp <= chrono::Utc::now());
    }

    #[test]
    fn test_component_health_states() {
        let up_health = ComponentHealth::up(Some(100));
        assert!(matches!(up_health.status, ComponentState::Up));
        assert_eq!(up_health.response_time_ms, Some(100));

        let down_health = ComponentHealth::down(Some("Test error".to_string()));
        assert!(matches!(down_health.status, ComponentState::Down));
        assert_eq!(down_health.details, Some("Test error".to_string()));

        let warning_health = ComponentHealth::warning(Some(500), Some("Slow response".to_string()));
        assert!(matches!(warning_health.status, ComponentState::Warning));
        assert_eq!(warning_health.response_time_ms, Some(500));
        assert_eq!(warning_health.details, Some("Slow response".to_string()));
    }

    #[tokio::test]
    async fn memory_store_reports_healthy() {
        let checker = HealthChecker::new(Arc::new(MemoryDonationStore::new()), "mercadopago");
        let status = checker.check_health().await;
        assert!(status.is_healthy());
        assert!(matches!(
            status.checks.get("database").map(|c| &c.status),
            Some(ComponentState::Up)
        ));
    }
}
