//! Health aggregator.
//!
//! Concurrent per-dependency probes with a roll-up verdict: any down
//! dependency makes the whole service unhealthy, any degraded one makes it
//! degraded. Slow-but-successful probes are downgraded too.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use epochmesh_bridge::HealthSignal;
use epochmesh_bus::EventBus;

/// Probe latency above this downgrades healthy to degraded.
pub const DEGRADED_LATENCY_MS: u64 = 3_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Down,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceProbe {
    pub status: HealthStatus,
    pub latency_ms: u64,
    pub details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceProbes {
    pub orchestration: ServiceProbe,
    pub simulation: ServiceProbe,
    pub bus: ServiceProbe,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepHealth {
    pub status: HealthStatus,
    pub services: ServiceProbes,
    pub timestamp: DateTime<Utc>,
}

impl DeepHealth {
    pub fn is_unhealthy(&self) -> bool {
        self.status == HealthStatus::Down
    }
}

pub struct HealthAggregator {
    simulation: Arc<dyn HealthSignal>,
    bus: Arc<EventBus>,
}

impl HealthAggregator {
    pub fn new(simulation: Arc<dyn HealthSignal>, bus: Arc<EventBus>) -> Self {
        Self { simulation, bus }
    }

    /// Probe every dependency concurrently and roll up.
    pub async fn deep_health(&self) -> DeepHealth {
        let (orchestration, simulation, bus) =
            tokio::join!(self.probe_self(), self.probe_simulation(), self.probe_bus());

        let status = [&orchestration, &simulation, &bus]
            .iter()
            .fold(HealthStatus::Healthy, |acc, probe| match probe.status {
                HealthStatus::Down => HealthStatus::Down,
                HealthStatus::Degraded if acc == HealthStatus::Healthy => HealthStatus::Degraded,
                _ => acc,
            });

        DeepHealth {
            status,
            services: ServiceProbes {
                orchestration,
                simulation,
                bus,
            },
            timestamp: Utc::now(),
        }
    }

    async fn probe_self(&self) -> ServiceProbe {
        ServiceProbe {
            status: HealthStatus::Healthy,
            latency_ms: 0,
            details: "orchestration core online".into(),
        }
    }

    async fn probe_simulation(&self) -> ServiceProbe {
        let start = Instant::now();
        match self.simulation.health().await {
            Ok(health) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                let healthy = matches!(health.status.as_str(), "ok" | "healthy");
                let status = if !healthy {
                    HealthStatus::Degraded
                } else if latency_ms > DEGRADED_LATENCY_MS {
                    HealthStatus::Degraded
                } else {
                    HealthStatus::Healthy
                };
                ServiceProbe {
                    status,
                    latency_ms,
                    details: health.detail.unwrap_or(health.status),
                }
            }
            Err(err) => ServiceProbe {
                status: HealthStatus::Down,
                latency_ms: start.elapsed().as_millis() as u64,
                details: err.to_string(),
            },
        }
    }

    async fn probe_bus(&self) -> ServiceProbe {
        let start = Instant::now();
        let connections = self.bus.connection_count();
        ServiceProbe {
            status: HealthStatus::Healthy,
            latency_ms: start.elapsed().as_millis() as u64,
            details: format!("{connections} subscriber(s) connected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use epochmesh_bridge::{BridgeError, SimulationHealth};

    struct StubSim {
        result: Result<&'static str, &'static str>,
    }

    #[async_trait]
    impl HealthSignal for StubSim {
        async fn health(&self) -> Result<SimulationHealth, BridgeError> {
            match self.result {
                Ok(status) => Ok(SimulationHealth {
                    status: status.to_string(),
                    detail: None,
                }),
                Err(msg) => Err(BridgeError::Unavailable(msg.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn healthy_when_every_probe_is_healthy() {
        let aggregator = HealthAggregator::new(
            Arc::new(StubSim { result: Ok("ok") }),
            Arc::new(EventBus::new()),
        );
        let health = aggregator.deep_health().await;
        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(!health.is_unhealthy());
        assert_eq!(health.services.orchestration.latency_ms, 0);
    }

    #[tokio::test]
    async fn degraded_simulation_degrades_overall() {
        let aggregator = HealthAggregator::new(
            Arc::new(StubSim {
                result: Ok("recovering"),
            }),
            Arc::new(EventBus::new()),
        );
        let health = aggregator.deep_health().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert!(!health.is_unhealthy());
    }

    #[tokio::test]
    async fn down_simulation_is_unhealthy() {
        let aggregator = HealthAggregator::new(
            Arc::new(StubSim {
                result: Err("connection refused"),
            }),
            Arc::new(EventBus::new()),
        );
        let health = aggregator.deep_health().await;
        assert_eq!(health.status, HealthStatus::Down);
        assert!(health.is_unhealthy());
        assert_eq!(health.services.simulation.status, HealthStatus::Down);
    }
}
