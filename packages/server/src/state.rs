//! Application state assembly.
//!
//! Everything the HTTP layer needs, wired from explicit collaborators. The
//! production constructor reads its knobs from the environment with
//! compiled defaults; tests assemble the same pieces by hand.

use std::sync::Arc;

use epochmesh_bridge::{RiskSignal, SimulationClient};
use epochmesh_bus::{EventBus, HEARTBEAT_INTERVAL};
use epochmesh_core::{
    AuditRing, BreakerConfig, CompletionClient, CoreError, EventClassifier, ModelRegistry,
    ServiceMode, TierRouter,
};
use epochmesh_memory::{AutoFlush, InMemoryGraph, MemorySession, RetryQueue, RetryQueueConfig};
use epochmesh_rails::{AegisSupervisor, CognitiveRails};

use crate::catalog::Catalog;
use crate::coordinator::PipelineCoordinator;
use crate::health::HealthAggregator;

/// Service configuration, environment-backed with defaults.
#[derive(Debug, Clone)]
pub struct MeshConfig {
    pub port: u16,
    pub simulation_url: String,
    pub mode: ServiceMode,
    pub breaker: BreakerConfig,
    pub audit_capacity: usize,
    /// Start the telemetry subscription against the simulation service.
    pub telemetry: bool,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            port: 8787,
            simulation_url: "http://127.0.0.1:9010".into(),
            mode: ServiceMode::default(),
            breaker: BreakerConfig::default(),
            audit_capacity: 1000,
            telemetry: false,
        }
    }
}

impl MeshConfig {
    /// Read configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            simulation_url: std::env::var("EPOCHMESH_SIM_URL").unwrap_or(defaults.simulation_url),
            mode: ServiceMode::detect(),
            breaker: defaults.breaker,
            audit_capacity: defaults.audit_capacity,
            telemetry: std::env::var("EPOCHMESH_TELEMETRY")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.telemetry),
        }
    }
}

/// Shared handles behind every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<PipelineCoordinator>,
    pub audit: Arc<AuditRing>,
    pub health: Arc<HealthAggregator>,
    pub catalog: Arc<Catalog>,
    pub bus: Arc<EventBus>,
}

/// Fully wired service, plus the handles the binary needs for shutdown.
pub struct MeshRuntime {
    pub state: AppState,
    pub retry_queue: Arc<RetryQueue>,
    pub autoflush: AutoFlush,
    pub memory: Arc<dyn MemorySession>,
    pub simulation: Arc<SimulationClient>,
}

/// Assemble the production wiring. Must run inside a Tokio runtime: the
/// retry queue's auto-flush task and the bus heartbeat are spawned here.
pub fn build_runtime(config: &MeshConfig) -> Result<MeshRuntime, CoreError> {
    let registry = Arc::new(ModelRegistry::with_default_catalogue());
    let router = Arc::new(TierRouter::new(registry, config.breaker.clone())?);
    let audit = Arc::new(AuditRing::new(config.audit_capacity));
    let client = Arc::new(CompletionClient::new(
        router.clone(),
        audit.clone(),
        config.mode,
    ));

    let simulation = Arc::new(SimulationClient::new(&config.simulation_url));
    let risk: Arc<dyn RiskSignal> = simulation.clone();

    let bus = Arc::new(EventBus::new());
    bus.set_port(config.port);
    bus.start_heartbeat(HEARTBEAT_INTERVAL);

    let memory: Arc<dyn MemorySession> = Arc::new(InMemoryGraph::new());
    let retry_queue = Arc::new(RetryQueue::new(RetryQueueConfig::default()));
    let autoflush = RetryQueue::start(retry_queue.clone(), memory.clone());

    let aegis = Arc::new(AegisSupervisor::default());
    let coordinator = Arc::new(PipelineCoordinator::new(
        EventClassifier::default(),
        client,
        risk,
        CognitiveRails::default(),
        aegis,
        bus.clone(),
        memory.clone(),
        retry_queue.clone(),
    ));

    let health = Arc::new(HealthAggregator::new(simulation.clone(), bus.clone()));

    Ok(MeshRuntime {
        state: AppState {
            coordinator,
            audit,
            health,
            catalog: Arc::new(Catalog::with_default_roster()),
            bus,
        },
        retry_queue,
        autoflush,
        memory,
        simulation,
    })
}
