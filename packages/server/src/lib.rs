//! EpochMesh Server
//!
//! The externally triggered surface over the orchestration core: HTTP
//! request layer, the pipeline coordinator composing classification,
//! routing, completion, risk probing, rails, and broadcast, plus the NPC
//! catalog, command surface, and health aggregation.

pub mod catalog;
pub mod commands;
pub mod coordinator;
pub mod health;
pub mod http;
pub mod state;

pub use catalog::{Archetype, Catalog, NpcProfile, SpawnManifest};
pub use commands::{BatchOutcome, CommandAccepted, CommandRequest, CommandType, MAX_BATCH};
pub use coordinator::{PipelineCoordinator, PipelineResponse, RebellionCheck, TelemetryPump};
pub use health::{DeepHealth, HealthAggregator, HealthStatus, DEGRADED_LATENCY_MS};
pub use http::{router, ApiError};
pub use state::{build_runtime, AppState, MeshConfig, MeshRuntime};
