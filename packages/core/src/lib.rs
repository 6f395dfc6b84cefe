//! EpochMesh Core
//!
//! Request-admission and fan-out engine: classifies game events into tiers,
//! routes each tier to a language-model backend behind per-backend circuit
//! breakers, and audits every routing decision into a fixed-capacity ring.
//!
//! The pieces compose left to right:
//!
//! ```text
//! EventClassifier -> TierRouter -> CompletionClient -> AuditRing
//!                        |
//!                 CircuitBreaker (per backend, shared by handle)
//! ```

pub mod adapters;
pub mod audit;
pub mod breaker;
pub mod classifier;
pub mod client;
pub mod error;
pub mod mode;
pub mod registry;
pub mod router;
pub mod types;

pub use adapters::{adapter_for, AdapterResponse, BackendAdapter, LiveAdapter, MockAdapter, MockConfig};
pub use audit::{AuditEntry, AuditRing, AuditStats};
pub use breaker::{BreakerConfig, BreakerSnapshot, BreakerState, CircuitBreaker};
pub use classifier::EventClassifier;
pub use client::CompletionClient;
pub use error::CoreError;
pub use mode::ServiceMode;
pub use registry::{BackendConfig, ModelRegistry};
pub use router::{RouteChoice, TierRouter};
pub use types::{
    BackendId, CompletionOptions, CompletionResult, GameEvent, ModelDescriptor, RoutingDecision,
    Tier,
};
