//! EpochMesh Cognitive Rails
//!
//! Layered policy interceptor over pipeline completions. Five ordered rails
//! produce a single allow/deny-with-reason verdict; the Aegis supervisor
//! holds the environmental-risk level that rail 2 consults.

pub mod aegis;
pub mod rails;
pub mod types;

pub use aegis::{
    is_aggressive, AegisAction, AegisDecision, AegisSupervisor, AGGRESSIVE_INTENSITY, VETO_LEVEL,
    WHISPER_LEVEL,
};
pub use rails::{
    AegisInfestationRail, CognitiveRails, LatencyBudgetRail, OutputCoherenceRail, Rail,
    RebellionThresholdRail, TrustErosionRail, DEFAULT_LATENCY_BUDGET_MS, REBELLION_THRESHOLD,
};
pub use types::{FieldKind, RailContext, RailResult, ResponseSchema};
