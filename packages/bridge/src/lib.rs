//! EpochMesh Bridge
//!
//! Client side of the external simulation service. One logical call surface
//! is carried over two wire protocols (REST primary, RPC-envelope fallback)
//! with per-call deadlines, plus a reconnecting consumer for the server's
//! telemetry stream.

pub mod client;
pub mod error;
pub mod telemetry;
pub mod transport;
pub mod types;

pub use client::{HealthSignal, RiskSignal, SimulationClient};
pub use error::BridgeError;
pub use telemetry::{subscribe, TelemetrySubscription, RECONNECT_DELAY};
pub use transport::{EnvelopeTransport, RestTransport, SimTransport, DEFAULT_DEADLINE_MS};
pub use types::{
    CleansingResult, NpcActionReport, RebellionProbe, SimulationHealth, SimulationStatus,
    TelemetryFilter, TelemetryItem,
};
