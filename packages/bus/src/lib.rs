//! EpochMesh Bus
//!
//! Channel-keyed publish/subscribe over long-lived WebSocket clients, with a
//! liveness heartbeat that reaps silent subscribers within two intervals.
//! Publishing is fire-and-forget and lossy toward dead transports; it never
//! blocks the pipeline.

pub mod bus;
pub mod ws;

pub use bus::{channels, EventBus, HEARTBEAT_INTERVAL};
pub use ws::router;
