//! EpochMesh Memory
//!
//! Contract against the external memory graph plus the bounded retry queue
//! that shields the pipeline from persistence hiccups. Writes are
//! fire-and-forget from the coordinator's perspective; this crate makes
//! sure they are retried, aged out, or dropped-oldest rather than blocking
//! anything.

pub mod ops;
pub mod retry_queue;
pub mod session;

pub use ops::PersistOp;
pub use retry_queue::{AutoFlush, FlushOutcome, RetryQueue, RetryQueueConfig};
pub use session::{InMemoryGraph, MemoryError, MemorySession};
