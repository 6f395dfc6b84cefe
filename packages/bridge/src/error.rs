//! Bridge error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// The call exceeded its deadline.
    #[error("simulation call timed out after {0} ms")]
    Timeout(u64),

    /// Transport-level failure (connect, send, non-2xx).
    #[error("simulation service unavailable: {0}")]
    Unavailable(String),

    /// The service answered, but not in the shape we expect.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Primary and fallback transports both failed.
    #[error("both wire protocols failed: primary: {primary}; fallback: {fallback}")]
    BothProtocolsFailed { primary: String, fallback: String },
}

impl BridgeError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "TIMEOUT",
            Self::Unavailable(_) => "UPSTREAM_UNAVAILABLE",
            Self::Protocol(_) => "UPSTREAM_UNAVAILABLE",
            Self::BothProtocolsFailed { .. } => "UPSTREAM_UNAVAILABLE",
        }
    }
}
