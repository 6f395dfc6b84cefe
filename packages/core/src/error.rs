//! Core error types.
//!
//! One enum carries every failure kind the orchestration core can surface.
//! The HTTP layer maps kinds to status codes; the resilient client inspects
//! them to decide breaker bookkeeping.

use thiserror::Error;

/// Errors raised by the orchestration core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Request was malformed or missing required fields.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A backend or external collaborator refused or failed the call.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// A call exceeded its deadline.
    #[error("timed out after {0} ms")]
    Timeout(u64),

    /// Every enabled backend's breaker denied admission.
    #[error("all circuit breakers open")]
    CircuitAllOpen,

    /// A backend rejected the call for quota reasons.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Anything that should not happen.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Stable kind tag for logs and audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            Self::Timeout(_) => "TIMEOUT",
            Self::CircuitAllOpen => "CIRCUIT_ALL_OPEN",
            Self::RateLimited(_) => "RATE_LIMITED",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether this failure should count against the backend's breaker.
    ///
    /// Input errors are the caller's fault and must not trip a circuit.
    pub fn counts_against_breaker(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable(_) | Self::Timeout(_) | Self::RateLimited(_) | Self::Internal(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_are_stable() {
        assert_eq!(CoreError::CircuitAllOpen.kind(), "CIRCUIT_ALL_OPEN");
        assert_eq!(CoreError::Timeout(5000).kind(), "TIMEOUT");
        assert_eq!(CoreError::InvalidInput("x".into()).kind(), "INVALID_INPUT");
    }

    #[test]
    fn invalid_input_never_trips_breaker() {
        assert!(!CoreError::InvalidInput("bad".into()).counts_against_breaker());
        assert!(CoreError::UpstreamUnavailable("503".into()).counts_against_breaker());
        assert!(CoreError::Timeout(5000).counts_against_breaker());
    }
}
