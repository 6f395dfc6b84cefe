//! Per-backend circuit breaker.
//!
//! Rolling-window failure tracker with the usual three-state machine:
//!
//! ```text
//! CLOSED --failures >= threshold within window--> OPEN
//! OPEN   --recovery timeout elapsed------------> HALF_OPEN
//! HALF_OPEN --successes >= threshold-----------> CLOSED
//! HALF_OPEN --any failure----------------------> OPEN
//! ```
//!
//! The gate (`can_request`) is read-only; the resilient client accounts for
//! half-open admissions via [`CircuitBreaker::note_admission`].

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::error::CoreError;

/// Breaker tuning, validated at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerConfig {
    /// Failures within the monitoring window before the circuit opens.
    pub failure_threshold: u32,
    /// Half-open successes required to close the circuit.
    pub success_threshold: u32,
    /// How long an open circuit waits before probing.
    pub recovery_timeout_ms: u64,
    /// Probe budget while half-open.
    pub half_open_max_requests: u32,
    /// Rolling window for failure counting.
    pub monitoring_window_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            recovery_timeout_ms: 30_000,
            half_open_max_requests: 3,
            monitoring_window_ms: 60_000,
        }
    }
}

impl BreakerConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.failure_threshold == 0 || self.success_threshold == 0 || self.half_open_max_requests == 0
        {
            return Err(CoreError::InvalidInput(
                "breaker thresholds must be >= 1".into(),
            ));
        }
        if self.recovery_timeout_ms == 0 || self.monitoring_window_ms == 0 {
            return Err(CoreError::InvalidInput(
                "breaker windows must be > 0 ms".into(),
            ));
        }
        Ok(())
    }
}

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Point-in-time view of breaker internals for the router and metrics.
#[derive(Debug, Clone)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub recent_failures: usize,
    pub half_open_successes: u32,
    pub half_open_admitted: u32,
    pub open_for: Option<Duration>,
}

struct Inner {
    state: BreakerState,
    /// Failure instants within the monitoring window (CLOSED only).
    failures: Vec<Instant>,
    opened_at: Option<Instant>,
    half_open_successes: u32,
    half_open_admitted: u32,
}

/// Rolling-window circuit breaker for one backend.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Result<Self, CoreError> {
        config.validate()?;
        Ok(Self {
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: Vec::new(),
                opened_at: None,
                half_open_successes: 0,
                half_open_admitted: 0,
            }),
        })
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current state, applying the lazy OPEN -> HALF_OPEN transition when the
    /// recovery timeout has elapsed.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock();
        self.advance(&mut inner);
        inner.state
    }

    /// Whether the gate admits a request right now. Read-only: half-open
    /// admission counting is the caller's job via [`Self::note_admission`].
    pub fn can_request(&self) -> bool {
        let mut inner = self.inner.lock();
        self.advance(&mut inner);
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => false,
            BreakerState::HalfOpen => inner.half_open_admitted < self.config.half_open_max_requests,
        }
    }

    /// Count one admitted half-open probe. No-op in other states.
    pub fn note_admission(&self) {
        let mut inner = self.inner.lock();
        self.advance(&mut inner);
        if inner.state == BreakerState::HalfOpen {
            inner.half_open_admitted += 1;
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        self.advance(&mut inner);
        if inner.state == BreakerState::HalfOpen {
            inner.half_open_successes += 1;
            if inner.half_open_successes >= self.config.success_threshold {
                tracing::info!(successes = inner.half_open_successes, "circuit closed");
                Self::to_closed(&mut inner);
            }
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        self.advance(&mut inner);
        match inner.state {
            BreakerState::Closed => {
                let now = Instant::now();
                inner.failures.push(now);
                let window = Duration::from_millis(self.config.monitoring_window_ms);
                inner.failures.retain(|t| now.duration_since(*t) <= window);
                if inner.failures.len() >= self.config.failure_threshold as usize {
                    tracing::warn!(failures = inner.failures.len(), "circuit opened");
                    Self::to_open(&mut inner);
                }
            }
            BreakerState::HalfOpen => {
                tracing::warn!("half-open probe failed, circuit re-opened");
                Self::to_open(&mut inner);
            }
            BreakerState::Open => {}
        }
    }

    /// Force CLOSED and clear all counters.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        Self::to_closed(&mut inner);
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let mut inner = self.inner.lock();
        self.advance(&mut inner);
        BreakerSnapshot {
            state: inner.state,
            recent_failures: inner.failures.len(),
            half_open_successes: inner.half_open_successes,
            half_open_admitted: inner.half_open_admitted,
            open_for: inner.opened_at.map(|t| t.elapsed()),
        }
    }

    /// Lazy OPEN -> HALF_OPEN transition. Must hold the lock.
    fn advance(&self, inner: &mut Inner) {
        if inner.state == BreakerState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= Duration::from_millis(self.config.recovery_timeout_ms) {
                    inner.state = BreakerState::HalfOpen;
                    inner.half_open_successes = 0;
                    inner.half_open_admitted = 0;
                }
            }
        }
    }

    fn to_open(inner: &mut Inner) {
        inner.state = BreakerState::Open;
        inner.opened_at = Some(Instant::now());
        inner.failures.clear();
        inner.half_open_successes = 0;
        inner.half_open_admitted = 0;
    }

    fn to_closed(inner: &mut Inner) {
        inner.state = BreakerState::Closed;
        inner.opened_at = None;
        inner.failures.clear();
        inner.half_open_successes = 0;
        inner.half_open_admitted = 0;
    }
}
