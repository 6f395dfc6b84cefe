//! Restart policy state machine.
//!
//! Pure and deterministic: all time values are passed in, no clock or IO.
//! The runtime layer feeds detection signals in and schedules what this
//! module decides.

use serde::{Deserialize, Serialize};

/// Supervisor tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WardenPolicy {
    /// Restarts allowed within the window before quarantine.
    pub max_restarts: u32,
    /// Sliding restart window, seconds.
    pub restart_window_s: u64,
    /// Consecutive health-probe failures tolerated before restart.
    pub max_failures: u32,
    /// Resident memory ceiling, bytes.
    pub memory_limit_bytes: u64,
    /// Probe cadence, seconds.
    pub cycle_interval_s: u64,
}

impl Default for WardenPolicy {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            restart_window_s: 600,
            max_failures: 3,
            memory_limit_bytes: 1_536 * 1024 * 1024,
            cycle_interval_s: 10,
        }
    }
}

/// Why a restart was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Detection {
    /// The worker's port stopped answering while its parent is still alive.
    PortDead,
    /// The parent process is gone; the worker is orphaned.
    ParentDead,
    /// Health probe failed more than `max_failures` times in a row.
    HealthFailures,
    /// Resident memory exceeded the limit.
    MemoryLimit,
}

/// Observable worker state, externalised to the status document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerState {
    Running,
    Restarting,
    Quarantined,
}

/// What the runtime should do after a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetDecision {
    /// Restart the worker now.
    Restart,
    /// Budget exhausted: quarantine, no further automatic attempts.
    Quarantine,
}

/// Sliding-window restart budget for one supervised worker.
#[derive(Debug, Clone)]
pub struct RestartBudget {
    policy: WardenPolicy,
    restart_timestamps_ms: Vec<u64>,
    consecutive_probe_failures: u32,
    state: WorkerState,
}

impl RestartBudget {
    pub fn new(policy: WardenPolicy) -> Self {
        Self {
            policy,
            restart_timestamps_ms: Vec::new(),
            consecutive_probe_failures: 0,
            state: WorkerState::Running,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn restarts_in_window(&self) -> usize {
        self.restart_timestamps_ms.len()
    }

    /// Record one failed health probe. Returns the detection once failures
    /// exceed the tolerance; the counter resets when that fires.
    pub fn record_probe_failure(&mut self) -> Option<Detection> {
        self.consecutive_probe_failures += 1;
        if self.consecutive_probe_failures > self.policy.max_failures {
            self.consecutive_probe_failures = 0;
            Some(Detection::HealthFailures)
        } else {
            None
        }
    }

    pub fn record_probe_success(&mut self) {
        self.consecutive_probe_failures = 0;
        if self.state == WorkerState::Restarting {
            self.state = WorkerState::Running;
        }
    }

    /// Ask for a restart at `now_ms`. Applies the sliding window and flips
    /// to QUARANTINED when the budget is spent.
    pub fn request_restart(&mut self, now_ms: u64, detection: Detection) -> BudgetDecision {
        if self.state == WorkerState::Quarantined {
            return BudgetDecision::Quarantine;
        }

        let window_start = now_ms.saturating_sub(self.policy.restart_window_s * 1_000);
        self.restart_timestamps_ms.retain(|&ts| ts >= window_start);

        if self.restart_timestamps_ms.len() >= self.policy.max_restarts as usize {
            tracing::error!(
                restarts = self.restart_timestamps_ms.len(),
                window_s = self.policy.restart_window_s,
                ?detection,
                "restart budget exhausted, quarantining worker"
            );
            self.state = WorkerState::Quarantined;
            return BudgetDecision::Quarantine;
        }

        self.restart_timestamps_ms.push(now_ms);
        self.state = WorkerState::Restarting;
        tracing::warn!(
            ?detection,
            used = self.restart_timestamps_ms.len(),
            budget = self.policy.max_restarts,
            "restarting worker"
        );
        BudgetDecision::Restart
    }
}
