//! Routing audit ring.
//!
//! Fixed-capacity overwriting log of routing decisions. Appends never fail
//! and never block the pipeline; the ring sinks silently when full by
//! overwriting the oldest entry.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::VecDeque;
use uuid::Uuid;

use crate::breaker::BreakerState;
use crate::types::{RoutingDecision, Tier};

/// Default ring capacity.
const DEFAULT_CAPACITY: usize = 1000;

/// Maximum characters of event description kept on an entry.
const DESCRIPTION_LIMIT: usize = 200;

/// One audited routing decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub decision: RoutingDecision,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Estimated USD cost of the call.
    pub estimated_cost: f64,
    /// Breaker state of the chosen backend at completion time.
    pub breaker_state: BreakerState,
    /// Event description, truncated to 200 characters.
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        decision: RoutingDecision,
        input_tokens: u32,
        output_tokens: u32,
        estimated_cost: f64,
        breaker_state: BreakerState,
        description: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            decision,
            input_tokens,
            output_tokens,
            estimated_cost,
            breaker_state,
            description: truncate(description, DESCRIPTION_LIMIT),
            timestamp: Utc::now(),
        }
    }
}

fn truncate(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        s.to_string()
    } else {
        s.chars().take(limit).collect()
    }
}

/// Aggregate statistics over the ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStats {
    /// Lifetime append count, non-decreasing across capacity wraps.
    pub total: u64,
    /// Failover count over the retained window.
    pub failover_count: u64,
    /// Mean latency over the retained window, in milliseconds.
    pub mean_latency_ms: f64,
    /// Per-tier entry counts over the retained window.
    pub per_tier: HashMap<Tier, u64>,
}

struct RingInner {
    entries: VecDeque<AuditEntry>,
    total_appended: u64,
}

/// Fixed-capacity overwriting audit log.
pub struct AuditRing {
    inner: Mutex<RingInner>,
    capacity: usize,
}

impl Default for AuditRing {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl AuditRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RingInner {
                entries: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
                total_appended: 0,
            }),
            capacity: capacity.max(1),
        }
    }

    /// Append an entry, overwriting the oldest when at capacity.
    pub fn append(&self, entry: AuditEntry) {
        let mut inner = self.inner.lock();
        while inner.entries.len() >= self.capacity {
            inner.entries.pop_front();
        }
        inner.entries.push_back(entry);
        inner.total_appended += 1;
    }

    /// The `n` most recent entries, newest first.
    pub fn recent(&self, n: usize) -> Vec<AuditEntry> {
        let inner = self.inner.lock();
        inner.entries.iter().rev().take(n).cloned().collect()
    }

    /// Aggregate statistics. `total` is lifetime; the rest cover the
    /// retained window.
    pub fn stats(&self) -> AuditStats {
        let inner = self.inner.lock();
        let retained = inner.entries.len();
        let failover_count = inner.entries.iter().filter(|e| e.decision.failover).count() as u64;
        let mean_latency_ms = if retained > 0 {
            inner
                .entries
                .iter()
                .map(|e| e.decision.latency_ms as f64)
                .sum::<f64>()
                / retained as f64
        } else {
            0.0
        };
        let mut per_tier: HashMap<Tier, u64> = HashMap::new();
        for entry in &inner.entries {
            *per_tier.entry(entry.decision.tier).or_insert(0) += 1;
        }
        AuditStats {
            total: inner.total_appended,
            failover_count,
            mean_latency_ms,
            per_tier,
        }
    }

    /// Number of retained entries.
    pub fn size(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Drop all retained entries. The lifetime counter is kept.
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }
}
