//! Memory graph session contract.
//!
//! The graph itself is an external collaborator; the pipeline only needs the
//! capability to apply persistence ops and to read a decayed
//! confidence-in-director. An in-memory implementation backs tests and
//! credential-less deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

use crate::ops::PersistOp;

/// Confidence drifts toward this baseline as samples age.
const CONFIDENCE_BASELINE: f64 = 0.5;
/// Half-life of a confidence sample, in seconds.
const CONFIDENCE_HALF_LIFE_S: f64 = 3_600.0;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory backend unavailable: {0}")]
    Unavailable(String),
}

/// A session against the memory graph.
#[async_trait]
pub trait MemorySession: Send + Sync {
    /// Apply one persistence op.
    async fn apply(&self, op: &PersistOp) -> Result<(), MemoryError>;

    /// Decayed confidence-in-director for a subject, when one is known.
    async fn director_confidence(&self, npc_id: &str) -> Result<Option<f64>, MemoryError>;
}

#[derive(Debug, Clone)]
struct NpcRecord {
    confidence: f64,
    sampled_at: DateTime<Utc>,
    outcomes: u64,
    failures: u64,
}

/// In-process memory graph.
pub struct InMemoryGraph {
    records: RwLock<HashMap<String, NpcRecord>>,
}

impl Default for InMemoryGraph {
    fn default() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exponential decay toward the baseline by sample age.
    fn decayed(confidence: f64, sampled_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let age_s = (now - sampled_at).num_milliseconds().max(0) as f64 / 1_000.0;
        let weight = 0.5_f64.powf(age_s / CONFIDENCE_HALF_LIFE_S);
        CONFIDENCE_BASELINE + (confidence - CONFIDENCE_BASELINE) * weight
    }
}

#[async_trait]
impl MemorySession for InMemoryGraph {
    async fn apply(&self, op: &PersistOp) -> Result<(), MemoryError> {
        let mut records = self.records.write();
        let record = records
            .entry(op.npc_id().to_string())
            .or_insert_with(|| NpcRecord {
                confidence: CONFIDENCE_BASELINE,
                sampled_at: Utc::now(),
                outcomes: 0,
                failures: 0,
            });
        match op {
            PersistOp::ActionOutcome {
                success, magnitude, ..
            } => {
                record.outcomes += 1;
                if !*success {
                    record.failures += 1;
                    // Vetoes erode confidence proportional to observed risk.
                    record.confidence = (record.confidence - 0.1 * magnitude).max(0.0);
                    record.sampled_at = Utc::now();
                }
            }
            PersistOp::ConfidenceSample { value, .. } => {
                record.confidence = value.clamp(0.0, 1.0);
                record.sampled_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn director_confidence(&self, npc_id: &str) -> Result<Option<f64>, MemoryError> {
        let records = self.records.read();
        Ok(records
            .get(npc_id)
            .map(|r| Self::decayed(r.confidence, r.sampled_at, Utc::now())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn unknown_subject_has_no_confidence() {
        let graph = InMemoryGraph::new();
        assert_eq!(graph.director_confidence("ghost").await.unwrap(), None);
    }

    #[tokio::test]
    async fn confidence_sample_is_readable_back() {
        let graph = InMemoryGraph::new();
        graph
            .apply(&PersistOp::ConfidenceSample {
                npc_id: "n1".into(),
                value: 0.9,
            })
            .await
            .unwrap();
        let c = graph.director_confidence("n1").await.unwrap().unwrap();
        // Fresh sample, negligible decay.
        assert!((c - 0.9).abs() < 0.01);
    }

    #[tokio::test]
    async fn failed_outcomes_erode_confidence() {
        let graph = InMemoryGraph::new();
        graph
            .apply(&PersistOp::ConfidenceSample {
                npc_id: "n1".into(),
                value: 0.8,
            })
            .await
            .unwrap();
        graph
            .apply(&PersistOp::ActionOutcome {
                npc_id: "n1".into(),
                event_type: "command".into(),
                success: false,
                magnitude: 1.0,
            })
            .await
            .unwrap();
        let c = graph.director_confidence("n1").await.unwrap().unwrap();
        assert!(c < 0.75);
    }

    #[test]
    fn decay_converges_to_baseline() {
        let now = Utc::now();
        let old = now - Duration::hours(24);
        let decayed = InMemoryGraph::decayed(1.0, old, now);
        assert!((decayed - CONFIDENCE_BASELINE).abs() < 0.001);
        let fresh = InMemoryGraph::decayed(1.0, now, now);
        assert!((fresh - 1.0).abs() < 0.001);
    }
}
