//! Persistence operations.

use serde::{Deserialize, Serialize};

/// A deferred write against the memory graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "op")]
pub enum PersistOp {
    /// Outcome of one pipeline pass for a subject.
    ActionOutcome {
        npc_id: String,
        event_type: String,
        /// False when the interceptor vetoed the response.
        success: bool,
        /// Risk probability observed during the pass.
        magnitude: f64,
    },
    /// A direct confidence-in-director observation.
    ConfidenceSample { npc_id: String, value: f64 },
}

impl PersistOp {
    pub fn npc_id(&self) -> &str {
        match self {
            Self::ActionOutcome { npc_id, .. } | Self::ConfidenceSample { npc_id, .. } => npc_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ops_round_trip_as_tagged_json() {
        let op = PersistOp::ActionOutcome {
            npc_id: "n1".into(),
            event_type: "command".into(),
            success: true,
            magnitude: 0.3,
        };
        let json = serde_json::to_string(&op).unwrap();
        assert!(json.contains("\"op\":\"actionOutcome\""));
        let back: PersistOp = serde_json::from_str(&json).unwrap();
        assert_eq!(back.npc_id(), "n1");
    }
}
