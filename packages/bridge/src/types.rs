//! Simulation service wire types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Risk signal for one subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebellionProbe {
    pub subject_id: String,
    /// Probability in [0, 1].
    pub probability: f64,
    #[serde(default)]
    pub factors: Vec<String>,
    pub threshold_exceeded: bool,
}

impl RebellionProbe {
    /// Neutral substitute used when the risk service is unreachable.
    pub fn unavailable(subject_id: &str) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            probability: 0.0,
            factors: Vec::new(),
            threshold_exceeded: false,
        }
    }
}

/// An NPC action reported into the simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpcActionReport {
    pub action_type: String,
    pub intensity: f64,
    pub description: String,
}

/// Simulation world snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationStatus {
    pub tick: u64,
    pub population: u32,
    pub resources: f64,
    pub infestation_level: u8,
}

/// Result of a cleansing operation deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleansingResult {
    pub targeted: Vec<String>,
    pub cleansed: u32,
}

/// Health hook payload from the simulation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationHealth {
    pub status: String,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Server-stream subscription filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryFilter {
    pub include_mental_breakdowns: bool,
    pub include_permanent_traumas: bool,
    pub include_state_changes: bool,
}

impl TelemetryFilter {
    pub fn everything() -> Self {
        Self {
            include_mental_breakdowns: true,
            include_permanent_traumas: true,
            include_state_changes: true,
        }
    }
}

/// One telemetry item off the stream, discriminated by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum TelemetryItem {
    StateChange {
        npc_id: String,
        from: String,
        to: String,
        #[serde(default)]
        catastrophic: bool,
        #[serde(default)]
        attributes: HashMap<String, serde_json::Value>,
    },
    MentalBreakdown {
        npc_id: String,
        severity: f64,
        #[serde(default)]
        catastrophic: bool,
    },
    PermanentTrauma {
        npc_id: String,
        trauma: String,
        #[serde(default)]
        catastrophic: bool,
    },
}

impl TelemetryItem {
    pub fn npc_id(&self) -> &str {
        match self {
            Self::StateChange { npc_id, .. }
            | Self::MentalBreakdown { npc_id, .. }
            | Self::PermanentTrauma { npc_id, .. } => npc_id,
        }
    }

    pub fn is_catastrophic(&self) -> bool {
        match self {
            Self::StateChange { catastrophic, .. }
            | Self::MentalBreakdown { catastrophic, .. }
            | Self::PermanentTrauma { catastrophic, .. } => *catastrophic,
        }
    }

    /// New infestation level carried on a state change, when present.
    pub fn infestation_level(&self) -> Option<u8> {
        match self {
            Self::StateChange { attributes, .. } => attributes
                .get("infestation_level")
                .and_then(|v| v.as_u64())
                .map(|v| v.min(100) as u8),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telemetry_discriminates_on_kind() {
        let json = r#"{"kind":"mental_breakdown","npcId":"n7","severity":0.9}"#;
        let item: TelemetryItem = serde_json::from_str(json).unwrap();
        assert!(matches!(item, TelemetryItem::MentalBreakdown { .. }));
        assert_eq!(item.npc_id(), "n7");
        assert!(!item.is_catastrophic());
    }

    #[test]
    fn state_change_carries_infestation_level() {
        let json = r#"{"kind":"state_change","npcId":"n1","from":"calm","to":"agitated",
                       "attributes":{"infestation_level": 72}}"#;
        let item: TelemetryItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.infestation_level(), Some(72));
    }

    #[test]
    fn unavailable_probe_is_neutral() {
        let probe = RebellionProbe::unavailable("n1");
        assert_eq!(probe.probability, 0.0);
        assert!(!probe.threshold_exceeded);
    }
}
