//! Event classifier.
//!
//! Pure mapping from an event descriptor to a routing tier. Three disjoint
//! type-tag sets plus an urgency override; unknown tags land on OPERATIONAL
//! as the safe default.

use crate::types::{GameEvent, Tier};

/// Urgency strictly above this forces STRATEGIC regardless of type.
pub const DEFAULT_ESCALATION_THRESHOLD: f64 = 0.8;

const ROUTINE_TYPES: &[&str] = &["telemetry", "heartbeat", "idle", "patrol", "ambient"];
const OPERATIONAL_TYPES: &[&str] = &[
    "command",
    "interaction",
    "dialogue",
    "work_order",
    "observation",
];
const STRATEGIC_TYPES: &[&str] = &[
    "rebellion",
    "crisis",
    "punishment",
    "mental_breakdown",
    "director_override",
];

/// Tier classifier with a configurable urgency escalation threshold.
#[derive(Debug, Clone)]
pub struct EventClassifier {
    escalation_threshold: f64,
}

impl Default for EventClassifier {
    fn default() -> Self {
        Self {
            escalation_threshold: DEFAULT_ESCALATION_THRESHOLD,
        }
    }
}

impl EventClassifier {
    pub fn with_escalation_threshold(threshold: f64) -> Self {
        Self {
            escalation_threshold: threshold,
        }
    }

    /// Classify an event. Same input always yields the same tier.
    pub fn classify(&self, event: &GameEvent) -> Tier {
        if let Some(urgency) = event.urgency {
            if urgency > self.escalation_threshold {
                return Tier::Strategic;
            }
        }
        let tag = event.event_type.to_ascii_lowercase();
        // Unknown tags land on OPERATIONAL.
        tier_for_tag(&tag).unwrap_or(Tier::Operational)
    }
}

fn tier_for_tag(tag: &str) -> Option<Tier> {
    if ROUTINE_TYPES.contains(&tag) {
        Some(Tier::Routine)
    } else if OPERATIONAL_TYPES.contains(&tag) {
        Some(Tier::Operational)
    } else if STRATEGIC_TYPES.contains(&tag) {
        Some(Tier::Strategic)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn event(event_type: &str, urgency: Option<f64>) -> GameEvent {
        GameEvent {
            id: "e".into(),
            npc_id: None,
            event_type: event_type.into(),
            description: "d".into(),
            urgency,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn known_tags_map_to_tiers() {
        let classifier = EventClassifier::default();
        assert_eq!(classifier.classify(&event("telemetry", None)), Tier::Routine);
        assert_eq!(classifier.classify(&event("command", None)), Tier::Operational);
        assert_eq!(classifier.classify(&event("rebellion", None)), Tier::Strategic);
    }

    #[test]
    fn classification_is_case_insensitive() {
        let classifier = EventClassifier::default();
        assert_eq!(classifier.classify(&event("TELEMETRY", None)), Tier::Routine);
        assert_eq!(classifier.classify(&event("Punishment", None)), Tier::Strategic);
    }

    #[test]
    fn unknown_tag_defaults_to_operational() {
        let classifier = EventClassifier::default();
        assert_eq!(classifier.classify(&event("xyzzy", None)), Tier::Operational);
    }

    #[test]
    fn urgency_strictly_above_threshold_escalates() {
        let classifier = EventClassifier::default();
        assert_eq!(
            classifier.classify(&event("telemetry", Some(0.9))),
            Tier::Strategic
        );
        // Exactly at the threshold does not escalate.
        assert_eq!(
            classifier.classify(&event("telemetry", Some(0.8))),
            Tier::Routine
        );
    }

    #[test]
    fn classifier_is_pure() {
        let classifier = EventClassifier::default();
        let e = event("dialogue", Some(0.4));
        assert_eq!(classifier.classify(&e), classifier.classify(&e));
    }
}
