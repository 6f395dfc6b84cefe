//! Rail evaluation types.

use serde::{Deserialize, Serialize};

/// Everything a rail may inspect about one pipeline pass.
#[derive(Debug, Clone, Default)]
pub struct RailContext {
    /// Rebellion probability from the external risk signal, in [0, 1].
    pub rebellion_probability: f64,
    /// Completion text under evaluation.
    pub completion_text: String,
    /// Elapsed pipeline time so far, milliseconds.
    pub latency_ms: u64,
    /// Current environmental-risk ("infestation") level, [0, 100].
    pub infestation_level: u8,
    /// Event type tag, used by the aggression check.
    pub event_type: String,
    /// Event urgency interpreted as action intensity, [0, 1].
    pub intensity: f64,
    /// Decayed confidence-in-director, when the memory collaborator has one.
    pub director_confidence: Option<f64>,
    /// Expected response structure, when the caller wants one enforced.
    pub expected_schema: Option<ResponseSchema>,
}

/// Verdict from a single rail, and from the interceptor as a whole.
///
/// `allowed` is always authoritative. A soft finding leaves `allowed = true`
/// while attaching `reason` and `rule_violated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RailResult {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_violated: Option<String>,
}

impl RailResult {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            rule_violated: None,
        }
    }

    pub fn deny(rule: &str, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            rule_violated: Some(rule.to_string()),
        }
    }

    pub fn soft(rule: &str, reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: Some(reason.into()),
            rule_violated: Some(rule.to_string()),
        }
    }

    /// Whether this result carries a finding (hard or soft).
    pub fn flagged(&self) -> bool {
        self.rule_violated.is_some()
    }
}

/// Minimal structural expectation for a JSON completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseSchema {
    /// Required top-level fields and their kinds.
    pub required: Vec<(String, FieldKind)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Bool,
    Object,
    Array,
    Any,
}

impl FieldKind {
    pub fn matches(&self, value: &serde_json::Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Any => true,
        }
    }
}
