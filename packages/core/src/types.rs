//! Shared types for the orchestration core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// An external game event admitted into the pipeline.
///
/// Immutable after admission; the coordinator only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEvent {
    /// Unique event id. Generated when the caller omits it.
    #[serde(default = "default_event_id")]
    pub id: String,
    /// Subject NPC, when the event concerns one.
    #[serde(default)]
    pub npc_id: Option<String>,
    /// Type tag consumed by the classifier.
    pub event_type: String,
    /// Free-text description appended to the prompt.
    pub description: String,
    /// Urgency in [0, 1]. Values above the escalation threshold force STRATEGIC.
    #[serde(default)]
    pub urgency: Option<f64>,
    /// Opaque metadata passed through untouched.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_event_id() -> String {
    Uuid::new_v4().to_string()
}

impl GameEvent {
    /// Validate required fields and ranges.
    pub fn validate(&self) -> Result<(), crate::error::CoreError> {
        if self.event_type.trim().is_empty() {
            return Err(crate::error::CoreError::InvalidInput(
                "eventType must not be empty".into(),
            ));
        }
        if self.description.trim().is_empty() {
            return Err(crate::error::CoreError::InvalidInput(
                "description must not be empty".into(),
            ));
        }
        if let Some(u) = self.urgency {
            if !(0.0..=1.0).contains(&u) {
                return Err(crate::error::CoreError::InvalidInput(format!(
                    "urgency {} outside [0, 1]",
                    u
                )));
            }
        }
        Ok(())
    }
}

/// Coarse priority band deciding which backend a request is eligible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Routine,
    Operational,
    Strategic,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Routine => "ROUTINE",
            Self::Operational => "OPERATIONAL",
            Self::Strategic => "STRATEGIC",
        }
    }
}

/// Backend family identifier.
///
/// `None` is the synthetic placeholder recorded on audit entries when routing
/// itself failed and no backend was ever chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendId {
    Anthropic,
    Openai,
    Google,
    Custom,
    None,
}

impl BackendId {
    /// Routing priority. Lower is preferred.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Anthropic => 0,
            Self::Openai => 1,
            Self::Google => 2,
            Self::Custom => 3,
            Self::None => u8::MAX,
        }
    }

    /// Environment variable carrying this backend's API key.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Openai => Some("OPENAI_API_KEY"),
            Self::Google => Some("GOOGLE_API_KEY"),
            Self::Custom | Self::None => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::Openai => "openai",
            Self::Google => "google",
            Self::Custom => "custom",
            Self::None => "none",
        }
    }
}

/// A model available under a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub id: String,
    pub backend: BackendId,
    pub tier: Tier,
    pub display_name: String,
    /// USD per million input tokens.
    pub input_cost_per_m: f64,
    /// USD per million output tokens.
    pub output_cost_per_m: f64,
    pub max_output_tokens: u32,
    /// Whether this model is the tier default across the whole catalogue.
    pub default_for_tier: bool,
}

impl ModelDescriptor {
    /// Estimated cost of a call in USD.
    pub fn estimate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 * self.input_cost_per_m + output_tokens as f64 * self.output_cost_per_m)
            / 1_000_000.0
    }
}

/// The outcome of one routing pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingDecision {
    pub tier: Tier,
    pub backend: BackendId,
    pub model_id: String,
    /// True only when a transparent in-call failover happened. External
    /// failover via the breaker on a later attempt is not recorded here.
    pub failover: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failover_from: Option<BackendId>,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// A completed backend call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResult {
    pub content: String,
    pub backend: BackendId,
    pub model_id: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub latency_ms: u64,
}

/// Per-call options for the resilient client.
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    /// Explicit execution mode, overriding the environment hint.
    pub mode: Option<crate::mode::ServiceMode>,
    /// Cap on output tokens; the model's own cap applies when absent.
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}
