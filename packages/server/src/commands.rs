//! NPC command surface.
//!
//! Validated command envelopes forwarded to game clients via the
//! `npc-commands` channel. Validation is schema-shaped: each command type
//! has its own required payload fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Largest accepted command batch.
pub const MAX_BATCH: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    MoveTo,
    Stop,
    LookAt,
    PlayMontage,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    pub command_id: String,
    pub npc_id: String,
    pub command_type: CommandType,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub priority: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandAccepted {
    pub accepted: bool,
    pub command_id: String,
    pub command_type: CommandType,
    pub npc_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum BatchItemResult {
    Accepted { command_id: String, accepted: bool },
    Rejected { command_id: String, error: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub total: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub results: Vec<BatchItemResult>,
}

const MOVEMENT_MODES: &[&str] = &["walk", "run", "sprint", "crouch"];

fn require_location(payload: &Value, field: &str) -> Result<(), String> {
    let location = payload
        .get(field)
        .ok_or_else(|| format!("payload missing {field}"))?;
    for axis in ["x", "y", "z"] {
        if !location.get(axis).map(Value::is_number).unwrap_or(false) {
            return Err(format!("{field}.{axis} must be a number"));
        }
    }
    Ok(())
}

impl CommandRequest {
    /// Validate the payload against the command type's schema.
    pub fn validate(&self) -> Result<(), String> {
        if self.command_id.trim().is_empty() {
            return Err("commandId must not be empty".into());
        }
        if self.npc_id.trim().is_empty() {
            return Err("npcId must not be empty".into());
        }
        match self.command_type {
            CommandType::MoveTo => {
                require_location(&self.payload, "targetLocation")?;
                if let Some(mode) = self.payload.get("movementMode") {
                    let mode = mode
                        .as_str()
                        .ok_or_else(|| "movementMode must be a string".to_string())?;
                    if !MOVEMENT_MODES.contains(&mode) {
                        return Err(format!("movementMode '{mode}' not recognized"));
                    }
                }
                if let Some(radius) = self.payload.get("acceptanceRadius") {
                    if !radius.is_number() {
                        return Err("acceptanceRadius must be a number".into());
                    }
                }
            }
            CommandType::Stop => {
                if let Some(interrupt) = self.payload.get("interruptMontage") {
                    if !interrupt.is_boolean() {
                        return Err("interruptMontage must be a boolean".into());
                    }
                }
            }
            CommandType::LookAt => {
                require_location(&self.payload, "targetLocation")?;
            }
            CommandType::PlayMontage => {
                let name = self
                    .payload
                    .get("montageName")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                if name.trim().is_empty() {
                    return Err("payload missing montageName".into());
                }
                if let Some(rate) = self.payload.get("playRate") {
                    if !rate.is_number() {
                        return Err("playRate must be a number".into());
                    }
                }
            }
        }
        Ok(())
    }
}
