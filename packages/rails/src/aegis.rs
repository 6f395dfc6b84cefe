//! Aegis risk supervisor.
//!
//! Holds the process-wide environmental-risk level ("infestation") and
//! advises the interceptor. The supervisor and the infestation rail share
//! one rule table:
//!
//! | level   | aggressive action | decision |
//! |---------|-------------------|----------|
//! | < 50    | any               | allow    |
//! | 50..=99 | any               | whisper  |
//! | 100     | yes               | veto     |
//! | 100     | no                | whisper  |
//!
//! Aggressive means type `command` or `punishment` with intensity > 0.5.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Level at and above which the supervisor whispers.
pub const WHISPER_LEVEL: u8 = 50;
/// Level at which aggressive actions are vetoed outright.
pub const VETO_LEVEL: u8 = 100;
/// Intensity strictly above this makes a command/punishment aggressive.
pub const AGGRESSIVE_INTENSITY: f64 = 0.5;

/// Advisory outcome for one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AegisAction {
    Allow,
    Whisper,
    Veto,
}

/// Full supervisor verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AegisDecision {
    pub decision: AegisAction,
    pub vetoed_by_aegis: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Whether an action counts as aggressive under the shared rule table.
pub fn is_aggressive(action_type: &str, intensity: f64) -> bool {
    let tag = action_type.to_ascii_lowercase();
    (tag == "command" || tag == "punishment") && intensity > AGGRESSIVE_INTENSITY
}

/// Process-wide infestation level holder.
///
/// Passed to collaborators explicitly; never an ambient singleton.
pub struct AegisSupervisor {
    level: Mutex<u8>,
}

impl Default for AegisSupervisor {
    fn default() -> Self {
        Self::new(0)
    }
}

impl AegisSupervisor {
    pub fn new(level: u8) -> Self {
        Self {
            level: Mutex::new(level.min(VETO_LEVEL)),
        }
    }

    pub fn level(&self) -> u8 {
        *self.level.lock()
    }

    /// Set the level, clamped to [0, 100].
    pub fn set_level(&self, level: u8) {
        let clamped = level.min(VETO_LEVEL);
        *self.level.lock() = clamped;
        tracing::debug!(level = clamped, "infestation level set");
    }

    /// Apply a clamped delta, e.g. from telemetry spread events.
    pub fn record_spread(&self, delta: i16) {
        let mut level = self.level.lock();
        let next = (*level as i16 + delta).clamp(0, VETO_LEVEL as i16) as u8;
        *level = next;
    }

    /// Advise on one action per the rule table.
    pub fn evaluate_action(
        &self,
        action_type: &str,
        intensity: f64,
        npc_id: Option<&str>,
    ) -> AegisDecision {
        let level = self.level();
        let aggressive = is_aggressive(action_type, intensity);
        let subject = npc_id.unwrap_or("unknown");

        if level >= VETO_LEVEL && aggressive {
            return AegisDecision {
                decision: AegisAction::Veto,
                vetoed_by_aegis: true,
                message: Some(format!(
                    "infestation level {level}: aggressive {action_type} against {subject} vetoed"
                )),
            };
        }
        if level >= WHISPER_LEVEL {
            return AegisDecision {
                decision: AegisAction::Whisper,
                vetoed_by_aegis: false,
                message: Some(format!(
                    "infestation level {level}: advise caution on {action_type}"
                )),
            };
        }
        AegisDecision {
            decision: AegisAction::Allow,
            vetoed_by_aegis: false,
            message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_is_clamped() {
        let aegis = AegisSupervisor::new(0);
        aegis.set_level(250);
        assert_eq!(aegis.level(), 100);
        aegis.record_spread(-200);
        assert_eq!(aegis.level(), 0);
        aegis.record_spread(30);
        assert_eq!(aegis.level(), 30);
    }

    #[test]
    fn below_whisper_level_allows() {
        let aegis = AegisSupervisor::new(49);
        let d = aegis.evaluate_action("command", 0.9, Some("n1"));
        assert_eq!(d.decision, AegisAction::Allow);
        assert!(!d.vetoed_by_aegis);
    }

    #[test]
    fn mid_band_whispers_for_any_action() {
        for level in [50, 99] {
            let aegis = AegisSupervisor::new(level);
            let d = aegis.evaluate_action("punishment", 0.9, Some("n1"));
            assert_eq!(d.decision, AegisAction::Whisper);
            assert!(!d.vetoed_by_aegis);
        }
    }

    #[test]
    fn full_level_vetoes_only_aggressive() {
        let aegis = AegisSupervisor::new(100);

        let aggressive = aegis.evaluate_action("command", 0.9, Some("n1"));
        assert_eq!(aggressive.decision, AegisAction::Veto);
        assert!(aggressive.vetoed_by_aegis);

        let passive = aegis.evaluate_action("dialogue", 0.9, Some("n1"));
        assert_eq!(passive.decision, AegisAction::Whisper);

        // Intensity exactly 0.5 is not aggressive.
        let borderline = aegis.evaluate_action("command", 0.5, Some("n1"));
        assert_eq!(borderline.decision, AegisAction::Whisper);
    }

    #[test]
    fn aggression_check_is_case_insensitive() {
        assert!(is_aggressive("Command", 0.6));
        assert!(is_aggressive("PUNISHMENT", 0.51));
        assert!(!is_aggressive("dialogue", 0.9));
        assert!(!is_aggressive("command", 0.5));
    }
}
