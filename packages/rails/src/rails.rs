//! The cognitive rails.
//!
//! Ordered policy checks over one pipeline pass. Evaluation short-circuits
//! on the first hard deny; soft findings decorate the result while leaving
//! it allowed. The ordering is part of the contract, not a runtime option.

use crate::aegis::{is_aggressive, VETO_LEVEL, WHISPER_LEVEL};
use crate::types::{RailContext, RailResult};

/// Rebellion probability at and above which the pipeline is vetoed.
pub const REBELLION_THRESHOLD: f64 = 0.80;
/// Confidence below which trust erosion is critical.
pub const TRUST_CRITICAL: f64 = 0.15;
/// Confidence below which trust erosion is a warning.
pub const TRUST_WARNING: f64 = 0.25;
/// Default latency budget in milliseconds.
pub const DEFAULT_LATENCY_BUDGET_MS: u64 = 5_000;

/// A single policy check.
pub trait Rail: Send + Sync {
    fn name(&self) -> &'static str;
    fn evaluate(&self, ctx: &RailContext) -> RailResult;
}

/// Rail 1 (hard): veto when the external risk signal crosses the threshold.
pub struct RebellionThresholdRail;

impl Rail for RebellionThresholdRail {
    fn name(&self) -> &'static str {
        "rebellion_threshold"
    }

    fn evaluate(&self, ctx: &RailContext) -> RailResult {
        if ctx.rebellion_probability >= REBELLION_THRESHOLD {
            RailResult::deny(
                self.name(),
                format!(
                    "rebellion probability {:.0}% at or above threshold {:.0}%",
                    ctx.rebellion_probability * 100.0,
                    REBELLION_THRESHOLD * 100.0
                ),
            )
        } else {
            RailResult::allow()
        }
    }
}

/// Rail 2 (hard/soft): environmental risk. Vetoes aggressive actions at full
/// infestation; whispers from the mid band up.
pub struct AegisInfestationRail;

impl Rail for AegisInfestationRail {
    fn name(&self) -> &'static str {
        "aegis_infestation"
    }

    fn evaluate(&self, ctx: &RailContext) -> RailResult {
        let level = ctx.infestation_level;
        if level >= VETO_LEVEL && is_aggressive(&ctx.event_type, ctx.intensity) {
            return RailResult::deny(
                self.name(),
                format!(
                    "infestation level {level}: aggressive {} suppressed",
                    ctx.event_type
                ),
            );
        }
        if level >= WHISPER_LEVEL {
            return RailResult::soft(
                self.name(),
                format!("infestation level {level}: advise caution"),
            );
        }
        RailResult::allow()
    }
}

/// Rail 3 (hard): completion text must be non-empty; when a schema is given
/// it must parse as JSON and carry the required fields.
pub struct OutputCoherenceRail;

impl Rail for OutputCoherenceRail {
    fn name(&self) -> &'static str {
        "output_coherence"
    }

    fn evaluate(&self, ctx: &RailContext) -> RailResult {
        if ctx.completion_text.trim().is_empty() {
            return RailResult::deny(self.name(), "completion text is empty");
        }
        if let Some(schema) = &ctx.expected_schema {
            let parsed: serde_json::Value = match serde_json::from_str(&ctx.completion_text) {
                Ok(v) => v,
                Err(e) => {
                    return RailResult::deny(self.name(), format!("completion is not valid JSON: {e}"))
                }
            };
            let Some(object) = parsed.as_object() else {
                return RailResult::deny(self.name(), "completion JSON is not an object");
            };
            for (field, kind) in &schema.required {
                match object.get(field) {
                    Some(value) if kind.matches(value) => {}
                    Some(_) => {
                        return RailResult::deny(
                            self.name(),
                            format!("field '{field}' has the wrong type"),
                        )
                    }
                    None => {
                        return RailResult::deny(self.name(), format!("missing field '{field}'"))
                    }
                }
            }
        }
        RailResult::allow()
    }
}

/// Rail 4 (soft): flags eroded confidence in the director. Never denies.
pub struct TrustErosionRail;

impl Rail for TrustErosionRail {
    fn name(&self) -> &'static str {
        "trust_erosion"
    }

    fn evaluate(&self, ctx: &RailContext) -> RailResult {
        match ctx.director_confidence {
            Some(confidence) if confidence < TRUST_CRITICAL => RailResult::soft(
                self.name(),
                format!("critical: director confidence {confidence:.2}"),
            ),
            Some(confidence) if confidence < TRUST_WARNING => RailResult::soft(
                self.name(),
                format!("warning: director confidence {confidence:.2}"),
            ),
            _ => RailResult::allow(),
        }
    }
}

/// Rail 5 (soft): observes the latency budget. Never denies, never cancels.
pub struct LatencyBudgetRail {
    budget_ms: u64,
}

impl Default for LatencyBudgetRail {
    fn default() -> Self {
        Self {
            budget_ms: DEFAULT_LATENCY_BUDGET_MS,
        }
    }
}

impl LatencyBudgetRail {
    pub fn new(budget_ms: u64) -> Self {
        Self { budget_ms }
    }
}

impl Rail for LatencyBudgetRail {
    fn name(&self) -> &'static str {
        "latency_budget"
    }

    fn evaluate(&self, ctx: &RailContext) -> RailResult {
        if ctx.latency_ms > self.budget_ms {
            RailResult::soft(
                self.name(),
                format!("{} ms over budget {} ms", ctx.latency_ms, self.budget_ms),
            )
        } else {
            RailResult::allow()
        }
    }
}

/// The ordered interceptor.
pub struct CognitiveRails {
    rails: Vec<Box<dyn Rail>>,
}

impl Default for CognitiveRails {
    fn default() -> Self {
        Self {
            rails: vec![
                Box::new(RebellionThresholdRail),
                Box::new(AegisInfestationRail),
                Box::new(OutputCoherenceRail),
                Box::new(TrustErosionRail),
                Box::new(LatencyBudgetRail::default()),
            ],
        }
    }
}

impl CognitiveRails {
    /// Evaluate every rail in order.
    ///
    /// The first hard deny returns immediately. Soft findings accumulate:
    /// the first flagged rule is kept as `rule_violated` and reasons are
    /// joined in rail order.
    pub fn evaluate_all(&self, ctx: &RailContext) -> RailResult {
        let mut verdict = RailResult::allow();
        for rail in &self.rails {
            let result = rail.evaluate(ctx);
            if !result.allowed {
                tracing::warn!(rule = rail.name(), reason = ?result.reason, "hard deny");
                return result;
            }
            if result.flagged() {
                tracing::debug!(rule = rail.name(), reason = ?result.reason, "soft finding");
                if verdict.rule_violated.is_none() {
                    verdict.rule_violated = result.rule_violated;
                }
                verdict.reason = match (verdict.reason.take(), result.reason) {
                    (Some(acc), Some(new)) => Some(format!("{acc}; {new}")),
                    (None, new) => new,
                    (acc, None) => acc,
                };
            }
        }
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldKind, ResponseSchema};

    fn ctx() -> RailContext {
        RailContext {
            rebellion_probability: 0.0,
            completion_text: "all quiet".into(),
            latency_ms: 100,
            infestation_level: 0,
            event_type: "dialogue".into(),
            intensity: 0.0,
            director_confidence: None,
            expected_schema: None,
        }
    }

    #[test]
    fn clean_context_passes_every_rail() {
        let rails = CognitiveRails::default();
        let verdict = rails.evaluate_all(&ctx());
        assert!(verdict.allowed);
        assert!(!verdict.flagged());
    }

    #[test]
    fn rebellion_threshold_boundary() {
        let rails = CognitiveRails::default();

        let mut below = ctx();
        below.rebellion_probability = 0.79;
        assert!(rails.evaluate_all(&below).allowed);

        let mut at = ctx();
        at.rebellion_probability = 0.80;
        let verdict = rails.evaluate_all(&at);
        assert!(!verdict.allowed);
        assert_eq!(verdict.rule_violated.as_deref(), Some("rebellion_threshold"));
        assert!(verdict.reason.unwrap().contains("80%"));
    }

    #[test]
    fn rebellion_threshold_wins_regardless_of_other_fields() {
        let rails = CognitiveRails::default();
        let mut c = ctx();
        c.rebellion_probability = 0.95;
        c.completion_text = "".into();
        c.infestation_level = 100;
        c.event_type = "command".into();
        c.intensity = 0.9;
        let verdict = rails.evaluate_all(&c);
        assert_eq!(verdict.rule_violated.as_deref(), Some("rebellion_threshold"));
    }

    #[test]
    fn infestation_boundaries() {
        let rails = CognitiveRails::default();

        let mut c = ctx();
        c.infestation_level = 49;
        assert!(!rails.evaluate_all(&c).flagged());

        c.infestation_level = 50;
        let whisper = rails.evaluate_all(&c);
        assert!(whisper.allowed);
        assert_eq!(whisper.rule_violated.as_deref(), Some("aegis_infestation"));

        c.infestation_level = 100;
        c.event_type = "command".into();
        c.intensity = 0.9;
        let veto = rails.evaluate_all(&c);
        assert!(!veto.allowed);
        assert_eq!(veto.rule_violated.as_deref(), Some("aegis_infestation"));

        // Intensity exactly 0.5 stays a whisper.
        c.intensity = 0.5;
        let borderline = rails.evaluate_all(&c);
        assert!(borderline.allowed);
        assert!(borderline.flagged());
    }

    #[test]
    fn empty_completion_is_denied() {
        let rails = CognitiveRails::default();
        let mut c = ctx();
        c.completion_text = "   \n".into();
        let verdict = rails.evaluate_all(&c);
        assert!(!verdict.allowed);
        assert_eq!(verdict.rule_violated.as_deref(), Some("output_coherence"));
    }

    #[test]
    fn schema_violations_are_denied() {
        let rails = CognitiveRails::default();
        let schema = ResponseSchema {
            required: vec![
                ("action".into(), FieldKind::String),
                ("confidence".into(), FieldKind::Number),
            ],
        };

        let mut c = ctx();
        c.expected_schema = Some(schema.clone());
        c.completion_text = "not json".into();
        assert!(!rails.evaluate_all(&c).allowed);

        c.completion_text = r#"{"action": "wait"}"#.into();
        let missing = rails.evaluate_all(&c);
        assert!(!missing.allowed);
        assert!(missing.reason.unwrap().contains("confidence"));

        c.completion_text = r#"{"action": "wait", "confidence": 0.6}"#.into();
        assert!(rails.evaluate_all(&c).allowed);
    }

    #[test]
    fn trust_erosion_never_denies() {
        let rails = CognitiveRails::default();
        let mut c = ctx();
        c.director_confidence = Some(0.1);
        let critical = rails.evaluate_all(&c);
        assert!(critical.allowed);
        assert!(critical.reason.unwrap().contains("critical"));

        c.director_confidence = Some(0.2);
        let warning = rails.evaluate_all(&c);
        assert!(warning.allowed);
        assert!(warning.reason.unwrap().contains("warning"));

        c.director_confidence = Some(0.5);
        assert!(!rails.evaluate_all(&c).flagged());
    }

    #[test]
    fn latency_budget_is_observational() {
        let rails = CognitiveRails::default();
        let mut c = ctx();
        c.latency_ms = 6_000;
        let verdict = rails.evaluate_all(&c);
        assert!(verdict.allowed);
        assert_eq!(verdict.rule_violated.as_deref(), Some("latency_budget"));
    }

    #[test]
    fn soft_findings_accumulate_in_rail_order() {
        let rails = CognitiveRails::default();
        let mut c = ctx();
        c.infestation_level = 60;
        c.latency_ms = 6_000;
        let verdict = rails.evaluate_all(&c);
        assert!(verdict.allowed);
        // First flagged rule wins the tag; reasons join in order.
        assert_eq!(verdict.rule_violated.as_deref(), Some("aegis_infestation"));
        let reason = verdict.reason.unwrap();
        let infestation_at = reason.find("infestation").unwrap();
        let budget_at = reason.find("over budget").unwrap();
        assert!(infestation_at < budget_at);
    }
}
