//! Pipeline coordinator.
//!
//! Composes classify -> route -> complete -> risk probe -> rails -> publish
//! and hands the persistence write to the retry queue, fire-and-forget.
//! Within one event the steps run in strict sequence; across events nothing
//! is ordered.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

use epochmesh_bridge::{self as bridge, RiskSignal, TelemetryFilter, TelemetryItem};
use epochmesh_bus::{channels, EventBus};
use epochmesh_core::{
    CompletionClient, CompletionOptions, CoreError, EventClassifier, GameEvent, Tier,
};
use epochmesh_memory::{MemorySession, PersistOp, RetryQueue};
use epochmesh_rails::{AegisSupervisor, CognitiveRails, RailContext};

/// Risk probe summary carried on every pipeline response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebellionCheck {
    pub probability: f64,
    pub threshold_exceeded: bool,
}

/// What one pipeline pass produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResponse {
    pub event_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub npc_id: Option<String>,
    pub tier: Tier,
    /// Completion text, or the `[VETOED] <reason>` marker.
    pub ai_response: String,
    pub rebellion_check: RebellionCheck,
    pub vetoed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub veto_reason: Option<String>,
    pub processing_ms: u64,
}

/// The pipeline coordinator. All collaborators are explicit; nothing here is
/// ambient process state.
pub struct PipelineCoordinator {
    classifier: EventClassifier,
    client: Arc<CompletionClient>,
    risk: Arc<dyn RiskSignal>,
    rails: CognitiveRails,
    aegis: Arc<AegisSupervisor>,
    bus: Arc<EventBus>,
    memory: Arc<dyn MemorySession>,
    retry_queue: Arc<RetryQueue>,
}

impl PipelineCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        classifier: EventClassifier,
        client: Arc<CompletionClient>,
        risk: Arc<dyn RiskSignal>,
        rails: CognitiveRails,
        aegis: Arc<AegisSupervisor>,
        bus: Arc<EventBus>,
        memory: Arc<dyn MemorySession>,
        retry_queue: Arc<RetryQueue>,
    ) -> Self {
        Self {
            classifier,
            client,
            risk,
            rails,
            aegis,
            bus,
            memory,
            retry_queue,
        }
    }

    pub fn aegis(&self) -> &Arc<AegisSupervisor> {
        &self.aegis
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Tier-specific prompt wrapping the event fields.
    fn build_prompt(tier: Tier, event: &GameEvent) -> String {
        let instruction = match tier {
            Tier::Routine => "Acknowledge briefly and stay in character.",
            Tier::Operational => "Decide how the subject responds and issue a concrete action.",
            Tier::Strategic => {
                "Weigh colony-wide consequences before responding; this decision is binding."
            }
        };
        let subject = event.npc_id.as_deref().unwrap_or("the colony");
        format!(
            "[{}] {} Subject: {}. Event '{}': {}",
            tier.as_str(),
            instruction,
            subject,
            event.event_type,
            event.description
        )
    }

    /// Run one event through the full pipeline.
    pub async fn process_event(&self, event: GameEvent) -> Result<PipelineResponse, CoreError> {
        event.validate()?;
        let start = Instant::now();

        // 1-3. Classify, route, complete. Completion failures propagate; the
        // resilient client has already done breaker and audit bookkeeping.
        let tier = self.classifier.classify(&event);
        let prompt = Self::build_prompt(tier, &event);
        let completion = self
            .client
            .complete(tier, &prompt, &CompletionOptions::default())
            .await?;

        // 4. Risk probe; unreachable service never blocks the pipeline.
        let probe = match &event.npc_id {
            Some(npc_id) => match self.risk.rebellion_probability(npc_id).await {
                Ok(probe) => probe,
                Err(err) => {
                    tracing::warn!(npc = %npc_id, kind = err.kind(), "risk probe failed, assuming neutral");
                    bridge::RebellionProbe::unavailable(npc_id)
                }
            },
            None => bridge::RebellionProbe::unavailable(""),
        };

        // 5. Director confidence is optional and cheap; skip on any miss.
        let director_confidence = match &event.npc_id {
            Some(npc_id) => self
                .memory
                .director_confidence(npc_id)
                .await
                .ok()
                .flatten(),
            None => None,
        };

        // 6. Rails.
        let ctx = RailContext {
            rebellion_probability: probe.probability,
            completion_text: completion.content.clone(),
            latency_ms: start.elapsed().as_millis() as u64,
            infestation_level: self.aegis.level(),
            event_type: event.event_type.clone(),
            intensity: event.urgency.unwrap_or(0.0),
            director_confidence,
            expected_schema: None,
        };
        let verdict = self.rails.evaluate_all(&ctx);

        let vetoed = !verdict.allowed;
        let ai_response = if vetoed {
            format!(
                "[VETOED] {}",
                verdict.reason.as_deref().unwrap_or("policy violation")
            )
        } else {
            completion.content
        };

        let response = PipelineResponse {
            event_id: event.id.clone(),
            npc_id: event.npc_id.clone(),
            tier,
            ai_response,
            rebellion_check: RebellionCheck {
                probability: probe.probability,
                threshold_exceeded: probe.threshold_exceeded,
            },
            vetoed,
            veto_reason: if vetoed { verdict.reason.clone() } else { None },
            processing_ms: start.elapsed().as_millis() as u64,
        };

        // 7-9. Choose output channels.
        let infestation_level = self.aegis.level();
        let vetoed_by_aegis = verdict.rule_violated.as_deref() == Some("aegis_infestation");
        if vetoed {
            let mut augmented = serde_json::to_value(&response)
                .unwrap_or_else(|_| json!({"eventId": response.event_id}));
            augmented["vetoedByAegis"] = json!(vetoed_by_aegis);
            augmented["infestationLevel"] = json!(infestation_level);
            self.bus.publish(channels::COGNITIVE_RAILS, augmented);
            self.bus.publish(
                channels::REBELLION_ALERTS,
                json!({
                    "eventId": response.event_id,
                    "npcId": response.npc_id,
                    "reason": response.veto_reason,
                    "rebellionProbability": probe.probability,
                    "vetoedByAegis": vetoed_by_aegis,
                    "infestationLevel": infestation_level,
                    "timestamp": Utc::now().to_rfc3339(),
                }),
            );
        } else {
            if let Some(rule) = verdict.rule_violated.as_deref() {
                self.bus.publish(
                    channels::SYSTEM_STATUS,
                    json!({
                        "type": "whisper",
                        "eventId": response.event_id,
                        "npcId": response.npc_id,
                        "rule": rule,
                        "reason": verdict.reason,
                        "infestationLevel": infestation_level,
                        "timestamp": Utc::now().to_rfc3339(),
                    }),
                );
            }
            self.bus.publish(
                channels::NPC_EVENTS,
                serde_json::to_value(&response)
                    .unwrap_or_else(|_| json!({"eventId": response.event_id})),
            );
        }

        // 10. Fire-and-forget persistence through the bounded queue.
        if let Some(npc_id) = &event.npc_id {
            self.retry_queue.enqueue(PersistOp::ActionOutcome {
                npc_id: npc_id.clone(),
                event_type: event.event_type.clone(),
                success: !vetoed,
                magnitude: probe.probability,
            });
        }

        tracing::info!(
            event = %response.event_id,
            tier = tier.as_str(),
            vetoed,
            processing_ms = response.processing_ms,
            "pipeline pass complete"
        );
        Ok(response)
    }

    /// Process a batch concurrently, returning results in input order.
    pub async fn process_batch(
        &self,
        events: Vec<GameEvent>,
    ) -> Vec<Result<PipelineResponse, CoreError>> {
        futures::future::join_all(events.into_iter().map(|event| self.process_event(event))).await
    }

    /// Pump telemetry items into the bus and the Aegis supervisor.
    ///
    /// Items are dispatched by discriminator: state changes go to
    /// `npc-events`, breakdowns and traumas to `rebellion-alerts`;
    /// catastrophic items are echoed to `system-status`, and an
    /// `infestation_level` attribute change updates the supervisor.
    pub fn dispatch_telemetry(&self, item: &TelemetryItem) {
        if let Some(level) = item.infestation_level() {
            self.aegis.set_level(level);
        }
        let payload = serde_json::to_value(item).unwrap_or_default();
        match item {
            TelemetryItem::StateChange { .. } => {
                self.bus.publish(channels::NPC_EVENTS, payload.clone());
            }
            TelemetryItem::MentalBreakdown { .. } | TelemetryItem::PermanentTrauma { .. } => {
                self.bus.publish(channels::REBELLION_ALERTS, payload.clone());
            }
        }
        if item.is_catastrophic() {
            self.bus.publish(channels::SYSTEM_STATUS, payload);
        }
    }
}

/// Long-running telemetry subscription against the simulation service.
pub struct TelemetryPump {
    subscription: bridge::TelemetrySubscription,
    pump: tokio::task::JoinHandle<()>,
}

impl TelemetryPump {
    /// Start consuming telemetry and dispatching through the coordinator.
    pub fn start(coordinator: Arc<PipelineCoordinator>, base_url: String) -> Self {
        let (tx, mut rx) = mpsc::channel::<TelemetryItem>(256);
        let subscription = bridge::subscribe(base_url, TelemetryFilter::everything(), tx);
        let pump = tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                coordinator.dispatch_telemetry(&item);
            }
        });
        Self { subscription, pump }
    }

    pub async fn stop(self) {
        self.subscription.stop().await;
        self.pump.abort();
    }
}
