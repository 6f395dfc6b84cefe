//! End-to-end pipeline scenarios.
//!
//! Each test wires a real coordinator over instant mock adapters, a stubbed
//! risk signal, and an in-process bus, then drives one event through and
//! asserts on the response, the audit ring, and the broadcast traffic.

use async_trait::async_trait;
use axum::extract::ws::Message;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use epochmesh_bridge::{BridgeError, RebellionProbe, RiskSignal};
use epochmesh_bus::{channels, EventBus};
use epochmesh_core::{
    AuditRing, BackendAdapter, BackendId, BreakerConfig, BreakerState, CompletionClient, CoreError,
    EventClassifier, GameEvent, MockAdapter, MockConfig, ModelRegistry, ServiceMode, Tier,
    TierRouter,
};
use epochmesh_memory::{InMemoryGraph, MemorySession, PersistOp, RetryQueue, RetryQueueConfig};
use epochmesh_rails::{AegisSupervisor, CognitiveRails};
use epochmesh_server::coordinator::PipelineCoordinator;

struct StubRisk {
    probability: f64,
    unreachable: bool,
}

#[async_trait]
impl RiskSignal for StubRisk {
    async fn rebellion_probability(&self, subject_id: &str) -> Result<RebellionProbe, BridgeError> {
        if self.unreachable {
            return Err(BridgeError::Unavailable("risk service down".into()));
        }
        Ok(RebellionProbe {
            subject_id: subject_id.to_string(),
            probability: self.probability,
            factors: vec![],
            threshold_exceeded: self.probability >= 0.8,
        })
    }
}

struct Harness {
    coordinator: PipelineCoordinator,
    audit: Arc<AuditRing>,
    bus: Arc<EventBus>,
    router: Arc<TierRouter>,
    retry_queue: Arc<RetryQueue>,
}

fn harness(risk: StubRisk, infestation_level: u8) -> Harness {
    let registry = Arc::new(ModelRegistry::with_default_catalogue());
    let router = Arc::new(
        TierRouter::new(
            registry,
            BreakerConfig {
                failure_threshold: 1,
                recovery_timeout_ms: 60_000,
                ..BreakerConfig::default()
            },
        )
        .unwrap(),
    );
    let audit = Arc::new(AuditRing::default());
    let client = Arc::new(CompletionClient::new(
        router.clone(),
        audit.clone(),
        ServiceMode::Mock,
    ));
    for backend in [BackendId::Anthropic, BackendId::Openai, BackendId::Google] {
        let adapter: Arc<dyn BackendAdapter> = Arc::new(MockAdapter::new(
            backend,
            MockConfig {
                forced_failure: false,
                latency_range_ms: (0, 0),
            },
        ));
        client.set_adapter(adapter);
    }
    let bus = Arc::new(EventBus::new());
    let memory: Arc<dyn MemorySession> = Arc::new(InMemoryGraph::new());
    let retry_queue = Arc::new(RetryQueue::new(RetryQueueConfig::default()));
    let coordinator = PipelineCoordinator::new(
        EventClassifier::default(),
        client,
        Arc::new(risk),
        CognitiveRails::default(),
        Arc::new(AegisSupervisor::new(infestation_level)),
        bus.clone(),
        memory,
        retry_queue.clone(),
    );
    Harness {
        coordinator,
        audit,
        bus,
        router,
        retry_queue,
    }
}

fn subscribe(bus: &EventBus, channel_list: &[&str]) -> (Uuid, mpsc::UnboundedReceiver<Message>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = bus.register(tx);
    let channels_json: Vec<String> = channel_list.iter().map(|c| format!("\"{c}\"")).collect();
    bus.handle_text(
        id,
        &format!(
            r#"{{"type":"subscribe","channels":[{}]}}"#,
            channels_json.join(",")
        ),
    );
    // Discard the subscription ack.
    let _ = rx.try_recv();
    (id, rx)
}

fn drain_channel(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<Value> {
    let mut envelopes = Vec::new();
    while let Ok(message) = rx.try_recv() {
        if let Message::Text(text) = message {
            envelopes.push(serde_json::from_str(text.as_str()).unwrap());
        }
    }
    envelopes
}

fn event(event_type: &str, npc_id: Option<&str>, urgency: Option<f64>) -> GameEvent {
    GameEvent {
        id: format!("evt-{event_type}"),
        npc_id: npc_id.map(str::to_string),
        event_type: event_type.into(),
        description: "integration scenario".into(),
        urgency,
        metadata: HashMap::new(),
    }
}

#[tokio::test]
async fn routine_completion_broadcasts_once() {
    let h = harness(
        StubRisk {
            probability: 0.1,
            unreachable: false,
        },
        0,
    );
    let (_id, mut npc_events) = subscribe(&h.bus, &[channels::NPC_EVENTS]);

    let response = h
        .coordinator
        .process_event(event("telemetry", None, None))
        .await
        .unwrap();

    assert_eq!(response.tier, Tier::Routine);
    assert!(!response.vetoed);
    assert_eq!(h.audit.size(), 1);
    assert_eq!(h.audit.recent(1)[0].decision.tier, Tier::Routine);
    assert_eq!(h.audit.recent(1)[0].decision.model_id, "claude-haiku");

    let envelopes = drain_channel(&mut npc_events);
    assert_eq!(envelopes.len(), 1);
    assert_eq!(envelopes[0]["channel"], "npc-events");
    assert_eq!(envelopes[0]["data"]["tier"], "ROUTINE");
}

#[tokio::test]
async fn rebellion_probability_veto() {
    let h = harness(
        StubRisk {
            probability: 0.92,
            unreachable: false,
        },
        0,
    );
    let (_a, mut rails_rx) = subscribe(&h.bus, &[channels::COGNITIVE_RAILS]);
    let (_b, mut alerts_rx) = subscribe(&h.bus, &[channels::REBELLION_ALERTS]);
    let (_c, mut npc_rx) = subscribe(&h.bus, &[channels::NPC_EVENTS]);

    let response = h
        .coordinator
        .process_event(event("command", Some("n1"), Some(0.5)))
        .await
        .unwrap();

    assert!(response.vetoed);
    assert!(response.ai_response.starts_with("[VETOED]"));
    assert!(response.rebellion_check.threshold_exceeded);

    let rails = drain_channel(&mut rails_rx);
    assert_eq!(rails.len(), 1);
    assert_eq!(rails[0]["data"]["vetoedByAegis"], false);

    let alerts = drain_channel(&mut alerts_rx);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["data"]["vetoedByAegis"], false);
    assert_eq!(alerts[0]["data"]["rebellionProbability"], 0.92);

    assert!(drain_channel(&mut npc_rx).is_empty());
}

#[tokio::test]
async fn infestation_veto_flags_aegis() {
    let h = harness(
        StubRisk {
            probability: 0.3,
            unreachable: false,
        },
        100,
    );
    let (_a, mut alerts_rx) = subscribe(&h.bus, &[channels::REBELLION_ALERTS]);

    let response = h
        .coordinator
        .process_event(event("punishment", Some("n1"), Some(0.9)))
        .await
        .unwrap();

    assert!(response.vetoed);
    assert!(response.veto_reason.unwrap().contains("infestation"));

    let alerts = drain_channel(&mut alerts_rx);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["data"]["vetoedByAegis"], true);
    assert_eq!(alerts[0]["data"]["infestationLevel"], 100);
}

#[tokio::test]
async fn whisper_advisory_still_emits_response() {
    let h = harness(
        StubRisk {
            probability: 0.2,
            unreachable: false,
        },
        60,
    );
    let (_a, mut status_rx) = subscribe(&h.bus, &[channels::SYSTEM_STATUS]);
    let (_b, mut npc_rx) = subscribe(&h.bus, &[channels::NPC_EVENTS]);

    let response = h
        .coordinator
        .process_event(event("dialogue", Some("n2"), Some(0.3)))
        .await
        .unwrap();

    assert!(!response.vetoed);
    let whispers = drain_channel(&mut status_rx);
    assert_eq!(whispers.len(), 1);
    assert_eq!(whispers[0]["data"]["type"], "whisper");
    assert_eq!(whispers[0]["data"]["rule"], "aegis_infestation");
    assert_eq!(drain_channel(&mut npc_rx).len(), 1);
}

#[tokio::test]
async fn failover_when_primary_breaker_open() {
    let h = harness(
        StubRisk {
            probability: 0.1,
            unreachable: false,
        },
        0,
    );
    h.router.breaker(BackendId::Anthropic).record_failure();
    assert_eq!(
        h.router.breaker(BackendId::Anthropic).state(),
        BreakerState::Open
    );

    let response = h
        .coordinator
        .process_event(event("telemetry", None, None))
        .await
        .unwrap();

    assert!(!response.vetoed);
    let entry = &h.audit.recent(1)[0];
    assert_ne!(entry.decision.backend, BackendId::Anthropic);
    assert_eq!(entry.decision.backend, BackendId::Openai);
}

#[tokio::test]
async fn all_breakers_open_surfaces_and_audits() {
    let h = harness(
        StubRisk {
            probability: 0.1,
            unreachable: false,
        },
        0,
    );
    for backend in [BackendId::Anthropic, BackendId::Openai, BackendId::Google] {
        h.router.breaker(backend).record_failure();
    }

    let err = h
        .coordinator
        .process_event(event("telemetry", None, None))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::CircuitAllOpen));
    assert_eq!(h.audit.size(), 1);
    assert_eq!(h.audit.recent(1)[0].decision.backend, BackendId::None);
}

#[tokio::test]
async fn unreachable_risk_probe_degrades_to_neutral() {
    let h = harness(
        StubRisk {
            probability: 0.99,
            unreachable: true,
        },
        0,
    );
    let response = h
        .coordinator
        .process_event(event("command", Some("n1"), Some(0.2)))
        .await
        .unwrap();

    assert!(!response.vetoed);
    assert_eq!(response.rebellion_check.probability, 0.0);
    assert!(!response.rebellion_check.threshold_exceeded);
}

#[tokio::test]
async fn outcome_is_queued_for_persistence() {
    let h = harness(
        StubRisk {
            probability: 0.4,
            unreachable: false,
        },
        0,
    );
    h.coordinator
        .process_event(event("command", Some("n3"), Some(0.2)))
        .await
        .unwrap();

    assert_eq!(h.retry_queue.len(), 1);
    let ops = h.retry_queue.drain_valid(std::time::Instant::now());
    match &ops[0] {
        PersistOp::ActionOutcome {
            npc_id,
            success,
            magnitude,
            ..
        } => {
            assert_eq!(npc_id, "n3");
            assert!(*success);
            assert_eq!(*magnitude, 0.4);
        }
        other => panic!("unexpected op {other:?}"),
    }
}

#[tokio::test]
async fn batch_preserves_input_order() {
    let h = harness(
        StubRisk {
            probability: 0.1,
            unreachable: false,
        },
        0,
    );
    let events = vec![
        event("telemetry", None, None),
        event("command", Some("n1"), Some(0.2)),
        event("rebellion", Some("n2"), None),
    ];
    let results = h.coordinator.process_batch(events).await;
    assert_eq!(results.len(), 3);
    let tiers: Vec<Tier> = results
        .into_iter()
        .map(|r| r.unwrap().tier)
        .collect();
    assert_eq!(tiers, vec![Tier::Routine, Tier::Operational, Tier::Strategic]);
}
