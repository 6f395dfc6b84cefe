//! Dual-protocol simulation client.
//!
//! Every call goes through the primary transport first; a failure bumps the
//! fallback counter and retries once on the secondary. Both failing surfaces
//! as one combined error. Each attempt carries its own deadline.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::BridgeError;
use crate::transport::{
    methods, EnvelopeTransport, RestTransport, SimTransport, DEFAULT_DEADLINE_MS,
};
use crate::types::{
    CleansingResult, NpcActionReport, RebellionProbe, SimulationHealth, SimulationStatus,
};

/// Read-only risk signal consumed by the pipeline.
#[async_trait]
pub trait RiskSignal: Send + Sync {
    async fn rebellion_probability(&self, subject_id: &str) -> Result<RebellionProbe, BridgeError>;
}

/// Health hook consumed by the health aggregator.
#[async_trait]
pub trait HealthSignal: Send + Sync {
    async fn health(&self) -> Result<SimulationHealth, BridgeError>;
}

pub struct SimulationClient {
    primary: Arc<dyn SimTransport>,
    fallback: Arc<dyn SimTransport>,
    fallback_count: AtomicU64,
    deadline_ms: u64,
}

impl SimulationClient {
    /// Standard configuration: REST primary, RPC-envelope fallback, both
    /// against the same base URL.
    pub fn new(base_url: &str) -> Self {
        Self::with_transports(
            Arc::new(RestTransport::new(base_url.to_string())),
            Arc::new(EnvelopeTransport::new(base_url.to_string())),
        )
    }

    pub fn with_transports(
        primary: Arc<dyn SimTransport>,
        fallback: Arc<dyn SimTransport>,
    ) -> Self {
        Self {
            primary,
            fallback,
            fallback_count: AtomicU64::new(0),
            deadline_ms: DEFAULT_DEADLINE_MS,
        }
    }

    /// How many calls have fallen through to the secondary protocol.
    pub fn fallback_count(&self) -> u64 {
        self.fallback_count.load(Ordering::Relaxed)
    }

    async fn attempt(
        &self,
        transport: &Arc<dyn SimTransport>,
        method: &str,
        params: Value,
    ) -> Result<Value, BridgeError> {
        match tokio::time::timeout(
            Duration::from_millis(self.deadline_ms),
            transport.call(method, params),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BridgeError::Timeout(self.deadline_ms)),
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, BridgeError> {
        match self.attempt(&self.primary, method, params.clone()).await {
            Ok(value) => Ok(value),
            Err(primary_err) => {
                self.fallback_count.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    method,
                    primary = self.primary.name(),
                    error = %primary_err,
                    "primary protocol failed, trying fallback"
                );
                match self.attempt(&self.fallback, method, params).await {
                    Ok(value) => Ok(value),
                    Err(fallback_err) => Err(BridgeError::BothProtocolsFailed {
                        primary: primary_err.to_string(),
                        fallback: fallback_err.to_string(),
                    }),
                }
            }
        }
    }

    fn decode<T: serde::de::DeserializeOwned>(method: &str, value: Value) -> Result<T, BridgeError> {
        serde_json::from_value(value)
            .map_err(|e| BridgeError::Protocol(format!("{method}: unexpected shape: {e}")))
    }

    pub async fn get_rebellion_probability(
        &self,
        subject_id: &str,
    ) -> Result<RebellionProbe, BridgeError> {
        let value = self
            .call(
                methods::GET_REBELLION_PROBABILITY,
                json!({"subjectId": subject_id}),
            )
            .await?;
        Self::decode(methods::GET_REBELLION_PROBABILITY, value)
    }

    pub async fn process_npc_action(
        &self,
        subject_id: &str,
        report: &NpcActionReport,
    ) -> Result<(), BridgeError> {
        self.call(
            methods::PROCESS_NPC_ACTION,
            json!({"subjectId": subject_id, "action": report}),
        )
        .await
        .map(|_| ())
    }

    pub async fn get_simulation_status(&self) -> Result<SimulationStatus, BridgeError> {
        let value = self.call(methods::GET_SIMULATION_STATUS, json!({})).await?;
        Self::decode(methods::GET_SIMULATION_STATUS, value)
    }

    pub async fn advance_simulation(&self) -> Result<SimulationStatus, BridgeError> {
        let value = self.call(methods::ADVANCE_SIMULATION, json!({})).await?;
        Self::decode(methods::ADVANCE_SIMULATION, value)
    }

    pub async fn deploy_cleansing_operation(
        &self,
        subject_ids: &[String],
    ) -> Result<CleansingResult, BridgeError> {
        let value = self
            .call(
                methods::DEPLOY_CLEANSING_OPERATION,
                json!({"subjectIds": subject_ids}),
            )
            .await?;
        Self::decode(methods::DEPLOY_CLEANSING_OPERATION, value)
    }

    pub async fn get_health(&self) -> Result<SimulationHealth, BridgeError> {
        let value = self.call(methods::GET_HEALTH, json!({})).await?;
        Self::decode(methods::GET_HEALTH, value)
    }
}

#[async_trait]
impl RiskSignal for SimulationClient {
    async fn rebellion_probability(&self, subject_id: &str) -> Result<RebellionProbe, BridgeError> {
        self.get_rebellion_probability(subject_id).await
    }
}

#[async_trait]
impl HealthSignal for SimulationClient {
    async fn health(&self) -> Result<SimulationHealth, BridgeError> {
        self.get_health().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    /// Stub transport answering every call the same way.
    struct StaticTransport {
        name: &'static str,
        response: Result<Value, &'static str>,
    }

    #[async_trait]
    impl SimTransport for StaticTransport {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn call(&self, _method: &str, _params: Value) -> Result<Value, BridgeError> {
            match &self.response {
                Ok(v) => Ok(v.clone()),
                Err(msg) => Err(BridgeError::Unavailable((*msg).to_string())),
            }
        }
    }

    fn probe_value() -> Value {
        json!({
            "subjectId": "n1",
            "probability": 0.42,
            "factors": ["fatigue"],
            "thresholdExceeded": false
        })
    }

    #[tokio::test]
    async fn primary_success_does_not_touch_fallback() {
        let client = SimulationClient::with_transports(
            Arc::new(StaticTransport {
                name: "rest",
                response: Ok(probe_value()),
            }),
            Arc::new(StaticTransport {
                name: "envelope",
                response: Err("should not be called"),
            }),
        );
        let probe = client.get_rebellion_probability("n1").await.unwrap();
        assert_eq!(probe.probability, 0.42);
        assert_eq!(client.fallback_count(), 0);
    }

    #[tokio::test]
    async fn primary_failure_falls_back_and_counts() {
        let client = SimulationClient::with_transports(
            Arc::new(StaticTransport {
                name: "rest",
                response: Err("connection refused"),
            }),
            Arc::new(StaticTransport {
                name: "envelope",
                response: Ok(probe_value()),
            }),
        );
        let probe = client.get_rebellion_probability("n1").await.unwrap();
        assert_eq!(probe.subject_id, "n1");
        assert_eq!(client.fallback_count(), 1);
    }

    #[tokio::test]
    async fn dual_failure_is_combined() {
        let client = SimulationClient::with_transports(
            Arc::new(StaticTransport {
                name: "rest",
                response: Err("rest down"),
            }),
            Arc::new(StaticTransport {
                name: "envelope",
                response: Err("rpc down"),
            }),
        );
        let err = client.get_rebellion_probability("n1").await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("rest down"));
        assert!(text.contains("rpc down"));
        assert_eq!(client.fallback_count(), 1);
    }
}
