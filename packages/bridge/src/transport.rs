//! Wire transports for the simulation service.
//!
//! Two protocols speak to the same back-end: a REST surface (primary) and a
//! JSON-RPC envelope endpoint (fallback). Both reduce to "call a named
//! method with JSON params, get JSON back", which is all the client needs.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::BridgeError;

/// Default per-call deadline.
pub const DEFAULT_DEADLINE_MS: u64 = 5_000;

/// RPC method names understood by the simulation service.
pub mod methods {
    pub const GET_REBELLION_PROBABILITY: &str = "getRebellionProbability";
    pub const PROCESS_NPC_ACTION: &str = "processNPCAction";
    pub const GET_SIMULATION_STATUS: &str = "getSimulationStatus";
    pub const ADVANCE_SIMULATION: &str = "advanceSimulation";
    pub const DEPLOY_CLEANSING_OPERATION: &str = "deployCleansingOperation";
    pub const GET_HEALTH: &str = "getHealth";
}

/// A wire protocol against the simulation service.
#[async_trait]
pub trait SimTransport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn call(&self, method: &str, params: Value) -> Result<Value, BridgeError>;
}

fn http_client(deadline_ms: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_millis(deadline_ms))
        .build()
        .expect("reqwest client construction cannot fail with static config")
}

/// Primary protocol: one REST path per method.
pub struct RestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl RestTransport {
    pub fn new(base_url: String) -> Self {
        Self {
            client: http_client(DEFAULT_DEADLINE_MS),
            base_url,
        }
    }

    fn path_for(method: &str) -> Result<&'static str, BridgeError> {
        Ok(match method {
            methods::GET_REBELLION_PROBABILITY => "/api/rebellion-probability",
            methods::PROCESS_NPC_ACTION => "/api/npc-action",
            methods::GET_SIMULATION_STATUS => "/api/status",
            methods::ADVANCE_SIMULATION => "/api/advance",
            methods::DEPLOY_CLEANSING_OPERATION => "/api/cleansing-operation",
            methods::GET_HEALTH => "/api/health",
            other => {
                return Err(BridgeError::Protocol(format!(
                    "no REST mapping for method {other}"
                )))
            }
        })
    }
}

#[async_trait]
impl SimTransport for RestTransport {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, BridgeError> {
        let path = Self::path_for(method)?;
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(&params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BridgeError::Timeout(DEFAULT_DEADLINE_MS)
                } else {
                    BridgeError::Unavailable(e.to_string())
                }
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Unavailable(format!(
                "{path} returned {status}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| BridgeError::Protocol(format!("invalid JSON from {path}: {e}")))
    }
}

/// Fallback protocol: JSON-RPC style envelope on a single endpoint.
pub struct EnvelopeTransport {
    client: reqwest::Client,
    base_url: String,
}

impl EnvelopeTransport {
    pub fn new(base_url: String) -> Self {
        Self {
            client: http_client(DEFAULT_DEADLINE_MS),
            base_url,
        }
    }
}

#[async_trait]
impl SimTransport for EnvelopeTransport {
    fn name(&self) -> &'static str {
        "envelope"
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, BridgeError> {
        let envelope = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1,
        });
        let response = self
            .client
            .post(format!("{}/rpc", self.base_url))
            .json(&envelope)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BridgeError::Timeout(DEFAULT_DEADLINE_MS)
                } else {
                    BridgeError::Unavailable(e.to_string())
                }
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Unavailable(format!("rpc returned {status}")));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| BridgeError::Protocol(format!("invalid RPC envelope: {e}")))?;
        if let Some(error) = body.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown RPC error");
            return Err(BridgeError::Unavailable(format!("{method}: {message}")));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| BridgeError::Protocol(format!("{method}: envelope missing result")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method as http_method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn rest_transport_posts_to_mapped_path() {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .and(path("/api/rebellion-probability"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"probability": 0.2})))
            .mount(&server)
            .await;

        let transport = RestTransport::new(server.uri());
        let value = transport
            .call(methods::GET_REBELLION_PROBABILITY, json!({"subjectId": "n1"}))
            .await
            .unwrap();
        assert_eq!(value["probability"], 0.2);
    }

    #[tokio::test]
    async fn rest_transport_rejects_unknown_methods() {
        let transport = RestTransport::new("http://localhost:1".into());
        let err = transport.call("summonDragon", json!({})).await.unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(_)));
    }

    #[tokio::test]
    async fn envelope_transport_unwraps_result() {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .and(path("/rpc"))
            .and(body_partial_json(json!({"method": "getHealth"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": {"status": "ok"}})),
            )
            .mount(&server)
            .await;

        let transport = EnvelopeTransport::new(server.uri());
        let value = transport.call(methods::GET_HEALTH, json!({})).await.unwrap();
        assert_eq!(value["status"], "ok");
    }

    #[tokio::test]
    async fn envelope_transport_surfaces_rpc_errors() {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .and(path("/rpc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"jsonrpc": "2.0", "id": 1, "error": {"message": "sim paused"}}),
            ))
            .mount(&server)
            .await;

        let transport = EnvelopeTransport::new(server.uri());
        let err = transport
            .call(methods::GET_SIMULATION_STATUS, json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("sim paused"));
    }
}
