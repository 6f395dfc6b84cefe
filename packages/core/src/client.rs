//! Resilient completion client.
//!
//! Route -> invoke adapter -> record the outcome on exactly the breaker the
//! router consulted -> append one audit entry -> return the timed result.
//! Every call appends exactly one audit entry, on the success path and on
//! every failure path including routing exhaustion.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::adapters::{adapter_for, BackendAdapter};
use crate::audit::{AuditEntry, AuditRing};
use crate::breaker::BreakerState;
use crate::error::CoreError;
use crate::mode::ServiceMode;
use crate::router::TierRouter;
use crate::types::{BackendId, CompletionOptions, CompletionResult, RoutingDecision, Tier};

/// Orchestrates one completion attempt end to end.
pub struct CompletionClient {
    router: Arc<TierRouter>,
    audit: Arc<AuditRing>,
    mode: ServiceMode,
    /// Injected adapters take precedence over the factory. Used by tests and
    /// bespoke deployments.
    overrides: RwLock<HashMap<BackendId, Arc<dyn BackendAdapter>>>,
    /// Factory-built adapters, cached per (backend, mode).
    cache: RwLock<HashMap<(BackendId, ServiceMode), Arc<dyn BackendAdapter>>>,
}

impl CompletionClient {
    pub fn new(router: Arc<TierRouter>, audit: Arc<AuditRing>, mode: ServiceMode) -> Self {
        Self {
            router,
            audit,
            mode,
            overrides: RwLock::new(HashMap::new()),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the adapter used for one backend.
    pub fn set_adapter(&self, adapter: Arc<dyn BackendAdapter>) {
        self.overrides.write().insert(adapter.backend(), adapter);
    }

    pub fn mode(&self) -> ServiceMode {
        self.mode
    }

    pub fn router(&self) -> &Arc<TierRouter> {
        &self.router
    }

    fn adapter(&self, backend: BackendId, mode: ServiceMode) -> Arc<dyn BackendAdapter> {
        if let Some(adapter) = self.overrides.read().get(&backend) {
            return adapter.clone();
        }
        if let Some(adapter) = self.cache.read().get(&(backend, mode)) {
            return adapter.clone();
        }
        let adapter = adapter_for(backend, mode);
        self.cache.write().insert((backend, mode), adapter.clone());
        adapter
    }

    /// Complete a prompt at the given tier.
    pub async fn complete(
        &self,
        tier: Tier,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<CompletionResult, CoreError> {
        let start = Instant::now();
        let mode = options.mode.unwrap_or(self.mode);

        let choice = match self.router.route(tier).await {
            Ok(choice) => choice,
            Err(err) => {
                // Routing exhausted: still leave an audit trace.
                let latency_ms = start.elapsed().as_millis() as u64;
                self.audit.append(AuditEntry::new(
                    RoutingDecision {
                        tier,
                        backend: BackendId::None,
                        model_id: "none".into(),
                        failover: false,
                        failover_from: None,
                        latency_ms,
                        timestamp: Utc::now(),
                    },
                    0,
                    0,
                    0.0,
                    BreakerState::Open,
                    prompt,
                ));
                tracing::error!(tier = tier.as_str(), kind = err.kind(), "routing failed");
                return Err(err);
            }
        };

        let breaker = self.router.breaker(choice.backend);
        breaker.note_admission();

        let Some(model) = self.router.registry().model(&choice.model_id).await else {
            // Registry changed under us between route and lookup. Still one
            // audit entry per call.
            self.audit.append(AuditEntry::new(
                RoutingDecision {
                    tier,
                    backend: choice.backend,
                    model_id: choice.model_id.clone(),
                    failover: false,
                    failover_from: None,
                    latency_ms: start.elapsed().as_millis() as u64,
                    timestamp: Utc::now(),
                },
                0,
                0,
                0.0,
                breaker.state(),
                prompt,
            ));
            return Err(CoreError::Internal(format!(
                "routed model {} not in registry",
                choice.model_id
            )));
        };

        let adapter = self.adapter(choice.backend, mode);
        match adapter.complete(&model, prompt, options).await {
            Ok(response) => {
                breaker.record_success();
                let latency_ms = start.elapsed().as_millis() as u64;
                let cost = model.estimate_cost(response.input_tokens, response.output_tokens);
                self.audit.append(AuditEntry::new(
                    RoutingDecision {
                        tier,
                        backend: choice.backend,
                        model_id: choice.model_id.clone(),
                        failover: false,
                        failover_from: None,
                        latency_ms,
                        timestamp: Utc::now(),
                    },
                    response.input_tokens,
                    response.output_tokens,
                    cost,
                    breaker.state(),
                    prompt,
                ));
                tracing::debug!(
                    tier = tier.as_str(),
                    backend = choice.backend.as_str(),
                    model = %choice.model_id,
                    latency_ms,
                    "completion ok"
                );
                Ok(CompletionResult {
                    content: response.content,
                    backend: choice.backend,
                    model_id: choice.model_id,
                    input_tokens: response.input_tokens,
                    output_tokens: response.output_tokens,
                    latency_ms,
                })
            }
            Err(err) => {
                if err.counts_against_breaker() {
                    breaker.record_failure();
                }
                let latency_ms = start.elapsed().as_millis() as u64;
                self.audit.append(AuditEntry::new(
                    RoutingDecision {
                        tier,
                        backend: choice.backend,
                        model_id: choice.model_id.clone(),
                        failover: false,
                        failover_from: None,
                        latency_ms,
                        timestamp: Utc::now(),
                    },
                    0,
                    0,
                    0.0,
                    breaker.state(),
                    prompt,
                ));
                tracing::warn!(
                    tier = tier.as_str(),
                    backend = choice.backend.as_str(),
                    kind = err.kind(),
                    "completion failed"
                );
                Err(err)
            }
        }
    }
}
