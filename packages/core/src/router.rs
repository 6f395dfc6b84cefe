//! Tier router.
//!
//! Picks the first admissible (backend, model) for a tier, honoring each
//! backend's breaker gate in priority order. Breakers are created on first
//! use and shared with the resilient client by handle, so outcome recording
//! lands on exactly the breaker that was consulted.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::error::CoreError;
use crate::registry::ModelRegistry;
use crate::types::{BackendId, Tier};

/// A routing choice: which backend and model will serve the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteChoice {
    pub backend: BackendId,
    pub model_id: String,
}

/// Priority-order router over the registry's enabled backends.
pub struct TierRouter {
    registry: Arc<ModelRegistry>,
    breaker_config: BreakerConfig,
    breakers: RwLock<HashMap<BackendId, Arc<CircuitBreaker>>>,
}

impl TierRouter {
    pub fn new(registry: Arc<ModelRegistry>, breaker_config: BreakerConfig) -> Result<Self, CoreError> {
        breaker_config.validate()?;
        Ok(Self {
            registry,
            breaker_config,
            breakers: RwLock::new(HashMap::new()),
        })
    }

    /// The breaker for a backend, created on first use.
    pub fn breaker(&self, backend: BackendId) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(&backend) {
            return breaker.clone();
        }
        let mut breakers = self.breakers.write();
        breakers
            .entry(backend)
            .or_insert_with(|| {
                Arc::new(
                    CircuitBreaker::new(self.breaker_config.clone())
                        .expect("breaker config validated at router construction"),
                )
            })
            .clone()
    }

    /// Route a tier to the first backend whose gate admits.
    ///
    /// Deterministic for a fixed breaker snapshot: the same tier with the
    /// same gate states always yields the same choice.
    pub async fn route(&self, tier: Tier) -> Result<RouteChoice, CoreError> {
        for backend in self.registry.enabled_backends().await {
            let breaker = self.breaker(backend.id);
            if !breaker.can_request() {
                tracing::debug!(backend = backend.id.as_str(), "gate denied, trying next");
                continue;
            }
            if let Some(model) = self.registry.find_model_for_backend(backend.id, tier).await {
                return Ok(RouteChoice {
                    backend: backend.id,
                    model_id: model.id,
                });
            }
        }
        Err(CoreError::CircuitAllOpen)
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerState;

    fn fast_breakers() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 1,
            recovery_timeout_ms: 60_000,
            ..BreakerConfig::default()
        }
    }

    #[tokio::test]
    async fn routes_to_highest_priority_backend() {
        let registry = Arc::new(ModelRegistry::with_default_catalogue());
        let router = TierRouter::new(registry, fast_breakers()).unwrap();
        let choice = router.route(Tier::Routine).await.unwrap();
        assert_eq!(choice.backend, BackendId::Anthropic);
        assert_eq!(choice.model_id, "claude-haiku");
    }

    #[tokio::test]
    async fn fails_over_past_open_breaker() {
        let registry = Arc::new(ModelRegistry::with_default_catalogue());
        let router = TierRouter::new(registry, fast_breakers()).unwrap();

        router.breaker(BackendId::Anthropic).record_failure();
        assert_eq!(
            router.breaker(BackendId::Anthropic).state(),
            BreakerState::Open
        );

        let choice = router.route(Tier::Routine).await.unwrap();
        assert_eq!(choice.backend, BackendId::Openai);
        assert_eq!(choice.model_id, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn all_gates_denied_is_circuit_all_open() {
        let registry = Arc::new(ModelRegistry::with_default_catalogue());
        let router = TierRouter::new(registry, fast_breakers()).unwrap();
        for backend in [BackendId::Anthropic, BackendId::Openai, BackendId::Google] {
            router.breaker(backend).record_failure();
        }
        let err = router.route(Tier::Strategic).await.unwrap_err();
        assert!(matches!(err, CoreError::CircuitAllOpen));
    }

    #[tokio::test]
    async fn routing_is_deterministic_for_fixed_state() {
        let registry = Arc::new(ModelRegistry::with_default_catalogue());
        let router = TierRouter::new(registry, fast_breakers()).unwrap();
        let first = router.route(Tier::Operational).await.unwrap();
        let second = router.route(Tier::Operational).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn breaker_handles_are_shared() {
        let registry = Arc::new(ModelRegistry::with_default_catalogue());
        let router = TierRouter::new(registry, fast_breakers()).unwrap();
        let a = router.breaker(BackendId::Anthropic);
        let b = router.breaker(BackendId::Anthropic);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
