//! Model registry.
//!
//! Catalogue of language-model backends and the models they serve, keyed by
//! backend id and tier. Read-mostly; mutation happens at startup or from
//! operator tooling.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::types::{BackendId, ModelDescriptor, Tier};

/// Configuration of one backend family.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub id: BackendId,
    pub enabled: bool,
    /// Lower is preferred by the router.
    pub priority: u8,
    pub display_name: String,
}

struct Inner {
    backends: HashMap<BackendId, BackendConfig>,
    models: Vec<ModelDescriptor>,
}

/// In-memory backend/model catalogue.
pub struct ModelRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::with_default_catalogue()
    }
}

impl ModelRegistry {
    /// Empty registry, for tests and bespoke deployments.
    pub fn empty() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                backends: HashMap::new(),
                models: Vec::new(),
            })),
        }
    }

    /// Registry seeded with the standard three-backend catalogue.
    pub fn with_default_catalogue() -> Self {
        let registry = Self::empty();
        let inner = registry.inner.clone();
        let mut guard = inner.try_write().expect("fresh registry is uncontended");

        for (id, name) in [
            (BackendId::Anthropic, "Anthropic"),
            (BackendId::Openai, "OpenAI"),
            (BackendId::Google, "Google"),
        ] {
            guard.backends.insert(
                id,
                BackendConfig {
                    id,
                    enabled: true,
                    priority: id.priority(),
                    display_name: name.to_string(),
                },
            );
        }
        guard.models = default_models();
        drop(guard);
        registry
    }

    /// The default model for a tier, if the catalogue has one.
    pub async fn model_for_tier(&self, tier: Tier) -> Option<ModelDescriptor> {
        let inner = self.inner.read().await;
        inner
            .models
            .iter()
            .find(|m| m.tier == tier && m.default_for_tier)
            .or_else(|| inner.models.iter().find(|m| m.tier == tier))
            .cloned()
    }

    /// Look a model up by id.
    pub async fn model(&self, model_id: &str) -> Option<ModelDescriptor> {
        let inner = self.inner.read().await;
        inner.models.iter().find(|m| m.id == model_id).cloned()
    }

    pub async fn all_models(&self) -> Vec<ModelDescriptor> {
        self.inner.read().await.models.clone()
    }

    pub async fn backend_config(&self, backend: BackendId) -> Option<BackendConfig> {
        self.inner.read().await.backends.get(&backend).cloned()
    }

    /// Enabled backends in priority order (lower first).
    pub async fn enabled_backends(&self) -> Vec<BackendConfig> {
        let inner = self.inner.read().await;
        let mut enabled: Vec<BackendConfig> =
            inner.backends.values().filter(|b| b.enabled).cloned().collect();
        enabled.sort_by_key(|b| b.priority);
        enabled
    }

    /// Best model under a backend for a tier: the tier default under that
    /// backend, then any model of that tier, then any model at all.
    pub async fn find_model_for_backend(
        &self,
        backend: BackendId,
        tier: Tier,
    ) -> Option<ModelDescriptor> {
        let inner = self.inner.read().await;
        let under = |m: &&ModelDescriptor| m.backend == backend;
        inner
            .models
            .iter()
            .filter(under)
            .find(|m| m.tier == tier && m.default_for_tier)
            .or_else(|| inner.models.iter().filter(under).find(|m| m.tier == tier))
            .or_else(|| inner.models.iter().find(under))
            .cloned()
    }

    /// Register (or replace) a backend and its models.
    pub async fn add_backend(&self, config: BackendConfig, models: Vec<ModelDescriptor>) {
        let mut inner = self.inner.write().await;
        tracing::info!(backend = config.id.as_str(), models = models.len(), "backend added");
        inner.models.retain(|m| m.backend != config.id);
        inner.models.extend(models);
        inner.backends.insert(config.id, config);
    }

    /// Remove a backend and all its models.
    pub async fn remove_backend(&self, backend: BackendId) -> Option<BackendConfig> {
        let mut inner = self.inner.write().await;
        inner.models.retain(|m| m.backend != backend);
        let removed = inner.backends.remove(&backend);
        if removed.is_some() {
            tracing::info!(backend = backend.as_str(), "backend removed");
        }
        removed
    }
}

fn model(
    id: &str,
    backend: BackendId,
    tier: Tier,
    display_name: &str,
    input_cost_per_m: f64,
    output_cost_per_m: f64,
    max_output_tokens: u32,
    default_for_tier: bool,
) -> ModelDescriptor {
    ModelDescriptor {
        id: id.to_string(),
        backend,
        tier,
        display_name: display_name.to_string(),
        input_cost_per_m,
        output_cost_per_m,
        max_output_tokens,
        default_for_tier,
    }
}

/// Standard catalogue: one model per backend per tier; Anthropic models are
/// the tier defaults, matching backend priority order.
fn default_models() -> Vec<ModelDescriptor> {
    vec![
        model("claude-haiku", BackendId::Anthropic, Tier::Routine, "Claude Haiku", 0.8, 4.0, 4_096, true),
        model("claude-sonnet", BackendId::Anthropic, Tier::Operational, "Claude Sonnet", 3.0, 15.0, 8_192, true),
        model("claude-opus", BackendId::Anthropic, Tier::Strategic, "Claude Opus", 15.0, 75.0, 16_384, true),
        model("gpt-4o-mini", BackendId::Openai, Tier::Routine, "GPT-4o mini", 0.15, 0.6, 4_096, false),
        model("gpt-4o", BackendId::Openai, Tier::Operational, "GPT-4o", 2.5, 10.0, 8_192, false),
        model("o1", BackendId::Openai, Tier::Strategic, "o1", 15.0, 60.0, 16_384, false),
        model("gemini-flash", BackendId::Google, Tier::Routine, "Gemini Flash", 0.1, 0.4, 4_096, false),
        model("gemini-pro", BackendId::Google, Tier::Operational, "Gemini Pro", 1.25, 5.0, 8_192, false),
        model("gemini-ultra", BackendId::Google, Tier::Strategic, "Gemini Ultra", 10.0, 40.0, 16_384, false),
    ]
}
