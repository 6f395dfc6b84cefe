//! Deterministic mock backend.
//!
//! Content is keyed on the prompt's tier prefix so tests and credential-less
//! deployments get stable, recognisable output. Failure injection and a
//! simulated latency range are configurable.

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

use super::{estimate_tokens, AdapterResponse, BackendAdapter};
use crate::error::CoreError;
use crate::types::{BackendId, CompletionOptions, ModelDescriptor};

/// Mock behaviour knobs.
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Every call fails with UPSTREAM_UNAVAILABLE when set.
    pub forced_failure: bool,
    /// Simulated latency, uniform in this range.
    pub latency_range_ms: (u64, u64),
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            forced_failure: false,
            latency_range_ms: (5, 25),
        }
    }
}

pub struct MockAdapter {
    backend: BackendId,
    config: MockConfig,
}

impl MockAdapter {
    pub fn new(backend: BackendId, config: MockConfig) -> Self {
        Self { backend, config }
    }

    fn canned_content(prompt: &str, model: &ModelDescriptor) -> String {
        let body = if prompt.starts_with("[STRATEGIC]") {
            "Directive acknowledged. Reprioritizing colony objectives and briefing affected units."
        } else if prompt.starts_with("[OPERATIONAL]") {
            "Order received. Dispatching the assigned unit and reporting back on completion."
        } else if prompt.starts_with("[ROUTINE]") {
            "Status nominal. Continuing current duties."
        } else {
            "Acknowledged."
        };
        format!("{body} (via {})", model.display_name)
    }
}

#[async_trait]
impl BackendAdapter for MockAdapter {
    fn backend(&self) -> BackendId {
        self.backend
    }

    async fn complete(
        &self,
        model: &ModelDescriptor,
        prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<AdapterResponse, CoreError> {
        let (lo, hi) = self.config.latency_range_ms;
        let delay = if hi > lo {
            rand::thread_rng().gen_range(lo..=hi)
        } else {
            lo
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;

        if self.config.forced_failure {
            return Err(CoreError::UpstreamUnavailable(format!(
                "mock {} forced failure",
                self.backend.as_str()
            )));
        }

        let content = Self::canned_content(prompt, model);
        Ok(AdapterResponse {
            input_tokens: estimate_tokens(prompt),
            output_tokens: estimate_tokens(&content),
            content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Tier;

    fn model() -> ModelDescriptor {
        ModelDescriptor {
            id: "claude-haiku".into(),
            backend: BackendId::Anthropic,
            tier: Tier::Routine,
            display_name: "Claude Haiku".into(),
            input_cost_per_m: 0.8,
            output_cost_per_m: 4.0,
            max_output_tokens: 4096,
            default_for_tier: true,
        }
    }

    #[tokio::test]
    async fn content_is_deterministic_for_a_prefix() {
        let adapter = MockAdapter::new(
            BackendId::Anthropic,
            MockConfig {
                latency_range_ms: (0, 0),
                ..MockConfig::default()
            },
        );
        let opts = CompletionOptions::default();
        let a = adapter.complete(&model(), "[ROUTINE] heartbeat", &opts).await.unwrap();
        let b = adapter.complete(&model(), "[ROUTINE] patrol", &opts).await.unwrap();
        assert_eq!(a.content, b.content);
        assert!(a.content.contains("Status nominal"));
    }

    #[tokio::test]
    async fn forced_failure_surfaces_upstream_unavailable() {
        let adapter = MockAdapter::new(
            BackendId::Openai,
            MockConfig {
                forced_failure: true,
                latency_range_ms: (0, 0),
            },
        );
        let err = adapter
            .complete(&model(), "[ROUTINE] x", &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UpstreamUnavailable(_)));
    }
}
