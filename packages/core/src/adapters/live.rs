//! Live backend adapter.
//!
//! One reqwest-backed adapter covering the three hosted backend families;
//! each family only differs in request shape, auth header, and usage field
//! names.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use super::{estimate_tokens, AdapterResponse, BackendAdapter};
use crate::error::CoreError;
use crate::types::{BackendId, CompletionOptions, ModelDescriptor};

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

pub struct LiveAdapter {
    backend: BackendId,
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl LiveAdapter {
    pub fn new(backend: BackendId, api_key: String) -> Self {
        let base_url = match backend {
            BackendId::Anthropic => "https://api.anthropic.com",
            BackendId::Openai => "https://api.openai.com",
            BackendId::Google => "https://generativelanguage.googleapis.com",
            BackendId::Custom | BackendId::None => "",
        }
        .to_string();
        Self::with_base_url(backend, api_key, base_url)
    }

    /// Construct against a custom endpoint (tests, proxies).
    pub fn with_base_url(backend: BackendId, api_key: String, base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .build()
            .expect("reqwest client construction cannot fail with static config");
        Self {
            backend,
            client,
            api_key,
            base_url,
        }
    }

    fn request(
        &self,
        model: &ModelDescriptor,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<reqwest::RequestBuilder, CoreError> {
        let max_tokens = options.max_tokens.unwrap_or(model.max_output_tokens);
        match self.backend {
            BackendId::Anthropic => Ok(self
                .client
                .post(format!("{}/v1/messages", self.base_url))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&json!({
                    "model": model.id,
                    "max_tokens": max_tokens,
                    "messages": [{"role": "user", "content": prompt}],
                }))),
            BackendId::Openai => Ok(self
                .client
                .post(format!("{}/v1/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&json!({
                    "model": model.id,
                    "max_tokens": max_tokens,
                    "messages": [{"role": "user", "content": prompt}],
                }))),
            BackendId::Google => Ok(self
                .client
                .post(format!(
                    "{}/v1beta/models/{}:generateContent?key={}",
                    self.base_url, model.id, self.api_key
                ))
                .json(&json!({
                    "contents": [{"parts": [{"text": prompt}]}],
                    "generationConfig": {"maxOutputTokens": max_tokens},
                }))),
            BackendId::Custom | BackendId::None => Err(CoreError::Internal(format!(
                "no live adapter for backend {}",
                self.backend.as_str()
            ))),
        }
    }

    fn parse(&self, body: &Value, prompt: &str) -> Result<AdapterResponse, CoreError> {
        let (content, input_tokens, output_tokens) = match self.backend {
            BackendId::Anthropic => (
                body.pointer("/content/0/text").and_then(Value::as_str),
                body.pointer("/usage/input_tokens").and_then(Value::as_u64),
                body.pointer("/usage/output_tokens").and_then(Value::as_u64),
            ),
            BackendId::Openai => (
                body.pointer("/choices/0/message/content").and_then(Value::as_str),
                body.pointer("/usage/prompt_tokens").and_then(Value::as_u64),
                body.pointer("/usage/completion_tokens").and_then(Value::as_u64),
            ),
            BackendId::Google => (
                body.pointer("/candidates/0/content/parts/0/text")
                    .and_then(Value::as_str),
                body.pointer("/usageMetadata/promptTokenCount").and_then(Value::as_u64),
                body.pointer("/usageMetadata/candidatesTokenCount")
                    .and_then(Value::as_u64),
            ),
            BackendId::Custom | BackendId::None => (None, None, None),
        };

        let content = content
            .ok_or_else(|| {
                CoreError::UpstreamUnavailable(format!(
                    "{} response missing completion content",
                    self.backend.as_str()
                ))
            })?
            .to_string();
        Ok(AdapterResponse {
            input_tokens: input_tokens.unwrap_or_else(|| estimate_tokens(prompt) as u64) as u32,
            output_tokens: output_tokens.unwrap_or_else(|| estimate_tokens(&content) as u64) as u32,
            content,
        })
    }
}

#[async_trait]
impl BackendAdapter for LiveAdapter {
    fn backend(&self) -> BackendId {
        self.backend
    }

    async fn complete(
        &self,
        model: &ModelDescriptor,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<AdapterResponse, CoreError> {
        let response = self
            .request(model, prompt, options)?
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CoreError::Timeout(DEFAULT_TIMEOUT_MS)
                } else {
                    CoreError::UpstreamUnavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(CoreError::RateLimited(format!(
                "{} returned 429",
                self.backend.as_str()
            )));
        }
        if !status.is_success() {
            return Err(CoreError::UpstreamUnavailable(format!(
                "{} returned {}",
                self.backend.as_str(),
                status
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(format!("invalid response body: {e}")))?;
        self.parse(&body, prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Tier;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn model(id: &str, backend: BackendId) -> ModelDescriptor {
        ModelDescriptor {
            id: id.into(),
            backend,
            tier: Tier::Operational,
            display_name: id.into(),
            input_cost_per_m: 1.0,
            output_cost_per_m: 2.0,
            max_output_tokens: 1024,
            default_for_tier: false,
        }
    }

    #[tokio::test]
    async fn anthropic_shape_round_trips() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "hello there"}],
                "usage": {"input_tokens": 12, "output_tokens": 7}
            })))
            .mount(&server)
            .await;

        let adapter =
            LiveAdapter::with_base_url(BackendId::Anthropic, "key".into(), server.uri());
        let resp = adapter
            .complete(&model("claude-sonnet", BackendId::Anthropic), "hi", &CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(resp.content, "hello there");
        assert_eq!(resp.input_tokens, 12);
        assert_eq!(resp.output_tokens, 7);
    }

    #[tokio::test]
    async fn rate_limit_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let adapter = LiveAdapter::with_base_url(BackendId::Openai, "key".into(), server.uri());
        let err = adapter
            .complete(&model("gpt-4o", BackendId::Openai), "hi", &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::RateLimited(_)));
    }

    #[tokio::test]
    async fn server_error_maps_to_upstream_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let adapter =
            LiveAdapter::with_base_url(BackendId::Anthropic, "key".into(), server.uri());
        let err = adapter
            .complete(&model("claude-sonnet", BackendId::Anthropic), "hi", &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UpstreamUnavailable(_)));
    }
}
