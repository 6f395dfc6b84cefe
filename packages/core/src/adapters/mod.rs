//! Backend adapters.
//!
//! One capability: `complete(model, prompt, options)`. The factory hands out
//! a mock or live adapter per backend depending on the execution mode and
//! whether credentials are present.

mod live;
mod mock;

pub use live::LiveAdapter;
pub use mock::{MockAdapter, MockConfig};

use async_trait::async_trait;
use std::env;
use std::sync::Arc;

use crate::error::CoreError;
use crate::mode::ServiceMode;
use crate::types::{BackendId, CompletionOptions, ModelDescriptor};

/// Raw adapter output before the client times and audits it.
#[derive(Debug, Clone)]
pub struct AdapterResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A language-model backend.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn backend(&self) -> BackendId;

    async fn complete(
        &self,
        model: &ModelDescriptor,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<AdapterResponse, CoreError>;
}

/// Build the adapter for a backend under the given mode.
///
/// Live mode without a key for the backend degrades to mock with a warning;
/// it is never a hard failure.
pub fn adapter_for(backend: BackendId, mode: ServiceMode) -> Arc<dyn BackendAdapter> {
    if mode.is_live() {
        let key = backend
            .api_key_env()
            .and_then(|name| env::var(name).ok())
            .filter(|v| !v.is_empty());
        match key {
            Some(api_key) => return Arc::new(LiveAdapter::new(backend, api_key)),
            None => {
                tracing::warn!(
                    backend = backend.as_str(),
                    "live mode requested but no API key, serving mock"
                );
            }
        }
    }
    Arc::new(MockAdapter::new(backend, MockConfig::default()))
}

/// Crude token estimate used by the mock path and as a live fallback when a
/// backend omits usage numbers.
pub(crate) fn estimate_tokens(text: &str) -> u32 {
    (text.len() as u32 / 4).max(1)
}
