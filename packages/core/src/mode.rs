//! Execution mode with graceful fallback.
//!
//! Works with credentials, degrades to the deterministic mock without them.
//! Missing keys never fail startup; they log a warning and the client serves
//! mock completions.

use serde::{Deserialize, Serialize};
use std::env;

use crate::types::BackendId;

/// How the resilient client executes backend calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceMode {
    /// Real API calls against configured backends.
    Live,
    /// Deterministic mock completions.
    Mock,
}

impl Default for ServiceMode {
    fn default() -> Self {
        Self::Mock
    }
}

impl ServiceMode {
    /// Detect mode from the environment.
    ///
    /// Order of precedence:
    /// 1. `EPOCHMESH_MODE=live|mock` forces a mode.
    /// 2. Any backend API key present -> Live.
    /// 3. Default -> Mock (graceful fallback).
    pub fn detect() -> Self {
        match env::var("EPOCHMESH_MODE").ok().as_deref() {
            Some("live") => return Self::Live,
            Some("mock") => return Self::Mock,
            Some(other) => {
                tracing::warn!(value = other, "unrecognized EPOCHMESH_MODE, ignoring");
            }
            None => {}
        }

        for backend in [BackendId::Anthropic, BackendId::Openai, BackendId::Google] {
            if backend
                .api_key_env()
                .and_then(|key| env::var(key).ok())
                .map(|v| !v.is_empty())
                .unwrap_or(false)
            {
                tracing::info!(backend = backend.as_str(), "live mode, credentials found");
                return Self::Live;
            }
        }

        tracing::warn!("no backend credentials found, serving mock completions");
        Self::Mock
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    /// Human-readable status line for startup logs.
    pub fn status_message(&self) -> &'static str {
        match self {
            Self::Live => "live - real backend calls",
            Self::Mock => "mock - set a backend API key or EPOCHMESH_MODE=live",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_env_wins() {
        env::set_var("EPOCHMESH_MODE", "mock");
        env::set_var("ANTHROPIC_API_KEY", "sk-test");
        assert_eq!(ServiceMode::detect(), ServiceMode::Mock);
        env::remove_var("EPOCHMESH_MODE");
        env::remove_var("ANTHROPIC_API_KEY");
    }

    #[test]
    fn defaults_to_mock_without_credentials() {
        env::remove_var("EPOCHMESH_MODE");
        for backend in [BackendId::Anthropic, BackendId::Openai, BackendId::Google] {
            if let Some(key) = backend.api_key_env() {
                env::remove_var(key);
            }
        }
        assert_eq!(ServiceMode::detect(), ServiceMode::Mock);
    }
}
