//! Provider registry.
//!
//! Constructs and holds all three concrete adapters at startup, keyed by
//! provider id. Mirrors the teacher's `from_config`-building, init-error
//! tracking registry, minus the multi-vendor LLM-router concerns that don't
//! apply here (there is always exactly one adapter per `Provider` variant).

use crate::claude_code::ClaudeCodeAdapter;
use crate::codex_cli::CodexCliAdapter;
use crate::opencode::OpencodeAdapter;
use crate::traits::ProviderAdapter;
use sa_domain::config::ExecutorConfig;
use sa_domain::types::Provider;
use std::collections::HashMap;
use std::sync::Arc;

/// Records an adapter that failed to initialize (construction only -- these
/// adapters do no eager network I/O, so failures here are config errors).
#[derive(Debug, Clone)]
pub struct ProviderInitError {
    pub provider_id: String,
    /// Error message with any potential secrets masked.
    pub error: String,
}

/// Mask substrings in an error message that look like API keys or bearer
/// tokens, so raw secrets never leak into logs or readiness endpoints.
fn mask_secrets(msg: &str) -> String {
    let mut result = msg.to_string();
    for word in msg.split(|c: char| c.is_whitespace() || c == '\'' || c == '"' || c == ',') {
        let trimmed = word.trim();
        if trimmed.len() >= 20
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            let masked = if trimmed.len() > 8 {
                format!("{}...{}", &trimmed[..4], &trimmed[trimmed.len() - 4..])
            } else {
                "***masked***".to_string()
            };
            result = result.replace(trimmed, &masked);
        }
    }
    result
}

pub struct ProviderRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    init_errors: Vec<ProviderInitError>,
}

impl ProviderRegistry {
    /// Build the registry. All three adapters share the same executor
    /// endpoint (§4.2 "wrapping an HTTP(S) client against that provider's
    /// executor-hosted agent endpoint"), so construction here can only fail
    /// on malformed config, not network reachability.
    pub fn from_config(cfg: &ExecutorConfig) -> Self {
        let mut adapters: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();
        let mut init_errors = Vec::new();

        match ClaudeCodeAdapter::from_config(cfg) {
            Ok(a) => {
                adapters.insert(Provider::ClaudeCode.as_str().to_string(), Arc::new(a));
            }
            Err(e) => init_errors.push(ProviderInitError {
                provider_id: Provider::ClaudeCode.as_str().to_string(),
                error: mask_secrets(&e.to_string()),
            }),
        }
        match OpencodeAdapter::from_config(cfg) {
            Ok(a) => {
                adapters.insert(Provider::Opencode.as_str().to_string(), Arc::new(a));
            }
            Err(e) => init_errors.push(ProviderInitError {
                provider_id: Provider::Opencode.as_str().to_string(),
                error: mask_secrets(&e.to_string()),
            }),
        }
        match CodexCliAdapter::from_config(cfg) {
            Ok(a) => {
                adapters.insert(Provider::CodexCli.as_str().to_string(), Arc::new(a));
            }
            Err(e) => init_errors.push(ProviderInitError {
                provider_id: Provider::CodexCli.as_str().to_string(),
                error: mask_secrets(&e.to_string()),
            }),
        }

        for err in &init_errors {
            tracing::warn!(
                provider_id = %err.provider_id,
                error = %err.error,
                "failed to initialize provider adapter, skipping"
            );
        }

        Self {
            adapters,
            init_errors,
        }
    }

    /// Build a registry directly from a pre-built adapter map, bypassing
    /// `from_config`'s network-facing `HttpAgentAdapter`s. Intended for
    /// tests and other in-process callers that wire up fake adapters.
    pub fn from_adapters(adapters: HashMap<String, Arc<dyn ProviderAdapter>>) -> Self {
        Self {
            adapters,
            init_errors: Vec::new(),
        }
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(provider.as_str()).cloned()
    }

    pub fn init_errors(&self) -> &[ProviderInitError] {
        &self.init_errors
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_all_three_providers() {
        let cfg = ExecutorConfig::default();
        let registry = ProviderRegistry::from_config(&cfg);
        assert_eq!(registry.len(), 3);
        assert!(registry.get(Provider::ClaudeCode).is_some());
        assert!(registry.get(Provider::Opencode).is_some());
        assert!(registry.get(Provider::CodexCli).is_some());
        assert!(registry.init_errors().is_empty());
    }

    #[test]
    fn capabilities_differ_per_provider() {
        let cfg = ExecutorConfig::default();
        let registry = ProviderRegistry::from_config(&cfg);
        let claude = registry.get(Provider::ClaudeCode).unwrap();
        let codex = registry.get(Provider::CodexCli).unwrap();
        assert!(claude.capabilities().human_loop);
        assert!(!codex.capabilities().human_loop);
        assert!(codex.capabilities().build_plan_mode);
    }

    #[test]
    fn mask_secrets_redacts_long_tokens() {
        let msg = "failed with token sk-ant-REDACTED";
        let masked = mask_secrets(msg);
        assert!(!masked.contains("abcdefghijklmnopqrstuvwxyz"));
    }
}
