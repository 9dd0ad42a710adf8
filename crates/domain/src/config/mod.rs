mod executor;
mod observability;
mod orchestrator;
mod queue;
mod reconciler;
mod server;
mod storage;

pub use executor::*;
pub use observability::*;
pub use orchestrator::*;
pub use queue::*;
pub use reconciler::*;
pub use server::*;
pub use storage::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load from an optional TOML file, then apply the environment-variable
    /// overrides named in §6 (names are part of the contract). Mirrors
    /// `bootstrap.rs`'s `config.server.api_token` / `api_token_env` priority:
    /// an explicit env var always wins over whatever the file says.
    pub fn load(path: Option<&std::path::Path>) -> anyhow::Result<Self> {
        use anyhow::Context;

        let mut cfg: Config = match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("reading config file {}", p.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("parsing config file {}", p.display()))?
            }
            _ => Config::default(),
        };

        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PORT") {
            if let Ok(p) = v.parse() {
                self.server.port = p;
            }
        }
        if let Ok(v) = std::env::var("CONTROL_PLANE_STORAGE") {
            self.storage.backend = match v.as_str() {
                "postgres" => StorageBackend::Postgres,
                _ => StorageBackend::Memory,
            };
        }
        if let Ok(v) = std::env::var("EXECUTOR_BASE_URL") {
            self.executor.base_url = v;
        }
        if let Ok(v) = std::env::var("EXECUTOR_AUTH_TOKEN") {
            self.executor.auth_token = Some(v);
        }
        if let Ok(v) = std::env::var("EXECUTOR_TIMEOUT_MS") {
            if let Ok(n) = v.parse() {
                self.executor.timeout_ms = n;
            }
        }
        if let Ok(v) = std::env::var("EXECUTOR_MAX_RETRIES") {
            if let Ok(n) = v.parse() {
                self.executor.max_retries = n;
            }
        }
        if let Ok(v) = std::env::var("EXECUTOR_RETRY_DELAY_MS") {
            if let Ok(n) = v.parse() {
                self.executor.retry_delay_ms = n;
            }
        }
        if let Ok(v) = std::env::var("EXECUTOR_RETRY_STATUS_CODES") {
            let codes: Vec<u16> = v
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if !codes.is_empty() {
                self.executor.retry_status_codes = codes;
            }
        }
        if let Ok(v) = std::env::var("RUN_QUEUE_OWNER") {
            self.queue.owner = v;
        }
        if let Ok(v) = std::env::var("RUN_QUEUE_LOCK_MS") {
            if let Ok(n) = v.parse() {
                self.queue.lock_ms = n;
            }
        }
        if let Ok(v) = std::env::var("RUN_QUEUE_RETRY_DELAY_MS") {
            if let Ok(n) = v.parse() {
                self.queue.retry_delay_ms = n;
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues. An empty vec
    /// means everything looks good; callers decide whether warnings block
    /// startup (`bootstrap.rs` logs warnings but only aborts on errors).
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.server.port == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }
        if self.server.host.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.executor.base_url.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "executor.base_url".into(),
                message: "base_url must not be empty".into(),
            });
        } else if !self.executor.base_url.starts_with("http://")
            && !self.executor.base_url.starts_with("https://")
        {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "executor.base_url".into(),
                message: format!(
                    "base_url must start with http:// or https:// (got \"{}\")",
                    self.executor.base_url
                ),
            });
        }

        if self.executor.auth_token.is_none() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "executor.auth_token".into(),
                message: "no EXECUTOR_AUTH_TOKEN configured; executor calls will be unauthenticated".into(),
            });
        }

        if self.server.cors.allowed_origins.len() == 1 && self.server.cors.allowed_origins[0] == "*"
        {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "server.cors.allowed_origins".into(),
                message: "wildcard \"*\" allows all origins (not recommended for production)"
                    .into(),
            });
        }

        if let Some(rl) = &self.server.rate_limit {
            if rl.requests_per_second == 0 {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.requests_per_second".into(),
                    message: "requests_per_second must be greater than 0".into(),
                });
            }
            if rl.burst_size == 0 {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.burst_size".into(),
                    message: "burst_size must be greater than 0".into(),
                });
            }
        }

        if self.queue.lock_ms == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "queue.lock_ms".into(),
                message: "lock_ms must be greater than 0".into(),
            });
        }
        if matches!(self.storage.backend, StorageBackend::Postgres) {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "storage.backend".into(),
                message: "postgres backend is not implemented in this repository".into(),
            });
        }

        issues
    }
}
