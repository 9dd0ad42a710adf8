use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Executor client (§4.8, §5, §6)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Overridden by `EXECUTOR_BASE_URL`.
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// Overridden by `EXECUTOR_AUTH_TOKEN`. Bearer token sent to the executor.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Overridden by `EXECUTOR_TIMEOUT_MS`.
    #[serde(default = "d_timeout_ms")]
    pub timeout_ms: u64,
    /// Overridden by `EXECUTOR_MAX_RETRIES`.
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,
    /// Overridden by `EXECUTOR_RETRY_DELAY_MS`.
    #[serde(default = "d_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Overridden by `EXECUTOR_RETRY_STATUS_CODES` (comma-separated).
    #[serde(default = "d_retry_status_codes")]
    pub retry_status_codes: Vec<u16>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            auth_token: None,
            timeout_ms: d_timeout_ms(),
            max_retries: d_max_retries(),
            retry_delay_ms: d_retry_delay_ms(),
            retry_status_codes: d_retry_status_codes(),
        }
    }
}

impl ExecutorConfig {
    pub fn should_retry(&self, status: u16) -> bool {
        status >= 500 || self.retry_status_codes.contains(&status)
    }
}

fn d_base_url() -> String {
    "http://localhost:8081".into()
}
fn d_timeout_ms() -> u64 {
    30_000
}
fn d_max_retries() -> u32 {
    3
}
fn d_retry_delay_ms() -> u64 {
    1_000
}
fn d_retry_status_codes() -> Vec<u16> {
    vec![429, 502, 503, 504]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_retry_5xx() {
        let cfg = ExecutorConfig::default();
        assert!(cfg.should_retry(503));
        assert!(cfg.should_retry(429));
        assert!(!cfg.should_retry(404));
    }

    #[test]
    fn deserialize_missing_fields_uses_defaults() {
        let cfg: ExecutorConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.max_retries, 3);
        assert!(cfg.auth_token.is_none());
    }
}
