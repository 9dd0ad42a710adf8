use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run Orchestrator / Stream Bus / Session Worker tuning (§4.1, §4.3, §4.8)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Per-stream history retained by the Stream Bus (§4.1 "default 2000").
    #[serde(default = "d_stream_capacity")]
    pub stream_capacity: usize,
    /// Interval between SSE `:heartbeat` comments (§6 "every 15 seconds").
    #[serde(default = "d_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Default `maxAttempts` when an enqueue request omits it.
    #[serde(default = "d_default_max_attempts")]
    pub default_max_attempts: u32,
    /// `stopIdleWorkers` idle threshold (§4.8).
    #[serde(default = "d_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// `removeLongStoppedWorkers` threshold (§4.8).
    #[serde(default = "d_remove_after_ms")]
    pub remove_after_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            stream_capacity: d_stream_capacity(),
            heartbeat_secs: d_heartbeat_secs(),
            default_max_attempts: d_default_max_attempts(),
            idle_timeout_ms: d_idle_timeout_ms(),
            remove_after_ms: d_remove_after_ms(),
        }
    }
}

fn d_stream_capacity() -> usize {
    2000
}
fn d_heartbeat_secs() -> u64 {
    15
}
fn d_default_max_attempts() -> u32 {
    3
}
fn d_idle_timeout_ms() -> u64 {
    900_000
}
fn d_remove_after_ms() -> u64 {
    86_400_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stream_capacity_is_2000() {
        assert_eq!(OrchestratorConfig::default().stream_capacity, 2000);
    }

    #[test]
    fn deserialize_missing_fields_uses_defaults() {
        let cfg: OrchestratorConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.heartbeat_secs, 15);
    }
}
