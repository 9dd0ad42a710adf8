use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run Queue Engine / Manager (§4.4, §4.5)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Overridden by `RUN_QUEUE_OWNER`; identifies this process to `claimNext`.
    #[serde(default = "d_owner")]
    pub owner: String,
    /// Overridden by `RUN_QUEUE_LOCK_MS`.
    #[serde(default = "d_lock_ms")]
    pub lock_ms: u64,
    /// Overridden by `RUN_QUEUE_RETRY_DELAY_MS`.
    #[serde(default = "d_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Max items drained per `drainOnce` call (§6 `limit?≤100`).
    #[serde(default = "d_drain_limit")]
    pub drain_limit: u32,
    /// Interval between background drain passes (§4.5 "Background driver").
    #[serde(default = "d_drain_interval_ms")]
    pub drain_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            owner: d_owner(),
            lock_ms: d_lock_ms(),
            retry_delay_ms: d_retry_delay_ms(),
            drain_limit: d_drain_limit(),
            drain_interval_ms: d_drain_interval_ms(),
        }
    }
}

impl QueueConfig {
    /// Clamp a caller-supplied drain request to the contract bounds in §6
    /// (`limit?≤100, lockMs?≤120000, retryDelayMs?≤300000`).
    pub fn clamp_limit(&self, limit: Option<u32>) -> u32 {
        limit.unwrap_or(self.drain_limit).min(100)
    }

    pub fn clamp_lock_ms(&self, lock_ms: Option<u64>) -> u64 {
        lock_ms.unwrap_or(self.lock_ms).min(120_000)
    }

    pub fn clamp_retry_delay_ms(&self, retry_delay_ms: Option<u64>) -> u64 {
        retry_delay_ms.unwrap_or(self.retry_delay_ms).min(300_000)
    }
}

fn d_owner() -> String {
    "gateway".into()
}
fn d_lock_ms() -> u64 {
    60_000
}
fn d_retry_delay_ms() -> u64 {
    5_000
}
fn d_drain_limit() -> u32 {
    20
}
fn d_drain_interval_ms() -> u64 {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_limit_caps_at_100() {
        let cfg = QueueConfig::default();
        assert_eq!(cfg.clamp_limit(Some(500)), 100);
        assert_eq!(cfg.clamp_limit(Some(10)), 10);
        assert_eq!(cfg.clamp_limit(None), d_drain_limit());
    }

    #[test]
    fn clamp_lock_ms_caps_at_120000() {
        let cfg = QueueConfig::default();
        assert_eq!(cfg.clamp_lock_ms(Some(999_999)), 120_000);
    }

    #[test]
    fn clamp_retry_delay_caps_at_300000() {
        let cfg = QueueConfig::default();
        assert_eq!(cfg.clamp_retry_delay_ms(Some(1_000_000)), 300_000);
    }

    #[test]
    fn deserialize_missing_fields_uses_defaults() {
        let cfg: QueueConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.owner, "gateway");
        assert_eq!(cfg.lock_ms, 60_000);
    }
}
