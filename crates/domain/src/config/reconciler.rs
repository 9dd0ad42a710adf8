use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reconciler (§4.9)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Interval between reconciler ticks.
    #[serde(default = "d_interval_ms")]
    pub interval_ms: u64,
    /// Grace period beyond a lease's `lockExpiresAt` before a claim is
    /// considered stale (defends against clock skew between workers).
    #[serde(default = "d_stale_claim_grace_ms")]
    pub stale_claim_grace_ms: u64,
    /// Workers whose `lastSyncAt` is older than this are swept (§4.9 "Stale
    /// sync workers").
    #[serde(default = "d_sync_stale_after_ms")]
    pub sync_stale_after_ms: u64,
    /// Whether expired `human_loop.requested` entries are auto-canceled.
    #[serde(default)]
    pub human_loop_timeout_enabled: bool,
    #[serde(default = "d_human_loop_timeout_ms")]
    pub human_loop_timeout_ms: u64,
    /// Bound on items returned per sweep (§9 open question d).
    #[serde(default = "d_sweep_limit")]
    pub sweep_limit: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval_ms: d_interval_ms(),
            stale_claim_grace_ms: d_stale_claim_grace_ms(),
            sync_stale_after_ms: d_sync_stale_after_ms(),
            human_loop_timeout_enabled: false,
            human_loop_timeout_ms: d_human_loop_timeout_ms(),
            sweep_limit: d_sweep_limit(),
        }
    }
}

fn d_interval_ms() -> u64 {
    10_000
}
fn d_stale_claim_grace_ms() -> u64 {
    0
}
fn d_sync_stale_after_ms() -> u64 {
    3_600_000
}
fn d_human_loop_timeout_ms() -> u64 {
    1_800_000
}
fn d_sweep_limit() -> u32 {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_loop_timeout_disabled_by_default() {
        assert!(!ReconcilerConfig::default().human_loop_timeout_enabled);
    }

    #[test]
    fn deserialize_missing_fields_uses_defaults() {
        let cfg: ReconcilerConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.interval_ms, 10_000);
        assert_eq!(cfg.sweep_limit, 100);
    }
}
