use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Storage backend selection (§6 `CONTROL_PLANE_STORAGE∈{memory,postgres}`)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Selects the repository backend. Only `Memory` is implemented in this
/// repository (§1 "in-memory vs. persistent storage backends... both
/// conform to the same repository interfaces" is out of scope beyond the
/// trait boundary); `Postgres` is accepted so deployments can fail fast with
/// a clear message instead of silently running in-memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
}
