use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionWorkerState {
    Running,
    Stopped,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Running,
    Success,
    Failed,
}

/// §3 SessionWorker: created by activation; sync-before-destroy invariant
/// lives in `lifecycle.rs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionWorker {
    pub session_id: String,
    pub container_id: Option<String>,
    pub workspace_s3_prefix: String,
    pub state: SessionWorkerState,
    pub last_active_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_sync_status: SyncStatus,
    pub last_sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of `activateSession` (§4.8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivateOutcome {
    AlreadyRunning,
    Restarted,
    Created,
}

/// Result of a sweep operation (`stopIdleWorkers`, `removeLongStoppedWorkers`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepCounters {
    pub total: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub skipped: u32,
}

/// §4.8 `syncSessionWorkspace` reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncReason {
    MessageStop,
    RunFinished,
    PreStop,
    PreRemove,
}

impl SyncReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncReason::MessageStop => "message.stop",
            SyncReason::RunFinished => "run.finished",
            SyncReason::PreStop => "pre.stop",
            SyncReason::PreRemove => "pre.remove",
        }
    }
}
