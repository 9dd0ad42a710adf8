use chrono::{DateTime, Utc};
use sa_domain::types::Provider;
use serde::{Deserialize, Serialize};

/// §3 RunQueueItem: `status=claimed ⇒ lockOwner≠null ∧ lockExpiresAt>created`,
/// `attempts ≤ maxAttempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunQueueStatus {
    Queued,
    Claimed,
    Succeeded,
    Failed,
    Canceled,
}

impl RunQueueStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunQueueStatus::Succeeded | RunQueueStatus::Failed | RunQueueStatus::Canceled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunQueueItem {
    pub run_id: String,
    pub session_id: String,
    pub provider: Provider,
    pub status: RunQueueStatus,
    pub lock_owner: Option<String>,
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub payload: serde_json::Value,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunQueueItem {
    /// Whether a lease (if any) has expired as of `now`, making the item
    /// eligible for `claimNext` crash recovery (§4.4).
    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        match self.lock_expires_at {
            Some(exp) => now >= exp,
            None => true,
        }
    }

    pub fn eligible_for_claim(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            RunQueueStatus::Queued => self.lease_expired(now),
            RunQueueStatus::Claimed => self.lease_expired(now),
            _ => false,
        }
    }
}

/// Outcome of `enqueue` (§4.4, §6 `POST /api/runs/queue/enqueue`).
#[derive(Debug, Clone, Serialize)]
pub struct EnqueueOutcome {
    pub accepted: bool,
    pub run_id: String,
}

/// Outcome of `markRetryOrFailed` (§4.4).
#[derive(Debug, Clone, Serialize)]
pub struct RetryOutcome {
    pub status: RunQueueStatus,
    pub attempts: u32,
    pub max_attempts: u32,
}
