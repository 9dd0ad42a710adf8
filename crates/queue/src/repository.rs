use crate::item::{EnqueueOutcome, RetryOutcome, RunQueueItem, RunQueueStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sa_domain::types::Provider;
use std::collections::HashMap;

/// Durable FIFO queue with leased execution and bounded retries (§4.4).
///
/// Exported so a future persistent (Postgres `SELECT ... FOR UPDATE SKIP
/// LOCKED`) implementation can satisfy the same observable semantics
/// without touching orchestration code (§9 "Repositories as capabilities").
#[async_trait]
pub trait QueueRepository: Send + Sync {
    async fn enqueue(
        &self,
        run_id: &str,
        session_id: &str,
        provider: Provider,
        max_attempts: u32,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> EnqueueOutcome;

    async fn claim_next(
        &self,
        owner: &str,
        now: DateTime<Utc>,
        lock_ms: u64,
    ) -> Option<RunQueueItem>;

    async fn mark_succeeded(&self, run_id: &str, now: DateTime<Utc>) -> bool;

    async fn mark_canceled(&self, run_id: &str, now: DateTime<Utc>, reason: Option<String>) -> bool;

    async fn mark_retry_or_failed(
        &self,
        run_id: &str,
        now: DateTime<Utc>,
        retry_delay_ms: u64,
        error_message: String,
    ) -> Option<RetryOutcome>;

    async fn list_stale_claimed(&self, now: DateTime<Utc>, limit: u32) -> Vec<RunQueueItem>;

    async fn find_by_run_id(&self, run_id: &str) -> Option<RunQueueItem>;
}

/// In-memory `QueueRepository`. Items are kept in insertion order (callers
/// are expected to pass non-decreasing `now` across enqueue calls, matching
/// real wall-clock use), mirroring the indexed-ring idea behind
/// `RunStore`'s `VecDeque` + `HashMap<Uuid, usize>` index, generalized here
/// to a `HashMap` keyed by `runId` plus a parallel order vector.
#[derive(Default)]
pub struct InMemoryQueueRepository {
    inner: parking_lot::Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    items: HashMap<String, RunQueueItem>,
    order: Vec<String>,
}

impl InMemoryQueueRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueRepository for InMemoryQueueRepository {
    async fn enqueue(
        &self,
        run_id: &str,
        session_id: &str,
        provider: Provider,
        max_attempts: u32,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> EnqueueOutcome {
        let mut inner = self.inner.lock();
        if inner.items.contains_key(run_id) {
            return EnqueueOutcome {
                accepted: false,
                run_id: run_id.to_string(),
            };
        }
        let item = RunQueueItem {
            run_id: run_id.to_string(),
            session_id: session_id.to_string(),
            provider,
            status: RunQueueStatus::Queued,
            lock_owner: None,
            lock_expires_at: None,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            payload,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        inner.order.push(run_id.to_string());
        inner.items.insert(run_id.to_string(), item);
        EnqueueOutcome {
            accepted: true,
            run_id: run_id.to_string(),
        }
    }

    async fn claim_next(
        &self,
        owner: &str,
        now: DateTime<Utc>,
        lock_ms: u64,
    ) -> Option<RunQueueItem> {
        let mut inner = self.inner.lock();
        let target = inner
            .order
            .iter()
            .find(|run_id| {
                inner
                    .items
                    .get(*run_id)
                    .is_some_and(|item| item.eligible_for_claim(now))
            })
            .cloned()?;

        let item = inner.items.get_mut(&target)?;
        item.status = RunQueueStatus::Claimed;
        item.lock_owner = Some(owner.to_string());
        item.lock_expires_at = Some(now + chrono::Duration::milliseconds(lock_ms as i64));
        item.attempts += 1;
        item.error_message = None;
        item.updated_at = now;
        Some(item.clone())
    }

    async fn mark_succeeded(&self, run_id: &str, now: DateTime<Utc>) -> bool {
        let mut inner = self.inner.lock();
        match inner.items.get_mut(run_id) {
            Some(item) => {
                item.status = RunQueueStatus::Succeeded;
                item.lock_owner = None;
                item.lock_expires_at = None;
                item.error_message = None;
                item.updated_at = now;
                true
            }
            None => false,
        }
    }

    async fn mark_canceled(&self, run_id: &str, now: DateTime<Utc>, reason: Option<String>) -> bool {
        let mut inner = self.inner.lock();
        match inner.items.get_mut(run_id) {
            Some(item) => {
                item.status = RunQueueStatus::Canceled;
                item.lock_owner = None;
                item.lock_expires_at = None;
                item.error_message = reason;
                item.updated_at = now;
                true
            }
            None => false,
        }
    }

    async fn mark_retry_or_failed(
        &self,
        run_id: &str,
        now: DateTime<Utc>,
        retry_delay_ms: u64,
        error_message: String,
    ) -> Option<RetryOutcome> {
        let mut inner = self.inner.lock();
        let item = inner.items.get_mut(run_id)?;
        item.error_message = Some(error_message);
        item.updated_at = now;
        if item.attempts >= item.max_attempts {
            item.status = RunQueueStatus::Failed;
            item.lock_owner = None;
            item.lock_expires_at = None;
        } else {
            item.status = RunQueueStatus::Queued;
            item.lock_owner = None;
            item.lock_expires_at = Some(now + chrono::Duration::milliseconds(retry_delay_ms as i64));
        }
        Some(RetryOutcome {
            status: item.status,
            attempts: item.attempts,
            max_attempts: item.max_attempts,
        })
    }

    async fn list_stale_claimed(&self, now: DateTime<Utc>, limit: u32) -> Vec<RunQueueItem> {
        let inner = self.inner.lock();
        inner
            .order
            .iter()
            .filter_map(|run_id| inner.items.get(run_id))
            .filter(|item| item.status == RunQueueStatus::Claimed && item.lease_expired(now))
            .take(limit as usize)
            .cloned()
            .collect()
    }

    async fn find_by_run_id(&self, run_id: &str) -> Option<RunQueueItem> {
        self.inner.lock().items.get(run_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    fn payload() -> serde_json::Value {
        serde_json::json!({"model": "m", "messages": [{"role": "user", "content": "hi"}]})
    }

    // ── S2 / invariant 1: duplicate enqueue ─────────────────────────
    #[tokio::test]
    async fn duplicate_enqueue_rejects_second() {
        let repo = InMemoryQueueRepository::new();
        let first = repo
            .enqueue("r1", "s1", Provider::Opencode, 3, payload(), t(0))
            .await;
        let second = repo
            .enqueue("r1", "s1", Provider::Opencode, 3, payload(), t(1))
            .await;
        assert!(first.accepted);
        assert!(!second.accepted);
    }

    // ── S3: lease recovery ──────────────────────────────────────────
    #[tokio::test]
    async fn lease_recovery_sequence() {
        let repo = InMemoryQueueRepository::new();
        repo.enqueue("r1", "s1", Provider::Opencode, 3, payload(), t(0))
            .await;

        let claimed_a = repo.claim_next("A", t(0), 1000).await.expect("claim A");
        assert_eq!(claimed_a.lock_owner.as_deref(), Some("A"));
        assert_eq!(claimed_a.attempts, 1);

        // invariant 2: no second claim while lease is live
        let claimed_b_early = repo.claim_next("B", t(500), 1000).await;
        assert!(claimed_b_early.is_none());

        // lease expired at t(1000); B claims after t(1500)
        let claimed_b_late = repo.claim_next("B", t(1500), 1000).await.expect("claim B");
        assert_eq!(claimed_b_late.attempts, 2);
        assert_eq!(claimed_b_late.lock_owner.as_deref(), Some("B"));
    }

    // ── S1: retry then success ───────────────────────────────────────
    #[tokio::test]
    async fn retry_then_succeed() {
        let repo = InMemoryQueueRepository::new();
        repo.enqueue("r1", "s1", Provider::Opencode, 3, payload(), t(0))
            .await;

        let claimed = repo.claim_next("A", t(0), 60_000).await.unwrap();
        assert_eq!(claimed.attempts, 1);

        let retry = repo
            .mark_retry_or_failed("r1", t(10), 5_000, "boom".into())
            .await
            .unwrap();
        assert_eq!(retry.status, RunQueueStatus::Queued);
        assert_eq!(retry.attempts, 1);

        let item = repo.find_by_run_id("r1").await.unwrap();
        assert_eq!(item.status, RunQueueStatus::Queued);
        assert_eq!(item.attempts, 1);

        let claimed2 = repo.claim_next("A", t(6000), 60_000).await.unwrap();
        assert_eq!(claimed2.attempts, 2);

        assert!(repo.mark_succeeded("r1", t(7000)).await);
        let item2 = repo.find_by_run_id("r1").await.unwrap();
        assert_eq!(item2.status, RunQueueStatus::Succeeded);
        assert_eq!(item2.attempts, 2);
        assert!(item2.error_message.is_none());
    }

    #[tokio::test]
    async fn max_attempts_exhausted_fails() {
        let repo = InMemoryQueueRepository::new();
        repo.enqueue("r1", "s1", Provider::Opencode, 1, payload(), t(0))
            .await;
        repo.claim_next("A", t(0), 1000).await.unwrap();
        let retry = repo
            .mark_retry_or_failed("r1", t(10), 5_000, "boom".into())
            .await
            .unwrap();
        assert_eq!(retry.status, RunQueueStatus::Failed);
    }

    #[tokio::test]
    async fn list_stale_claimed_respects_limit() {
        let repo = InMemoryQueueRepository::new();
        for i in 0..3 {
            repo.enqueue(&format!("r{i}"), "s1", Provider::Opencode, 3, payload(), t(i))
                .await;
            repo.claim_next("A", t(i), 100).await.unwrap();
        }
        let stale = repo.list_stale_claimed(t(10_000), 2).await;
        assert_eq!(stale.len(), 2);
    }
}
