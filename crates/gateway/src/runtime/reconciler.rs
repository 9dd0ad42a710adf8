//! Reconciler (§4.9): three independent, idempotent sweep jobs driven by
//! their own `tokio::time::interval` from `spawn_background_tasks`. Mirrors
//! the teacher's periodic-sweep shape, generalized from a single cleanup job
//! to the three named here.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use sa_callbacks::{HumanLoopRepository, RunStateRepository, RunStateStatus};
use sa_domain::config::ReconcilerConfig;
use sa_domain::trace::TraceEvent;
use sa_queue::QueueRepository;
use sa_sessions::SessionWorkerLifecycleManager;

pub struct Reconciler {
    queue: Arc<dyn QueueRepository>,
    human_loop: Arc<dyn HumanLoopRepository>,
    run_states: Arc<dyn RunStateRepository>,
    sessions: Arc<SessionWorkerLifecycleManager>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        queue: Arc<dyn QueueRepository>,
        human_loop: Arc<dyn HumanLoopRepository>,
        run_states: Arc<dyn RunStateRepository>,
        sessions: Arc<SessionWorkerLifecycleManager>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            queue,
            human_loop,
            run_states,
            sessions,
            config,
        }
    }

    /// Runs all three sweeps once. Each job bounds its own result set to
    /// `config.sweep_limit` and records the bound via
    /// `TraceEvent::ReconcileSweepBounded` (§9 open question d).
    pub async fn tick(&self, now: DateTime<Utc>) {
        self.reconcile_stale_leases(now).await;
        self.reconcile_stale_syncs(now).await;
        if self.config.human_loop_timeout_enabled {
            self.reconcile_human_loop_timeouts(now).await;
        }
    }

    /// §4.9 "Stale run leases": reclaim claims past their lease plus a
    /// clock-skew grace period.
    pub async fn reconcile_stale_leases(&self, now: DateTime<Utc>) -> u32 {
        let grace_adjusted = now - Duration::milliseconds(self.config.stale_claim_grace_ms as i64);
        let stale = self
            .queue
            .list_stale_claimed(grace_adjusted, self.config.sweep_limit)
            .await;
        TraceEvent::ReconcileSweepBounded {
            job: "stale_leases".to_string(),
            limit: self.config.sweep_limit,
            returned: stale.len() as u32,
        }
        .emit();

        for item in &stale {
            if let Some(owner) = &item.lock_owner {
                TraceEvent::QueueLeaseExpired {
                    run_id: item.run_id.clone(),
                    owner: owner.clone(),
                }
                .emit();
            }
            self.queue
                .mark_retry_or_failed(&item.run_id, now, 0, "reconciler_stale_claim_timeout".to_string())
                .await;
        }
        stale.len() as u32
    }

    /// §4.9 "Stale sync workers": re-sync any worker whose `lastSyncAt` has
    /// fallen behind `syncStaleAfterMs`.
    pub async fn reconcile_stale_syncs(&self, now: DateTime<Utc>) -> u32 {
        let counters = match self
            .sessions
            .sync_stale_workers(now, self.config.sync_stale_after_ms as i64, self.config.sweep_limit)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "stale sync sweep failed");
                return 0;
            }
        };
        TraceEvent::ReconcileSweepBounded {
            job: "stale_syncs".to_string(),
            limit: self.config.sweep_limit,
            returned: counters.total,
        }
        .emit();
        counters.total
    }

    /// §4.9 "Human-loop timeouts": expire `pending` requests older than
    /// `humanLoopTimeoutMs` by canceling them and failing the run they were
    /// blocking, when the deployment opts in.
    pub async fn reconcile_human_loop_timeouts(&self, now: DateTime<Utc>) -> u32 {
        let cutoff = now - Duration::milliseconds(self.config.human_loop_timeout_ms as i64);
        let pending = self.human_loop.list_pending_older_than(cutoff).await;
        let bounded: Vec<_> = pending
            .into_iter()
            .take(self.config.sweep_limit as usize)
            .collect();
        TraceEvent::ReconcileSweepBounded {
            job: "human_loop_timeouts".to_string(),
            limit: self.config.sweep_limit,
            returned: bounded.len() as u32,
        }
        .emit();

        for request in &bounded {
            self.human_loop.cancel(&request.question_id).await;
            self.run_states
                .set_status(&request.run_id, RunStateStatus::Failed)
                .await;
        }
        bounded.len() as u32
    }
}
