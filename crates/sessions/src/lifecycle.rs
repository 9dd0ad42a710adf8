//! Session Worker Lifecycle Manager (§4.8). Owns the `activateSession` /
//! `stopIdleWorkers` / `removeLongStoppedWorkers` / `syncSessionWorkspace`
//! state machine. Shaped after the teacher's `LifecycleManager`, whose
//! `should_reset` method evaluates a fixed precedence of reset reasons
//! against a single piece of mutable state — here the precedence is over
//! activation outcomes and sweep eligibility instead of reset triggers, but
//! the "one method, ordered checks, first match wins" shape is the same.

use crate::container::ContainerRuntime;
use crate::executor_client::{ExecutorClient, TraceContext, WorkspaceSyncClient};
use crate::item::{ActivateOutcome, SessionWorker, SessionWorkerState, SweepCounters, SyncReason, SyncStatus};
use crate::restore_plan::{build_restore_plan, compute_workspace_s3_prefix, RuntimeManifest};
use crate::store::SessionWorkerRepository;
use chrono::{DateTime, Utc};
use sa_domain::error::Result;
use std::sync::Arc;

/// §4.8 activation inputs. `manifest` is `None` when the caller only wants
/// to touch an already-running worker (no restore needed).
pub struct ActivateRequest<'a> {
    pub session_id: &'a str,
    pub app_id: &'a str,
    pub project_name: Option<&'a str>,
    pub user_login_name: &'a str,
    pub runtime_version: &'a str,
    pub manifest: Option<&'a RuntimeManifest>,
}

pub struct SessionWorkerLifecycleManager {
    repo: Arc<dyn SessionWorkerRepository>,
    executor: Arc<dyn ExecutorClient>,
    sync: Arc<dyn WorkspaceSyncClient>,
    runtime: Arc<dyn ContainerRuntime>,
    idle_timeout_ms: i64,
    remove_after_ms: i64,
}

impl SessionWorkerLifecycleManager {
    pub fn new(
        repo: Arc<dyn SessionWorkerRepository>,
        executor: Arc<dyn ExecutorClient>,
        sync: Arc<dyn WorkspaceSyncClient>,
        runtime: Arc<dyn ContainerRuntime>,
        idle_timeout_ms: i64,
        remove_after_ms: i64,
    ) -> Self {
        Self {
            repo,
            executor,
            sync,
            runtime,
            idle_timeout_ms,
            remove_after_ms,
        }
    }

    /// §6 `GET /api/session-workers/:sessionId`.
    pub async fn get(&self, session_id: &str) -> Option<SessionWorker> {
        self.repo.get(session_id).await
    }

    fn trace(&self, session_id: &str, operation: &str, now: DateTime<Utc>) -> TraceContext {
        TraceContext {
            trace_id: uuid::Uuid::new_v4().to_string(),
            trace_session_id: session_id.to_string(),
            trace_executor_id: "session-worker-lifecycle".to_string(),
            trace_operation: operation.to_string(),
            trace_ts: now,
            trace_run_id: None,
        }
    }

    /// §4.8 `activateSession`. Ordered precedence: already running and no
    /// manifest change requested -> `AlreadyRunning`; stopped -> restart in
    /// place; absent -> create. A manifest, when given, is always restored
    /// and validated before the worker is reported as running.
    pub async fn activate_session(
        &self,
        req: ActivateRequest<'_>,
        now: DateTime<Utc>,
    ) -> Result<(SessionWorker, ActivateOutcome)> {
        let existing = self.repo.get(req.session_id).await;

        let outcome = match &existing {
            Some(w) if w.state == SessionWorkerState::Running && req.manifest.is_none() => {
                ActivateOutcome::AlreadyRunning
            }
            Some(w) if w.state == SessionWorkerState::Stopped => ActivateOutcome::Restarted,
            Some(w) if w.state == SessionWorkerState::Running => ActivateOutcome::AlreadyRunning,
            _ => ActivateOutcome::Created,
        };

        let workspace_s3_prefix = compute_workspace_s3_prefix(
            req.app_id,
            req.project_name,
            req.user_login_name,
            req.session_id,
        );

        let container_id = match (&existing, &outcome) {
            (Some(w), ActivateOutcome::AlreadyRunning) => w.container_id.clone(),
            _ => Some(self.runtime.start(req.session_id, &workspace_s3_prefix).await?),
        };

        if let Some(manifest) = req.manifest {
            let plan = build_restore_plan(manifest, req.runtime_version)?;
            let trace = self.trace(req.session_id, "activateSession.restore", now);
            self.executor.restore_workspace(&plan, &trace).await?;
            self.executor.link_agent_data(req.session_id, &trace).await?;
            let validation = self
                .executor
                .validate_workspace(&plan.required_paths, &trace)
                .await?;
            if !validation.ok {
                return Err(sa_domain::error::Error::Conflict(format!(
                    "session {} missing required paths after restore: {:?}",
                    req.session_id, validation.missing_required_paths
                )));
            }
        }

        let worker = SessionWorker {
            session_id: req.session_id.to_string(),
            container_id,
            workspace_s3_prefix,
            state: SessionWorkerState::Running,
            last_active_at: now,
            stopped_at: None,
            last_sync_at: existing.as_ref().and_then(|w| w.last_sync_at),
            last_sync_status: existing
                .as_ref()
                .map(|w| w.last_sync_status)
                .unwrap_or(SyncStatus::Idle),
            last_sync_error: existing.as_ref().and_then(|w| w.last_sync_error.clone()),
            created_at: existing.as_ref().map(|w| w.created_at).unwrap_or(now),
            updated_at: now,
        };
        self.repo.upsert(worker.clone()).await;
        Ok((worker, outcome))
    }

    /// Sync a single worker's workspace, recording the attempt regardless of
    /// outcome (§4.8 `syncSessionWorkspace`). Returns the (possibly failed)
    /// sync outcome rather than propagating the error, so callers doing a
    /// sweep can account for it in `SweepCounters` instead of aborting.
    pub async fn sync_session_workspace(
        &self,
        session_id: &str,
        reason: SyncReason,
        now: DateTime<Utc>,
    ) -> Result<SessionWorker> {
        let mut worker = self
            .repo
            .get(session_id)
            .await
            .ok_or_else(|| sa_domain::error::Error::NotFound(format!("session worker {session_id}")))?;

        worker.last_sync_status = SyncStatus::Running;
        self.repo.upsert(worker.clone()).await;

        let trace = self.trace(session_id, "syncSessionWorkspace", now);
        let result = self.sync.sync_workspace(session_id, reason, &trace).await;

        worker.last_sync_at = Some(now);
        worker.updated_at = now;
        match result {
            Ok(()) => {
                worker.last_sync_status = SyncStatus::Success;
                worker.last_sync_error = None;
            }
            Err(e) => {
                worker.last_sync_status = SyncStatus::Failed;
                worker.last_sync_error = Some(e.to_string());
            }
        }
        self.repo.upsert(worker.clone()).await;
        Ok(worker)
    }

    /// §4.8 `stopIdleWorkers`. Sync-before-stop (§8 invariant 6): a worker
    /// whose sync fails stays `running` with `lastSyncStatus=failed` rather
    /// than transitioning to `stopped` — matching **S7**.
    pub async fn stop_idle_workers(&self, now: DateTime<Utc>, limit: u32) -> Result<SweepCounters> {
        let candidates = self
            .repo
            .list_running_idle_since(now, self.idle_timeout_ms, limit)
            .await;
        let mut counters = SweepCounters::default();
        for candidate in candidates {
            counters.total += 1;
            let synced = self
                .sync_session_workspace(&candidate.session_id, SyncReason::PreStop, now)
                .await?;
            if synced.last_sync_status != SyncStatus::Success {
                counters.failed += 1;
                continue;
            }
            if let Some(container_id) = &synced.container_id {
                if let Err(e) = self.runtime.stop(container_id).await {
                    tracing::warn!(session_id = %candidate.session_id, error = %e, "failed to stop container after successful sync");
                    counters.failed += 1;
                    continue;
                }
            }
            let mut stopped = synced;
            stopped.state = SessionWorkerState::Stopped;
            stopped.stopped_at = Some(now);
            stopped.updated_at = now;
            self.repo.upsert(stopped).await;
            counters.succeeded += 1;
        }
        Ok(counters)
    }

    /// §4.9 reconciler job "stale sync workers". Re-syncs any `running` or
    /// `stopped` worker whose `lastSyncAt` is older than `staleAfterMs` (or
    /// unset), independent of the idle/stop sweeps above.
    pub async fn sync_stale_workers(
        &self,
        now: DateTime<Utc>,
        stale_after_ms: i64,
        limit: u32,
    ) -> Result<SweepCounters> {
        let candidates = self.repo.list_stale_sync(now, stale_after_ms, limit).await;
        let mut counters = SweepCounters::default();
        for candidate in candidates {
            counters.total += 1;
            let synced = self
                .sync_session_workspace(&candidate.session_id, SyncReason::RunFinished, now)
                .await?;
            if synced.last_sync_status == SyncStatus::Success {
                counters.succeeded += 1;
            } else {
                counters.failed += 1;
            }
        }
        Ok(counters)
    }

    /// §4.8 `removeLongStoppedWorkers`. Short-circuits to `deleted` without a
    /// sync call when the backing container is already gone — there is
    /// nothing left to sync.
    pub async fn remove_long_stopped_workers(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<SweepCounters> {
        let candidates = self
            .repo
            .list_stopped_before(now, self.remove_after_ms, limit)
            .await;
        let mut counters = SweepCounters::default();
        for candidate in candidates {
            counters.total += 1;

            let container_present = match &candidate.container_id {
                Some(id) => self.runtime.exists(id).await?,
                None => false,
            };

            if !container_present {
                let mut deleted = candidate;
                deleted.state = SessionWorkerState::Deleted;
                deleted.updated_at = now;
                self.repo.upsert(deleted).await;
                counters.skipped += 1;
                continue;
            }

            let synced = self
                .sync_session_workspace(&candidate.session_id, SyncReason::PreRemove, now)
                .await?;
            if synced.last_sync_status != SyncStatus::Success {
                counters.failed += 1;
                continue;
            }
            if let Some(container_id) = &synced.container_id {
                self.runtime.stop(container_id).await?;
            }
            let mut deleted = synced;
            deleted.state = SessionWorkerState::Deleted;
            deleted.updated_at = now;
            self.repo.upsert(deleted).await;
            counters.succeeded += 1;
        }
        Ok(counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::StubContainerRuntime;
    use crate::executor_client::ValidateWorkspaceResponse;
    use crate::restore_plan::RestorePlan;
    use crate::store::InMemorySessionWorkerRepository;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use sa_domain::error::Error;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    struct NoopExecutor;

    #[async_trait]
    impl ExecutorClient for NoopExecutor {
        async fn restore_workspace(&self, _plan: &RestorePlan, _trace: &TraceContext) -> Result<()> {
            Ok(())
        }
        async fn link_agent_data(&self, _session_id: &str, _trace: &TraceContext) -> Result<()> {
            Ok(())
        }
        async fn validate_workspace(
            &self,
            _required_paths: &[String],
            _trace: &TraceContext,
        ) -> Result<ValidateWorkspaceResponse> {
            Ok(ValidateWorkspaceResponse {
                ok: true,
                missing_required_paths: vec![],
            })
        }
    }

    struct FailingSync {
        should_fail: AtomicBool,
    }

    #[async_trait]
    impl WorkspaceSyncClient for FailingSync {
        async fn sync_workspace(
            &self,
            _session_id: &str,
            _reason: SyncReason,
            _trace: &TraceContext,
        ) -> Result<()> {
            if self.should_fail.load(Ordering::SeqCst) {
                Err(Error::UpstreamNetwork("sync endpoint unreachable".into()))
            } else {
                Ok(())
            }
        }
    }

    fn manager(
        idle_timeout_ms: i64,
        remove_after_ms: i64,
        sync_fails: bool,
    ) -> (SessionWorkerLifecycleManager, Arc<InMemorySessionWorkerRepository>) {
        let repo = Arc::new(InMemorySessionWorkerRepository::default());
        let mgr = SessionWorkerLifecycleManager::new(
            repo.clone(),
            Arc::new(NoopExecutor),
            Arc::new(FailingSync {
                should_fail: AtomicBool::new(sync_fails),
            }),
            Arc::new(StubContainerRuntime::default()),
            idle_timeout_ms,
            remove_after_ms,
        );
        (mgr, repo)
    }

    #[tokio::test]
    async fn activate_session_creates_new_worker() {
        let (mgr, _repo) = manager(60_000, 60_000, false);
        let (worker, outcome) = mgr
            .activate_session(
                ActivateRequest {
                    session_id: "s1",
                    app_id: "app1",
                    project_name: None,
                    user_login_name: "alice",
                    runtime_version: "v1",
                    manifest: None,
                },
                t(0),
            )
            .await
            .unwrap();
        assert_eq!(outcome, ActivateOutcome::Created);
        assert_eq!(worker.state, SessionWorkerState::Running);
        assert_eq!(
            worker.workspace_s3_prefix,
            "app/app1/project/default/alice/session/s1/workspace"
        );
    }

    #[tokio::test]
    async fn activate_session_already_running_is_noop_outcome() {
        let (mgr, _repo) = manager(60_000, 60_000, false);
        let req = || ActivateRequest {
            session_id: "s1",
            app_id: "app1",
            project_name: None,
            user_login_name: "alice",
            runtime_version: "v1",
            manifest: None,
        };
        mgr.activate_session(req(), t(0)).await.unwrap();
        let (_, outcome) = mgr.activate_session(req(), t(1_000)).await.unwrap();
        assert_eq!(outcome, ActivateOutcome::AlreadyRunning);
    }

    // ── S7: sync-before-stop, sync fails, worker stays running ──────────
    #[tokio::test]
    async fn s7_sync_failure_keeps_worker_running() {
        let (mgr, repo) = manager(1, 60_000, true);
        mgr.activate_session(
            ActivateRequest {
                session_id: "s1",
                app_id: "app1",
                project_name: None,
                user_login_name: "alice",
                runtime_version: "v1",
                manifest: None,
            },
            t(0),
        )
        .await
        .unwrap();

        let counters = mgr.stop_idle_workers(t(10_000), 10).await.unwrap();
        assert_eq!(
            counters,
            SweepCounters {
                total: 1,
                succeeded: 0,
                failed: 1,
                skipped: 0
            }
        );

        let worker = repo.get("s1").await.unwrap();
        assert_eq!(worker.state, SessionWorkerState::Running);
        assert_eq!(worker.last_sync_status, SyncStatus::Failed);
    }

    // ── invariant 6: sync-before-destroy holds when sync succeeds ────────
    #[tokio::test]
    async fn invariant6_successful_sync_allows_stop() {
        let (mgr, repo) = manager(1, 60_000, false);
        mgr.activate_session(
            ActivateRequest {
                session_id: "s1",
                app_id: "app1",
                project_name: None,
                user_login_name: "alice",
                runtime_version: "v1",
                manifest: None,
            },
            t(0),
        )
        .await
        .unwrap();

        let counters = mgr.stop_idle_workers(t(10_000), 10).await.unwrap();
        assert_eq!(counters.succeeded, 1);
        let worker = repo.get("s1").await.unwrap();
        assert_eq!(worker.state, SessionWorkerState::Stopped);
        assert_eq!(worker.last_sync_status, SyncStatus::Success);
        assert!(worker.last_sync_at.is_some());
    }

    #[tokio::test]
    async fn sync_stale_workers_resyncs_running_worker_past_threshold() {
        let (mgr, repo) = manager(60_000, 60_000, false);
        mgr.activate_session(
            ActivateRequest {
                session_id: "s1",
                app_id: "app1",
                project_name: None,
                user_login_name: "alice",
                runtime_version: "v1",
                manifest: None,
            },
            t(0),
        )
        .await
        .unwrap();

        let counters = mgr.sync_stale_workers(t(10_000), 1_000, 10).await.unwrap();
        assert_eq!(counters.total, 1);
        assert_eq!(counters.succeeded, 1);
        let worker = repo.get("s1").await.unwrap();
        assert_eq!(worker.state, SessionWorkerState::Running);
        assert_eq!(worker.last_sync_status, SyncStatus::Success);
    }

    #[tokio::test]
    async fn remove_long_stopped_worker_skips_sync_when_container_absent() {
        let (mgr, repo) = manager(1, 1, false);
        mgr.activate_session(
            ActivateRequest {
                session_id: "s1",
                app_id: "app1",
                project_name: None,
                user_login_name: "alice",
                runtime_version: "v1",
                manifest: None,
            },
            t(0),
        )
        .await
        .unwrap();
        mgr.stop_idle_workers(t(10_000), 10).await.unwrap();

        let counters = mgr.remove_long_stopped_workers(t(20_000), 10).await.unwrap();
        assert_eq!(counters.total, 1);
        assert_eq!(counters.skipped, 1);
        let worker = repo.get("s1").await.unwrap();
        assert_eq!(worker.state, SessionWorkerState::Deleted);
    }
}
