use crate::item::SessionWorker;
use async_trait::async_trait;
use std::collections::HashMap;

#[async_trait]
pub trait SessionWorkerRepository: Send + Sync {
    async fn get(&self, session_id: &str) -> Option<SessionWorker>;
    async fn upsert(&self, worker: SessionWorker);
    async fn list_running_idle_since(
        &self,
        now: chrono::DateTime<chrono::Utc>,
        idle_timeout_ms: i64,
        limit: u32,
    ) -> Vec<SessionWorker>;
    async fn list_stopped_before(
        &self,
        now: chrono::DateTime<chrono::Utc>,
        remove_after_ms: i64,
        limit: u32,
    ) -> Vec<SessionWorker>;
    async fn list_stale_sync(
        &self,
        now: chrono::DateTime<chrono::Utc>,
        stale_after_ms: i64,
        limit: u32,
    ) -> Vec<SessionWorker>;
}

#[derive(Default)]
pub struct InMemorySessionWorkerRepository {
    inner: parking_lot::RwLock<HashMap<String, SessionWorker>>,
}

#[async_trait]
impl SessionWorkerRepository for InMemorySessionWorkerRepository {
    async fn get(&self, session_id: &str) -> Option<SessionWorker> {
        self.inner.read().get(session_id).cloned()
    }

    async fn upsert(&self, worker: SessionWorker) {
        self.inner.write().insert(worker.session_id.clone(), worker);
    }

    async fn list_running_idle_since(
        &self,
        now: chrono::DateTime<chrono::Utc>,
        idle_timeout_ms: i64,
        limit: u32,
    ) -> Vec<SessionWorker> {
        use crate::item::SessionWorkerState;
        let cutoff = now - chrono::Duration::milliseconds(idle_timeout_ms);
        let mut workers: Vec<SessionWorker> = self
            .inner
            .read()
            .values()
            .filter(|w| w.state == SessionWorkerState::Running && w.last_active_at < cutoff)
            .cloned()
            .collect();
        workers.sort_by_key(|w| w.last_active_at);
        workers.truncate(limit as usize);
        workers
    }

    async fn list_stopped_before(
        &self,
        now: chrono::DateTime<chrono::Utc>,
        remove_after_ms: i64,
        limit: u32,
    ) -> Vec<SessionWorker> {
        use crate::item::SessionWorkerState;
        let cutoff = now - chrono::Duration::milliseconds(remove_after_ms);
        let mut workers: Vec<SessionWorker> = self
            .inner
            .read()
            .values()
            .filter(|w| {
                w.state == SessionWorkerState::Stopped
                    && w.stopped_at.map(|t| t < cutoff).unwrap_or(false)
            })
            .cloned()
            .collect();
        workers.sort_by_key(|w| w.stopped_at);
        workers.truncate(limit as usize);
        workers
    }

    async fn list_stale_sync(
        &self,
        now: chrono::DateTime<chrono::Utc>,
        stale_after_ms: i64,
        limit: u32,
    ) -> Vec<SessionWorker> {
        use crate::item::SessionWorkerState;
        let cutoff = now - chrono::Duration::milliseconds(stale_after_ms);
        let mut workers: Vec<SessionWorker> = self
            .inner
            .read()
            .values()
            .filter(|w| {
                matches!(
                    w.state,
                    SessionWorkerState::Running | SessionWorkerState::Stopped
                ) && w.last_sync_at.map(|t| t < cutoff).unwrap_or(true)
            })
            .cloned()
            .collect();
        workers.sort_by_key(|w| w.last_sync_at);
        workers.truncate(limit as usize);
        workers
    }
}
