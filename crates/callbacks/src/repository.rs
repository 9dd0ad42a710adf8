use crate::item::{
    HumanLoopRequest, HumanLoopStatus, RunState, RunStateStatus, TodoEvent, TodoItem, TodoStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sa_domain::stream::Usage;
use std::collections::HashMap;

/// Idempotency log backing `recordEventIfNew` (§4.6, §3 "Event-id log").
/// The first call for a given `eventId` returns `true`; every subsequent
/// call returns `false` (§8 invariant 4).
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn record_event_if_new(&self, event_id: &str) -> bool;
}

#[async_trait]
pub trait TodoRepository: Send + Sync {
    async fn upsert(&self, item: TodoItem);
    async fn append_event(&self, event: TodoEvent);
    async fn list(&self, run_id: &str) -> Vec<TodoItem>;
}

#[async_trait]
pub trait HumanLoopRepository: Send + Sync {
    async fn upsert_pending(
        &self,
        question_id: &str,
        run_id: &str,
        session_id: &str,
        prompt: &str,
        metadata: serde_json::Value,
        requested_at: DateTime<Utc>,
    );
    /// Resolves only if `question_id` belongs to `run_id` (§3 invariant).
    async fn resolve(&self, run_id: &str, question_id: &str, resolved_at: DateTime<Utc>) -> bool;
    async fn get(&self, question_id: &str) -> Option<HumanLoopRequest>;
    async fn list_pending_older_than(&self, cutoff: DateTime<Utc>) -> Vec<HumanLoopRequest>;
    async fn cancel(&self, question_id: &str) -> bool;
}

#[async_trait]
pub trait RunStateRepository: Send + Sync {
    async fn ensure(&self, run_id: &str, status: RunStateStatus);
    async fn set_status(&self, run_id: &str, status: RunStateStatus);
    /// First-writer-wins (§8 invariant 5, §9 open question b).
    async fn finalize_usage_once(&self, run_id: &str, usage: Usage, now: DateTime<Utc>) -> bool;
    async fn get(&self, run_id: &str) -> Option<RunState>;
}

#[derive(Default)]
pub struct InMemoryEventLog {
    seen: parking_lot::RwLock<std::collections::HashSet<String>>,
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn record_event_if_new(&self, event_id: &str) -> bool {
        self.seen.write().insert(event_id.to_string())
    }
}

#[derive(Default)]
pub struct InMemoryTodoRepository {
    items: parking_lot::RwLock<HashMap<(String, String), TodoItem>>,
    events: parking_lot::RwLock<Vec<TodoEvent>>,
}

#[async_trait]
impl TodoRepository for InMemoryTodoRepository {
    async fn upsert(&self, item: TodoItem) {
        let key = (item.run_id.clone(), item.todo_id.clone());
        let mut items = self.items.write();
        match items.get(&key) {
            Some(existing) if existing.updated_at > item.updated_at => {}
            _ => {
                items.insert(key, item);
            }
        }
    }

    async fn append_event(&self, event: TodoEvent) {
        self.events.write().push(event);
    }

    async fn list(&self, run_id: &str) -> Vec<TodoItem> {
        self.items
            .read()
            .values()
            .filter(|i| i.run_id == run_id)
            .cloned()
            .collect()
    }
}

#[derive(Default)]
pub struct InMemoryHumanLoopRepository {
    requests: parking_lot::RwLock<HashMap<String, HumanLoopRequest>>,
}

#[async_trait]
impl HumanLoopRepository for InMemoryHumanLoopRepository {
    async fn upsert_pending(
        &self,
        question_id: &str,
        run_id: &str,
        session_id: &str,
        prompt: &str,
        metadata: serde_json::Value,
        requested_at: DateTime<Utc>,
    ) {
        self.requests.write().insert(
            question_id.to_string(),
            HumanLoopRequest {
                question_id: question_id.to_string(),
                run_id: run_id.to_string(),
                session_id: session_id.to_string(),
                prompt: prompt.to_string(),
                metadata,
                status: HumanLoopStatus::Pending,
                requested_at,
                resolved_at: None,
            },
        );
    }

    async fn resolve(&self, run_id: &str, question_id: &str, resolved_at: DateTime<Utc>) -> bool {
        let mut requests = self.requests.write();
        match requests.get_mut(question_id) {
            Some(req) if req.run_id == run_id => {
                req.status = HumanLoopStatus::Resolved;
                req.resolved_at = Some(resolved_at);
                true
            }
            _ => false,
        }
    }

    async fn get(&self, question_id: &str) -> Option<HumanLoopRequest> {
        self.requests.read().get(question_id).cloned()
    }

    async fn list_pending_older_than(&self, cutoff: DateTime<Utc>) -> Vec<HumanLoopRequest> {
        self.requests
            .read()
            .values()
            .filter(|r| r.status == HumanLoopStatus::Pending && r.requested_at < cutoff)
            .cloned()
            .collect()
    }

    async fn cancel(&self, question_id: &str) -> bool {
        let mut requests = self.requests.write();
        match requests.get_mut(question_id) {
            Some(req) => {
                req.status = HumanLoopStatus::Canceled;
                true
            }
            None => false,
        }
    }
}

#[derive(Default)]
pub struct InMemoryRunStateRepository {
    states: parking_lot::RwLock<HashMap<String, RunState>>,
}

#[async_trait]
impl RunStateRepository for InMemoryRunStateRepository {
    async fn ensure(&self, run_id: &str, status: RunStateStatus) {
        let mut states = self.states.write();
        states.entry(run_id.to_string()).or_insert(RunState {
            run_id: run_id.to_string(),
            status,
            usage: None,
            finalized_at: None,
        });
    }

    async fn set_status(&self, run_id: &str, status: RunStateStatus) {
        let mut states = self.states.write();
        states
            .entry(run_id.to_string())
            .and_modify(|s| s.status = status)
            .or_insert(RunState {
                run_id: run_id.to_string(),
                status,
                usage: None,
                finalized_at: None,
            });
    }

    async fn finalize_usage_once(&self, run_id: &str, usage: Usage, now: DateTime<Utc>) -> bool {
        let mut states = self.states.write();
        let entry = states.entry(run_id.to_string()).or_insert(RunState {
            run_id: run_id.to_string(),
            status: RunStateStatus::Running,
            usage: None,
            finalized_at: None,
        });
        if entry.usage.is_some() {
            return false;
        }
        entry.usage = Some(usage);
        entry.finalized_at = Some(now);
        true
    }

    async fn get(&self, run_id: &str) -> Option<RunState> {
        self.states.read().get(run_id).cloned()
    }
}
