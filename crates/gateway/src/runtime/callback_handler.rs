//! Callback Handler (§4.6): exactly-once ingestion of executor callbacks.
//! Mirrors the teacher's `runtime::deliveries` dispatch-by-event-type shape,
//! generalized from webhook deliveries to the five callback kinds this
//! system ingests.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sa_callbacks::{
    CallbackEvent, CallbackEventType, EventLog, HumanLoopRepository, RunStateRepository,
    RunStateStatus, TodoEvent, TodoItem, TodoRepository, TodoStatus,
};
use sa_domain::stream::Usage;
use sa_domain::trace::TraceEvent;
use sa_domain::types::TerminalStatus;
use sa_sessions::{SessionWorkerLifecycleManager, SyncReason};

use super::orchestrator::Orchestrator;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageStopPayload {}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TodoUpdatePayload {
    todo_id: String,
    content: String,
    status: TodoStatus,
    order: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HumanLoopRequestedPayload {
    question_id: String,
    session_id: String,
    prompt: String,
    #[serde(default)]
    metadata: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HumanLoopResolvedPayload {
    question_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunFinishedPayload {
    status: TerminalStatus,
    #[serde(default)]
    usage: Option<Usage>,
}

/// Result of processing one `CallbackEvent` (§6 `POST
/// /api/runs/:runId/callbacks` response body).
#[derive(Debug, Clone, Serialize)]
pub struct CallbackOutcome {
    pub processed: bool,
    pub duplicate: bool,
    pub action: String,
}

impl CallbackOutcome {
    fn duplicate() -> Self {
        Self {
            processed: false,
            duplicate: true,
            action: "duplicate_ignored".into(),
        }
    }

    fn processed(action: &str) -> Self {
        Self {
            processed: true,
            duplicate: false,
            action: action.to_string(),
        }
    }
}

pub struct CallbackHandler {
    event_log: Arc<dyn EventLog>,
    todos: Arc<dyn TodoRepository>,
    human_loop: Arc<dyn HumanLoopRepository>,
    run_states: Arc<dyn RunStateRepository>,
    orchestrator: Arc<Orchestrator>,
    sessions: Arc<SessionWorkerLifecycleManager>,
}

impl CallbackHandler {
    pub fn new(
        event_log: Arc<dyn EventLog>,
        todos: Arc<dyn TodoRepository>,
        human_loop: Arc<dyn HumanLoopRepository>,
        run_states: Arc<dyn RunStateRepository>,
        orchestrator: Arc<Orchestrator>,
        sessions: Arc<SessionWorkerLifecycleManager>,
    ) -> Self {
        Self {
            event_log,
            todos,
            human_loop,
            run_states,
            orchestrator,
            sessions,
        }
    }

    /// §4.6 dispatch. `now` drives the session-sync and human-loop timestamps
    /// written as a side effect of `message.stop`/`human_loop.requested`.
    pub async fn handle(&self, event: CallbackEvent, now: DateTime<Utc>) -> CallbackOutcome {
        if !self.event_log.record_event_if_new(&event.event_id).await {
            TraceEvent::CallbackDuplicate {
                event_id: event.event_id.clone(),
            }
            .emit();
            return CallbackOutcome::duplicate();
        }

        let outcome = match event.kind {
            CallbackEventType::MessageStop => self.handle_message_stop(&event, now).await,
            CallbackEventType::TodoUpdate => self.handle_todo_update(&event).await,
            CallbackEventType::HumanLoopRequested => self.handle_human_loop_requested(&event, now).await,
            CallbackEventType::HumanLoopResolved => self.handle_human_loop_resolved(&event).await,
            CallbackEventType::RunFinished => self.handle_run_finished(&event, now).await,
        };

        TraceEvent::CallbackAccepted {
            event_id: event.event_id.clone(),
            run_id: event.run_id.clone(),
            kind: format!("{:?}", event.kind),
        }
        .emit();
        outcome
    }

    async fn handle_message_stop(&self, event: &CallbackEvent, now: DateTime<Utc>) -> CallbackOutcome {
        let Some(ctx) = self.orchestrator.context(&event.run_id) else {
            return CallbackOutcome::processed("missing_run");
        };
        // `sync_session_workspace` only returns `Err` when the session worker
        // row itself doesn't exist; a sync failure is recorded on the
        // returned `SessionWorker` (`last_sync_status`/`last_sync_error`) and
        // still comes back as `Ok`. §4.6 reports a single outcome here
        // regardless of which way the underlying sync went.
        match self
            .sessions
            .sync_session_workspace(&ctx.session_id, SyncReason::MessageStop, now)
            .await
        {
            Ok(_) => CallbackOutcome::processed("message_stop_synced"),
            Err(_) => CallbackOutcome::processed("missing_run"),
        }
    }

    async fn handle_todo_update(&self, event: &CallbackEvent) -> CallbackOutcome {
        let payload: TodoUpdatePayload = match serde_json::from_value(event.payload.clone()) {
            Ok(p) => p,
            Err(_) => return CallbackOutcome::processed("malformed_payload"),
        };
        self.todos
            .upsert(TodoItem {
                run_id: event.run_id.clone(),
                todo_id: payload.todo_id.clone(),
                content: payload.content.clone(),
                status: payload.status,
                order: payload.order,
                updated_at: event.occurred_at,
            })
            .await;
        self.todos
            .append_event(TodoEvent {
                event_id: event.event_id.clone(),
                run_id: event.run_id.clone(),
                todo_id: payload.todo_id,
                content: payload.content,
                status: payload.status,
                order: payload.order,
                updated_at: event.occurred_at,
            })
            .await;
        CallbackOutcome::processed("todo_updated")
    }

    async fn handle_human_loop_requested(&self, event: &CallbackEvent, _now: DateTime<Utc>) -> CallbackOutcome {
        if self.orchestrator.context(&event.run_id).is_none() {
            return CallbackOutcome::processed("missing_run");
        }
        let payload: HumanLoopRequestedPayload = match serde_json::from_value(event.payload.clone()) {
            Ok(p) => p,
            Err(_) => return CallbackOutcome::processed("malformed_payload"),
        };
        self.human_loop
            .upsert_pending(
                &payload.question_id,
                &event.run_id,
                &payload.session_id,
                &payload.prompt,
                payload.metadata,
                event.occurred_at,
            )
            .await;
        self.run_states
            .set_status(&event.run_id, RunStateStatus::WaitingHuman)
            .await;
        CallbackOutcome::processed("human_loop_requested")
    }

    async fn handle_human_loop_resolved(&self, event: &CallbackEvent) -> CallbackOutcome {
        let payload: HumanLoopResolvedPayload = match serde_json::from_value(event.payload.clone()) {
            Ok(p) => p,
            Err(_) => return CallbackOutcome::processed("malformed_payload"),
        };
        let resolved = self
            .human_loop
            .resolve(&event.run_id, &payload.question_id, event.occurred_at)
            .await;
        if !resolved {
            return CallbackOutcome::processed("human_loop_resolve_failed");
        }
        self.run_states
            .set_status(&event.run_id, RunStateStatus::Running)
            .await;
        CallbackOutcome::processed("human_loop_resolved")
    }

    async fn handle_run_finished(&self, event: &CallbackEvent, now: DateTime<Utc>) -> CallbackOutcome {
        let payload: RunFinishedPayload = match serde_json::from_value(event.payload.clone()) {
            Ok(p) => p,
            Err(_) => return CallbackOutcome::processed("malformed_payload"),
        };
        let status = match payload.status {
            TerminalStatus::Succeeded => RunStateStatus::Succeeded,
            TerminalStatus::Failed => RunStateStatus::Failed,
            TerminalStatus::Canceled => RunStateStatus::Canceled,
        };
        self.run_states.set_status(&event.run_id, status).await;
        if let Some(usage) = payload.usage {
            self.run_states
                .finalize_usage_once(&event.run_id, usage, now)
                .await;
        }
        CallbackOutcome::processed("run_finalized")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sa_callbacks::{InMemoryEventLog, InMemoryHumanLoopRepository, InMemoryRunStateRepository, InMemoryTodoRepository};
    use sa_domain::types::Provider;
    use sa_providers::ProviderRegistry;
    use sa_sessions::{InMemorySessionWorkerRepository, StubContainerRuntime};
    use sa_streambus::StreamBus;
    use std::collections::HashMap;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    struct NoopExecutor;

    #[async_trait::async_trait]
    impl sa_sessions::ExecutorClient for NoopExecutor {
        async fn restore_workspace(
            &self,
            _plan: &sa_sessions::RestorePlan,
            _trace: &sa_sessions::TraceContext,
        ) -> sa_domain::error::Result<()> {
            Ok(())
        }
        async fn link_agent_data(&self, _session_id: &str, _trace: &sa_sessions::TraceContext) -> sa_domain::error::Result<()> {
            Ok(())
        }
        async fn validate_workspace(
            &self,
            _required_paths: &[String],
            _trace: &sa_sessions::TraceContext,
        ) -> sa_domain::error::Result<sa_sessions::ValidateWorkspaceResponse> {
            Ok(sa_sessions::ValidateWorkspaceResponse {
                ok: true,
                missing_required_paths: vec![],
            })
        }
    }

    #[async_trait::async_trait]
    impl sa_sessions::WorkspaceSyncClient for NoopExecutor {
        async fn sync_workspace(
            &self,
            _session_id: &str,
            _reason: SyncReason,
            _trace: &sa_sessions::TraceContext,
        ) -> sa_domain::error::Result<()> {
            Ok(())
        }
    }

    fn handler() -> CallbackHandler {
        let registry = Arc::new(ProviderRegistry::from_adapters(HashMap::new()));
        let bus = Arc::new(StreamBus::new(2000));
        let orchestrator = Arc::new(Orchestrator::new(registry, bus));
        let noop = Arc::new(NoopExecutor);
        let sessions = Arc::new(SessionWorkerLifecycleManager::new(
            Arc::new(InMemorySessionWorkerRepository::default()),
            noop.clone(),
            noop,
            Arc::new(StubContainerRuntime::default()),
            900_000,
            86_400_000,
        ));
        CallbackHandler::new(
            Arc::new(InMemoryEventLog::default()),
            Arc::new(InMemoryTodoRepository::default()),
            Arc::new(InMemoryHumanLoopRepository::default()),
            Arc::new(InMemoryRunStateRepository::default()),
            orchestrator,
            sessions,
        )
    }

    fn event(event_id: &str, run_id: &str, kind: CallbackEventType, payload: serde_json::Value) -> CallbackEvent {
        CallbackEvent {
            event_id: event_id.to_string(),
            run_id: run_id.to_string(),
            kind,
            occurred_at: t(0),
            payload,
        }
    }

    // S4 / invariant 4
    #[tokio::test]
    async fn duplicate_event_is_ignored() {
        let handler = handler();
        let ev = event(
            "e1",
            "r1",
            CallbackEventType::TodoUpdate,
            serde_json::json!({"todoId": "t1", "content": "x", "status": "todo", "order": 0}),
        );
        let first = handler.handle(ev.clone(), t(0)).await;
        assert!(first.processed);
        let second = handler.handle(ev, t(1)).await;
        assert!(second.duplicate);
        assert_eq!(second.action, "duplicate_ignored");
    }

    #[tokio::test]
    async fn message_stop_without_run_context_is_missing_run() {
        let handler = handler();
        let ev = event("e1", "r-unknown", CallbackEventType::MessageStop, serde_json::json!({}));
        let outcome = handler.handle(ev, t(0)).await;
        assert_eq!(outcome.action, "missing_run");
    }

    // A run context pointing at a session worker the repository has never
    // seen reports `missing_run`, not a sync-failure action — a sync
    // failure itself comes back as `Ok` from `sync_session_workspace` and
    // is always reported as `message_stop_synced`.
    #[tokio::test]
    async fn message_stop_with_unknown_session_worker_is_missing_run() {
        use sa_providers::{ProviderAdapter, ProviderCapabilities, RunRequest};

        struct EmptyAdapter;
        #[async_trait::async_trait]
        impl ProviderAdapter for EmptyAdapter {
            async fn run(&self, _req: RunRequest) -> sa_domain::error::Result<Box<dyn sa_providers::Handle>> {
                struct EmptyHandle;
                #[async_trait::async_trait]
                impl sa_providers::Handle for EmptyHandle {
                    fn stream(&mut self) -> sa_domain::stream::BoxStream<'static, sa_domain::error::Result<sa_providers::ProviderChunk>> {
                        Box::pin(futures_util::stream::empty())
                    }
                    async fn stop(&self) {}
                }
                Ok(Box::new(EmptyHandle))
            }
            fn capabilities(&self) -> ProviderCapabilities {
                ProviderCapabilities {
                    resume: true,
                    human_loop: true,
                    todo_stream: true,
                    build_plan_mode: true,
                }
            }
            fn provider_id(&self) -> &str {
                "opencode"
            }
            async fn reply(&self, _run_id: &str, _question_id: &str, _answer: &str) -> sa_domain::error::Result<()> {
                Ok(())
            }
        }

        let mut adapters: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();
        adapters.insert(Provider::Opencode.as_str().to_string(), Arc::new(EmptyAdapter));
        let registry = Arc::new(ProviderRegistry::from_adapters(adapters));
        let bus = Arc::new(StreamBus::new(2000));
        let orchestrator = Arc::new(Orchestrator::new(registry, bus));
        orchestrator
            .start_run(
                super::StartRunInput {
                    run_id: "r1".to_string(),
                    session_id: "s-unknown".to_string(),
                    provider: Provider::Opencode,
                    model: "m".to_string(),
                    messages: vec![],
                    resume_session_id: None,
                    execution_profile: None,
                    tools: None,
                    provider_options: None,
                    require_human_loop: false,
                },
                t(0),
            )
            .await
            .unwrap();

        let noop = Arc::new(NoopExecutor);
        let sessions = Arc::new(SessionWorkerLifecycleManager::new(
            Arc::new(InMemorySessionWorkerRepository::default()),
            noop.clone(),
            noop,
            Arc::new(StubContainerRuntime::default()),
            900_000,
            86_400_000,
        ));
        let handler = CallbackHandler::new(
            Arc::new(InMemoryEventLog::default()),
            Arc::new(InMemoryTodoRepository::default()),
            Arc::new(InMemoryHumanLoopRepository::default()),
            Arc::new(InMemoryRunStateRepository::default()),
            orchestrator,
            sessions,
        );

        let ev = event("e1", "r1", CallbackEventType::MessageStop, serde_json::json!({}));
        let outcome = handler.handle(ev, t(1)).await;
        assert_eq!(outcome.action, "missing_run");
    }

    #[tokio::test]
    async fn run_finished_finalizes_usage_once() {
        let handler = handler();
        let usage = serde_json::json!({"prompt_tokens": 1, "completion_tokens": 2, "total_tokens": 3});
        let ev = event(
            "e1",
            "r1",
            CallbackEventType::RunFinished,
            serde_json::json!({"status": "succeeded", "usage": usage}),
        );
        let outcome = handler.handle(ev, t(0)).await;
        assert_eq!(outcome.action, "run_finalized");
        let state = handler.run_states.get("r1").await.unwrap();
        assert_eq!(state.status, RunStateStatus::Succeeded);
        assert!(state.usage.is_some());
    }
}
