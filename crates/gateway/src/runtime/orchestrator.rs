//! Run Orchestrator (§4.3): per-run lifecycle state machine, translating a
//! provider [`Handle`]'s chunks into the normalized events the Stream Bus
//! fans out over SSE. Shaped after `sa-providers`'s adapters driving one
//! `BoxStream` to completion, generalized to own the run-level state machine
//! those adapters don't know about.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;

use sa_domain::error::{Error, Result};
use sa_domain::trace::TraceEvent;
use sa_domain::types::{Message, Provider, TerminalStatus};
use sa_providers::{Handle, ProviderChunk, ProviderRegistry, RunRequest};
use sa_streambus::StreamBus;

/// Normalized event carried on the Stream Bus and written to the SSE wire
/// (§4.3 "Event-type invariants", §6 SSE framing).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum RunEvent {
    #[serde(rename = "run.status")]
    RunStatus {
        run_id: String,
        provider: String,
        ts: DateTime<Utc>,
        status: String,
        detail: Option<String>,
    },
    #[serde(rename = "run.warning")]
    RunWarning {
        run_id: String,
        provider: String,
        ts: DateTime<Utc>,
        message: String,
    },
    #[serde(rename = "message.delta")]
    MessageDelta {
        run_id: String,
        provider: String,
        ts: DateTime<Utc>,
        text: String,
    },
    #[serde(rename = "todo.update")]
    TodoUpdate {
        run_id: String,
        provider: String,
        ts: DateTime<Utc>,
        todo_id: String,
        content: String,
        status: String,
        order: i64,
    },
}

impl RunEvent {
    /// The `event:` field written on the SSE wire (§6 SSE framing); matches
    /// the `#[serde(tag = "type")]` rename on each variant.
    pub fn type_name(&self) -> &'static str {
        match self {
            RunEvent::RunStatus { .. } => "run.status",
            RunEvent::RunWarning { .. } => "run.warning",
            RunEvent::MessageDelta { .. } => "message.delta",
            RunEvent::TodoUpdate { .. } => "todo.update",
        }
    }
}

/// §3 RunContext.
#[derive(Debug, Clone, Serialize)]
pub struct RunContext {
    pub run_id: String,
    pub session_id: String,
    pub provider: Provider,
    pub status: RunStatus,
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub streamed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    WaitingHuman,
    Succeeded,
    Failed,
    Canceled,
    Blocked,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::WaitingHuman => "waiting_human",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Canceled => "canceled",
            RunStatus::Blocked => "blocked",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Canceled
        )
    }
}

/// Input to [`Orchestrator::start_run`] (§6 `POST /api/runs/start` body).
#[derive(Debug, Clone)]
pub struct StartRunInput {
    pub run_id: String,
    pub session_id: String,
    pub provider: Provider,
    pub model: String,
    pub messages: Vec<Message>,
    pub resume_session_id: Option<String>,
    pub execution_profile: Option<String>,
    pub tools: Option<serde_json::Value>,
    pub provider_options: Option<serde_json::Value>,
    pub require_human_loop: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartRunOutcome {
    pub accepted: bool,
    pub run_id: String,
    pub warnings: Vec<String>,
    pub reason: Option<String>,
}

/// A run's live provider handle, kept reachable from both `stream_run`
/// (which calls `.stream()` once) and `stop_run` (which may call `.stop()`
/// concurrently while a stream is being pumped).
type SharedHandle = Arc<AsyncMutex<Box<dyn Handle>>>;

pub struct Orchestrator {
    providers: Arc<ProviderRegistry>,
    bus: Arc<StreamBus<RunEvent>>,
    contexts: RwLock<HashMap<String, RunContext>>,
    handles: Mutex<HashMap<String, SharedHandle>>,
    /// `runId -> sessionId` bindings recorded ahead of `startRun` (§6 `POST
    /// /api/runs/:runId/bind`), for callers that need to correlate a run with
    /// its session before the run itself exists.
    session_bindings: RwLock<HashMap<String, String>>,
}

impl Orchestrator {
    pub fn new(providers: Arc<ProviderRegistry>, bus: Arc<StreamBus<RunEvent>>) -> Self {
        Self {
            providers,
            bus,
            contexts: RwLock::new(HashMap::new()),
            handles: Mutex::new(HashMap::new()),
            session_bindings: RwLock::new(HashMap::new()),
        }
    }

    pub fn context(&self, run_id: &str) -> Option<RunContext> {
        self.contexts.read().get(run_id).cloned()
    }

    /// §6 `POST /api/runs/:runId/bind`. Independent of `startRun` so a
    /// caller can register the mapping early (e.g. right after queuing) and
    /// have it available to anything that only knows the `runId`.
    pub fn bind_session(&self, run_id: &str, session_id: &str) {
        self.session_bindings
            .write()
            .insert(run_id.to_string(), session_id.to_string());
    }

    /// Resolves a run's session id, preferring the live `RunContext` and
    /// falling back to an explicit `bind_session` registration.
    pub fn session_id_for(&self, run_id: &str) -> Option<String> {
        if let Some(ctx) = self.contexts.read().get(run_id) {
            return Some(ctx.session_id.clone());
        }
        self.session_bindings.read().get(run_id).cloned()
    }

    /// §4.3 `startRun`. Capability gating happens here, before any provider
    /// call: a `blocked` run never acquires a `Handle`.
    pub async fn start_run(&self, input: StartRunInput, now: DateTime<Utc>) -> Result<StartRunOutcome> {
        let adapter = self.providers.get(input.provider).ok_or_else(|| {
            Error::Validation(format!("provider \"{}\" is not available", input.provider))
        })?;
        let caps = adapter.capabilities();

        if input.require_human_loop && !caps.human_loop {
            let reason = "provider does not support human-loop".to_string();
            self.contexts.write().insert(
                input.run_id.clone(),
                RunContext {
                    run_id: input.run_id.clone(),
                    session_id: input.session_id.clone(),
                    provider: input.provider,
                    status: RunStatus::Blocked,
                    warnings: vec![],
                    started_at: now,
                    ended_at: Some(now),
                    reason: Some(reason.clone()),
                    streamed: false,
                },
            );
            TraceEvent::RunBlocked {
                run_id: input.run_id.clone(),
                reason: reason.clone(),
            }
            .emit();
            return Ok(StartRunOutcome {
                accepted: false,
                run_id: input.run_id,
                warnings: vec![],
                reason: Some(reason),
            });
        }

        let mut warnings = Vec::new();
        let mut resume_session_id = input.resume_session_id.clone();
        if resume_session_id.is_some() && !caps.resume {
            warnings.push(
                "provider does not support resume; falling back to new session".to_string(),
            );
            resume_session_id = None;
        }

        let req = RunRequest {
            run_id: input.run_id.clone(),
            model: input.model,
            messages: input.messages,
            resume_session_id: resume_session_id.clone(),
            execution_profile: input.execution_profile,
            tools: input.tools,
            provider_options: input.provider_options,
        };
        let handle = adapter.run(req).await?;
        self.handles
            .lock()
            .insert(input.run_id.clone(), Arc::new(AsyncMutex::new(handle)));

        self.contexts.write().insert(
            input.run_id.clone(),
            RunContext {
                run_id: input.run_id.clone(),
                session_id: input.session_id,
                provider: input.provider,
                status: RunStatus::Running,
                warnings: warnings.clone(),
                started_at: now,
                ended_at: None,
                reason: None,
                streamed: false,
            },
        );
        TraceEvent::RunStarted {
            run_id: input.run_id.clone(),
            provider: input.provider.to_string(),
            resume_session_id,
        }
        .emit();

        Ok(StartRunOutcome {
            accepted: true,
            run_id: input.run_id,
            warnings,
            reason: None,
        })
    }

    /// §4.3 `streamRun`: single-consumer, drains the provider handle to
    /// completion, publishing every normalized event to the Stream Bus and
    /// returning the same sequence (used for the JSON, non-SSE response
    /// branch of `POST /api/runs/start`).
    pub async fn stream_run(&self, run_id: &str, now: DateTime<Utc>) -> Result<Vec<RunEvent>> {
        let provider_str = {
            let mut contexts = self.contexts.write();
            let ctx = contexts
                .get_mut(run_id)
                .ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
            if ctx.streamed {
                return Err(Error::Conflict("run stream already consumed".into()));
            }
            ctx.streamed = true;
            ctx.provider.to_string()
        };

        let mut events = Vec::new();
        let started = RunEvent::RunStatus {
            run_id: run_id.to_string(),
            provider: provider_str.clone(),
            ts: now,
            status: "started".into(),
            detail: None,
        };
        self.bus.publish(run_id, started.clone());
        events.push(started);

        let warnings = self
            .contexts
            .read()
            .get(run_id)
            .map(|c| c.warnings.clone())
            .unwrap_or_default();
        for message in warnings {
            let ev = RunEvent::RunWarning {
                run_id: run_id.to_string(),
                provider: provider_str.clone(),
                ts: Utc::now(),
                message,
            };
            self.bus.publish(run_id, ev.clone());
            events.push(ev);
        }

        let shared_handle = self
            .handles
            .lock()
            .get(run_id)
            .cloned()
            .ok_or_else(|| Error::Internal(format!("no provider handle for run {run_id}")))?;
        let mut stream = {
            let mut handle = shared_handle.lock().await;
            handle.stream()
        };

        let mut terminal: Option<(TerminalStatus, Option<String>)> = None;
        loop {
            match stream.next().await {
                Some(Ok(ProviderChunk::MessageDelta { text })) => {
                    let ev = RunEvent::MessageDelta {
                        run_id: run_id.to_string(),
                        provider: provider_str.clone(),
                        ts: Utc::now(),
                        text,
                    };
                    self.bus.publish(run_id, ev.clone());
                    events.push(ev);
                }
                Some(Ok(ProviderChunk::TodoUpdate {
                    todo_id,
                    content,
                    status,
                    order,
                })) => {
                    let ev = RunEvent::TodoUpdate {
                        run_id: run_id.to_string(),
                        provider: provider_str.clone(),
                        ts: Utc::now(),
                        todo_id,
                        content,
                        status,
                        order,
                    };
                    self.bus.publish(run_id, ev.clone());
                    events.push(ev);
                }
                Some(Ok(ProviderChunk::RunFinished { status, reason, .. })) => {
                    terminal = Some((status, reason.clone()));
                    let detail = match &reason {
                        Some(r) => format!("{}: {}", status.as_str(), r),
                        None => status.as_str().to_string(),
                    };
                    let ev = RunEvent::RunStatus {
                        run_id: run_id.to_string(),
                        provider: provider_str.clone(),
                        ts: Utc::now(),
                        status: "finished".into(),
                        detail: Some(detail),
                    };
                    self.bus.publish(run_id, ev.clone());
                    events.push(ev);
                    break;
                }
                Some(Err(e)) => {
                    let detail = e.to_string();
                    let ev = RunEvent::RunStatus {
                        run_id: run_id.to_string(),
                        provider: provider_str.clone(),
                        ts: Utc::now(),
                        status: "failed".into(),
                        detail: Some(detail.clone()),
                    };
                    self.bus.publish(run_id, ev.clone());
                    events.push(ev);
                    self.finish(run_id, RunStatus::Failed, Some(detail.clone()));
                    self.bus.close(run_id);
                    self.handles.lock().remove(run_id);
                    return Ok(events);
                }
                None => break,
            }
        }

        let (status, reason) = match terminal {
            Some((TerminalStatus::Succeeded, reason)) => (RunStatus::Succeeded, reason),
            Some((TerminalStatus::Failed, reason)) => (RunStatus::Failed, reason),
            Some((TerminalStatus::Canceled, reason)) => (RunStatus::Canceled, reason),
            None => (
                RunStatus::Failed,
                Some("provider stream closed without terminal event".to_string()),
            ),
        };
        self.finish(run_id, status, reason.clone());
        TraceEvent::RunTerminal {
            run_id: run_id.to_string(),
            status: status.as_str().to_string(),
            reason,
        }
        .emit();
        self.bus.close(run_id);
        self.handles.lock().remove(run_id);
        Ok(events)
    }

    /// Idempotent: a run is only finalized once. If `streamRun`'s terminal
    /// write and `stopRun`'s write race, whichever observes `status ==
    /// Running` first wins and the other becomes a no-op — the Stream Bus
    /// stays single-writer per stream (only the winner's caller publishes
    /// the terminal event).
    fn finish(&self, run_id: &str, status: RunStatus, reason: Option<String>) -> bool {
        let mut contexts = self.contexts.write();
        match contexts.get_mut(run_id) {
            Some(ctx) if ctx.status == RunStatus::Running => {
                ctx.status = status;
                ctx.ended_at = Some(Utc::now());
                ctx.reason = reason;
                true
            }
            _ => false,
        }
    }

    /// §4.3 `stopRun`. Only flips `RunContext.status` (via the same
    /// CAS-guarded `finish` that `streamRun` uses) and cancels the provider
    /// handle; it does not itself publish to the Stream Bus, close the
    /// stream, or remove the handle. An in-flight `streamRun` pump is the
    /// sole writer of the terminal bus event — it observes the canceled
    /// handle as a synthesized terminal chunk (or its stream simply ending)
    /// and finalizes from there, so the run is never finalized twice.
    pub async fn stop_run(&self, run_id: &str, _now: DateTime<Utc>) -> Result<bool> {
        if !self.finish(run_id, RunStatus::Canceled, Some("stopped by caller".into())) {
            return Ok(false);
        }

        let shared_handle = self.handles.lock().get(run_id).cloned();
        if let Some(handle) = shared_handle {
            handle.lock().await.stop().await;
        }

        Ok(true)
    }

    /// §4.3 `replyHumanLoop`: only valid while `running`, requires the
    /// `humanLoop` capability.
    pub async fn reply_human_loop(&self, run_id: &str, question_id: &str, answer: &str) -> Result<()> {
        let ctx = self
            .contexts
            .read()
            .get(run_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
        if ctx.status != RunStatus::Running {
            return Err(Error::Conflict(format!(
                "run {run_id} is not running (status={})",
                ctx.status.as_str()
            )));
        }
        let adapter = self
            .providers
            .get(ctx.provider)
            .ok_or_else(|| Error::Internal(format!("provider \"{}\" missing from registry", ctx.provider)))?;
        if !adapter.capabilities().human_loop {
            return Err(Error::Validation(
                "provider does not support human-loop reply".into(),
            ));
        }
        adapter.reply(run_id, question_id, answer).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use sa_domain::types::{ProviderCapabilities, Role};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    /// Scripted in-process adapter standing in for an `HttpAgentAdapter` so
    /// orchestrator tests never touch the network.
    struct FakeAdapter {
        capabilities: ProviderCapabilities,
        chunks: Vec<ProviderChunk>,
        stopped: Arc<AtomicBool>,
    }

    struct FakeHandle {
        chunks: Mutex<Vec<ProviderChunk>>,
        stopped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Handle for FakeHandle {
        fn stream(&mut self) -> sa_domain::stream::BoxStream<'static, Result<ProviderChunk>> {
            let chunks = std::mem::take(&mut *self.chunks.lock());
            Box::pin(futures_util::stream::iter(chunks.into_iter().map(Ok)))
        }

        async fn stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl sa_providers::ProviderAdapter for FakeAdapter {
        async fn run(&self, _req: RunRequest) -> Result<Box<dyn Handle>> {
            Ok(Box::new(FakeHandle {
                chunks: Mutex::new(self.chunks.clone()),
                stopped: self.stopped.clone(),
            }))
        }

        fn capabilities(&self) -> ProviderCapabilities {
            self.capabilities
        }

        fn provider_id(&self) -> &str {
            "opencode"
        }
    }

    fn registry_with(provider: Provider, capabilities: ProviderCapabilities, chunks: Vec<ProviderChunk>) -> Arc<ProviderRegistry> {
        let mut adapters: HashMap<String, Arc<dyn sa_providers::ProviderAdapter>> = HashMap::new();
        adapters.insert(
            provider.as_str().to_string(),
            Arc::new(FakeAdapter {
                capabilities,
                chunks,
                stopped: Arc::new(AtomicBool::new(false)),
            }),
        );
        Arc::new(ProviderRegistry::from_adapters(adapters))
    }

    fn input(run_id: &str, provider: Provider, require_human_loop: bool) -> StartRunInput {
        StartRunInput {
            run_id: run_id.to_string(),
            session_id: "s1".to_string(),
            provider,
            model: "m".to_string(),
            messages: vec![Message {
                role: Role::User,
                content: "hi".to_string(),
            }],
            resume_session_id: None,
            execution_profile: None,
            tools: None,
            provider_options: None,
            require_human_loop,
        }
    }

    fn full_capabilities() -> ProviderCapabilities {
        ProviderCapabilities {
            resume: true,
            human_loop: true,
            todo_stream: true,
            build_plan_mode: true,
        }
    }

    #[tokio::test]
    async fn start_run_blocks_when_human_loop_unsupported() {
        let registry = registry_with(
            Provider::CodexCli,
            ProviderCapabilities {
                human_loop: false,
                ..full_capabilities()
            },
            vec![],
        );
        let bus = Arc::new(StreamBus::new(2000));
        let orchestrator = Orchestrator::new(registry, bus);

        let req = input("r1", Provider::CodexCli, true);
        let outcome = orchestrator.start_run(req, t(0)).await.unwrap();
        assert!(!outcome.accepted);
        assert_eq!(
            orchestrator.context("r1").unwrap().status,
            RunStatus::Blocked
        );
    }

    #[tokio::test]
    async fn stream_run_emits_ordered_events_and_rejects_second_call() {
        let chunks = vec![
            ProviderChunk::MessageDelta {
                text: "hello".into(),
            },
            ProviderChunk::RunFinished {
                status: TerminalStatus::Succeeded,
                reason: None,
                usage: None,
            },
        ];
        let registry = registry_with(Provider::Opencode, full_capabilities(), chunks);
        let bus = Arc::new(StreamBus::new(2000));
        let orchestrator = Orchestrator::new(registry, bus);

        orchestrator
            .start_run(input("r1", Provider::Opencode, false), t(0))
            .await
            .unwrap();
        let events = orchestrator.stream_run("r1", t(1)).await.unwrap();
        assert!(matches!(events[0], RunEvent::RunStatus { ref status, .. } if status == "started"));
        assert!(matches!(events[1], RunEvent::MessageDelta { .. }));
        assert!(matches!(events[2], RunEvent::RunStatus { ref status, .. } if status == "finished"));
        assert_eq!(
            orchestrator.context("r1").unwrap().status,
            RunStatus::Succeeded
        );

        let second = orchestrator.stream_run("r1", t(2)).await;
        assert!(matches!(second, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn bind_session_is_overridden_once_context_exists() {
        let registry = registry_with(Provider::Opencode, full_capabilities(), vec![]);
        let bus = Arc::new(StreamBus::new(2000));
        let orchestrator = Orchestrator::new(registry, bus);

        orchestrator.bind_session("r1", "bound-session");
        assert_eq!(orchestrator.session_id_for("r1").as_deref(), Some("bound-session"));

        orchestrator
            .start_run(input("r1", Provider::Opencode, false), t(0))
            .await
            .unwrap();
        assert_eq!(orchestrator.session_id_for("r1").as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn stop_run_returns_false_when_not_running() {
        let registry = registry_with(Provider::Opencode, full_capabilities(), vec![]);
        let bus = Arc::new(StreamBus::new(2000));
        let orchestrator = Orchestrator::new(registry, bus);
        assert!(!orchestrator.stop_run("missing", t(0)).await.unwrap());
    }

    #[tokio::test]
    async fn stop_run_invokes_handle_stop_while_running() {
        let stopped = Arc::new(AtomicBool::new(false));
        let mut adapters: HashMap<String, Arc<dyn sa_providers::ProviderAdapter>> = HashMap::new();
        adapters.insert(
            Provider::Opencode.as_str().to_string(),
            Arc::new(FakeAdapter {
                capabilities: full_capabilities(),
                chunks: vec![],
                stopped: stopped.clone(),
            }),
        );
        let registry = Arc::new(ProviderRegistry::from_adapters(adapters));
        let bus = Arc::new(StreamBus::new(2000));
        let orchestrator = Orchestrator::new(registry, bus);

        orchestrator
            .start_run(input("r1", Provider::Opencode, false), t(0))
            .await
            .unwrap();
        assert!(orchestrator.stop_run("r1", t(1)).await.unwrap());
        assert!(stopped.load(Ordering::SeqCst));
        assert_eq!(
            orchestrator.context("r1").unwrap().status,
            RunStatus::Canceled
        );
    }
}
