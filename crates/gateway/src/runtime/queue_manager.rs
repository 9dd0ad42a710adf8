//! Run Queue Manager (§4.5): drives `sa-queue`'s claim/lease loop, handing
//! each claimed item to the [`Orchestrator`] and translating the run's
//! terminal status back into the queue repository's success/retry/cancel
//! vocabulary. Mirrors the teacher's `runtime::schedule_runner` drive loop,
//! generalized from cron schedules to queued runs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sa_domain::error::Result;
use sa_domain::trace::TraceEvent;
use sa_domain::types::{Message, Provider};
use sa_queue::{QueueRepository, RunQueueItem, RunQueueStatus};

use super::orchestrator::{Orchestrator, RunStatus, StartRunInput};

/// The shape of a `RunQueueItem.payload` produced by `POST
/// /api/runs/queue/enqueue` (§6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueuedRunPayload {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub resume_session_id: Option<String>,
    #[serde(default)]
    pub execution_profile: Option<String>,
    #[serde(default)]
    pub tools: Option<serde_json::Value>,
    #[serde(default)]
    pub provider_options: Option<serde_json::Value>,
    #[serde(default)]
    pub require_human_loop: bool,
}

/// Counters accumulated across one `drainOnce` call (§4.5, §6 drain
/// response body, `TraceEvent::QueueDrainCompleted`).
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DrainOutcome {
    pub claimed: u32,
    pub succeeded: u32,
    pub retried: u32,
    pub failed: u32,
    pub canceled: u32,
}

pub struct QueueManager {
    queue: Arc<dyn QueueRepository>,
    orchestrator: Arc<Orchestrator>,
}

impl QueueManager {
    pub fn new(queue: Arc<dyn QueueRepository>, orchestrator: Arc<Orchestrator>) -> Self {
        Self { queue, orchestrator }
    }

    /// §4.5 `drainOnce`: claim up to `limit` eligible items and run each to
    /// completion sequentially, recording per-outcome counters.
    pub async fn drain_once(
        &self,
        owner: &str,
        now: DateTime<Utc>,
        limit: u32,
        lock_ms: u64,
        retry_delay_ms: u64,
    ) -> DrainOutcome {
        let mut outcome = DrainOutcome::default();
        for _ in 0..limit {
            let Some(item) = self.queue.claim_next(owner, now, lock_ms).await else {
                break;
            };
            outcome.claimed += 1;
            TraceEvent::QueueClaimed {
                run_id: item.run_id.clone(),
                owner: owner.to_string(),
                attempt: item.attempts,
            }
            .emit();

            self.process_claimed(item, now, retry_delay_ms, &mut outcome)
                .await;
        }

        TraceEvent::QueueDrainCompleted {
            claimed: outcome.claimed,
            succeeded: outcome.succeeded,
            retried: outcome.retried,
            failed: outcome.failed,
            canceled: outcome.canceled,
        }
        .emit();
        outcome
    }

    async fn process_claimed(
        &self,
        item: RunQueueItem,
        now: DateTime<Utc>,
        retry_delay_ms: u64,
        outcome: &mut DrainOutcome,
    ) {
        let payload: QueuedRunPayload = match serde_json::from_value(item.payload.clone()) {
            Ok(p) => p,
            Err(e) => {
                self.queue
                    .mark_retry_or_failed(&item.run_id, now, retry_delay_ms, format!("malformed payload: {e}"))
                    .await;
                outcome.failed += 1;
                return;
            }
        };

        let start = StartRunInput {
            run_id: item.run_id.clone(),
            session_id: item.session_id.clone(),
            provider: item.provider,
            model: payload.model,
            messages: payload.messages,
            resume_session_id: payload.resume_session_id,
            execution_profile: payload.execution_profile,
            tools: payload.tools,
            provider_options: payload.provider_options,
            require_human_loop: payload.require_human_loop,
        };

        match self.run_to_terminal(item.provider, start, now).await {
            Ok(RunStatus::Succeeded) => {
                self.queue.mark_succeeded(&item.run_id, Utc::now()).await;
                outcome.succeeded += 1;
            }
            Ok(RunStatus::Canceled) => {
                self.queue
                    .mark_canceled(&item.run_id, Utc::now(), Some("run canceled".into()))
                    .await;
                outcome.canceled += 1;
            }
            Ok(RunStatus::Blocked) => {
                self.queue
                    .mark_canceled(&item.run_id, Utc::now(), Some("run blocked by capability gating".into()))
                    .await;
                outcome.canceled += 1;
            }
            Ok(status) => {
                // Failed, or a non-terminal status the provider stream
                // exited without (both treated as retryable failures here).
                let retry = self
                    .queue
                    .mark_retry_or_failed(
                        &item.run_id,
                        Utc::now(),
                        retry_delay_ms,
                        format!("run ended with status {}", status.as_str()),
                    )
                    .await;
                match retry.map(|r| r.status) {
                    Some(RunQueueStatus::Failed) => outcome.failed += 1,
                    Some(_) => outcome.retried += 1,
                    None => outcome.failed += 1,
                }
            }
            Err(e) => {
                let retry = self
                    .queue
                    .mark_retry_or_failed(&item.run_id, Utc::now(), retry_delay_ms, e.to_string())
                    .await;
                match retry.map(|r| r.status) {
                    Some(RunQueueStatus::Failed) => outcome.failed += 1,
                    Some(_) => outcome.retried += 1,
                    None => outcome.failed += 1,
                }
            }
        }
    }

    async fn run_to_terminal(
        &self,
        _provider: Provider,
        start: StartRunInput,
        now: DateTime<Utc>,
    ) -> Result<RunStatus> {
        let run_id = start.run_id.clone();
        let started = self.orchestrator.start_run(start, now).await?;
        if !started.accepted {
            return Ok(RunStatus::Blocked);
        }
        self.orchestrator.stream_run(&run_id, Utc::now()).await?;
        Ok(self
            .orchestrator
            .context(&run_id)
            .map(|c| c.status)
            .unwrap_or(RunStatus::Failed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use sa_domain::stream::BoxStream;
    use sa_domain::types::{ProviderCapabilities, TerminalStatus};
    use sa_providers::{Handle, ProviderAdapter, ProviderChunk, ProviderRegistry, RunRequest};
    use sa_queue::InMemoryQueueRepository;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    fn payload() -> serde_json::Value {
        serde_json::json!({"model": "m", "messages": [{"role": "user", "content": "hi"}]})
    }

    /// Fails the first `fail_times` attempts, then succeeds (S1).
    struct FlakyAdapter {
        fail_times: u32,
        attempts: AtomicU32,
    }

    struct FlakyHandle {
        chunks: Vec<ProviderChunk>,
    }

    #[async_trait]
    impl Handle for FlakyHandle {
        fn stream(&mut self) -> BoxStream<'static, Result<ProviderChunk>> {
            let chunks = std::mem::take(&mut self.chunks);
            Box::pin(futures_util::stream::iter(chunks.into_iter().map(Ok)))
        }

        async fn stop(&self) {}
    }

    #[async_trait]
    impl ProviderAdapter for FlakyAdapter {
        async fn run(&self, _req: RunRequest) -> Result<Box<dyn Handle>> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_times {
                return Err(sa_domain::error::Error::ProviderFailure("transient".into()));
            }
            Ok(Box::new(FlakyHandle {
                chunks: vec![ProviderChunk::RunFinished {
                    status: TerminalStatus::Succeeded,
                    reason: None,
                    usage: None,
                }],
            }))
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
    }

    fn manager_with(fail_times: u32) -> (QueueManager, Arc<dyn QueueRepository>) {
        let mut adapters: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();
        adapters.insert(
            Provider::Opencode.as_str().to_string(),
            Arc::new(FlakyAdapter {
                fail_times,
                attempts: AtomicU32::new(0),
            }),
        );
        let registry = Arc::new(ProviderRegistry::from_adapters(adapters));
        let bus = Arc::new(sa_streambus::StreamBus::new(2000));
        let orchestrator = Arc::new(Orchestrator::new(registry, bus));
        let queue: Arc<dyn QueueRepository> = Arc::new(InMemoryQueueRepository::new());
        (QueueManager::new(queue.clone(), orchestrator), queue)
    }

    // S1: retry then succeed, driven end-to-end through drain_once.
    #[tokio::test]
    async fn drain_once_retries_then_succeeds() {
        let (manager, queue) = manager_with(1);
        queue
            .enqueue("r1", "s1", Provider::Opencode, 3, payload(), t(0))
            .await;

        let first = manager.drain_once("gateway", t(0), 10, 60_000, 1).await;
        assert_eq!(first.claimed, 1);
        assert_eq!(first.retried, 1);

        let item = queue.find_by_run_id("r1").await.unwrap();
        assert_eq!(item.status, RunQueueStatus::Queued);

        let second = manager.drain_once("gateway", t(100), 10, 60_000, 1).await;
        assert_eq!(second.claimed, 1);
        assert_eq!(second.succeeded, 1);

        let item2 = queue.find_by_run_id("r1").await.unwrap();
        assert_eq!(item2.status, RunQueueStatus::Succeeded);
    }

    #[tokio::test]
    async fn drain_once_stops_when_queue_is_empty() {
        let (manager, _queue) = manager_with(0);
        let outcome = manager.drain_once("gateway", t(0), 10, 60_000, 1).await;
        assert_eq!(outcome.claimed, 0);
    }

    #[tokio::test]
    async fn drain_once_fails_permanently_after_max_attempts() {
        let (manager, queue) = manager_with(5);
        queue
            .enqueue("r1", "s1", Provider::Opencode, 1, payload(), t(0))
            .await;
        let outcome = manager.drain_once("gateway", t(0), 10, 60_000, 1).await;
        assert_eq!(outcome.failed, 1);
        let item = queue.find_by_run_id("r1").await.unwrap();
        assert_eq!(item.status, RunQueueStatus::Failed);
    }
}
