//! `AppState` construction and background-task spawning extracted from
//! `main.rs`, mirroring the teacher's sequential-init-with-context +
//! one-`tokio::spawn`-per-job shape.

use std::sync::Arc;

use anyhow::Context;
use sha2::{Digest, Sha256};

use sa_callbacks::{InMemoryEventLog, InMemoryHumanLoopRepository, InMemoryRunStateRepository, InMemoryTodoRepository};
use sa_domain::config::{Config, ConfigSeverity, StorageBackend};
use sa_providers::ProviderRegistry;
use sa_queue::InMemoryQueueRepository;
use sa_sessions::{
    HttpExecutorClient, InMemorySessionWorkerRepository, SessionWorkerLifecycleManager,
    StubContainerRuntime,
};
use sa_streambus::StreamBus;

use crate::runtime::{CallbackHandler, Orchestrator, QueueManager, Reconciler};
use crate::state::AppState;

/// Validate config, initialize every subsystem and return a fully-wired
/// [`AppState`]. This is the shared "boot" path used by `serve` and tests.
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Storage backend ───────────────────────────────────────────────
    // Only the in-memory backend is implemented in this crate (§3 "Storage
    // Model"). A configured Postgres backend parses fine but has nowhere to
    // go yet, so fail fast instead of silently falling back to memory.
    match config.storage.backend {
        StorageBackend::Memory => {}
        StorageBackend::Postgres => {
            anyhow::bail!(
                "storage.backend = \"postgres\" is not implemented by this build; \
                 only \"memory\" is available"
            );
        }
    }
    tracing::info!(backend = ?config.storage.backend, "storage backend selected");

    // ── Provider registry ──────────────────────────────────────────────
    let providers = Arc::new(ProviderRegistry::from_config(&config.executor));
    for err in providers.init_errors() {
        tracing::warn!(
            provider = %err.provider_id,
            error = %err.error,
            "provider adapter failed to initialize"
        );
    }
    tracing::info!(count = providers.len(), "provider registry ready");

    // ── Queue ───────────────────────────────────────────────────────────
    let queue: Arc<dyn sa_queue::QueueRepository> = Arc::new(InMemoryQueueRepository::new());
    tracing::info!("run queue ready");

    // ── Stream Bus + Orchestrator ───────────────────────────────────────
    let bus = Arc::new(StreamBus::new(config.orchestrator.stream_capacity));
    let orchestrator = Arc::new(Orchestrator::new(providers.clone(), bus.clone()));
    tracing::info!(
        capacity = config.orchestrator.stream_capacity,
        "stream bus and orchestrator ready"
    );

    let queue_manager = Arc::new(QueueManager::new(queue.clone(), orchestrator.clone()));

    // ── Callback repositories ────────────────────────────────────────────
    let event_log: Arc<dyn sa_callbacks::EventLog> = Arc::new(InMemoryEventLog::default());
    let todos: Arc<dyn sa_callbacks::TodoRepository> = Arc::new(InMemoryTodoRepository::default());
    let human_loop: Arc<dyn sa_callbacks::HumanLoopRepository> =
        Arc::new(InMemoryHumanLoopRepository::default());
    let run_states: Arc<dyn sa_callbacks::RunStateRepository> =
        Arc::new(InMemoryRunStateRepository::default());
    tracing::info!("callback repositories ready");

    // ── Session workers ───────────────────────────────────────────────
    let executor_client = Arc::new(
        HttpExecutorClient::new(&config.executor)
            .context("building executor HTTP client")?,
    );
    let sessions = Arc::new(SessionWorkerLifecycleManager::new(
        Arc::new(InMemorySessionWorkerRepository::default()),
        executor_client.clone(),
        executor_client,
        Arc::new(StubContainerRuntime::default()),
        config.orchestrator.idle_timeout_ms as i64,
        config.orchestrator.remove_after_ms as i64,
    ));
    tracing::info!("session worker lifecycle manager ready");

    let callback_handler = Arc::new(CallbackHandler::new(
        event_log.clone(),
        todos.clone(),
        human_loop.clone(),
        run_states.clone(),
        orchestrator.clone(),
        sessions.clone(),
    ));

    // ── Reconciler ────────────────────────────────────────────────────
    let reconciler = Arc::new(Reconciler::new(
        queue.clone(),
        human_loop.clone(),
        run_states.clone(),
        sessions.clone(),
        config.reconciler.clone(),
    ));
    tracing::info!("reconciler ready");

    // ── Bearer token ──────────────────────────────────────────────────
    let api_token = config
        .server
        .api_token
        .clone()
        .or_else(|| std::env::var(&config.server.api_token_env).ok())
        .filter(|t| !t.is_empty());
    let api_token_hash = match &api_token {
        Some(token) => {
            tracing::info!(
                source = if config.server.api_token.is_some() {
                    "config"
                } else {
                    "env"
                },
                "api bearer token configured"
            );
            Some(Sha256::digest(token.as_bytes()).to_vec())
        }
        None => {
            tracing::warn!("AUTH DISABLED: no api token configured, every endpoint is open");
            None
        }
    };

    Ok(AppState {
        config,
        providers,
        queue,
        queue_manager,
        bus,
        orchestrator,
        event_log,
        todos,
        human_loop,
        run_states,
        callback_handler,
        sessions,
        reconciler,
        api_token_hash,
    })
}

/// Spawn the queue-drain and reconciler loops. Each runs on its own
/// `tokio::time::interval`, independent of the others, matching the
/// teacher's one-job-per-spawn shape.
pub fn spawn_background_tasks(state: &AppState) {
    // ── Queue drain loop ────────────────────────────────────────────────
    {
        let queue_manager = state.queue_manager.clone();
        let owner = state.config.queue.owner.clone();
        let limit = state.config.queue.drain_limit;
        let lock_ms = state.config.queue.lock_ms;
        let retry_delay_ms = state.config.queue.retry_delay_ms;
        let interval_ms = state.config.queue.drain_interval_ms;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
            loop {
                interval.tick().await;
                let outcome = queue_manager
                    .drain_once(&owner, chrono::Utc::now(), limit, lock_ms, retry_delay_ms)
                    .await;
                if outcome.claimed > 0 {
                    tracing::debug!(
                        claimed = outcome.claimed,
                        succeeded = outcome.succeeded,
                        failed = outcome.failed,
                        retried = outcome.retried,
                        "queue drain tick"
                    );
                }
            }
        });
    }

    // ── Reconciler loop ──────────────────────────────────────────────────
    {
        let reconciler = state.reconciler.clone();
        let interval_ms = state.config.reconciler.interval_ms;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
            loop {
                interval.tick().await;
                reconciler.tick(chrono::Utc::now()).await;
            }
        });
    }

    tracing::info!("background tasks spawned");
}
