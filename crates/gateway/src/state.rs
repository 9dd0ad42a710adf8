use std::sync::Arc;

use sa_callbacks::{EventLog, HumanLoopRepository, RunStateRepository, TodoRepository};
use sa_domain::config::Config;
use sa_providers::ProviderRegistry;
use sa_queue::QueueRepository;
use sa_sessions::SessionWorkerLifecycleManager;
use sa_streambus::StreamBus;

use crate::runtime::{CallbackHandler, Orchestrator, QueueManager, Reconciler, RunEvent};

/// Shared application state passed to every API handler.
///
/// Fields are grouped by concern:
/// - **Core** — config, provider registry
/// - **Queue** — the queue repository and the manager driving it
/// - **Runs** — the Stream Bus and the Orchestrator that publishes to it
/// - **Callbacks** — the narrow repository set + the handler dispatching over them
/// - **Sessions** — the worker lifecycle manager and the reconciler sweeping it
/// - **Security** — the bearer-token hash computed once at startup
#[derive(Clone)]
pub struct AppState {
    // ── Core ──────────────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub providers: Arc<ProviderRegistry>,

    // ── Queue ─────────────────────────────────────────────────────────
    pub queue: Arc<dyn QueueRepository>,
    pub queue_manager: Arc<QueueManager>,

    // ── Runs ──────────────────────────────────────────────────────────
    pub bus: Arc<StreamBus<RunEvent>>,
    pub orchestrator: Arc<Orchestrator>,

    // ── Callbacks ─────────────────────────────────────────────────────
    pub event_log: Arc<dyn EventLog>,
    pub todos: Arc<dyn TodoRepository>,
    pub human_loop: Arc<dyn HumanLoopRepository>,
    pub run_states: Arc<dyn RunStateRepository>,
    pub callback_handler: Arc<CallbackHandler>,

    // ── Sessions ──────────────────────────────────────────────────────
    pub sessions: Arc<SessionWorkerLifecycleManager>,
    pub reconciler: Arc<Reconciler>,

    // ── Security (startup-computed) ──────────────────────────────────
    /// SHA-256 hash of the API bearer token (read once at startup).
    /// `None` = dev mode (no auth enforced).
    pub api_token_hash: Option<Vec<u8>>,
}
