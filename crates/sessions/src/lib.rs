//! Session worker lifecycle: restore-plan derivation from a runtime
//! manifest, container bracketing, and the sync-before-destroy state
//! machine that governs activation, idle-stop, and removal sweeps.

pub mod container;
pub mod executor_client;
pub mod item;
pub mod lifecycle;
pub mod restore_plan;
pub mod store;

pub use container::{ContainerRuntime, StubContainerRuntime};
pub use executor_client::{
    ExecutorClient, HttpExecutorClient, TraceContext, ValidateWorkspaceResponse, WorkspaceSyncClient,
};
pub use item::{
    ActivateOutcome, SessionWorker, SessionWorkerState, SweepCounters, SyncReason, SyncStatus,
};
pub use lifecycle::{ActivateRequest, SessionWorkerLifecycleManager};
pub use restore_plan::{
    build_restore_plan, compute_workspace_s3_prefix, validate_required_paths, CleanupRule,
    ConflictPolicy, MountPoint, RestoreLayerEntry, RestorePlan, RuntimeManifest, SeedFile,
    ValidateRequiredPathsResult,
};
pub use store::{InMemorySessionWorkerRepository, SessionWorkerRepository};
