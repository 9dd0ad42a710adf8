pub mod callback_handler;
pub mod orchestrator;
pub mod queue_manager;
pub mod reconciler;

pub use callback_handler::CallbackHandler;
pub use orchestrator::{Orchestrator, RunContext, RunEvent, RunStatus, StartRunInput, StartRunOutcome};
pub use queue_manager::{DrainOutcome, QueueManager};
pub use reconciler::Reconciler;
