pub mod item;
pub mod repository;

pub use item::{EnqueueOutcome, RetryOutcome, RunQueueItem, RunQueueStatus};
pub use repository::{InMemoryQueueRepository, QueueRepository};
