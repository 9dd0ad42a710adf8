use chrono::{DateTime, Utc};

/// A single retained event in a stream's ordered log (§3 StreamEntry).
/// `seq` is strictly monotonically increasing per streamId starting at 1.
#[derive(Debug, Clone)]
pub struct StreamEntry<E> {
    pub seq: u64,
    pub event: E,
    pub ts: DateTime<Utc>,
}
