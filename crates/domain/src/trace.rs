use serde::Serialize;

/// Structured trace events emitted across every control-plane crate.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    RunStarted {
        run_id: String,
        provider: String,
        resume_session_id: Option<String>,
    },
    RunTerminal {
        run_id: String,
        status: String,
        reason: Option<String>,
    },
    RunBlocked {
        run_id: String,
        reason: String,
    },
    QueueEnqueued {
        run_id: String,
        accepted: bool,
    },
    QueueClaimed {
        run_id: String,
        owner: String,
        attempt: u32,
    },
    QueueLeaseExpired {
        run_id: String,
        owner: String,
    },
    QueueDrainCompleted {
        claimed: u32,
        succeeded: u32,
        retried: u32,
        failed: u32,
        canceled: u32,
    },
    CallbackAccepted {
        event_id: String,
        run_id: String,
        kind: String,
    },
    CallbackDuplicate {
        event_id: String,
    },
    SyncStarted {
        session_id: String,
        reason: String,
    },
    SyncFinished {
        session_id: String,
        reason: String,
        success: bool,
    },
    WorkerStateTransition {
        session_id: String,
        from: String,
        to: String,
    },
    ReconcileSweepBounded {
        job: String,
        limit: u32,
        returned: u32,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "cp_event");
    }
}
