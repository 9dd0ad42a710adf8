use chrono::{DateTime, Utc};
use sa_domain::stream::Usage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Todo,
    Doing,
    Done,
    Canceled,
}

/// §3 TodoItem: upsert, last-writer-wins by `updatedAt` within the same
/// logical event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub run_id: String,
    pub todo_id: String,
    pub content: String,
    pub status: TodoStatus,
    pub order: i64,
    pub updated_at: DateTime<Utc>,
}

/// §3 TodoEvent: append-only timeline, one per accepted `todo.update` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoEvent {
    pub event_id: String,
    pub run_id: String,
    pub todo_id: String,
    pub content: String,
    pub status: TodoStatus,
    pub order: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HumanLoopStatus {
    Pending,
    Resolved,
    Canceled,
}

/// §3 HumanLoopRequest: created on `human_loop.requested`, resolved only
/// within its originating `runId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanLoopRequest {
    pub question_id: String,
    pub run_id: String,
    pub session_id: String,
    pub prompt: String,
    pub metadata: serde_json::Value,
    pub status: HumanLoopStatus,
    pub requested_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStateStatus {
    Running,
    WaitingHuman,
    Succeeded,
    Failed,
    Canceled,
    Blocked,
}

impl RunStateStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStateStatus::Succeeded | RunStateStatus::Failed | RunStateStatus::Canceled
        )
    }
}

/// §3 RunState: usage is written only on the first run-terminal event that
/// carries it (first-writer-wins, §9 open question b).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub status: RunStateStatus,
    pub usage: Option<Usage>,
    pub finalized_at: Option<DateTime<Utc>>,
}

/// §3 CallbackEvent (logical): `type` discriminates dispatch in §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackEventType {
    MessageStop,
    TodoUpdate,
    HumanLoopRequested,
    HumanLoopResolved,
    RunFinished,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackEvent {
    pub event_id: String,
    pub run_id: String,
    #[serde(rename = "type")]
    pub kind: CallbackEventType,
    pub occurred_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}
