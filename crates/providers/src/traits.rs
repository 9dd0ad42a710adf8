use async_trait::async_trait;
use sa_domain::error::Result;
use sa_domain::stream::{BoxStream, Usage};
use sa_domain::types::{Message, ProviderCapabilities, TerminalStatus};
use serde::{Deserialize, Serialize};

/// A single chunk yielded by a running provider adapter (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderChunk {
    #[serde(rename = "message.delta")]
    MessageDelta { text: String },
    #[serde(rename = "todo.update")]
    TodoUpdate {
        todo_id: String,
        content: String,
        status: String,
        order: i64,
    },
    #[serde(rename = "run.finished")]
    RunFinished {
        status: TerminalStatus,
        reason: Option<String>,
        usage: Option<Usage>,
    },
}

/// Input to [`ProviderAdapter::run`].
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub run_id: String,
    pub model: String,
    pub messages: Vec<Message>,
    pub resume_session_id: Option<String>,
    pub execution_profile: Option<String>,
    pub tools: Option<serde_json::Value>,
    pub provider_options: Option<serde_json::Value>,
}

/// A live, in-flight provider invocation. `stream()` is consumed by the
/// Orchestrator exactly once (§4.3 `streamRun` single-consumer rule lives
/// one layer up; this handle itself has no such restriction).
#[async_trait]
pub trait Handle: Send + Sync {
    fn stream(&mut self) -> BoxStream<'static, Result<ProviderChunk>>;
    async fn stop(&self);
}

/// Trait every agent provider adapter implements (§4.2).
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn run(&self, req: RunRequest) -> Result<Box<dyn Handle>>;

    /// Forward an answer for a pending human-loop question. Only meaningful
    /// when `capabilities().human_loop` is `true`; adapters without the
    /// capability return `Error::Validation`.
    async fn reply(&self, run_id: &str, question_id: &str, answer: &str) -> Result<()> {
        let _ = (run_id, question_id, answer);
        Err(sa_domain::error::Error::Validation(
            "provider does not support human-loop reply".into(),
        ))
    }

    fn capabilities(&self) -> ProviderCapabilities;

    fn provider_id(&self) -> &str;
}
