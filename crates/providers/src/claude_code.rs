use crate::http_agent::HttpAgentAdapter;
use crate::traits::{Handle, ProviderAdapter, RunRequest};
use async_trait::async_trait;
use sa_domain::config::ExecutorConfig;
use sa_domain::error::Result;
use sa_domain::types::ProviderCapabilities;

/// `claude-code`: the fullest-featured agent, supports resume, human-loop
/// replies, a live todo stream, and build-plan mode.
pub struct ClaudeCodeAdapter(HttpAgentAdapter);

impl ClaudeCodeAdapter {
    pub fn from_config(cfg: &ExecutorConfig) -> Result<Self> {
        let capabilities = ProviderCapabilities {
            resume: true,
            human_loop: true,
            todo_stream: true,
            build_plan_mode: true,
        };
        Ok(Self(HttpAgentAdapter::new(
            "claude-code",
            capabilities,
            cfg,
        )?))
    }
}

#[async_trait]
impl ProviderAdapter for ClaudeCodeAdapter {
    async fn run(&self, req: RunRequest) -> Result<Box<dyn Handle>> {
        self.0.run(req).await
    }

    async fn reply(&self, run_id: &str, question_id: &str, answer: &str) -> Result<()> {
        self.0.reply(run_id, question_id, answer).await
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.0.capabilities()
    }

    fn provider_id(&self) -> &str {
        self.0.provider_id()
    }
}
