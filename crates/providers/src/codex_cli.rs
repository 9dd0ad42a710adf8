use crate::http_agent::HttpAgentAdapter;
use crate::traits::{Handle, ProviderAdapter, RunRequest};
use async_trait::async_trait;
use sa_domain::config::ExecutorConfig;
use sa_domain::error::Result;
use sa_domain::types::ProviderCapabilities;

/// `codex-cli`: the narrowest adapter — no resume, no human-loop, no todo
/// stream, but supports build-plan mode.
pub struct CodexCliAdapter(HttpAgentAdapter);

impl CodexCliAdapter {
    pub fn from_config(cfg: &ExecutorConfig) -> Result<Self> {
        let capabilities = ProviderCapabilities {
            resume: false,
            human_loop: false,
            todo_stream: false,
            build_plan_mode: true,
        };
        Ok(Self(HttpAgentAdapter::new(
            "codex-cli",
            capabilities,
            cfg,
        )?))
    }
}

#[async_trait]
impl ProviderAdapter for CodexCliAdapter {
    async fn run(&self, req: RunRequest) -> Result<Box<dyn Handle>> {
        self.0.run(req).await
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.0.capabilities()
    }

    fn provider_id(&self) -> &str {
        self.0.provider_id()
    }
}
