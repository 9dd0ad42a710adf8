use crate::http_agent::HttpAgentAdapter;
use crate::traits::{Handle, ProviderAdapter, RunRequest};
use async_trait::async_trait;
use sa_domain::config::ExecutorConfig;
use sa_domain::error::Result;
use sa_domain::types::ProviderCapabilities;

/// `opencode`: supports resume and a todo stream, but no human-loop and no
/// build-plan mode.
pub struct OpencodeAdapter(HttpAgentAdapter);

impl OpencodeAdapter {
    pub fn from_config(cfg: &ExecutorConfig) -> Result<Self> {
        let capabilities = ProviderCapabilities {
            resume: true,
            human_loop: false,
            todo_stream: true,
            build_plan_mode: false,
        };
        Ok(Self(HttpAgentAdapter::new("opencode", capabilities, cfg)?))
    }
}

#[async_trait]
impl ProviderAdapter for OpencodeAdapter {
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
