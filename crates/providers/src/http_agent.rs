//! Shared HTTP plumbing for the three concrete provider adapters.
//!
//! Each provider (`claude-code`, `opencode`, `codex-cli`) is an agent hosted
//! behind the same executor process, reachable at
//! `{executor.base_url}/agents/{provider_id}/...` (§4.2, §6 executor wire
//! contract). Only the capability literal and provider id differ per vendor;
//! [`claude_code`], [`opencode`], and [`codex_cli`] each construct one of
//! these with their own values, mirroring how the teacher's vendor adapters
//! (`anthropic.rs`, `openai_compat.rs`) share `sse.rs`/`util.rs` but keep
//! their own `struct`.

use crate::sse::sse_response_stream;
use crate::traits::{Handle, ProviderAdapter, ProviderChunk, RunRequest};
use crate::util::from_reqwest;
use async_trait::async_trait;
use sa_domain::config::ExecutorConfig;
use sa_domain::error::{Error, Result};
use sa_domain::stream::BoxStream;
use sa_domain::types::ProviderCapabilities;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub(crate) struct HttpAgentAdapter {
    provider_id: &'static str,
    capabilities: ProviderCapabilities,
    base_url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl HttpAgentAdapter {
    pub(crate) fn new(
        provider_id: &'static str,
        capabilities: ProviderCapabilities,
        cfg: &ExecutorConfig,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| from_reqwest(e, "client_build"))?;
        Ok(Self {
            provider_id,
            capabilities,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            auth_token: cfg.auth_token.clone(),
            client,
        })
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(tok) => builder.bearer_auth(tok),
            None => builder,
        }
    }

    fn run_url(&self) -> String {
        format!("{}/agents/{}/run", self.base_url, self.provider_id)
    }

    fn stop_url(&self, run_id: &str) -> String {
        format!(
            "{}/agents/{}/runs/{}/stop",
            self.base_url, self.provider_id, run_id
        )
    }

    fn reply_url(&self, run_id: &str) -> String {
        format!(
            "{}/agents/{}/runs/{}/reply",
            self.base_url, self.provider_id, run_id
        )
    }
}

fn request_body(req: &RunRequest) -> serde_json::Value {
    serde_json::json!({
        "runId": req.run_id,
        "model": req.model,
        "messages": req.messages,
        "resumeSessionId": req.resume_session_id,
        "executionProfile": req.execution_profile,
        "tools": req.tools,
        "providerOptions": req.provider_options,
    })
}

fn parse_chunk_line(data: &str) -> Vec<Result<ProviderChunk>> {
    match serde_json::from_str::<ProviderChunk>(data) {
        Ok(chunk) => vec![Ok(chunk)],
        Err(e) => vec![Err(Error::Json(e))],
    }
}

struct HttpHandle {
    client: reqwest::Client,
    stop_url: String,
    auth_token: Option<String>,
    path: String,
    response: Option<reqwest::Response>,
    stop_flag: Arc<AtomicBool>,
}

#[async_trait]
impl Handle for HttpHandle {
    fn stream(&mut self) -> BoxStream<'static, Result<ProviderChunk>> {
        let response = self
            .response
            .take()
            .expect("Handle::stream called more than once");
        sse_response_stream(response, self.path.clone(), self.stop_flag.clone(), parse_chunk_line)
    }

    async fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        let mut builder = self.client.post(&self.stop_url);
        if let Some(tok) = &self.auth_token {
            builder = builder.bearer_auth(tok);
        }
        if let Err(e) = builder.send().await {
            tracing::warn!(url = %self.stop_url, error = %e, "agent stop request failed");
        }
    }
}

#[async_trait]
impl ProviderAdapter for HttpAgentAdapter {
    async fn run(&self, req: RunRequest) -> Result<Box<dyn Handle>> {
        let url = self.run_url();
        let body = request_body(&req);
        tracing::debug!(provider = %self.provider_id, url = %url, run_id = %req.run_id, "agent run request");

        let response = self
            .authed(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| from_reqwest(e, &url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UpstreamHttp {
                status: status.as_u16(),
                body,
                attempt: 1,
                path: url,
            });
        }

        Ok(Box::new(HttpHandle {
            client: self.client.clone(),
            stop_url: self.stop_url(&req.run_id),
            auth_token: self.auth_token.clone(),
            path: url,
            response: Some(response),
            stop_flag: Arc::new(AtomicBool::new(false)),
        }))
    }

    async fn reply(&self, run_id: &str, question_id: &str, answer: &str) -> Result<()> {
        if !self.capabilities.human_loop {
            return Err(Error::Validation(format!(
                "provider '{}' does not support human-loop reply",
                self.provider_id
            )));
        }
        let url = self.reply_url(run_id);
        let body = serde_json::json!({ "questionId": question_id, "answer": answer });
        let response = self
            .authed(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| from_reqwest(e, &url))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UpstreamHttp {
                status: status.as_u16(),
                body,
                attempt: 1,
                path: url,
            });
        }
        Ok(())
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.capabilities
    }

    fn provider_id(&self) -> &str {
        self.provider_id
    }
}
