//! Executor HTTP client (§4.8, §6 executor wire contract, §6 trace headers).
//!
//! Two narrow collaborator traits so the Lifecycle Manager can be tested
//! without a live executor: [`ExecutorClient`] (restore/link/validate) and
//! [`WorkspaceSyncClient`] (the sync call invoked before every destructive
//! transition). [`HttpExecutorClient`] implements both against one
//! `reqwest::Client`, retrying per `ExecutorConfig`'s policy the same way
//! `sa-providers`'s adapters retry upstream calls.

use crate::item::SyncReason;
use crate::restore_plan::RestorePlan;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sa_domain::config::ExecutorConfig;
use sa_domain::error::Error;
use sa_domain::error::Result;
use serde::Deserialize;

/// §6 "Trace headers (propagated to executor/sync)".
#[derive(Debug, Clone)]
pub struct TraceContext {
    pub trace_id: String,
    pub trace_session_id: String,
    pub trace_executor_id: String,
    pub trace_operation: String,
    pub trace_ts: DateTime<Utc>,
    pub trace_run_id: Option<String>,
}

impl TraceContext {
    fn apply(&self, mut builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder = builder
            .header("x-trace-id", &self.trace_id)
            .header("x-trace-session-id", &self.trace_session_id)
            .header("x-trace-executor-id", &self.trace_executor_id)
            .header("x-trace-operation", &self.trace_operation)
            .header("x-trace-ts", self.trace_ts.to_rfc3339());
        if let Some(run_id) = &self.trace_run_id {
            builder = builder.header("x-trace-run-id", run_id);
        }
        builder
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidateWorkspaceResponse {
    pub ok: bool,
    #[serde(default)]
    pub missing_required_paths: Vec<String>,
}

#[async_trait]
pub trait ExecutorClient: Send + Sync {
    async fn restore_workspace(&self, plan: &RestorePlan, trace: &TraceContext) -> Result<()>;
    async fn link_agent_data(&self, session_id: &str, trace: &TraceContext) -> Result<()>;
    async fn validate_workspace(
        &self,
        required_paths: &[String],
        trace: &TraceContext,
    ) -> Result<ValidateWorkspaceResponse>;
}

#[async_trait]
pub trait WorkspaceSyncClient: Send + Sync {
    async fn sync_workspace(
        &self,
        session_id: &str,
        reason: SyncReason,
        trace: &TraceContext,
    ) -> Result<()>;
}

pub struct HttpExecutorClient {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    max_retries: u32,
    retry_delay_ms: u64,
    retry_status_codes: Vec<u16>,
}

impl HttpExecutorClient {
    pub fn new(cfg: &ExecutorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build executor client: {e}")))?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            auth_token: cfg.auth_token.clone(),
            max_retries: cfg.max_retries,
            retry_delay_ms: cfg.retry_delay_ms,
            retry_status_codes: cfg.retry_status_codes.clone(),
        })
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(tok) => builder.bearer_auth(tok),
            None => builder,
        }
    }

    async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
        trace: &TraceContext,
    ) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let builder = self.authed(trace.apply(self.client.post(&url))).json(&body);
            let result = builder.send().await;
            match result {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp.json().await.map_err(|e| {
                            Error::Internal(format!("invalid executor response: {e}"))
                        });
                    }
                    let text = resp.text().await.unwrap_or_default();
                    let retryable =
                        status.as_u16() >= 500 || self.retry_status_codes.contains(&status.as_u16());
                    let err = Error::UpstreamHttp {
                        status: status.as_u16(),
                        body: text,
                        attempt,
                        path: path.to_string(),
                    };
                    if retryable && attempt <= self.max_retries {
                        tokio::time::sleep(std::time::Duration::from_millis(self.retry_delay_ms))
                            .await;
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    let err = if e.is_timeout() {
                        Error::UpstreamTimeout(e.to_string())
                    } else {
                        Error::UpstreamNetwork(e.to_string())
                    };
                    if attempt <= self.max_retries {
                        tokio::time::sleep(std::time::Duration::from_millis(self.retry_delay_ms))
                            .await;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }
}

#[async_trait]
impl ExecutorClient for HttpExecutorClient {
    async fn restore_workspace(&self, plan: &RestorePlan, trace: &TraceContext) -> Result<()> {
        self.post_json("/workspace/restore", serde_json::to_value(plan)?, trace)
            .await?;
        Ok(())
    }

    async fn link_agent_data(&self, session_id: &str, trace: &TraceContext) -> Result<()> {
        self.post_json(
            "/workspace/link-agent-data",
            serde_json::json!({ "sessionId": session_id }),
            trace,
        )
        .await?;
        Ok(())
    }

    async fn validate_workspace(
        &self,
        required_paths: &[String],
        trace: &TraceContext,
    ) -> Result<ValidateWorkspaceResponse> {
        let value = self
            .post_json(
                "/workspace/validate",
                serde_json::json!({ "requiredPaths": required_paths }),
                trace,
            )
            .await?;
        serde_json::from_value(value).map_err(Error::Json)
    }
}

#[async_trait]
impl WorkspaceSyncClient for HttpExecutorClient {
    async fn sync_workspace(
        &self,
        session_id: &str,
        reason: SyncReason,
        trace: &TraceContext,
    ) -> Result<()> {
        self.post_json(
            "/workspace/sync",
            serde_json::json!({ "sessionId": session_id, "reason": reason.as_str() }),
            trace,
        )
        .await?;
        Ok(())
    }
}
