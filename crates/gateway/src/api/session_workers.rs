//! `/api/session-workers/*` — lifecycle endpoints for session containers
//! (§4.8, §6).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use sa_sessions::{ActivateOutcome, ActivateRequest, RuntimeManifest, SyncReason};

use crate::error::ApiError;
use crate::state::AppState;

fn outcome_str(outcome: &ActivateOutcome) -> &'static str {
    match outcome {
        ActivateOutcome::AlreadyRunning => "already_running",
        ActivateOutcome::Restarted => "restarted",
        ActivateOutcome::Created => "created",
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateRequestBody {
    pub app_id: String,
    #[serde(default)]
    pub project_name: Option<String>,
    pub user_login_name: String,
    pub runtime_version: String,
    #[serde(default)]
    pub manifest: Option<RuntimeManifest>,
}

/// `POST /api/session-workers/:sessionId/activate`.
pub async fn activate(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<ActivateRequestBody>,
) -> Response {
    let req = ActivateRequest {
        session_id: &session_id,
        app_id: &body.app_id,
        project_name: body.project_name.as_deref(),
        user_login_name: &body.user_login_name,
        runtime_version: &body.runtime_version,
        manifest: body.manifest.as_ref(),
    };
    match state.sessions.activate_session(req, Utc::now()).await {
        Ok((worker, outcome)) => Json(serde_json::json!({
            "worker": worker,
            "outcome": outcome_str(&outcome),
        }))
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncReasonBody {
    MessageStop,
    RunFinished,
    PreStop,
    PreRemove,
}

impl From<SyncReasonBody> for SyncReason {
    fn from(b: SyncReasonBody) -> Self {
        match b {
            SyncReasonBody::MessageStop => SyncReason::MessageStop,
            SyncReasonBody::RunFinished => SyncReason::RunFinished,
            SyncReasonBody::PreStop => SyncReason::PreStop,
            SyncReasonBody::PreRemove => SyncReason::PreRemove,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequestBody {
    pub reason: SyncReasonBody,
}

/// `POST /api/session-workers/:sessionId/sync`.
pub async fn sync(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<SyncRequestBody>,
) -> Response {
    match state
        .sessions
        .sync_session_workspace(&session_id, body.reason.into(), Utc::now())
        .await
    {
        Ok(worker) => Json(worker).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct SweepQuery {
    #[serde(default)]
    limit: Option<u32>,
}

const DEFAULT_SWEEP_LIMIT: u32 = 50;

/// `POST /api/session-workers/cleanup/idle`.
pub async fn cleanup_idle(
    State(state): State<AppState>,
    axum::extract::Query(query): axum::extract::Query<SweepQuery>,
) -> Response {
    match state
        .sessions
        .stop_idle_workers(Utc::now(), query.limit.unwrap_or(DEFAULT_SWEEP_LIMIT))
        .await
    {
        Ok(counters) => Json(counters).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// `POST /api/session-workers/cleanup/stopped`.
pub async fn cleanup_stopped(
    State(state): State<AppState>,
    axum::extract::Query(query): axum::extract::Query<SweepQuery>,
) -> Response {
    match state
        .sessions
        .remove_long_stopped_workers(Utc::now(), query.limit.unwrap_or(DEFAULT_SWEEP_LIMIT))
        .await
    {
        Ok(counters) => Json(counters).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// `GET /api/session-workers/:sessionId`.
pub async fn get_session_worker(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    match state.sessions.get(&session_id).await {
        Some(worker) => Json(worker).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
