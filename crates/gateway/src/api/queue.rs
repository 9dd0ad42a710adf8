//! `/api/runs/queue/*` — durable FIFO enqueue and drain (§6, §4.4, §4.5).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use crate::runtime::queue_manager::QueuedRunPayload;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    pub run_id: String,
    pub session_id: String,
    pub provider: sa_domain::types::Provider,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(flatten)]
    pub payload: QueuedRunPayload,
}

/// `POST /api/runs/queue/enqueue`.
pub async fn enqueue(State(state): State<AppState>, Json(body): Json<EnqueueRequest>) -> Response {
    let max_attempts = body
        .max_attempts
        .unwrap_or(state.config.orchestrator.default_max_attempts);
    let payload = match serde_json::to_value(&body.payload) {
        Ok(v) => v,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    };

    let outcome = state
        .queue
        .enqueue(
            &body.run_id,
            &body.session_id,
            body.provider,
            max_attempts,
            payload,
            Utc::now(),
        )
        .await;

    let status = if outcome.accepted {
        StatusCode::ACCEPTED
    } else {
        StatusCode::CONFLICT
    };
    (status, Json(outcome)).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainRequest {
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub lock_ms: Option<u64>,
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
}

/// `POST /api/runs/queue/drain`.
pub async fn drain(
    State(state): State<AppState>,
    Json(body): Json<DrainRequest>,
) -> Response {
    let queue_cfg = &state.config.queue;
    let owner = body.owner.unwrap_or_else(|| queue_cfg.owner.clone());
    let limit = queue_cfg.clamp_limit(body.limit);
    let lock_ms = queue_cfg.clamp_lock_ms(body.lock_ms);
    let retry_delay_ms = queue_cfg.clamp_retry_delay_ms(body.retry_delay_ms);

    let outcome = state
        .queue_manager
        .drain_once(&owner, Utc::now(), limit, lock_ms, retry_delay_ms)
        .await;
    Json(outcome).into_response()
}

/// `GET /api/runs/queue/:runId`.
pub async fn get_queue_item(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Response {
    match state.queue.find_by_run_id(&run_id).await {
        Some(item) => Json(item).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
