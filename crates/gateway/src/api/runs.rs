//! `/api/runs/*` — starting, stopping, inspecting and streaming runs (§6).

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use sa_domain::stream::BoxStream;
use sa_domain::types::{Message, Provider};
use sa_streambus::BusEvent;

use crate::error::ApiError;
use crate::runtime::orchestrator::{RunEvent, StartRunInput};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunRequest {
    #[serde(default)]
    pub run_id: Option<String>,
    pub provider: Provider,
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub resume_session_id: Option<String>,
    #[serde(default)]
    pub execution_profile: Option<String>,
    #[serde(default)]
    pub tools: Option<serde_json::Value>,
    #[serde(default)]
    pub provider_options: Option<serde_json::Value>,
    #[serde(default)]
    pub require_human_loop: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RejectedResponse<'a> {
    run_id: &'a str,
    accepted: bool,
    reason: &'a Option<String>,
}

/// `POST /api/runs/start`. Branches on `Accept: text/event-stream`: SSE gets
/// a live stream, everything else gets the run drained to completion inline
/// and returned as one JSON body.
pub async fn start_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<StartRunRequest>,
) -> Response {
    let run_id = body
        .run_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let session_id = state
        .orchestrator
        .session_id_for(&run_id)
        .unwrap_or_else(|| run_id.clone());
    let wants_sse = headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/event-stream"))
        .unwrap_or(false);

    let input = StartRunInput {
        run_id: run_id.clone(),
        session_id,
        provider: body.provider,
        model: body.model,
        messages: body.messages,
        resume_session_id: body.resume_session_id,
        execution_profile: body.execution_profile,
        tools: body.tools,
        provider_options: body.provider_options,
        require_human_loop: body.require_human_loop,
    };

    if wants_sse {
        // Subscribe before starting the run so no published event can be
        // missed between `startRun` accepting and the stream task running.
        let bus_stream = state.bus.subscribe(&run_id, 0);

        let outcome = match state.orchestrator.start_run(input, Utc::now()).await {
            Ok(o) => o,
            Err(e) => return ApiError::from(e).into_response(),
        };
        if !outcome.accepted {
            return (
                StatusCode::CONFLICT,
                Json(RejectedResponse {
                    run_id: &outcome.run_id,
                    accepted: false,
                    reason: &outcome.reason,
                }),
            )
                .into_response();
        }

        let orchestrator = state.orchestrator.clone();
        let run_id_for_task = run_id.clone();
        tokio::spawn(async move {
            let _ = orchestrator.stream_run(&run_id_for_task, Utc::now()).await;
        });

        let heartbeat_secs = state.config.orchestrator.heartbeat_secs;
        let sse_stream = make_run_event_stream(bus_stream, run_id);
        return Sse::new(sse_stream)
            .keep_alive(
                KeepAlive::new()
                    .interval(Duration::from_secs(heartbeat_secs))
                    .text("heartbeat"),
            )
            .into_response();
    }

    let outcome = match state.orchestrator.start_run(input, Utc::now()).await {
        Ok(o) => o,
        Err(e) => return ApiError::from(e).into_response(),
    };
    if !outcome.accepted {
        return (
            StatusCode::CONFLICT,
            Json(RejectedResponse {
                run_id: &outcome.run_id,
                accepted: false,
                reason: &outcome.reason,
            }),
        )
            .into_response();
    }

    let events = match state.orchestrator.stream_run(&run_id, Utc::now()).await {
        Ok(events) => events,
        Err(e) => return ApiError::from(e).into_response(),
    };
    let snapshot = state.orchestrator.context(&run_id);
    Json(serde_json::json!({
        "runId": run_id,
        "accepted": true,
        "warnings": outcome.warnings,
        "events": events,
        "snapshot": snapshot,
    }))
    .into_response()
}

/// `POST /api/runs/:runId/stop`.
pub async fn stop_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Response {
    match state.orchestrator.stop_run(&run_id, Utc::now()).await {
        Ok(true) => Json(serde_json::json!({ "ok": true })).into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// `GET /api/runs/:runId`.
pub async fn get_run(State(state): State<AppState>, Path(run_id): Path<String>) -> Response {
    match state.orchestrator.context(&run_id) {
        Some(ctx) => Json(ctx).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    cursor: Option<u64>,
}

/// `GET /api/runs/:runId/stream`. Resumable via `?cursor=<seq>` or
/// `Last-Event-ID`.
pub async fn stream_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Response {
    let after_seq = query
        .cursor
        .or_else(|| {
            headers
                .get("last-event-id")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
        })
        .unwrap_or(0);

    let heartbeat_secs = state.config.orchestrator.heartbeat_secs;
    let bus_stream = state.bus.subscribe(&run_id, after_seq);
    let sse_stream = make_run_event_stream(bus_stream, run_id);
    Sse::new(sse_stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(heartbeat_secs))
                .text("heartbeat"),
        )
        .into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindRunRequest {
    pub session_id: String,
}

/// `POST /api/runs/:runId/bind`.
pub async fn bind_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Json(body): Json<BindRunRequest>,
) -> Response {
    state.orchestrator.bind_session(&run_id, &body.session_id);
    Json(serde_json::json!({ "ok": true })).into_response()
}

/// Translate the Stream Bus's `BusEvent<RunEvent>` into SSE wire framing
/// (§6 "SSE framing"). `Lagged` surfaces as a comment rather than dropping
/// the connection (§4.1 "documented, bounded loss").
fn make_run_event_stream(
    mut bus_stream: BoxStream<'static, BusEvent<RunEvent>>,
    run_id: String,
) -> impl futures_core::Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        while let Some(item) = bus_stream.next().await {
            match item {
                BusEvent::Entry(entry) => {
                    let data = serde_json::to_string(&entry.event).unwrap_or_default();
                    yield Ok(Event::default()
                        .id(entry.seq.to_string())
                        .event(entry.event.type_name())
                        .data(data));
                }
                BusEvent::Lagged => {
                    yield Ok(Event::default().comment("lagged"));
                }
                BusEvent::Closed => {
                    let data = serde_json::json!({ "runId": run_id }).to_string();
                    yield Ok(Event::default().event("run.closed").data(data));
                    break;
                }
            }
        }
    }
}
