//! `/api/runs/:runId/callbacks` — executor callback ingestion (§4.6, §6).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;

use sa_callbacks::CallbackEvent;

use crate::state::AppState;

/// `POST /api/runs/:runId/callbacks`.
pub async fn handle_callback(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Json(event): Json<CallbackEvent>,
) -> Response {
    if event.run_id != run_id {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "callback event runId does not match path runId",
            })),
        )
            .into_response();
    }

    let outcome = state.callback_handler.handle(event, Utc::now()).await;
    Json(outcome).into_response()
}
