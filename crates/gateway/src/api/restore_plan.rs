//! `/api/runs/restore-plan` — pure restore plan derivation (§4.7, §6).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use sa_sessions::{build_restore_plan, validate_required_paths, RuntimeManifest};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestorePlanRequest {
    pub manifest: RuntimeManifest,
    pub runtime_version: String,
    #[serde(default)]
    pub existing_paths: Option<Vec<String>>,
}

/// `POST /api/runs/restore-plan`. When `existingPaths` is supplied, the plan
/// is additionally checked against it (§4.7 `validateRequiredPaths`); a
/// miss returns 422 with the plan attached so the caller can see what it
/// would have built.
pub async fn restore_plan(
    State(_state): State<AppState>,
    Json(body): Json<RestorePlanRequest>,
) -> Response {
    let plan = match build_restore_plan(&body.manifest, &body.runtime_version) {
        Ok(p) => p,
        Err(e) => return ApiError::from(e).into_response(),
    };

    if let Some(existing) = &body.existing_paths {
        let validation = validate_required_paths(&plan.required_paths, existing);
        if !validation.ok {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({
                    "ok": false,
                    "reason": "required_paths_missing",
                    "missingRequiredPaths": validation.missing_required_paths,
                    "plan": plan,
                })),
            )
                .into_response();
        }
    }

    Json(serde_json::json!({ "ok": true, "plan": plan })).into_response()
}
