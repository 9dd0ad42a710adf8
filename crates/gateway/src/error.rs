//! HTTP error mapping (§7). A thin `ApiError` newtype around
//! `sa_domain::error::Error` with a single blanket `IntoResponse` impl,
//! generalizing the teacher's per-handler `api_error(status, message)`
//! helper (duplicated in `api/router.rs`, `api/webhooks.rs`,
//! `api/schedules.rs`) into one place so every endpoint gets the same
//! `{error, details?}` body shape for free via `?`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use sa_domain::error::Error;

pub struct ApiError(pub Error);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, details) = match &self.0 {
            Error::Validation(_) => (StatusCode::BAD_REQUEST, None),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, None),
            Error::Conflict(_) => (StatusCode::CONFLICT, None),
            Error::UpstreamHttp {
                status,
                body,
                attempt,
                path,
            } => (
                StatusCode::BAD_GATEWAY,
                Some(serde_json::json!({
                    "upstreamStatus": status,
                    "upstreamBody": body,
                    "attempt": attempt,
                    "path": path,
                })),
            ),
            Error::UpstreamTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, None),
            Error::UpstreamNetwork(_) => (StatusCode::BAD_GATEWAY, None),
            Error::ProviderFailure(_) => (StatusCode::BAD_GATEWAY, None),
            Error::Internal(_) | Error::Io(_) | Error::Json(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "internal error");
        }

        let body = ErrorBody {
            error: self.0.to_string(),
            details,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn validation_maps_to_400() {
        let resp = ApiError(Error::Validation("bad field".into())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn not_found_maps_to_404() {
        let resp = ApiError(Error::NotFound("run r1".into())).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn conflict_maps_to_409() {
        let resp = ApiError(Error::Conflict("already consumed".into())).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn upstream_http_carries_structured_details() {
        let resp = ApiError(Error::UpstreamHttp {
            status: 503,
            body: "unavailable".into(),
            attempt: 2,
            path: "/agents/opencode/run".into(),
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let json = body_json(resp).await;
        assert_eq!(json["details"]["upstreamStatus"], 503);
    }

    #[tokio::test]
    async fn internal_maps_to_500() {
        let resp = ApiError(Error::Internal("invariant violated".into())).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
