//! HTTP surface (§6). Mirrors the teacher's public/protected split: a
//! handful of unauthenticated liveness routes, everything else behind
//! [`auth::require_api_token`].

pub mod auth;
pub mod callbacks;
pub mod queue;
pub mod restore_plan;
pub mod runs;
pub mod session_workers;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

async fn healthz() -> &'static str {
    "ok"
}

/// Builds the full router: public liveness routes merged with the
/// bearer-token-protected API surface, traced end to end.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/healthz", get(healthz));

    let protected = Router::new()
        .route("/api/runs/start", post(runs::start_run))
        .route("/api/runs/:runId", get(runs::get_run))
        .route("/api/runs/:runId/stop", post(runs::stop_run))
        .route("/api/runs/:runId/stream", get(runs::stream_run))
        .route("/api/runs/:runId/bind", post(runs::bind_run))
        .route("/api/runs/:runId/callbacks", post(callbacks::handle_callback))
        .route("/api/runs/queue/enqueue", post(queue::enqueue))
        .route("/api/runs/queue/drain", post(queue::drain))
        .route("/api/runs/queue/:runId", get(queue::get_queue_item))
        .route("/api/runs/restore-plan", post(restore_plan::restore_plan))
        .route(
            "/api/session-workers/cleanup/idle",
            post(session_workers::cleanup_idle),
        )
        .route(
            "/api/session-workers/cleanup/stopped",
            post(session_workers::cleanup_stopped),
        )
        .route(
            "/api/session-workers/:sessionId",
            get(session_workers::get_session_worker),
        )
        .route(
            "/api/session-workers/:sessionId/activate",
            post(session_workers::activate),
        )
        .route(
            "/api/session-workers/:sessionId/sync",
            post(session_workers::sync),
        )
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public.merge(protected).layer(TraceLayer::new_for_http())
}
