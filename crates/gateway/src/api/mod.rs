//! HTTP surface: the admin/control API and the candidate streaming
//! endpoints, assembled into one router.

pub mod auth;
pub mod interviews;
pub mod portal;
pub mod recording;
pub mod session;
pub mod slots;
pub mod stt_ws;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// Map a domain error onto the wire.
pub(crate) fn domain_error(e: candor_domain::Error) -> Response {
    let status =
        StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match e {
        candor_domain::Error::TooEarly { seconds_remaining } => (
            status,
            Json(serde_json::json!({
                "error": "too_early",
                "seconds_remaining": seconds_remaining,
            })),
        )
            .into_response(),
        // Never leak internals to the wire.
        candor_domain::Error::Internal(ref msg) => {
            tracing::error!(error = %msg, "internal error");
            api_error(status, "internal error")
        }
        other => api_error(status, other.to_string()),
    }
}

async fn healthz(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "active_sessions": state.registry.len(),
        "slots": state.slots.slot_count().await,
    }))
}

/// Assemble the full router. The admin surface sits behind the bearer
/// middleware; the candidate surface authenticates by access token.
pub fn build_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/slots", post(slots::create_slot).get(slots::search_slots))
        .route("/slots/recurring", post(slots::create_recurring))
        .route("/slots/:id/book", post(slots::book_slot))
        .route("/slots/:id/cancel", post(slots::cancel_slot))
        .route("/bookings/:id/cancel", post(slots::cancel_booking))
        .route("/interviews", post(interviews::create_interview))
        .route(
            "/interviews/:id/access-token",
            post(interviews::issue_access_token),
        )
        .route("/interviews/:id/evaluation", get(interviews::get_evaluation))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin_token,
        ));

    let candidate = Router::new()
        .route("/portal", get(portal::portal))
        .route("/stt", get(stt_ws::stt_ws))
        .route("/audio/chunks", post(recording::upload_chunk))
        .route("/session/finalize", post(session::finalize))
        .route("/session/submit", post(session::submit_answer))
        .route("/session/tab-switch", post(session::tab_switch))
        .route("/session/frames", post(session::upload_frame))
        .route("/session/coding", post(session::submit_coding));

    Router::new()
        .route("/healthz", get(healthz))
        .merge(admin)
        .merge(candidate)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
