//! Candidate portal entry: token redemption.
//!
//! `GET /portal?token=…` — redeems the access token. TooEarly returns a
//! countdown view (the browser retries at `valid_from`); Expired is a
//! terminal view. No stack traces reach candidates.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use candor_domain::Error;

use super::api_error;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct PortalQuery {
    token: Option<String>,
}

pub async fn portal(State(state): State<AppState>, Query(query): Query<PortalQuery>) -> Response {
    let Some(token) = query.token else {
        return api_error(StatusCode::BAD_REQUEST, "missing access token");
    };

    match state.tokens.redeem(&token).await {
        Ok(handle) => {
            // Kick the dialogue off (idempotent across resumes).
            let dialogue = state.dialogue.clone();
            let session = handle.clone();
            tokio::spawn(async move {
                dialogue.begin(&session).await;
            });

            Json(serde_json::json!({
                "view": "interview",
                "session_id": handle.id,
                "language": handle.job.language,
            }))
            .into_response()
        }
        Err(Error::TooEarly { seconds_remaining }) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "view": "countdown",
                "message": "Interview not yet available",
                "seconds_remaining": seconds_remaining,
            })),
        )
            .into_response(),
        Err(Error::Expired) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "view": "expired",
                "message": "Your interview window has expired",
            })),
        )
            .into_response(),
        Err(e @ (Error::InvalidSignature | Error::TokenCanceled | Error::AlreadyTerminal)) => {
            api_error(StatusCode::UNAUTHORIZED, e.to_string())
        }
        Err(e) => {
            tracing::error!(error = %e, "portal redemption failed");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "An error occurred — your progress has been saved",
            )
        }
    }
}
