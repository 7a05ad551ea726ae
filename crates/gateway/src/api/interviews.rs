//! Admin interview endpoints.
//!
//! - `POST /interviews`                    — create an interview row
//! - `POST /interviews/{id}/access-token`  — issue the signed access URL
//! - `GET  /interviews/{id}/evaluation`

use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use uuid::Uuid;

use super::{api_error, domain_error};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateInterviewRequest {
    candidate_name: String,
    candidate_id: Uuid,
    job_id: Uuid,
    #[serde(default)]
    job_description: String,
    #[serde(default)]
    candidate_resume: String,
}

pub async fn create_interview(
    State(state): State<AppState>,
    Json(req): Json<CreateInterviewRequest>,
) -> Response {
    if req.candidate_name.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "candidate_name must not be empty");
    }
    let interview = state
        .interviews
        .create(
            req.candidate_name,
            req.candidate_id,
            req.job_id,
            req.job_description,
            req.candidate_resume,
        )
        .await;
    Json(serde_json::json!({ "interview_id": interview.id })).into_response()
}

pub async fn issue_access_token(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.tokens.issue(id).await {
        Ok(token) => Json(serde_json::json!({
            "token": token,
            "access_url": format!("/portal?token={token}"),
        }))
        .into_response(),
        Err(e) => domain_error(e),
    }
}

pub async fn get_evaluation(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.evaluations.get(&id).await {
        Some(evaluation) => Json(evaluation).into_response(),
        None => api_error(
            StatusCode::NOT_FOUND,
            format!("no evaluation for interview {id}"),
        ),
    }
}
