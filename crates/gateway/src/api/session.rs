//! Candidate session endpoints: answer submission, browser signals,
//! proctor frames, the coding round, and finalize.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Json, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use uuid::Uuid;

use candor_domain::interview::InterviewStatus;
use candor_domain::session::TerminalKind;
use candor_domain::warning::WarningKind;
use candor_sessions::SessionHandle;

use super::{api_error, domain_error};
use crate::runtime::proctor::Frame;
use crate::runtime::snapshot;
use crate::state::AppState;

fn lookup(state: &AppState, session_id: &Uuid) -> Result<Arc<SessionHandle>, Response> {
    state.registry.get(session_id).ok_or_else(|| {
        api_error(
            StatusCode::NOT_FOUND,
            format!("no active session {session_id}"),
        )
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Answer submission
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
pub struct SubmitRequest {
    session_id: Uuid,
    /// Typed fallback text (text-only mode); `None` snapshots the
    /// transcript accumulator.
    #[serde(default)]
    text: Option<String>,
}

pub async fn submit_answer(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Response {
    let handle = match lookup(&state, &req.session_id) {
        Ok(h) => h,
        Err(resp) => return resp,
    };
    state.dialogue.submit_answer(&handle, req.text).await;
    Json(serde_json::json!({ "accepted": true })).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Browser signals
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
pub struct SignalRequest {
    session_id: Uuid,
}

/// Tab switches are signaled by the browser (not the vision model) and
/// join the same rate-limited warning stream.
pub async fn tab_switch(
    State(state): State<AppState>,
    Json(req): Json<SignalRequest>,
) -> Response {
    let handle = match lookup(&state, &req.session_id) {
        Ok(h) => h,
        Err(resp) => return resp,
    };
    let now = state.clock.now_utc();
    let recorded = {
        let mut session = handle.state.lock().await;
        session
            .warnings
            .try_record(WarningKind::TabSwitch, now, None)
            .is_some()
    };
    Json(serde_json::json!({ "recorded": recorded })).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Proctor frames
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
pub struct FrameQuery {
    session_id: Uuid,
}

/// `POST /session/frames?session_id=…` with a JPEG body. Frames are
/// dropped (not queued) when the vision loop is behind.
pub async fn upload_frame(
    State(state): State<AppState>,
    Query(query): Query<FrameQuery>,
    body: Bytes,
) -> Response {
    let handle = match lookup(&state, &query.session_id) {
        Ok(h) => h,
        Err(resp) => return resp,
    };
    if body.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "empty frame");
    }
    state.proctor.submit_frame(
        &handle,
        Frame {
            jpeg: body.to_vec(),
            at: state.clock.now_utc(),
        },
    );
    Json(serde_json::json!({ "accepted": true })).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Coding round
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
pub struct CodingRequest {
    session_id: Uuid,
    question_id: Uuid,
    language: String,
    source: String,
}

/// An upload mid-turn suspends the dialogue until the round finalizes.
pub async fn submit_coding(
    State(state): State<AppState>,
    Json(req): Json<CodingRequest>,
) -> Response {
    let handle = match lookup(&state, &req.session_id) {
        Ok(h) => h,
        Err(resp) => return resp,
    };

    state.dialogue.suspend_for_coding(&handle).await;
    let result = state
        .coding
        .evaluate(req.session_id, req.question_id, &req.language, &req.source)
        .await;
    state.dialogue.resume_after_coding(&handle).await;

    match result {
        Ok(submission) => {
            let passed = submission.run_results.iter().filter(|r| r.passed).count();
            let total = submission.run_results.len();
            let combined = submission.combined_score;
            {
                let mut session = handle.state.lock().await;
                session.coding_submission = Some(submission);
            }
            Json(serde_json::json!({
                "tests_passed": passed,
                "tests_total": total,
                "combined_score": combined,
            }))
            .into_response()
        }
        Err(e) => domain_error(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Finalize
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
pub struct FinalizeRequest {
    session_id: Uuid,
}

/// `POST /session/finalize` — mux the recording, snapshot the session,
/// assemble the evaluation, and release the runtime entry.
pub async fn finalize(
    State(state): State<AppState>,
    Json(req): Json<FinalizeRequest>,
) -> Response {
    let handle = match lookup(&state, &req.session_id) {
        Ok(h) => h,
        Err(resp) => return resp,
    };
    let now = state.clock.now_utc();

    // ── Recording mux (failure never blocks termination) ──────────
    let timeline = {
        let session = handle.state.lock().await;
        session
            .turns
            .all()
            .iter()
            .filter(|t| t.role == candor_domain::session::TurnRole::Interviewer)
            .map(|t| {
                let offset = (t.created_at - handle.started_at).num_milliseconds().max(0);
                (t.sequence, offset as u64)
            })
            .collect::<Vec<_>>()
    };
    let artifact = match state.recordings.finalize(handle.id, None, timeline).await {
        Ok(a) => Some(a),
        Err(e) => {
            tracing::warn!(session_id = %handle.id, error = %e, "recording finalize failed");
            None
        }
    };

    // ── Terminal transition + snapshot ────────────────────────────
    {
        let mut session = handle.state.lock().await;
        handle.mark_terminal(&mut session, TerminalKind::Completed);
    }
    let snap = snapshot::capture(&handle, TerminalKind::Completed, now).await;
    if let Err(e) = snapshot::persist(&state.config.storage.state_path, &snap).await {
        tracing::error!(session_id = %handle.id, error = %e, "snapshot persist failed");
    }

    // ── Evaluation assembly ───────────────────────────────────────
    let coding = {
        let session = handle.state.lock().await;
        session.coding_submission.clone()
    };
    let evaluation = match state
        .assembler
        .assemble(&handle.job.candidate_name, &snap, coding.as_ref())
        .await
    {
        Ok(e) => e,
        Err(e) => return domain_error(e),
    };

    if let Err(e) = state
        .interviews
        .set_status(&handle.interview_id, InterviewStatus::Completed)
        .await
    {
        tracing::warn!(error = %e, "failed to mark interview completed");
    }

    // ── Release runtime entries ───────────────────────────────────
    state.proctor.detach(&handle.id);
    state.registry.remove(&handle.id);

    Json(serde_json::json!({
        "evaluation": evaluation,
        "recording": artifact,
    }))
    .into_response()
}
