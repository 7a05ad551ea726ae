//! Admin slot & booking endpoints.
//!
//! - `POST /slots`            — create slot
//! - `POST /slots/recurring`  — create recurring pattern
//! - `GET  /slots?company&ai_type&from&to`
//! - `POST /slots/{id}/book`  — body `{interview_id, notes}`
//! - `POST /slots/{id}/cancel`
//! - `POST /bookings/{id}/cancel`

use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{Duration, NaiveDate, NaiveTime};
use serde::Deserialize;
use uuid::Uuid;

use candor_domain::slot::{AiType, Difficulty};

use super::{api_error, domain_error};
use crate::slots::{NewSlot, RecurringPattern, SlotSearch};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
pub struct CreateSlotRequest {
    company: String,
    job: String,
    date: NaiveDate,
    /// Slot-local start time (IST).
    start: NaiveTime,
    /// Defaults to `start + slots.default_duration_min`.
    end: Option<NaiveTime>,
    capacity: u32,
    ai_type: AiType,
    #[serde(default)]
    difficulty: Difficulty,
    #[serde(default = "default_language")]
    language: String,
}

fn default_language() -> String {
    "en".into()
}

#[derive(Deserialize)]
pub struct BookRequest {
    interview_id: Uuid,
    #[serde(default)]
    notes: String,
}

#[derive(Deserialize)]
pub struct SlotsQuery {
    company: Option<String>,
    ai_type: Option<AiType>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn create_slot(
    State(state): State<AppState>,
    Json(req): Json<CreateSlotRequest>,
) -> Response {
    let end = req.end.unwrap_or_else(|| {
        req.start
            + Duration::minutes(state.config.slots.default_duration_min as i64)
    });
    let new_slot = NewSlot {
        company: req.company,
        job: req.job,
        date: req.date,
        start: req.start,
        end,
        capacity: req.capacity,
        ai_type: req.ai_type,
        difficulty: req.difficulty,
        language: req.language,
    };
    match state.slots.create_slot(new_slot).await {
        Ok(slot_id) => Json(serde_json::json!({ "slot_id": slot_id })).into_response(),
        Err(e) => domain_error(e),
    }
}

pub async fn create_recurring(
    State(state): State<AppState>,
    Json(pattern): Json<RecurringPattern>,
) -> Response {
    match state.slots.create_recurring(pattern).await {
        Ok(ids) => Json(serde_json::json!({ "slot_ids": ids })).into_response(),
        Err(e) => domain_error(e),
    }
}

pub async fn search_slots(
    State(state): State<AppState>,
    Query(query): Query<SlotsQuery>,
) -> Response {
    let results = state
        .slots
        .search_available(SlotSearch {
            company: query.company,
            ai_type: query.ai_type,
            from: query.from,
            to: query.to,
        })
        .await;
    Json(serde_json::json!({ "slots": results })).into_response()
}

/// Booking also copies the slot's UTC window onto the interview row so
/// the token service can compute the access window.
pub async fn book_slot(
    State(state): State<AppState>,
    Path(slot_id): Path<Uuid>,
    Json(req): Json<BookRequest>,
) -> Response {
    if state.interviews.get(&req.interview_id).await.is_none() {
        return api_error(
            StatusCode::NOT_FOUND,
            format!("interview {} not found", req.interview_id),
        );
    }

    let booking = match state.slots.book(slot_id, req.interview_id, req.notes).await {
        Ok(b) => b,
        Err(e) => return domain_error(e),
    };

    // The slot exists — book just succeeded against it.
    if let Some(slot) = state.slots.get_slot(&slot_id).await {
        if let Err(e) = state
            .interviews
            .set_schedule(&req.interview_id, slot.start_utc(), slot.end_utc())
            .await
        {
            tracing::warn!(error = %e, "failed to copy schedule onto interview");
        }
    }

    Json(serde_json::json!({ "booking_id": booking.id })).into_response()
}

pub async fn cancel_slot(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.slots.cancel_slot(id).await {
        Ok(()) => Json(serde_json::json!({ "canceled": true })).into_response(),
        Err(e) => domain_error(e),
    }
}

pub async fn cancel_booking(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.slots.release(id).await {
        Ok(()) => Json(serde_json::json!({ "canceled": true })).into_response(),
        Err(e) => domain_error(e),
    }
}
