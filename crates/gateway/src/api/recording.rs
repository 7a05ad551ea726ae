//! Chunked recording upload.
//!
//! `POST /audio/chunks?session_id=…&kind=video|mic` with a raw
//! WebM/MP4 chunk body. Chunks append in arrival order; the mux runs at
//! finalize.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use uuid::Uuid;

use super::{api_error, domain_error};
use crate::runtime::recording::ChunkKind;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ChunkQuery {
    session_id: Uuid,
    #[serde(default = "default_kind")]
    kind: String,
}

fn default_kind() -> String {
    "video".into()
}

pub async fn upload_chunk(
    State(state): State<AppState>,
    Query(query): Query<ChunkQuery>,
    body: Bytes,
) -> Response {
    if state.registry.get(&query.session_id).is_none() {
        return api_error(
            StatusCode::NOT_FOUND,
            format!("no active session {}", query.session_id),
        );
    }
    if body.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "empty chunk");
    }
    let kind = match query.kind.as_str() {
        "video" => ChunkKind::Video,
        "mic" => ChunkKind::Mic,
        other => {
            return api_error(
                StatusCode::BAD_REQUEST,
                format!("unknown chunk kind: {other}"),
            )
        }
    };

    match state
        .recordings
        .append_chunk(query.session_id, kind, body.to_vec())
        .await
    {
        Ok(()) => Json(serde_json::json!({ "accepted": true })).into_response(),
        Err(e) => domain_error(e),
    }
}
