//! Terminal snapshot persistence.
//!
//! When a session reaches a terminal state its turn log, warning log,
//! and scores are flushed to `sessions/{session_id}.json` under the
//! state path. The evaluation assembler and the report builder read
//! from this snapshot, never from live session state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use candor_domain::error::{Error, Result};
use candor_domain::session::{SessionSnapshot, TerminalKind};
use candor_sessions::SessionHandle;

fn snapshot_path(state_path: &Path, session_id: Uuid) -> PathBuf {
    state_path
        .join("sessions")
        .join(format!("{session_id}.json"))
}

/// Build a snapshot from the live handle. Call with the terminal kind
/// already decided; the caller owns the terminal transition itself.
pub async fn capture(
    handle: &Arc<SessionHandle>,
    terminal: TerminalKind,
    ended_at: DateTime<Utc>,
) -> SessionSnapshot {
    let state = handle.state.lock().await;
    SessionSnapshot {
        session_id: handle.id,
        interview_id: handle.interview_id,
        language: handle.job.language.clone(),
        started_at: handle.started_at,
        ended_at,
        terminal,
        turns: state.turns.to_vec(),
        warnings: state.warnings.to_vec(),
        turn_scores: state.turn_scores.clone(),
        fallback_events: state.fallback_events,
    }
}

/// Persist a snapshot. Replaces any previous snapshot for the session.
pub async fn persist(state_path: &Path, snapshot: &SessionSnapshot) -> Result<()> {
    let path = snapshot_path(state_path, snapshot.session_id);
    let json = serde_json::to_string_pretty(snapshot)?;
    tokio::task::spawn_blocking(move || -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, json)?;
        Ok(())
    })
    .await
    .map_err(|e| Error::Internal(format!("snapshot write task: {e}")))?
}

/// Load a persisted snapshot.
pub fn load(state_path: &Path, session_id: Uuid) -> Option<SessionSnapshot> {
    let raw = std::fs::read_to_string(snapshot_path(state_path, session_id)).ok()?;
    serde_json::from_str(&raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use candor_domain::slot::{AiType, Difficulty};
    use candor_sessions::JobContext;

    #[tokio::test]
    async fn capture_persist_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let handle = SessionHandle::new(
            Uuid::new_v4(),
            JobContext {
                candidate_name: "Jane".into(),
                company: "acme".into(),
                role: "backend".into(),
                job_description: String::new(),
                candidate_resume: String::new(),
                ai_type: AiType::Technical,
                difficulty: Difficulty::Medium,
                language: "en".into(),
            },
            6,
            10,
            Utc::now(),
            Utc::now() + chrono::Duration::minutes(30),
        );
        {
            let mut state = handle.state.lock().await;
            state.turns.record_interviewer("q0", None, Utc::now());
            state.turns.record_candidate("a0", 1500, Utc::now());
            state.turn_scores.push(0.8);
        }

        let ended = Utc::now();
        let snap = capture(&handle, TerminalKind::Completed, ended).await;
        persist(dir.path(), &snap).await.unwrap();

        let loaded = load(dir.path(), handle.id).unwrap();
        assert_eq!(loaded.turns.len(), 2);
        assert_eq!(loaded.terminal, TerminalKind::Completed);
        assert_eq!(loaded.turn_scores, vec![0.8]);
        assert_eq!(loaded.interview_id, handle.interview_id);
    }
}
