//! The per-session handle: identity, the single coordination primitive
//! serializing all state mutation, the cancel token shared with every
//! attached loop, and the candidate-facing event channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use candor_domain::session::{CodingSubmission, DialoguePhase, Question, TerminalKind};
use candor_domain::slot::{AiType, Difficulty};
use candor_domain::stream::PortalEvent;

use crate::accumulator::TranscriptAccumulator;
use crate::cancel::CancelToken;
use crate::turns::TurnLog;
use crate::warnings::WarningLog;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Job context
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fixed per-session context fed to question generation. Built once at
/// redemption from the interview row and the booked slot.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub candidate_name: String,
    pub company: String,
    pub role: String,
    pub job_description: String,
    pub candidate_resume: String,
    pub ai_type: AiType,
    pub difficulty: Difficulty,
    pub language: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session state (behind the mailbox mutex)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything the dialogue controller and the loops mutate. Concurrent
/// events from the relay, the browser, and the proctoring loop all go
/// through the handle's mutex, so arrival order is processing order.
#[derive(Debug)]
pub struct SessionState {
    pub phase: DialoguePhase,
    pub max_questions: u32,
    /// Index of the current MAIN question, 0-based.
    pub question_index: u32,
    pub last_question: Option<Question>,
    pub question_asked_at: Option<DateTime<Utc>>,
    /// Consecutive Empty verdicts on the current MAIN question.
    pub consecutive_empties: u32,
    pub accumulator: TranscriptAccumulator,
    pub turns: TurnLog,
    pub warnings: WarningLog,
    /// Per-answer quality scores from the evaluation step (0..1).
    pub turn_scores: Vec<f32>,
    /// Count of canned-question fallbacks taken.
    pub fallback_events: u32,
    /// STT degraded — the candidate types instead of speaking.
    pub text_only: bool,
    pub coding_active: bool,
    /// Latest evaluated coding submission for this session.
    pub coding_submission: Option<CodingSubmission>,
    pub terminal: Option<TerminalKind>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug)]
pub struct SessionHandle {
    pub id: Uuid,
    pub interview_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Hard-cancellation instant (access window end).
    pub valid_until: DateTime<Utc>,
    pub job: JobContext,
    pub cancel: CancelToken,
    pub state: Mutex<SessionState>,
    /// Push channel to the candidate browser (questions, STT echoes).
    pub events: broadcast::Sender<PortalEvent>,
    /// Mirror of `state.terminal.is_some()` readable without the lock
    /// (the GC sweep and the registry are synchronous).
    terminal_flag: AtomicBool,
}

impl SessionHandle {
    pub fn new(
        interview_id: Uuid,
        job: JobContext,
        max_questions: u32,
        warning_dedup_s: u64,
        started_at: DateTime<Utc>,
        valid_until: DateTime<Utc>,
    ) -> Arc<Self> {
        let id = Uuid::new_v4();
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            id,
            interview_id,
            started_at,
            valid_until,
            job,
            cancel: CancelToken::new(),
            state: Mutex::new(SessionState {
                phase: DialoguePhase::Booting,
                max_questions,
                question_index: 0,
                last_question: None,
                question_asked_at: None,
                consecutive_empties: 0,
                accumulator: TranscriptAccumulator::new(),
                turns: TurnLog::new(id),
                warnings: WarningLog::new(id, warning_dedup_s),
                turn_scores: Vec::new(),
                fallback_events: 0,
                text_only: false,
                coding_active: false,
                coding_submission: None,
                terminal: None,
            }),
            events,
            terminal_flag: AtomicBool::new(false),
        })
    }

    /// Subscribe the candidate browser to push events.
    pub fn subscribe(&self) -> broadcast::Receiver<PortalEvent> {
        self.events.subscribe()
    }

    /// Best-effort push; a disconnected browser is not an error.
    pub fn push(&self, event: PortalEvent) {
        let _ = self.events.send(event);
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal_flag.load(Ordering::Acquire)
    }

    /// Mark the session terminal. Idempotent — the first kind wins.
    /// Callers must hold the state lock and pass it in, which keeps the
    /// flag and the state in step.
    pub fn mark_terminal(&self, state: &mut SessionState, kind: TerminalKind) -> bool {
        if state.terminal.is_some() {
            return false;
        }
        state.terminal = Some(kind);
        state.phase = DialoguePhase::Terminal;
        self.terminal_flag.store(true, Ordering::Release);
        self.cancel.cancel();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_handle() -> Arc<SessionHandle> {
        SessionHandle::new(
            Uuid::new_v4(),
            JobContext {
                candidate_name: "Jane".into(),
                company: "acme".into(),
                role: "backend engineer".into(),
                job_description: "rust services".into(),
                candidate_resume: "5y experience".into(),
                ai_type: AiType::Technical,
                difficulty: Difficulty::Medium,
                language: "en".into(),
            },
            6,
            10,
            Utc::now(),
            Utc::now() + chrono::Duration::minutes(30),
        )
    }

    #[tokio::test]
    async fn terminal_is_idempotent_and_cancels() {
        let handle = test_handle();
        assert!(!handle.is_terminal());
        {
            let mut state = handle.state.lock().await;
            assert!(handle.mark_terminal(&mut state, TerminalKind::Completed));
            assert!(!handle.mark_terminal(&mut state, TerminalKind::Abandoned));
            assert_eq!(state.terminal, Some(TerminalKind::Completed));
        }
        assert!(handle.is_terminal());
        assert!(handle.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn push_without_subscriber_is_fine() {
        let handle = test_handle();
        handle.push(PortalEvent::Ended);
        let mut rx = handle.subscribe();
        handle.push(PortalEvent::Ended);
        assert!(matches!(rx.recv().await, Ok(PortalEvent::Ended)));
    }
}
