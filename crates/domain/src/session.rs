//! Runtime session records: turns, dialogue phases, coding submissions,
//! recording artifacts, and the final evaluation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turns
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    Interviewer,
    Candidate,
    System,
}

/// One line of the interview transcript.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TurnRecord {
    pub session_id: Uuid,
    pub role: TurnRole,
    /// Dense, strictly increasing, starting at 0.
    pub sequence: u32,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// Interviewer turns only.
    #[serde(default)]
    pub audio_url: Option<String>,
    /// Candidate turns only.
    #[serde(default)]
    pub response_time_ms: Option<u64>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dialogue state machine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DialoguePhase {
    Booting,
    Preamble,
    Asking,
    AwaitingAnswer,
    Evaluating,
    Closing,
    Terminal,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TerminalKind {
    Completed,
    Abandoned,
    Failed,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestionLevel {
    Main,
    FollowUp,
}

/// A generated (or fallback) interviewer question.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub level: QuestionLevel,
    pub topic_tag: String,
}

/// Verdict for one candidate message, produced by classification.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnswerVerdict {
    Answer,
    RepeatRequest,
    Skip,
    Empty,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Coding round
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Outcome of running one test case against the candidate's source.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestRunResult {
    pub test_id: String,
    pub passed: bool,
    pub stdout: String,
    pub stderr: String,
    pub runtime_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CodingSubmission {
    pub session_id: Uuid,
    pub question_id: Uuid,
    pub language: String,
    pub source: String,
    pub run_results: Vec<TestRunResult>,
    /// LLM review score, 0..100.
    pub llm_review_score: u32,
    pub feedback_text: String,
    /// `round(pass_ratio * 60 + llm_review_score * 0.4)`, 0..100.
    pub combined_score: u32,
    pub created_at: DateTime<Utc>,
}

/// A coding question with its bound test cases.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CodingQuestion {
    pub id: Uuid,
    pub title: String,
    pub prompt: String,
    pub test_cases: Vec<TestCase>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    pub stdin: String,
    pub expected_stdout: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Recording
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordingArtifact {
    pub session_id: Uuid,
    /// Final merged file; the only form retained after a verified mux.
    pub final_merged_ref: String,
    pub duration_ms: u64,
    pub has_audio: bool,
    /// (question sequence, offset ms) markers for report deep-links.
    #[serde(default)]
    pub question_timeline: Vec<(u32, u64)>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Evaluation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DimensionScores {
    pub technical: f32,
    pub communication: f32,
    pub problem_solving: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProctoringSummary {
    pub warning_count: u32,
    pub by_kind: Vec<(crate::warning::WarningKind, u32)>,
    pub penalty: f32,
}

/// The final signed-off evaluation for an interview. One per interview;
/// reassembly replaces in place.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Evaluation {
    pub interview_id: Uuid,
    /// 0..10.
    pub overall_score: f32,
    pub per_dimension: DimensionScores,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommend: bool,
    pub proctoring_summary: ProctoringSummary,
    pub report_ref: String,
    pub created_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Terminal snapshot
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What the runtime flushes to disk when a session reaches a terminal
/// state: the turn log and the warning log, plus enough identity to
/// rebuild the report later.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub interview_id: Uuid,
    pub language: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub terminal: TerminalKind,
    pub turns: Vec<TurnRecord>,
    pub warnings: Vec<crate::warning::WarningEvent>,
    pub turn_scores: Vec<f32>,
    #[serde(default)]
    pub fallback_events: u32,
}
