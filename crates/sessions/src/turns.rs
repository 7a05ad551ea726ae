//! Turn log: the per-session transcript with dense sequencing.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use candor_domain::session::{TurnRecord, TurnRole};

/// Append-only turn log. Sequences are dense, strictly increasing, and
/// assigned here — callers never pick their own.
#[derive(Debug)]
pub struct TurnLog {
    session_id: Uuid,
    turns: Vec<TurnRecord>,
}

impl TurnLog {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            turns: Vec::new(),
        }
    }

    fn next_sequence(&self) -> u32 {
        self.turns.len() as u32
    }

    /// Record an interviewer question. Returns the assigned sequence.
    pub fn record_interviewer(
        &mut self,
        text: &str,
        audio_url: Option<String>,
        at: DateTime<Utc>,
    ) -> u32 {
        let sequence = self.next_sequence();
        self.turns.push(TurnRecord {
            session_id: self.session_id,
            role: TurnRole::Interviewer,
            sequence,
            text: text.to_string(),
            created_at: at,
            audio_url,
            response_time_ms: None,
        });
        sequence
    }

    /// Record a candidate answer. Returns the assigned sequence.
    pub fn record_candidate(
        &mut self,
        text: &str,
        response_time_ms: u64,
        at: DateTime<Utc>,
    ) -> u32 {
        let sequence = self.next_sequence();
        self.turns.push(TurnRecord {
            session_id: self.session_id,
            role: TurnRole::Candidate,
            sequence,
            text: text.to_string(),
            created_at: at,
            audio_url: None,
            response_time_ms: Some(response_time_ms),
        });
        sequence
    }

    /// Record a system message (degradation notices, forced skips).
    pub fn record_system(&mut self, text: &str, at: DateTime<Utc>) -> u32 {
        let sequence = self.next_sequence();
        self.turns.push(TurnRecord {
            session_id: self.session_id,
            role: TurnRole::System,
            sequence,
            text: text.to_string(),
            created_at: at,
            audio_url: None,
            response_time_ms: None,
        });
        sequence
    }

    pub fn all(&self) -> &[TurnRecord] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Last N turns, oldest first, for LLM prompt context.
    pub fn tail(&self, n: usize) -> &[TurnRecord] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    /// Export for the terminal snapshot.
    pub fn to_vec(&self) -> Vec<TurnRecord> {
        self.turns.clone()
    }
}
