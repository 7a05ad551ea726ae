//! Streaming event types shared between the STT relay, the transcript
//! accumulator, and the dialogue controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recognition event from the STT provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SttEvent {
    pub text: String,
    pub is_final: bool,
    pub arrived_at: DateTime<Utc>,
    /// Distinct speakers heard in this result, when diarization is on.
    #[serde(default)]
    pub speaker_count: Option<u32>,
}

/// JSON events pushed to the candidate browser over the `/stt` socket.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PortalEvent {
    Interim { text: String, at: DateTime<Utc> },
    Final { text: String, at: DateTime<Utc> },
    /// A new interviewer question (text + optional synthesized audio).
    Question {
        sequence: u32,
        text: String,
        audio_url: Option<String>,
    },
    /// Transcription degraded to text-only fallback.
    TranscriptionUnavailable,
    Ended,
}
