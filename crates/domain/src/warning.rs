//! Proctoring warning events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    NoPerson,
    MultiplePeople,
    PhoneDetected,
    LowAttention,
    TabSwitch,
    NoiseBurst,
    MultipleSpeakers,
}

impl WarningKind {
    /// Candidate-facing label used in report thumbnails.
    pub fn label(self) -> &'static str {
        match self {
            WarningKind::NoPerson => "no person visible",
            WarningKind::MultiplePeople => "multiple people visible",
            WarningKind::PhoneDetected => "phone detected",
            WarningKind::LowAttention => "low attention",
            WarningKind::TabSwitch => "tab switch",
            WarningKind::NoiseBurst => "background noise",
            WarningKind::MultipleSpeakers => "multiple speakers",
        }
    }
}

/// A discrete proctoring observation worth persisting.
///
/// At most one event per (kind, 10-second window) per session — the
/// warning log enforces the dedup at insert time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WarningEvent {
    pub id: Uuid,
    pub session_id: Uuid,
    pub kind: WarningKind,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub snapshot_ref: Option<String>,
}
