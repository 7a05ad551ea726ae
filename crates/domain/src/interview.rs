//! Interview and access-token records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InterviewStatus {
    Scheduled,
    Live,
    Completed,
    Expired,
    Abandoned,
}

impl InterviewStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            InterviewStatus::Completed | InterviewStatus::Expired | InterviewStatus::Abandoned
        )
    }
}

/// A scheduled interview. References its session by id only — runtime
/// joins happen through the registries, never through reference graphs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Interview {
    pub id: Uuid,
    pub candidate_id: Uuid,
    pub job_id: Uuid,
    pub candidate_name: String,
    /// Job description text used to seed question generation.
    #[serde(default)]
    pub job_description: String,
    /// Resume summary text used to seed question generation.
    #[serde(default)]
    pub candidate_resume: String,
    pub scheduled_start_utc: Option<DateTime<Utc>>,
    pub scheduled_end_utc: Option<DateTime<Utc>>,
    pub status: InterviewStatus,
    /// Set on first token redemption; idempotent thereafter.
    #[serde(default)]
    pub session_id: Option<Uuid>,
    /// Metadata of the most recently issued access token.
    #[serde(default)]
    pub access_token: Option<AccessTokenRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persisted side of an issued access token. The opaque wire value is
/// reconstructible from the signed payload; only state that verification
/// cannot derive (redemption, cancellation) lives here.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessTokenRecord {
    /// Nonce binding the persisted record to one signed token.
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    #[serde(default)]
    pub redeemed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub canceled: bool,
}
