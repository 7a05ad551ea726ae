//! Access tokens: the HMAC wire codec and the issue/redeem service.
//!
//! Wire format: `base64url(payload_json) + "." + base64url(hmac_sha256)`
//! where the payload is the compact map `{i, f, u, n, k}` (interview id,
//! valid-from epoch, valid-until epoch, nonce, key id). Verification
//! picks the key by `k` and compares tags in constant time.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use candor_domain::clock::Clock;
use candor_domain::config::{AccessConfig, DialogueConfig, ProctorConfig};
use candor_domain::error::{Error, Result};
use candor_domain::interview::{AccessTokenRecord, Interview, InterviewStatus};
use candor_domain::slot::{AiType, Difficulty};
use candor_sessions::{JobContext, SessionHandle, SessionRegistry};

use crate::interviews::InterviewStore;
use crate::slots::SlotStore;

type HmacSha256 = Hmac<Sha256>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire codec
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Compact signed payload. Field names are the wire format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPayload {
    /// Interview id.
    pub i: Uuid,
    /// Valid-from, epoch seconds.
    pub f: i64,
    /// Valid-until, epoch seconds.
    pub u: i64,
    /// Nonce binding the token to one issued record.
    pub n: String,
    /// Signing key id.
    pub k: String,
}

fn hmac_tag(payload_bytes: &[u8], secret: &str) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Internal(format!("hmac key: {e}")))?;
    mac.update(payload_bytes);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Sign a payload with the given secret.
pub fn sign(payload: &TokenPayload, secret: &str) -> Result<String> {
    let payload_bytes = serde_json::to_vec(payload)?;
    let tag = hmac_tag(&payload_bytes, secret)?;
    Ok(format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(&payload_bytes),
        URL_SAFE_NO_PAD.encode(tag)
    ))
}

/// Verify a token against the key set, picking the key by the payload's
/// `k` field. Tag comparison is constant-time.
pub fn verify(token: &str, keys: &HashMap<String, String>) -> Result<TokenPayload> {
    let (payload_b64, tag_b64) = token
        .split_once('.')
        .ok_or(Error::InvalidSignature)?;
    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| Error::InvalidSignature)?;
    let provided_tag = URL_SAFE_NO_PAD
        .decode(tag_b64)
        .map_err(|_| Error::InvalidSignature)?;

    let payload: TokenPayload =
        serde_json::from_slice(&payload_bytes).map_err(|_| Error::InvalidSignature)?;

    let secret = keys.get(&payload.k).ok_or(Error::InvalidSignature)?;
    let expected_tag = hmac_tag(&payload_bytes, secret)?;

    if expected_tag.ct_eq(&provided_tag).into() {
        Ok(payload)
    } else {
        Err(Error::InvalidSignature)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Token service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Issues and redeems time-bounded candidate access tokens.
pub struct TokenService {
    access: AccessConfig,
    dialogue: DialogueConfig,
    proctor: ProctorConfig,
    clock: Arc<dyn Clock>,
    interviews: Arc<InterviewStore>,
    slots: Arc<SlotStore>,
    registry: Arc<SessionRegistry>,
}

impl TokenService {
    pub fn new(
        access: AccessConfig,
        dialogue: DialogueConfig,
        proctor: ProctorConfig,
        clock: Arc<dyn Clock>,
        interviews: Arc<InterviewStore>,
        slots: Arc<SlotStore>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            access,
            dialogue,
            proctor,
            clock,
            interviews,
            slots,
            registry,
        }
    }

    /// Issue a signed token for an interview.
    ///
    /// Window: `[scheduled_start − lead, scheduled_end + grace]`. Fails
    /// when the interview has no schedule yet (book a slot first).
    pub async fn issue(&self, interview_id: Uuid) -> Result<String> {
        let interview = self
            .interviews
            .get(&interview_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("interview {interview_id}")))?;

        let start = interview.scheduled_start_utc.ok_or_else(|| {
            Error::Validation("interview has no scheduled start — book a slot first".into())
        })?;
        let end = interview.scheduled_end_utc.ok_or_else(|| {
            Error::Validation("interview has no scheduled end — book a slot first".into())
        })?;

        let valid_from = start - chrono::Duration::minutes(self.access.window_lead_min);
        let valid_until = end + chrono::Duration::minutes(self.access.window_grace_min);
        let nonce = Uuid::new_v4().simple().to_string();
        let now = self.clock.now_utc();

        let key_id = self.access.active_key_id.clone();
        let secret = self
            .access
            .hmac_keys
            .get(&key_id)
            .ok_or_else(|| Error::Internal(format!("no signing secret for key id {key_id}")))?;

        let payload = TokenPayload {
            i: interview_id,
            f: valid_from.timestamp(),
            u: valid_until.timestamp(),
            n: nonce.clone(),
            k: key_id,
        };
        let token = sign(&payload, secret)?;

        self.interviews
            .set_token_record(
                &interview_id,
                AccessTokenRecord {
                    nonce,
                    issued_at: now,
                    valid_from,
                    valid_until,
                    redeemed_at: None,
                    canceled: false,
                },
            )
            .await?;

        tracing::info!(%interview_id, %valid_from, %valid_until, "access token issued");
        Ok(token)
    }

    /// Redeem a token. First redemption creates the session; subsequent
    /// redemptions within the window resume it.
    pub async fn redeem(&self, token: &str) -> Result<Arc<SessionHandle>> {
        let payload = verify(token, &self.access.hmac_keys)?;
        let now = self.clock.now_utc();

        let interview = self
            .interviews
            .get(&payload.i)
            .await
            .ok_or_else(|| Error::NotFound(format!("interview {}", payload.i)))?;

        let record = interview
            .access_token
            .as_ref()
            .filter(|r| r.nonce == payload.n)
            .ok_or_else(|| Error::Auth("token does not match any issued token".into()))?;

        if record.canceled {
            return Err(Error::TokenCanceled);
        }
        if interview.status.is_terminal() {
            return Err(Error::AlreadyTerminal);
        }

        let valid_from = epoch(payload.f);
        let valid_until = epoch(payload.u);
        if now < valid_from {
            return Err(Error::TooEarly {
                seconds_remaining: (valid_from - now).num_seconds(),
            });
        }
        if now > valid_until {
            // The window closed without a completed session.
            self.interviews
                .set_status(&payload.i, InterviewStatus::Expired)
                .await?;
            return Err(Error::Expired);
        }

        // Resume an existing live session when we still hold it.
        if let Some(session_id) = interview.session_id {
            if let Some(handle) = self.registry.get(&session_id) {
                if handle.is_terminal() {
                    return Err(Error::AlreadyTerminal);
                }
                tracing::info!(%session_id, interview_id = %payload.i, "session resumed");
                return Ok(handle);
            }
        }

        // First redemption (or the prior handle was swept): create and
        // attach a session.
        let job = self.job_context(&interview).await;
        let handle = SessionHandle::new(
            interview.id,
            job,
            self.dialogue.max_questions,
            self.proctor.dedup_window_s,
            now,
            valid_until,
        );
        let handle = self.registry.insert_if_absent(handle);

        self.interviews
            .attach_session(&interview.id, handle.id, now)
            .await?;
        self.interviews
            .set_status(&interview.id, InterviewStatus::Live)
            .await?;

        tracing::info!(
            session_id = %handle.id,
            interview_id = %interview.id,
            "session created on first redemption"
        );
        Ok(handle)
    }

    /// Cancel the currently issued token for an interview.
    pub async fn cancel(&self, interview_id: Uuid) -> Result<()> {
        self.interviews.cancel_token(&interview_id).await
    }

    /// Build the per-session job context from the interview and its
    /// booked slot. A missing booking degrades to a general interview.
    async fn job_context(&self, interview: &Interview) -> JobContext {
        match self.slots.find_slot_for_interview(&interview.id).await {
            Some(slot) => JobContext {
                candidate_name: interview.candidate_name.clone(),
                company: slot.company,
                role: slot.job,
                job_description: interview.job_description.clone(),
                candidate_resume: interview.candidate_resume.clone(),
                ai_type: slot.ai_type,
                difficulty: slot.difficulty,
                language: slot.language,
            },
            None => JobContext {
                candidate_name: interview.candidate_name.clone(),
                company: String::new(),
                role: String::new(),
                job_description: interview.job_description.clone(),
                candidate_resume: interview.candidate_resume.clone(),
                ai_type: AiType::General,
                difficulty: Difficulty::default(),
                language: "en".into(),
            },
        }
    }
}

fn epoch(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}
