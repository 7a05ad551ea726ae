//! Shared error taxonomy used across all Candor crates.
//!
//! Errors are values, not stack unwinds: retries and fallbacks are
//! policy decisions made by the caller (usually the dialogue
//! controller), so every variant carries enough to decide.

/// Shared error type used across all Candor crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    // ── Input / validation ────────────────────────────────────────
    #[error("validation: {0}")]
    Validation(String),

    // ── Authorization ─────────────────────────────────────────────
    #[error("auth: {0}")]
    Auth(String),

    #[error("access token signature is invalid")]
    InvalidSignature,

    // ── Capacity ──────────────────────────────────────────────────
    #[error("slot is full")]
    SlotFull,

    #[error("slot is canceled")]
    SlotCanceled,

    #[error("interview already has an active booking")]
    AlreadyBooked,

    #[error("slot overlaps an existing slot with remaining capacity")]
    OverlapsExisting,

    // ── Temporal gate ─────────────────────────────────────────────
    #[error("interview window opens in {seconds_remaining}s")]
    TooEarly { seconds_remaining: i64 },

    #[error("interview window has expired")]
    Expired,

    #[error("access token was canceled")]
    TokenCanceled,

    #[error("interview session already reached a terminal state")]
    AlreadyTerminal,

    // ── Providers ─────────────────────────────────────────────────
    /// Transient provider fault (timeout, 5xx). Retry with backoff; on
    /// exhaustion the session degrades rather than failing.
    #[error("provider {provider} (transient): {message}")]
    ProviderTransient { provider: String, message: String },

    /// Permanent provider fault (credentials, quota). No retry.
    #[error("provider {provider} (permanent): {message}")]
    ProviderPermanent { provider: String, message: String },

    #[error("timeout: {0}")]
    Timeout(String),

    // ── Everything else ───────────────────────────────────────────
    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status code for the admin/candidate surfaces.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::Auth(_) | Error::InvalidSignature | Error::TokenCanceled => 401,
            Error::NotFound(_) => 404,
            Error::SlotFull
            | Error::SlotCanceled
            | Error::AlreadyBooked
            | Error::OverlapsExisting
            | Error::AlreadyTerminal => 409,
            Error::TooEarly { .. } | Error::Expired => 403,
            Error::ProviderTransient { .. } | Error::Timeout(_) => 503,
            _ => 500,
        }
    }

    /// CLI exit code per the admin wrapper contract: 0 success,
    /// 2 validation, 3 auth, 4 not-found, 5 conflict, 1 internal.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Validation(_) => 2,
            Error::Auth(_) | Error::InvalidSignature | Error::TokenCanceled => 3,
            Error::NotFound(_) => 4,
            Error::SlotFull
            | Error::SlotCanceled
            | Error::AlreadyBooked
            | Error::OverlapsExisting
            | Error::AlreadyTerminal => 5,
            _ => 1,
        }
    }

    /// True when a retry with backoff is worth attempting.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::ProviderTransient { .. } | Error::Timeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
