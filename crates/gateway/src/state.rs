use std::sync::Arc;

use candor_domain::clock::Clock;
use candor_domain::config::Config;
use candor_providers::LlmProvider;
use candor_sessions::SessionRegistry;

use crate::interviews::InterviewStore;
use crate::runtime::coding::CodingEvaluator;
use crate::runtime::dialogue::DialogueController;
use crate::runtime::evaluation::{EvaluationAssembler, EvaluationStore};
use crate::runtime::proctor::ProctorManager;
use crate::runtime::recording::RecordingStore;
use crate::slots::SlotStore;
use crate::storage::Storage;
use crate::tokens::TokenService;

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core** — config, clock, storage
/// - **Scheduling** — slot store, interview store, token service
/// - **Runtime** — session registry, dialogue controller, proctoring,
///   recording, coding, evaluation
/// - **Security** — admin token hash (startup-computed)
#[derive(Clone)]
pub struct AppState {
    // ── Core ──────────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub clock: Arc<dyn Clock>,
    pub storage: Arc<Storage>,

    // ── Scheduling ────────────────────────────────────────────────
    pub slots: Arc<SlotStore>,
    pub interviews: Arc<InterviewStore>,
    pub tokens: Arc<TokenService>,

    // ── Runtime ───────────────────────────────────────────────────
    pub registry: Arc<SessionRegistry>,
    pub dialogue: Arc<DialogueController>,
    pub llm: Arc<dyn LlmProvider>,
    pub proctor: Arc<ProctorManager>,
    pub recordings: Arc<RecordingStore>,
    pub coding: Arc<CodingEvaluator>,
    pub evaluations: Arc<EvaluationStore>,
    pub assembler: Arc<EvaluationAssembler>,

    // ── Security (startup-computed) ───────────────────────────────
    /// SHA-256 hash of the admin bearer token (read once at startup).
    /// `None` = dev mode (no auth enforced).
    pub admin_token_hash: Option<Vec<u8>>,
}
