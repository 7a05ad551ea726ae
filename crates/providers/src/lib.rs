//! External-service adapters for the Candor runtime.
//!
//! Every piece of model intelligence — question generation (LLM),
//! speech recognition (STT), speech synthesis (TTS), and frame
//! detection (vision) — is consumed through the trait contracts in
//! [`traits`]; the submodules hold the HTTP/WebSocket adapters.

pub mod llm;
pub mod stt;
pub mod traits;
pub mod tts;
pub mod util;
pub mod vision;

pub use traits::{
    ChatMessage, ChatRequest, ChatResponse, ChatRole, Detection, DetectionLabel, FrameDetector,
    LlmProvider, TtsProvider,
};
