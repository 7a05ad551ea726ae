//! Runtime configuration: `candor.toml` plus environment overrides.
//!
//! The file is optional — every field has a default — and the
//! environment variables recognized by the core (STORAGE_ROOT,
//! ACCESS_WINDOW_LEAD_MIN, …) override whatever the file says.
//! Validation runs once at startup; errors abort the server.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub slots: SlotsConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub stt: SttConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub tts: TtsConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub dialogue: DialogueConfig,
    #[serde(default)]
    pub proctor: ProctorConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub coding: CodingConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    /// Environment variable holding the admin bearer token.
    /// Unset/empty env var → dev mode (admin surface unauthenticated).
    #[serde(default = "d_admin_token_env")]
    pub admin_token_env: String,
    /// Allowed CORS origins for the candidate portal.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_port() -> u16 {
    8740
}
fn d_admin_token_env() -> String {
    "CANDOR_ADMIN_TOKEN".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
            admin_token_env: d_admin_token_env(),
            allowed_origins: Vec::new(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Storage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Absolute root for recordings, snapshots, TTS audio, and reports.
    #[serde(default = "d_storage_root")]
    pub root: PathBuf,
    /// State directory for the JSON stores (slots, bookings, interviews,
    /// evaluations, session snapshots).
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
}

fn d_storage_root() -> PathBuf {
    PathBuf::from("./data/storage")
}
fn d_state_path() -> PathBuf {
    PathBuf::from("./data/state")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: d_storage_root(),
            state_path: d_state_path(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Slots & access windows
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotsConfig {
    /// Default slot duration in minutes when `end` is not supplied.
    #[serde(default = "d_slot_duration")]
    pub default_duration_min: u32,
    /// Presentation timezone name for slot-local times.
    #[serde(default = "d_zone")]
    pub zone: String,
}

fn d_slot_duration() -> u32 {
    10
}
fn d_zone() -> String {
    "Asia/Kolkata".into()
}

impl Default for SlotsConfig {
    fn default() -> Self {
        Self {
            default_duration_min: d_slot_duration(),
            zone: d_zone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Minutes before scheduled start the token becomes valid.
    #[serde(default = "d_lead_min")]
    pub window_lead_min: i64,
    /// Grace minutes after scheduled end before the token expires.
    #[serde(default = "d_grace_min")]
    pub window_grace_min: i64,
    /// Signing keys by key id. The empty key id maps to `HMAC_SECRET`;
    /// others to `HMAC_SECRET_{key_id}`. Populated from env at startup.
    #[serde(default)]
    pub hmac_keys: HashMap<String, String>,
    /// Key id used for newly issued tokens.
    #[serde(default = "d_active_key")]
    pub active_key_id: String,
}

fn d_lead_min() -> i64 {
    15
}
fn d_grace_min() -> i64 {
    10
}
fn d_active_key() -> String {
    "k1".into()
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            window_lead_min: d_lead_min(),
            window_grace_min: d_grace_min(),
            hmac_keys: HashMap::new(),
            active_key_id: d_active_key(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Providers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    /// WebSocket base URL of the STT provider.
    #[serde(default = "d_stt_url")]
    pub base_url: String,
    #[serde(default = "d_stt_model")]
    pub model: String,
    /// Env var holding the provider API key.
    #[serde(default = "d_stt_key_env")]
    pub api_key_env: String,
    /// Minimum silence (ms) after which the provider finalizes.
    #[serde(default = "d_endpointing")]
    pub endpointing_ms: u32,
    /// Utterance boundary detection bound (ms).
    #[serde(default = "d_utterance_end")]
    pub utterance_end_ms: u32,
    #[serde(default = "d_sample_rate")]
    pub sample_rate: u32,
}

fn d_stt_url() -> String {
    "wss://api.deepgram.com/v1/listen".into()
}
fn d_stt_model() -> String {
    "nova-2".into()
}
fn d_stt_key_env() -> String {
    "STT_API_KEY".into()
}
fn d_endpointing() -> u32 {
    500
}
fn d_utterance_end() -> u32 {
    2000
}
fn d_sample_rate() -> u32 {
    16_000
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            base_url: d_stt_url(),
            model: d_stt_model(),
            api_key_env: d_stt_key_env(),
            endpointing_ms: d_endpointing(),
            utterance_end_ms: d_utterance_end(),
            sample_rate: d_sample_rate(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions base URL.
    #[serde(default = "d_llm_url")]
    pub base_url: String,
    #[serde(default = "d_llm_model")]
    pub model: String,
    #[serde(default = "d_llm_key_env")]
    pub api_key_env: String,
    /// Per-call deadline in seconds.
    #[serde(default = "d_llm_deadline")]
    pub call_deadline_s: u64,
}

fn d_llm_url() -> String {
    "https://api.openai.com/v1".into()
}
fn d_llm_model() -> String {
    "gpt-4o-mini".into()
}
fn d_llm_key_env() -> String {
    "LLM_API_KEY".into()
}
fn d_llm_deadline() -> u64 {
    20
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_llm_url(),
            model: d_llm_model(),
            api_key_env: d_llm_key_env(),
            call_deadline_s: d_llm_deadline(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default = "d_tts_url")]
    pub base_url: String,
    #[serde(default = "d_tts_voice")]
    pub voice: String,
    #[serde(default = "d_tts_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_tts_deadline")]
    pub call_deadline_s: u64,
    /// Cache entry lifetime in hours.
    #[serde(default = "d_tts_ttl")]
    pub cache_ttl_hours: u64,
}

fn d_tts_url() -> String {
    "https://api.openai.com/v1/audio/speech".into()
}
fn d_tts_voice() -> String {
    "alloy".into()
}
fn d_tts_key_env() -> String {
    "TTS_API_KEY".into()
}
fn d_tts_deadline() -> u64 {
    15
}
fn d_tts_ttl() -> u64 {
    24
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            base_url: d_tts_url(),
            voice: d_tts_voice(),
            api_key_env: d_tts_key_env(),
            call_deadline_s: d_tts_deadline(),
            cache_ttl_hours: d_tts_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    /// HTTP inference endpoint for frame detection.
    #[serde(default = "d_vision_url")]
    pub base_url: String,
    /// Primary detection model.
    #[serde(default = "d_vision_primary")]
    pub primary_model: String,
    /// Fast fallback model used when the primary errors.
    #[serde(default = "d_vision_fallback")]
    pub fallback_model: String,
    #[serde(default = "d_vision_key_env")]
    pub api_key_env: String,
}

fn d_vision_url() -> String {
    "http://127.0.0.1:9400".into()
}
fn d_vision_primary() -> String {
    "detector-large".into()
}
fn d_vision_fallback() -> String {
    "detector-fast".into()
}
fn d_vision_key_env() -> String {
    "VISION_API_KEY".into()
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            base_url: d_vision_url(),
            primary_model: d_vision_primary(),
            fallback_model: d_vision_fallback(),
            api_key_env: d_vision_key_env(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Runtime loops
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueConfig {
    /// Default number of main questions per interview.
    #[serde(default = "d_max_questions")]
    pub max_questions: u32,
    /// Prior turns included in question-generation prompts.
    #[serde(default = "d_prior_turns")]
    pub prior_turns: usize,
    /// Answer-submit inactivity timeout (seconds from first voice).
    #[serde(default = "d_answer_timeout")]
    pub answer_timeout_s: u64,
    /// Grace before auto-submit when no voice was ever detected.
    #[serde(default = "d_no_voice_grace")]
    pub no_voice_grace_s: u64,
    /// Coverage score under which a MAIN answer earns a follow-up.
    #[serde(default = "d_followup_threshold")]
    pub followup_threshold: f32,
}

fn d_max_questions() -> u32 {
    6
}
fn d_prior_turns() -> usize {
    6
}
fn d_answer_timeout() -> u64 {
    60
}
fn d_no_voice_grace() -> u64 {
    15
}
fn d_followup_threshold() -> f32 {
    0.6
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            max_questions: d_max_questions(),
            prior_turns: d_prior_turns(),
            answer_timeout_s: d_answer_timeout(),
            no_voice_grace_s: d_no_voice_grace(),
            followup_threshold: d_followup_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProctorConfig {
    /// Target frame rate for the vision loop.
    #[serde(default = "d_fps")]
    pub target_fps: u32,
    /// Frames older than this on arrival are dropped.
    #[serde(default = "d_stale_ms")]
    pub stale_frame_ms: u64,
    /// A verdict must hold this long before a warning is emitted.
    #[serde(default = "d_hold_s")]
    pub verdict_hold_s: u64,
    /// Dedup window per warning kind.
    #[serde(default = "d_dedup_s")]
    pub dedup_window_s: u64,
    /// Person-box confidence threshold.
    #[serde(default = "d_person_conf")]
    pub person_conf: f32,
    /// Phone-box confidence threshold.
    #[serde(default = "d_phone_conf")]
    pub phone_conf: f32,
    /// Face-center deviation (fraction of frame width) for LowAttention.
    #[serde(default = "d_attention_dev")]
    pub attention_deviation: f32,
    /// Seconds the deviation must persist for LowAttention.
    #[serde(default = "d_attention_s")]
    pub attention_hold_s: u64,
}

fn d_fps() -> u32 {
    4
}
fn d_stale_ms() -> u64 {
    500
}
fn d_hold_s() -> u64 {
    2
}
fn d_dedup_s() -> u64 {
    10
}
fn d_person_conf() -> f32 {
    0.5
}
fn d_phone_conf() -> f32 {
    0.4
}
fn d_attention_dev() -> f32 {
    0.35
}
fn d_attention_s() -> u64 {
    3
}

impl Default for ProctorConfig {
    fn default() -> Self {
        Self {
            target_fps: d_fps(),
            stale_frame_ms: d_stale_ms(),
            verdict_hold_s: d_hold_s(),
            dedup_window_s: d_dedup_s(),
            person_conf: d_person_conf(),
            phone_conf: d_phone_conf(),
            attention_deviation: d_attention_dev(),
            attention_hold_s: d_attention_s(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    #[serde(default = "d_ffmpeg")]
    pub ffmpeg_bin: String,
    #[serde(default = "d_ffprobe")]
    pub ffprobe_bin: String,
    /// Microphone track gain in the mux.
    #[serde(default = "d_mic_gain")]
    pub mic_gain: f32,
    /// TTS track gain in the mux.
    #[serde(default = "d_tts_gain")]
    pub tts_gain: f32,
}

fn d_ffmpeg() -> String {
    "ffmpeg".into()
}
fn d_ffprobe() -> String {
    "ffprobe".into()
}
fn d_mic_gain() -> f32 {
    1.0
}
fn d_tts_gain() -> f32 {
    0.8
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: d_ffmpeg(),
            ffprobe_bin: d_ffprobe(),
            mic_gain: d_mic_gain(),
            tts_gain: d_tts_gain(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodingConfig {
    /// Interpreter/runner command per language, e.g.
    /// `python = ["python3", "{source}"]`. `{source}` is replaced with
    /// the candidate source file path.
    #[serde(default = "d_runners")]
    pub runners: HashMap<String, Vec<String>>,
    /// Per-test CPU budget (seconds), enforced as wall timeout + kill.
    #[serde(default = "d_cpu_s")]
    pub cpu_time_s: u64,
    /// Memory cap passed to the runner wrapper (MB).
    #[serde(default = "d_mem_mb")]
    pub memory_mb: u64,
}

fn d_runners() -> HashMap<String, Vec<String>> {
    let mut m = HashMap::new();
    m.insert(
        "python".into(),
        vec!["python3".into(), "{source}".into()],
    );
    m.insert(
        "javascript".into(),
        vec!["node".into(), "{source}".into()],
    );
    m.insert("java".into(), vec!["java".into(), "{source}".into()]);
    m
}
fn d_cpu_s() -> u64 {
    3
}
fn d_mem_mb() -> u64 {
    256
}

impl Default for CodingConfig {
    fn default() -> Self {
        Self {
            runners: d_runners(),
            cpu_time_s: d_cpu_s(),
            memory_mb: d_mem_mb(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Env overrides & validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Apply the environment variables recognized by the core on top of
    /// whatever the file provided.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("STORAGE_ROOT") {
            self.storage.root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("IST_ZONE") {
            self.slots.zone = v;
        }
        if let Some(v) = env_parse::<u32>("SLOT_DEFAULT_DURATION_MIN") {
            self.slots.default_duration_min = v;
        }
        if let Some(v) = env_parse::<i64>("ACCESS_WINDOW_LEAD_MIN") {
            self.access.window_lead_min = v;
        }
        if let Some(v) = env_parse::<i64>("ACCESS_WINDOW_GRACE_MIN") {
            self.access.window_grace_min = v;
        }
        if let Some(v) = env_parse::<u32>("STT_ENDPOINTING_MS") {
            self.stt.endpointing_ms = v;
        }
        if let Some(v) = env_parse::<u32>("STT_UTTERANCE_END_MS") {
            self.stt.utterance_end_ms = v;
        }
        if let Some(v) = env_parse::<u64>("LLM_CALL_DEADLINE_S") {
            self.llm.call_deadline_s = v;
        }
        if let Some(v) = env_parse::<u64>("TTS_CALL_DEADLINE_S") {
            self.tts.call_deadline_s = v;
        }

        // Signing keys: HMAC_SECRET → active key id; HMAC_SECRET_{id} →
        // that id. Verification picks the key by the token's `k` field.
        if let Ok(v) = std::env::var("HMAC_SECRET") {
            if !v.is_empty() {
                self.access
                    .hmac_keys
                    .insert(self.access.active_key_id.clone(), v);
            }
        }
        for (key, value) in std::env::vars() {
            if let Some(id) = key.strip_prefix("HMAC_SECRET_") {
                if !id.is_empty() && !value.is_empty() {
                    self.access.hmac_keys.insert(id.to_lowercase(), value);
                }
            }
        }
        if !self.access.hmac_keys.is_empty() {
            tracing::debug!(keys = self.access.hmac_keys.len(), "signing keys loaded");
        }
    }

    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.server.port == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }
        if self.server.host.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.access.hmac_keys.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "access.hmac_keys".into(),
                message: "no signing key — set HMAC_SECRET or HMAC_SECRET_{key_id}".into(),
            });
        } else if !self.access.hmac_keys.contains_key(&self.access.active_key_id) {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "access.active_key_id".into(),
                message: format!(
                    "active key id \"{}\" has no configured secret",
                    self.access.active_key_id
                ),
            });
        }

        if self.access.window_lead_min < 0 || self.access.window_grace_min < 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "access".into(),
                message: "access window lead/grace must be non-negative".into(),
            });
        }

        for (section, url) in [
            ("stt.base_url", &self.stt.base_url),
            ("llm.base_url", &self.llm.base_url),
            ("tts.base_url", &self.tts.base_url),
            ("vision.base_url", &self.vision.base_url),
        ] {
            let ok = url.starts_with("http://")
                || url.starts_with("https://")
                || url.starts_with("ws://")
                || url.starts_with("wss://");
            if !ok {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Error,
                    field: section.into(),
                    message: format!("must be an http(s):// or ws(s):// URL (got \"{url}\")"),
                });
            }
        }

        if self.slots.default_duration_min == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "slots.default_duration_min".into(),
                message: "default slot duration must be positive".into(),
            });
        }

        if self.slots.zone.parse::<chrono_tz::Tz>().is_err() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "slots.zone".into(),
                message: format!("unknown timezone \"{}\"", self.slots.zone),
            });
        }

        if self.proctor.target_fps == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "proctor.target_fps".into(),
                message: "frame rate must be positive".into(),
            });
        }

        if self.dialogue.max_questions == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "dialogue.max_questions".into(),
                message: "interviews will close immediately after the preamble".into(),
            });
        }

        if self.coding.runners.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "coding.runners".into(),
                message: "no coding runners — the coding round will reject all submissions".into(),
            });
        }

        issues
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
