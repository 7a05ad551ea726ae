//! Dialogue controller — the per-session turn state machine.
//!
//! `Booting → Asking → AwaitingAnswer → Evaluating → (Follow-up | Next
//! | Closing)`. All state mutation happens under the session handle's
//! mutex; LLM and TTS calls run outside it so transcript events keep
//! flowing while the model thinks. The `Evaluating` phase guard keeps a
//! second submit from racing the first.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use candor_domain::clock::Clock;
use candor_domain::config::DialogueConfig;
use candor_domain::session::{
    AnswerVerdict, DialoguePhase, Question, QuestionLevel,
};
use candor_domain::slot::AiType;
use candor_domain::stream::PortalEvent;
use candor_providers::{ChatMessage, ChatRequest, LlmProvider};
use candor_sessions::{JobContext, SessionHandle};

use super::classify;
use super::questions;
use super::tts_cache::TtsCache;

/// Wait for a trailing final event before declaring an answer empty.
const EMPTY_SNAPSHOT_WAIT_MS: u64 = 1_000;

pub struct DialogueController {
    llm: Arc<dyn LlmProvider>,
    tts: Arc<TtsCache>,
    clock: Arc<dyn Clock>,
    cfg: DialogueConfig,
    voice: String,
    llm_deadline: Duration,
}

impl DialogueController {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        tts: Arc<TtsCache>,
        clock: Arc<dyn Clock>,
        cfg: DialogueConfig,
        voice: String,
        llm_deadline_s: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            llm,
            tts,
            clock,
            cfg,
            voice,
            llm_deadline: Duration::from_secs(llm_deadline_s),
        })
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Session start
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    /// First entry into the dialogue. Idempotent — a resume while the
    /// session is already past `Booting` changes nothing.
    pub async fn begin(self: &Arc<Self>, handle: &Arc<SessionHandle>) {
        {
            let mut state = handle.state.lock().await;
            if state.phase != DialoguePhase::Booting {
                return;
            }
            state.phase = DialoguePhase::Preamble;
        }

        let question = self.generate_question(handle, QuestionLevel::Main).await;
        let preamble =
            questions::preamble(&handle.job.candidate_name, &handle.job.company);
        let opening = Question {
            text: format!("{preamble}\n\n{}", question.text),
            ..question
        };
        self.ask(handle, opening).await;
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Asking
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Speak a question: synthesize audio, record the interviewer turn,
    /// push to the candidate, arm the answer timer.
    async fn ask(self: &Arc<Self>, handle: &Arc<SessionHandle>, question: Question) {
        let audio_url = match self
            .tts
            .synthesize(&question.text, &self.voice, &handle.job.language)
            .await
        {
            Ok(r) => Some(r),
            Err(e) => {
                // Continue text-only.
                tracing::warn!(session_id = %handle.id, error = %e, "tts failed");
                None
            }
        };

        let now = self.clock.now_utc();
        {
            let mut state = handle.state.lock().await;
            if state.terminal.is_some() {
                return;
            }
            let sequence = state
                .turns
                .record_interviewer(&question.text, audio_url.clone(), now);
            state.last_question = Some(question.clone());
            state.question_asked_at = Some(now);
            state.phase = DialoguePhase::AwaitingAnswer;
            state.accumulator.begin_new_turn();
            handle.push(PortalEvent::Question {
                sequence,
                text: question.text.clone(),
                audio_url,
            });
        }

        self.spawn_answer_watchdog(handle.clone(), now);
    }

    /// Auto-submit when the candidate goes quiet: 60 s after the first
    /// voice of the turn, or a 15 s grace when no voice was ever heard.
    fn spawn_answer_watchdog(
        self: &Arc<Self>,
        handle: Arc<SessionHandle>,
        asked_at: chrono::DateTime<chrono::Utc>,
    ) {
        let controller = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;
                if handle.cancel.is_cancelled() {
                    return;
                }
                let due = {
                    let state = handle.state.lock().await;
                    // A newer question supersedes this watchdog.
                    if state.phase != DialoguePhase::AwaitingAnswer
                        || state.question_asked_at != Some(asked_at)
                    {
                        return;
                    }
                    let now = controller.clock.now_utc();
                    let deadline = match state.accumulator.first_voice_at() {
                        Some(first_voice) => {
                            first_voice
                                + chrono::Duration::seconds(
                                    controller.cfg.answer_timeout_s as i64,
                                )
                        }
                        None => {
                            asked_at
                                + chrono::Duration::seconds(
                                    controller.cfg.no_voice_grace_s as i64,
                                )
                        }
                    };
                    now >= deadline
                };
                if due {
                    tracing::debug!(session_id = %handle.id, "answer timer fired");
                    controller.submit_answer(&handle, None).await;
                    return;
                }
            }
        });
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Answer handling
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Process a candidate submission (explicit button, typed fallback
    /// text, or the inactivity timer).
    pub async fn submit_answer(
        self: &Arc<Self>,
        handle: &Arc<SessionHandle>,
        typed: Option<String>,
    ) {
        // ── Claim the turn ────────────────────────────────────────
        let (question, asked_at) = {
            let mut state = handle.state.lock().await;
            if state.terminal.is_some()
                || state.coding_active
                || state.phase != DialoguePhase::AwaitingAnswer
            {
                return;
            }
            state.phase = DialoguePhase::Evaluating;
            let question = match state.last_question.clone() {
                Some(q) => q,
                None => return,
            };
            (question, state.question_asked_at)
        };

        // ── Snapshot the answer text ──────────────────────────────
        let mut text = match &typed {
            Some(t) => t.trim().to_string(),
            None => {
                let state = handle.state.lock().await;
                state.accumulator.snapshot()
            }
        };
        if text.is_empty() {
            // A final event may still be in flight from the provider.
            tokio::time::sleep(Duration::from_millis(EMPTY_SNAPSHOT_WAIT_MS)).await;
            let state = handle.state.lock().await;
            text = state.accumulator.snapshot();
        }

        let verdict = classify::classify_answer(
            &self.llm,
            self.llm_deadline,
            &question.text,
            &text,
        )
        .await;

        let now = self.clock.now_utc();
        let response_time_ms = asked_at
            .map(|t| (now - t).num_milliseconds().max(0) as u64)
            .unwrap_or(0);

        tracing::debug!(
            session_id = %handle.id,
            ?verdict,
            response_time_ms,
            "answer classified"
        );

        match verdict {
            AnswerVerdict::Answer => {
                self.handle_answer(handle, &question, &text, response_time_ms)
                    .await;
            }
            AnswerVerdict::RepeatRequest => {
                {
                    let mut state = handle.state.lock().await;
                    state.turns.record_candidate(&text, response_time_ms, now);
                }
                let rephrased = self.rephrase_question(&question).await;
                self.ask(handle, rephrased).await;
            }
            AnswerVerdict::Skip => {
                {
                    let mut state = handle.state.lock().await;
                    state.turns.record_candidate(&text, response_time_ms, now);
                    // A skipped question scores zero coverage.
                    state.turn_scores.push(0.0);
                }
                self.advance(handle).await;
            }
            AnswerVerdict::Empty => {
                self.handle_empty(handle, &question).await;
            }
        }
    }

    async fn handle_answer(
        self: &Arc<Self>,
        handle: &Arc<SessionHandle>,
        question: &Question,
        text: &str,
        response_time_ms: u64,
    ) {
        let score =
            classify::score_answer(&self.llm, self.llm_deadline, &question.text, text).await;

        let follow_up = {
            let mut state = handle.state.lock().await;
            let now = self.clock.now_utc();
            state.turns.record_candidate(text, response_time_ms, now);
            state.turn_scores.push(score);
            state.consecutive_empties = 0;
            question.level == QuestionLevel::Main && score < self.cfg.followup_threshold
        };

        if follow_up {
            let q = self.generate_question(handle, QuestionLevel::FollowUp).await;
            self.ask(handle, q).await;
        } else {
            self.advance(handle).await;
        }
    }

    async fn handle_empty(self: &Arc<Self>, handle: &Arc<SessionHandle>, question: &Question) {
        let empties = {
            let mut state = handle.state.lock().await;
            state.consecutive_empties += 1;
            state.consecutive_empties
        };

        // Two consecutive empties per MAIN question force progress.
        let ask_again = empties < 2
            && classify::empty_decision(&self.llm, self.llm_deadline, &question.text, empties)
                .await;

        if ask_again {
            let now = self.clock.now_utc();
            let mut state = handle.state.lock().await;
            let sequence = state.turns.record_system(questions::EMPTY_RETRY_PROMPT, now);
            state.question_asked_at = Some(now);
            state.phase = DialoguePhase::AwaitingAnswer;
            state.accumulator.begin_new_turn();
            handle.push(PortalEvent::Question {
                sequence,
                text: questions::EMPTY_RETRY_PROMPT.to_string(),
                audio_url: None,
            });
            drop(state);
            self.spawn_answer_watchdog(handle.clone(), now);
        } else {
            {
                let now = self.clock.now_utc();
                let mut state = handle.state.lock().await;
                state.turns.record_system("no answer given, moving on", now);
                state.turn_scores.push(0.0);
            }
            self.advance(handle).await;
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Next / Closing
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Move to the next MAIN question, or close the dialogue when the
    /// question budget is spent.
    async fn advance(self: &Arc<Self>, handle: &Arc<SessionHandle>) {
        let closing = {
            let mut state = handle.state.lock().await;
            state.consecutive_empties = 0;
            if state.question_index + 1 >= state.max_questions {
                true
            } else {
                state.question_index += 1;
                false
            }
        };

        if closing {
            self.close(handle).await;
        } else {
            let q = self.generate_question(handle, QuestionLevel::Main).await;
            self.ask(handle, q).await;
        }
    }

    async fn close(self: &Arc<Self>, handle: &Arc<SessionHandle>) {
        let coding_round = handle.job.ai_type == AiType::Coding;
        let text = questions::closing_statement(coding_round);

        let audio_url = self
            .tts
            .synthesize(text, &self.voice, &handle.job.language)
            .await
            .ok();

        let now = self.clock.now_utc();
        let mut state = handle.state.lock().await;
        let sequence = state.turns.record_interviewer(text, audio_url.clone(), now);
        state.phase = DialoguePhase::Closing;
        state.coding_active = coding_round;
        handle.push(PortalEvent::Question {
            sequence,
            text: text.to_string(),
            audio_url,
        });
        tracing::info!(session_id = %handle.id, coding_round, "dialogue closing");
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Degradation & coding suspension
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// The STT relay gave up; the candidate continues by typing.
    pub async fn stream_ended(&self, handle: &Arc<SessionHandle>, error: Option<String>) {
        let now = self.clock.now_utc();
        let mut state = handle.state.lock().await;
        if state.terminal.is_some() || state.text_only {
            return;
        }
        state.text_only = true;
        state
            .turns
            .record_system("transcription unavailable, candidate switched to text input", now);
        handle.push(PortalEvent::TranscriptionUnavailable);
        if let Some(e) = error {
            tracing::warn!(session_id = %handle.id, error = %e, "session degraded to text-only");
        }
    }

    /// A coding submission arrived; dialogue stays suspended until the
    /// coding round finalizes.
    pub async fn suspend_for_coding(&self, handle: &Arc<SessionHandle>) {
        let mut state = handle.state.lock().await;
        state.coding_active = true;
    }

    pub async fn resume_after_coding(&self, handle: &Arc<SessionHandle>) {
        let mut state = handle.state.lock().await;
        state.coding_active = false;
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Question generation
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Generate the next question from the job context and recent
    /// turns. Any failure (deadline, malformed reply, empty text) takes
    /// the canned fallback path.
    async fn generate_question(
        self: &Arc<Self>,
        handle: &Arc<SessionHandle>,
        level: QuestionLevel,
    ) -> Question {
        let (prompt, question_index) = {
            let state = handle.state.lock().await;
            let prior: Vec<String> = state
                .turns
                .tail(self.cfg.prior_turns)
                .iter()
                .map(|t| format!("{:?}: {}", t.role, t.text))
                .collect();
            (
                build_question_prompt(&handle.job, &prior, level),
                state.question_index,
            )
        };

        let req = ChatRequest {
            messages: vec![ChatMessage::user(prompt)],
            temperature: Some(0.7),
            max_tokens: Some(256),
            json_mode: true,
            model: None,
        };

        let generated = tokio::time::timeout(self.llm_deadline, self.llm.chat(req)).await;
        match generated {
            Ok(Ok(resp)) => match parse_question(&resp.content, level) {
                Some(q) => return q,
                None => {
                    tracing::warn!(session_id = %handle.id, "malformed question from llm");
                }
            },
            Ok(Err(e)) => {
                tracing::warn!(session_id = %handle.id, error = %e, "question generation failed");
            }
            Err(_) => {
                tracing::warn!(session_id = %handle.id, "question generation deadline expired");
            }
        }

        // Fallback path: canned per-topic question.
        {
            let mut state = handle.state.lock().await;
            state.fallback_events += 1;
        }
        tracing::info!(session_id = %handle.id, "fallback question used");
        questions::fallback_question(handle.job.ai_type, question_index)
    }

    async fn rephrase_question(&self, question: &Question) -> Question {
        let req = ChatRequest {
            messages: vec![ChatMessage::user(format!(
                "Rephrase this interview question without changing its substance:\n{}\n\n\
                 Reply with JSON: {{\"question_text\": \"...\"}}.",
                question.text
            ))],
            temperature: Some(0.7),
            max_tokens: Some(256),
            json_mode: true,
            model: None,
        };

        let rephrased = tokio::time::timeout(self.llm_deadline, self.llm.chat(req)).await;
        let text = match rephrased {
            Ok(Ok(resp)) => parse_question(&resp.content, question.level)
                .map(|q| q.text)
                .unwrap_or_default(),
            _ => String::new(),
        };

        Question {
            text: if text.is_empty() {
                format!("Let me rephrase: {}", question.text)
            } else {
                text
            },
            level: question.level,
            topic_tag: question.topic_tag.clone(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Prompt building & parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn build_question_prompt(job: &JobContext, prior_turns: &[String], level: QuestionLevel) -> String {
    let kind = match level {
        QuestionLevel::Main => "the next main interview question",
        QuestionLevel::FollowUp => {
            "one follow-up question digging into the candidate's last answer"
        }
    };
    format!(
        "You are conducting a {ai_type:?} interview ({difficulty:?} difficulty) in {language} \
         for the role of {role} at {company}.\n\
         Job description: {jd}\n\
         Candidate resume: {resume}\n\
         Recent turns:\n{turns}\n\n\
         Produce {kind}. Reply with JSON: \
         {{\"question_text\": \"...\", \"level\": \"MAIN\" | \"FOLLOW_UP\", \"topic_tag\": \"...\"}}.",
        ai_type = job.ai_type,
        difficulty = job.difficulty,
        language = job.language,
        role = job.role,
        company = job.company,
        jd = job.job_description,
        resume = job.candidate_resume,
        turns = prior_turns.join("\n"),
    )
}

#[derive(Deserialize)]
struct QuestionWire {
    question_text: String,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    topic_tag: Option<String>,
}

fn parse_question(content: &str, requested: QuestionLevel) -> Option<Question> {
    let wire: QuestionWire = serde_json::from_str(classify::extract_json(content)).ok()?;
    let text = wire.question_text.trim().to_string();
    if text.is_empty() {
        return None;
    }
    let level = match wire.level.as_deref() {
        Some("FOLLOW_UP") => QuestionLevel::FollowUp,
        Some("MAIN") => QuestionLevel::Main,
        _ => requested,
    };
    Some(Question {
        text,
        level,
        topic_tag: wire.topic_tag.unwrap_or_else(|| "general".into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use candor_domain::clock::SystemClock;
    use candor_domain::error::Result;
    use candor_domain::session::{TurnRole};
    use candor_domain::slot::Difficulty;
    use candor_providers::{ChatResponse, TtsProvider};
    use uuid::Uuid;

    /// Routes by prompt content: question generation gets a valid
    /// question, classification echoes a configured verdict, the
    /// empty-answer decider asks again.
    struct ScriptedLlm {
        coverage: f32,
    }

    #[async_trait::async_trait]
    impl LlmProvider for ScriptedLlm {
        async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
            let prompt = &req.messages.last().unwrap().content;
            let content = if prompt.contains("\"verdict\"") {
                r#"{"verdict": "answer"}"#.to_string()
            } else if prompt.contains("\"coverage\"") {
                format!(r#"{{"coverage": {}}}"#, self.coverage)
            } else if prompt.contains("\"action\"") {
                r#"{"action": "ask_again"}"#.to_string()
            } else if prompt.contains("Rephrase") {
                r#"{"question_text": "Put differently, what was hard about it?"}"#.to_string()
            } else {
                r#"{"question_text": "Tell me about your hardest bug.",
                    "level": "MAIN", "topic_tag": "debugging"}"#
                    .to_string()
            };
            Ok(ChatResponse {
                content,
                model: "scripted".into(),
            })
        }

        fn provider_id(&self) -> &str {
            "scripted"
        }
    }

    struct SilentTts;

    #[async_trait::async_trait]
    impl TtsProvider for SilentTts {
        async fn synthesize(&self, _t: &str, _v: &str, _l: &str) -> Result<Vec<u8>> {
            Ok(vec![0u8; 4])
        }

        fn provider_id(&self) -> &str {
            "silent"
        }
    }

    fn controller(coverage: f32, dir: &tempfile::TempDir) -> Arc<DialogueController> {
        let storage = Arc::new(Storage::new(dir.path()));
        storage.ensure_layout().unwrap();
        let tts = Arc::new(TtsCache::new(
            Arc::new(SilentTts),
            storage,
            &candor_domain::config::TtsConfig::default(),
        ));
        DialogueController::new(
            Arc::new(ScriptedLlm { coverage }),
            tts,
            Arc::new(SystemClock),
            DialogueConfig {
                max_questions: 2,
                ..Default::default()
            },
            "alloy".into(),
            20,
        )
    }

    fn handle(max_questions: u32) -> Arc<SessionHandle> {
        SessionHandle::new(
            Uuid::new_v4(),
            JobContext {
                candidate_name: "Jane".into(),
                company: "acme".into(),
                role: "backend".into(),
                job_description: "rust services".into(),
                candidate_resume: "5y".into(),
                ai_type: AiType::Technical,
                difficulty: Difficulty::Medium,
                language: "en".into(),
            },
            max_questions,
            10,
            chrono::Utc::now(),
            chrono::Utc::now() + chrono::Duration::minutes(30),
        )
    }

    #[tokio::test]
    async fn begin_asks_the_first_question() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(0.9, &dir);
        let h = handle(3);

        controller.begin(&h).await;
        let state = h.state.lock().await;
        assert_eq!(state.phase, DialoguePhase::AwaitingAnswer);
        assert_eq!(state.turns.len(), 1);
        let first = &state.turns.all()[0];
        assert_eq!(first.role, TurnRole::Interviewer);
        assert_eq!(first.sequence, 0);
        assert!(first.text.contains("hardest bug"));
        assert!(first.audio_url.is_some());
    }

    #[tokio::test]
    async fn begin_is_idempotent_on_resume() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(0.9, &dir);
        let h = handle(3);
        controller.begin(&h).await;
        controller.begin(&h).await;
        assert_eq!(h.state.lock().await.turns.len(), 1);
    }

    #[tokio::test]
    async fn good_answer_advances_to_next_question() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(0.9, &dir);
        let h = handle(3);
        controller.begin(&h).await;

        controller
            .submit_answer(&h, Some("I rebuilt the retry logic around idempotency keys".into()))
            .await;

        let state = h.state.lock().await;
        assert_eq!(state.question_index, 1);
        assert_eq!(state.phase, DialoguePhase::AwaitingAnswer);
        // Interviewer, candidate, interviewer.
        assert_eq!(state.turns.len(), 3);
        assert_eq!(state.turn_scores.len(), 1);
        assert!((state.turn_scores[0] - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn weak_answer_earns_a_follow_up_without_advancing() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(0.3, &dir);
        let h = handle(3);
        controller.begin(&h).await;

        controller.submit_answer(&h, Some("it was hard".into())).await;

        let state = h.state.lock().await;
        // Index unchanged: the follow-up belongs to the same MAIN question.
        assert_eq!(state.question_index, 0);
        assert_eq!(state.phase, DialoguePhase::AwaitingAnswer);
        assert_eq!(state.turns.len(), 3);
    }

    #[tokio::test]
    async fn skip_advances_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(0.9, &dir);
        let h = handle(3);
        controller.begin(&h).await;

        controller.submit_answer(&h, Some("skip".into())).await;

        let state = h.state.lock().await;
        assert_eq!(state.question_index, 1);
        assert_eq!(state.turn_scores, vec![0.0]);
    }

    #[tokio::test]
    async fn two_empties_force_next_question() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(0.9, &dir);
        let h = handle(3);
        controller.begin(&h).await;

        // First empty: retry prompt, same question.
        controller.submit_answer(&h, Some("".into())).await;
        {
            let state = h.state.lock().await;
            assert_eq!(state.question_index, 0);
            assert_eq!(state.phase, DialoguePhase::AwaitingAnswer);
            let last = state.turns.all().last().unwrap();
            assert_eq!(last.role, TurnRole::System);
            assert_eq!(last.text, questions::EMPTY_RETRY_PROMPT);
        }

        // Second empty: forced next, no further retry.
        controller.submit_answer(&h, Some("".into())).await;
        {
            let state = h.state.lock().await;
            assert_eq!(state.question_index, 1);
            assert_eq!(state.phase, DialoguePhase::AwaitingAnswer);
            assert_eq!(state.consecutive_empties, 0);
        }
    }

    #[tokio::test]
    async fn last_question_leads_to_closing() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(0.9, &dir);
        let h = handle(1);
        controller.begin(&h).await;

        controller.submit_answer(&h, Some("a full answer".into())).await;

        let state = h.state.lock().await;
        assert_eq!(state.phase, DialoguePhase::Closing);
        assert!(!state.coding_active, "technical interview has no coding round");
    }

    #[tokio::test]
    async fn coding_interview_enters_coding_round_at_closing() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(0.9, &dir);
        let h = SessionHandle::new(
            Uuid::new_v4(),
            JobContext {
                candidate_name: "Jane".into(),
                company: "acme".into(),
                role: "backend".into(),
                job_description: String::new(),
                candidate_resume: String::new(),
                ai_type: AiType::Coding,
                difficulty: Difficulty::Medium,
                language: "en".into(),
            },
            1,
            10,
            chrono::Utc::now(),
            chrono::Utc::now() + chrono::Duration::minutes(30),
        );
        controller.begin(&h).await;
        controller.submit_answer(&h, Some("done".into())).await;

        let state = h.state.lock().await;
        assert_eq!(state.phase, DialoguePhase::Closing);
        assert!(state.coding_active);
    }

    #[tokio::test]
    async fn stream_ended_degrades_to_text_only_once() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(0.9, &dir);
        let h = handle(3);
        controller.begin(&h).await;

        controller.stream_ended(&h, Some("provider gone".into())).await;
        controller.stream_ended(&h, None).await;

        let state = h.state.lock().await;
        assert!(state.text_only);
        let system_turns = state
            .turns
            .all()
            .iter()
            .filter(|t| t.role == TurnRole::System)
            .count();
        assert_eq!(system_turns, 1);
    }

    #[tokio::test]
    async fn submits_ignored_while_coding_round_is_active() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(0.9, &dir);
        let h = handle(3);
        controller.begin(&h).await;
        controller.suspend_for_coding(&h).await;

        controller.submit_answer(&h, Some("mid-coding chatter".into())).await;
        let state = h.state.lock().await;
        assert_eq!(state.turns.len(), 1, "no candidate turn recorded");
        drop(state);

        controller.resume_after_coding(&h).await;
        controller.submit_answer(&h, Some("real answer".into())).await;
        assert_eq!(h.state.lock().await.turns.len(), 3);
    }
}
