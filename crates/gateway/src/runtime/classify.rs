//! Candidate-message classification and answer scoring.
//!
//! A regex short-circuit handles explicit skips; everything else goes
//! to the LLM for a single-label verdict. Classification failures fall
//! back to `Answer` — mislabeling a real answer as noise is worse than
//! evaluating noise as an answer.

use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use candor_domain::error::Result;
use candor_domain::session::AnswerVerdict;
use candor_providers::{ChatMessage, ChatRequest, LlmProvider};

fn skip_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(skip|next question)\b").expect("static regex"))
}

/// Deterministic pre-checks, applied before any LLM call.
pub fn pre_classify(message: &str) -> Option<AnswerVerdict> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Some(AnswerVerdict::Empty);
    }
    if skip_regex().is_match(trimmed) {
        return Some(AnswerVerdict::Skip);
    }
    None
}

#[derive(Deserialize)]
struct VerdictWire {
    verdict: String,
}

/// Classify a candidate message against the last question.
pub async fn classify_answer(
    llm: &Arc<dyn LlmProvider>,
    deadline: Duration,
    question: &str,
    message: &str,
) -> AnswerVerdict {
    if let Some(verdict) = pre_classify(message) {
        return verdict;
    }

    let prompt = format!(
        "You are labeling one candidate message from an interview.\n\
         Question: {question}\n\
         Candidate message: {message}\n\n\
         Reply with JSON: {{\"verdict\": \"answer\" | \"repeat_request\" | \"skip\" | \"empty\"}}.\n\
         \"repeat_request\" means the candidate asked to hear the question again.\n\
         \"empty\" means the message carries no usable content."
    );

    let req = ChatRequest {
        messages: vec![ChatMessage::user(prompt)],
        temperature: Some(0.0),
        max_tokens: Some(32),
        json_mode: true,
        model: None,
    };

    match call_json::<VerdictWire>(llm, deadline, req).await {
        Ok(wire) => match wire.verdict.as_str() {
            "repeat_request" => AnswerVerdict::RepeatRequest,
            "skip" => AnswerVerdict::Skip,
            "empty" => AnswerVerdict::Empty,
            _ => AnswerVerdict::Answer,
        },
        Err(e) => {
            tracing::warn!(error = %e, "classification failed, defaulting to answer");
            AnswerVerdict::Answer
        }
    }
}

#[derive(Deserialize)]
struct CoverageWire {
    coverage: f32,
}

/// Score how completely an answer covers the question, 0..1. Scoring
/// failures return 1.0 (no follow-up) rather than punishing the
/// candidate for a provider fault.
pub async fn score_answer(
    llm: &Arc<dyn LlmProvider>,
    deadline: Duration,
    question: &str,
    answer: &str,
) -> f32 {
    let prompt = format!(
        "Rate how completely this answer covers the question, as a number 0.0 to 1.0.\n\
         Question: {question}\n\
         Answer: {answer}\n\n\
         Reply with JSON: {{\"coverage\": <number>}}."
    );
    let req = ChatRequest {
        messages: vec![ChatMessage::user(prompt)],
        temperature: Some(0.0),
        max_tokens: Some(32),
        json_mode: true,
        model: None,
    };

    match call_json::<CoverageWire>(llm, deadline, req).await {
        Ok(wire) => wire.coverage.clamp(0.0, 1.0),
        Err(e) => {
            tracing::warn!(error = %e, "answer scoring failed, assuming covered");
            1.0
        }
    }
}

#[derive(Deserialize)]
struct EmptyDecisionWire {
    action: String,
}

/// Whether to re-ask or move on after an empty answer.
pub async fn empty_decision(
    llm: &Arc<dyn LlmProvider>,
    deadline: Duration,
    question: &str,
    empties_so_far: u32,
) -> bool {
    let prompt = format!(
        "An interview candidate gave no answer to this question ({empties_so_far} empty \
         attempt(s) so far):\n{question}\n\n\
         Reply with JSON: {{\"action\": \"ask_again\" | \"move_on\"}}."
    );
    let req = ChatRequest {
        messages: vec![ChatMessage::user(prompt)],
        temperature: Some(0.0),
        max_tokens: Some(16),
        json_mode: true,
        model: None,
    };

    match call_json::<EmptyDecisionWire>(llm, deadline, req).await {
        Ok(wire) => wire.action == "ask_again",
        // Favor one more attempt when the decider is unavailable.
        Err(_) => true,
    }
}

/// Call the LLM with a deadline and parse a JSON body from the reply.
async fn call_json<T: serde::de::DeserializeOwned>(
    llm: &Arc<dyn LlmProvider>,
    deadline: Duration,
    req: ChatRequest,
) -> Result<T> {
    let resp = tokio::time::timeout(deadline, llm.chat(req))
        .await
        .map_err(|_| candor_domain::Error::Timeout("llm call deadline".into()))??;
    let body = extract_json(&resp.content);
    Ok(serde_json::from_str(body)?)
}

/// Tolerate models that wrap JSON in prose or code fences.
pub fn extract_json(content: &str) -> &str {
    let trimmed = content.trim();
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return &trimmed[start..=end];
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_phrases_short_circuit() {
        assert_eq!(pre_classify("skip"), Some(AnswerVerdict::Skip));
        assert_eq!(pre_classify("Skip this one"), Some(AnswerVerdict::Skip));
        assert_eq!(
            pre_classify("next question please"),
            Some(AnswerVerdict::Skip)
        );
        assert_eq!(pre_classify("NEXT QUESTION"), Some(AnswerVerdict::Skip));
    }

    #[test]
    fn skip_must_be_a_prefix_word() {
        assert_eq!(pre_classify("I would skip the cache here"), None);
        assert_eq!(pre_classify("skipping stones"), None);
    }

    #[test]
    fn empty_messages_short_circuit() {
        assert_eq!(pre_classify(""), Some(AnswerVerdict::Empty));
        assert_eq!(pre_classify("   \n\t"), Some(AnswerVerdict::Empty));
    }

    #[test]
    fn ordinary_answers_need_the_llm() {
        assert_eq!(pre_classify("I used a worker pool with a queue"), None);
    }

    #[test]
    fn extract_json_handles_fenced_replies() {
        assert_eq!(
            extract_json("```json\n{\"verdict\": \"skip\"}\n```"),
            "{\"verdict\": \"skip\"}"
        );
        assert_eq!(
            extract_json("Sure! {\"coverage\": 0.4} hope that helps"),
            "{\"coverage\": 0.4}"
        );
        assert_eq!(extract_json("plain text"), "plain text");
    }
}
