//! Canned fallback questions, drawn per topic when the LLM fails to
//! produce a usable question within its deadline.

use candor_domain::session::{Question, QuestionLevel};
use candor_domain::slot::AiType;

struct TopicBank {
    topic: &'static str,
    questions: &'static [&'static str],
}

const TECHNICAL: &[TopicBank] = &[
    TopicBank {
        topic: "fundamentals",
        questions: &[
            "Walk me through a technically challenging project you worked on recently. What made it hard?",
            "How do you decide between optimizing for readability and optimizing for performance?",
            "Describe a production bug you diagnosed. How did you narrow it down?",
        ],
    },
    TopicBank {
        topic: "data-structures",
        questions: &[
            "When would you reach for a hash map over a sorted structure, and what trade-offs come with that?",
            "Describe a situation where the obvious data structure was the wrong choice.",
        ],
    },
    TopicBank {
        topic: "concurrency",
        questions: &[
            "Explain a race condition you have actually encountered and how you fixed it.",
            "How do you reason about shared state when multiple workers touch the same records?",
        ],
    },
];

const BEHAVIORAL: &[TopicBank] = &[
    TopicBank {
        topic: "collaboration",
        questions: &[
            "Tell me about a disagreement with a teammate over a technical decision. How was it resolved?",
            "Describe a time you had to deliver difficult feedback.",
        ],
    },
    TopicBank {
        topic: "ownership",
        questions: &[
            "Tell me about a time you took ownership of a problem outside your direct responsibility.",
            "Describe a project that slipped. What did you change afterwards?",
        ],
    },
];

const SYSTEM_DESIGN: &[TopicBank] = &[TopicBank {
    topic: "design",
    questions: &[
        "Sketch the design of a rate limiter shared across several API servers.",
        "How would you design a job scheduler that must survive process restarts?",
    ],
}];

const CODING: &[TopicBank] = &[TopicBank {
    topic: "coding",
    questions: &[
        "Before we move to the coding exercise: how do you usually structure your approach to an unfamiliar problem?",
        "What do you check first when your solution passes the examples but fails hidden tests?",
    ],
}];

const GENERAL: &[TopicBank] = &[TopicBank {
    topic: "general",
    questions: &[
        "Tell me about yourself and what kind of work you enjoy most.",
        "What attracted you to this role?",
        "Where do you want to grow over the next couple of years?",
    ],
}];

fn banks_for(ai_type: AiType) -> &'static [TopicBank] {
    match ai_type {
        AiType::Technical => TECHNICAL,
        AiType::Behavioral => BEHAVIORAL,
        AiType::SystemDesign => SYSTEM_DESIGN,
        AiType::Coding => CODING,
        AiType::General => GENERAL,
    }
}

/// Pick a fallback question for the given question index. Cycles
/// through topics and their questions deterministically so consecutive
/// fallbacks do not repeat.
pub fn fallback_question(ai_type: AiType, question_index: u32) -> Question {
    let banks = banks_for(ai_type);
    let bank = &banks[(question_index as usize) % banks.len()];
    let text = bank.questions[(question_index as usize / banks.len()) % bank.questions.len()];
    Question {
        text: text.to_string(),
        level: QuestionLevel::Main,
        topic_tag: bank.topic.to_string(),
    }
}

/// Opening line spoken before the first question.
pub fn preamble(candidate_name: &str, company: &str) -> String {
    let who = if company.is_empty() {
        "the team".to_string()
    } else {
        company.to_string()
    };
    format!(
        "Hello {candidate_name}, welcome to your interview with {who}. \
         I'll ask a series of questions; take your time, and say \
         \"repeat\" if you'd like a question again. Let's begin."
    )
}

/// Closing statement spoken after the last question.
pub fn closing_statement(coding_round: bool) -> &'static str {
    if coding_round {
        "That completes the discussion part. Next you'll see a short coding exercise — \
         take your time and submit when ready."
    } else {
        "That completes the interview. Thank you for your time — \
         your results will be shared with the team."
    }
}

/// Nudge used after an empty answer.
pub const EMPTY_RETRY_PROMPT: &str = "I didn't catch that, please try again.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_fallbacks_differ() {
        let a = fallback_question(AiType::Technical, 0);
        let b = fallback_question(AiType::Technical, 1);
        let c = fallback_question(AiType::Technical, 2);
        assert_ne!(a.text, b.text);
        assert_ne!(b.text, c.text);
    }

    #[test]
    fn every_type_has_a_bank() {
        for t in [
            AiType::Technical,
            AiType::Behavioral,
            AiType::Coding,
            AiType::SystemDesign,
            AiType::General,
        ] {
            for i in 0..10 {
                assert!(!fallback_question(t, i).text.is_empty());
            }
        }
    }
}
