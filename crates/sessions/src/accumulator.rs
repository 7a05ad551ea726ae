//! Transcript accumulator: merges interim/final STT fragments into a
//! stable utterance.
//!
//! `accumulated` never shrinks between `begin_new_turn` calls; interim
//! text is display-only and never persisted. Providers resend final
//! fragments in overlapping forms, so the merge has to dedupe by
//! substring containment before falling back to concatenation.

use chrono::{DateTime, Utc};

use candor_domain::stream::SttEvent;

#[derive(Debug, Default)]
pub struct TranscriptAccumulator {
    accumulated: String,
    interim: String,
    turn_index: u32,
    last_seen_at: Option<DateTime<Utc>>,
    last_final_at: Option<DateTime<Utc>>,
    /// First non-empty recognition of the current turn.
    first_voice_at: Option<DateTime<Utc>>,
    /// Any voice seen across the whole session.
    has_voice_ever: bool,
}

impl TranscriptAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one STT event. Returns `true` when this event is the first
    /// voice of the current turn (the dialogue controller arms its
    /// inactivity timer on it).
    pub fn apply(&mut self, e: &SttEvent) -> bool {
        self.last_seen_at = Some(e.arrived_at);

        let text = e.text.trim();
        if text.is_empty() {
            return false;
        }

        let first_voice = self.first_voice_at.is_none();
        if first_voice {
            self.first_voice_at = Some(e.arrived_at);
        }
        self.has_voice_ever = true;

        if e.is_final {
            if self.accumulated.is_empty() {
                self.accumulated = text.to_string();
            } else if self.accumulated.contains(text) {
                // Provider resent a fragment we already hold.
            } else if text.contains(self.accumulated.as_str()) {
                // Provider resent the longer form.
                self.accumulated = text.to_string();
            } else {
                self.accumulated.push(' ');
                self.accumulated.push_str(text);
            }
            self.interim.clear();
            self.last_final_at = Some(e.arrived_at);
        } else if !self.accumulated.is_empty() && text.starts_with(self.accumulated.as_str()) {
            // Show only the unconfirmed tail.
            self.interim = text[self.accumulated.len()..].trim_start().to_string();
        } else {
            self.interim = text.to_string();
        }

        first_voice
    }

    /// Finalized text, trimmed.
    pub fn snapshot(&self) -> String {
        self.accumulated.trim().to_string()
    }

    /// Finalized + interim, for live display only.
    pub fn full_for_display(&self) -> String {
        if self.interim.is_empty() {
            self.snapshot()
        } else if self.accumulated.is_empty() {
            self.interim.clone()
        } else {
            format!("{} {}", self.accumulated.trim(), self.interim)
        }
    }

    /// Atomically clear both buffers and advance the turn index.
    pub fn begin_new_turn(&mut self) {
        self.accumulated.clear();
        self.interim.clear();
        self.first_voice_at = None;
        self.last_final_at = None;
        self.turn_index += 1;
    }

    pub fn turn_index(&self) -> u32 {
        self.turn_index
    }

    pub fn first_voice_at(&self) -> Option<DateTime<Utc>> {
        self.first_voice_at
    }

    pub fn last_final_at(&self) -> Option<DateTime<Utc>> {
        self.last_final_at
    }

    pub fn has_voice_ever(&self) -> bool {
        self.has_voice_ever
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(text: &str, is_final: bool) -> SttEvent {
        SttEvent {
            text: text.into(),
            is_final,
            arrived_at: Utc::now(),
            speaker_count: None,
        }
    }

    /// Squash whitespace for prefix-order comparisons.
    fn norm(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn interleaved_interim_and_final_fragments() {
        let mut acc = TranscriptAccumulator::new();
        acc.apply(&ev("Hello", false));
        acc.apply(&ev("Hello my", false));
        acc.apply(&ev("Hello my name", true));
        acc.apply(&ev("is", false));
        acc.apply(&ev("is John", true));
        assert_eq!(acc.snapshot(), "Hello my name is John");
    }

    #[test]
    fn resent_fragment_is_ignored() {
        let mut acc = TranscriptAccumulator::new();
        acc.apply(&ev("the quick brown fox", true));
        acc.apply(&ev("quick brown", true));
        assert_eq!(acc.snapshot(), "the quick brown fox");
    }

    #[test]
    fn longer_resend_replaces() {
        let mut acc = TranscriptAccumulator::new();
        acc.apply(&ev("the quick", true));
        acc.apply(&ev("the quick brown fox", true));
        assert_eq!(acc.snapshot(), "the quick brown fox");
    }

    #[test]
    fn interim_shows_only_unconfirmed_tail() {
        let mut acc = TranscriptAccumulator::new();
        acc.apply(&ev("good morning", true));
        acc.apply(&ev("good morning everyone", false));
        assert_eq!(acc.snapshot(), "good morning");
        assert_eq!(acc.full_for_display(), "good morning everyone");
    }

    #[test]
    fn whitespace_only_events_change_nothing() {
        let mut acc = TranscriptAccumulator::new();
        acc.apply(&ev("hello", true));
        acc.apply(&ev("   ", true));
        acc.apply(&ev("", false));
        assert_eq!(acc.snapshot(), "hello");
        assert!(!acc.full_for_display().contains("  "));
    }

    #[test]
    fn accumulated_is_monotonic_within_a_turn() {
        let mut acc = TranscriptAccumulator::new();
        let events = [
            ev("I worked", false),
            ev("I worked on", true),
            ev("a payments", false),
            ev("a payments system", true),
            ev("a payments system", true),
            ev("for three years", true),
        ];
        let mut prev = String::new();
        for e in &events {
            acc.apply(e);
            let cur = norm(&acc.snapshot());
            assert!(
                cur.starts_with(&prev),
                "shrank: {prev:?} -> {cur:?}"
            );
            prev = cur;
        }
    }

    #[test]
    fn begin_new_turn_resets_everything() {
        let mut acc = TranscriptAccumulator::new();
        acc.apply(&ev("first answer", true));
        assert!(acc.first_voice_at().is_some());
        acc.begin_new_turn();
        assert_eq!(acc.snapshot(), "");
        assert_eq!(acc.full_for_display(), "");
        assert!(acc.first_voice_at().is_none());
        assert_eq!(acc.turn_index(), 1);
        // Voice-ever survives turn resets.
        assert!(acc.has_voice_ever());
    }

    #[test]
    fn first_voice_reported_once_per_turn() {
        let mut acc = TranscriptAccumulator::new();
        assert!(acc.apply(&ev("hi", false)));
        assert!(!acc.apply(&ev("hi there", false)));
        acc.begin_new_turn();
        assert!(acc.apply(&ev("next", false)));
    }
}
