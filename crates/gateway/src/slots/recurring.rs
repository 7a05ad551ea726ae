//! Recurring slot patterns: a weekday set expanded over a horizon.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use serde::Deserialize;

use candor_domain::slot::{AiType, Difficulty};

use super::NewSlot;

/// A weekly pattern. Every matching weekday within
/// `[from, from + horizon_days)` yields one slot candidate; overlaps
/// with existing slots are skipped at creation time.
#[derive(Debug, Clone, Deserialize)]
pub struct RecurringPattern {
    pub company: String,
    pub job: String,
    pub weekdays: Vec<Weekday>,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub from: NaiveDate,
    pub horizon_days: u32,
    pub capacity: u32,
    pub ai_type: AiType,
    #[serde(default)]
    pub difficulty: Difficulty,
    pub language: String,
}

impl RecurringPattern {
    /// Expand into per-day slot requests, in date order.
    pub fn expand(&self) -> Vec<NewSlot> {
        let mut out = Vec::new();
        for offset in 0..self.horizon_days {
            let date = self.from + Duration::days(offset as i64);
            if !self.weekdays.contains(&date.weekday()) {
                continue;
            }
            out.push(NewSlot {
                company: self.company.clone(),
                job: self.job.clone(),
                date,
                start: self.start,
                end: self.end,
                capacity: self.capacity,
                ai_type: self.ai_type,
                difficulty: self.difficulty,
                language: self.language.clone(),
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(weekdays: &[Weekday], horizon_days: u32) -> RecurringPattern {
        RecurringPattern {
            company: "acme".into(),
            job: "backend".into(),
            weekdays: weekdays.iter().copied().collect(),
            start: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
            // 2025-06-02 is a Monday.
            from: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            horizon_days,
            capacity: 2,
            ai_type: AiType::Technical,
            difficulty: Difficulty::Medium,
            language: "en".into(),
        }
    }

    #[test]
    fn expands_only_matching_weekdays() {
        let p = pattern(&[Weekday::Mon, Weekday::Wed], 7);
        let slots = p.expand();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].date.weekday(), Weekday::Mon);
        assert_eq!(slots[1].date.weekday(), Weekday::Wed);
    }

    #[test]
    fn two_week_horizon_repeats_the_pattern() {
        let p = pattern(&[Weekday::Fri], 14);
        let slots = p.expand();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[1].date - slots[0].date, Duration::days(7));
    }

    #[test]
    fn empty_weekday_set_yields_nothing() {
        let p = pattern(&[], 30);
        assert!(p.expand().is_empty());
    }
}
