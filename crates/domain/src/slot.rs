//! Slot & booking data model.
//!
//! Slot times are stored as (date, local time-of-day) in the
//! presentation zone (IST) and converted to UTC for every temporal
//! comparison. `status` is NOT stored — it is derived from `canceled`
//! and the capacity counters, so the `Full ⇔ booked_count = capacity`
//! invariant holds by construction.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::ist_to_utc;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Enums
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AiType {
    Technical,
    Behavioral,
    Coding,
    SystemDesign,
    General,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Default for Difficulty {
    fn default() -> Self {
        Self::Medium
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Available,
    Full,
    Canceled,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Canceled,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Slot
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A bookable interview window with strict capacity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Slot {
    pub id: Uuid,
    pub company: String,
    pub job: String,
    /// Slot-local date in the presentation zone.
    pub date: NaiveDate,
    /// Slot-local start time-of-day (IST).
    pub start: NaiveTime,
    /// Slot-local end time-of-day (IST).
    pub end: NaiveTime,
    pub capacity: u32,
    #[serde(default)]
    pub booked_count: u32,
    #[serde(default)]
    pub canceled: bool,
    pub ai_type: AiType,
    #[serde(default)]
    pub difficulty: Difficulty,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Slot {
    /// Derive status from stored state. Never persisted.
    pub fn status(&self) -> SlotStatus {
        if self.canceled {
            SlotStatus::Canceled
        } else if self.booked_count >= self.capacity {
            SlotStatus::Full
        } else {
            SlotStatus::Available
        }
    }

    pub fn remaining_capacity(&self) -> u32 {
        self.capacity.saturating_sub(self.booked_count)
    }

    /// UTC instant of the slot start (IST boundary conversion).
    pub fn start_utc(&self) -> DateTime<Utc> {
        ist_to_utc(self.date, self.start)
    }

    /// UTC instant of the slot end.
    pub fn end_utc(&self) -> DateTime<Utc> {
        ist_to_utc(self.date, self.end)
    }

    /// Half-open interval intersection: `[start, end) ∩ [other, …) ≠ ∅`.
    pub fn overlaps(&self, other: &Slot) -> bool {
        self.start_utc() < other.end_utc() && other.start_utc() < self.end_utc()
    }

    /// API-facing view with the computed `status` field.
    pub fn to_view(&self) -> SlotView {
        SlotView {
            slot: self.clone(),
            status: self.status(),
        }
    }
}

/// API response wrapper that includes the computed `status` field.
#[derive(Clone, Debug, Serialize)]
pub struct SlotView {
    #[serde(flatten)]
    pub slot: Slot,
    pub status: SlotStatus,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Booking
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The durable link between a slot and an interview.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub interview_id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
    pub status: BookingStatus,
}

impl Booking {
    /// A booking holds capacity while it is not canceled.
    pub fn is_active(&self) -> bool {
        self.status != BookingStatus::Canceled
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Events (admin surface subscription)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlotEvent {
    SlotCreated { slot: SlotView },
    SlotUpdated { slot: SlotView },
    Booked { slot_id: Uuid, booking_id: Uuid },
    Released { slot_id: Uuid, booking_id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn test_slot(start: (u32, u32), end: (u32, u32), ai_type: AiType) -> Slot {
        Slot {
            id: Uuid::new_v4(),
            company: "acme".into(),
            job: "backend".into(),
            date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            start: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            capacity: 2,
            booked_count: 0,
            canceled: false,
            ai_type,
            difficulty: Difficulty::Medium,
            language: "en".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn status_derivation() {
        let mut s = test_slot((10, 0), (10, 10), AiType::Technical);
        assert_eq!(s.status(), SlotStatus::Available);
        s.booked_count = 2;
        assert_eq!(s.status(), SlotStatus::Full);
        s.canceled = true;
        assert_eq!(s.status(), SlotStatus::Canceled);
    }

    #[test]
    fn half_open_overlap() {
        let a = test_slot((10, 0), (10, 10), AiType::Technical);
        let b = test_slot((10, 5), (10, 15), AiType::Technical);
        let c = test_slot((10, 10), (10, 20), AiType::Technical);
        assert!(a.overlaps(&b));
        // Touching boundaries do not overlap.
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn slot_times_convert_at_ist_boundary() {
        let s = test_slot((14, 0), (14, 10), AiType::General);
        assert_eq!(s.start_utc().format("%H:%M").to_string(), "08:30");
        assert_eq!(s.end_utc().format("%H:%M").to_string(), "08:40");
    }
}
