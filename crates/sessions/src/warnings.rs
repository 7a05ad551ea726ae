//! Warning log with per-kind dedup.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use candor_domain::warning::{WarningEvent, WarningKind};

/// Append-only warning log. Insertions within `window` of the previous
/// same-kind event are rejected, which enforces the "at most one
/// warning per (kind, window)" invariant at the single insert site.
#[derive(Debug)]
pub struct WarningLog {
    session_id: Uuid,
    window: Duration,
    events: Vec<WarningEvent>,
    last_by_kind: HashMap<WarningKind, DateTime<Utc>>,
}

impl WarningLog {
    pub fn new(session_id: Uuid, window_s: u64) -> Self {
        Self {
            session_id,
            window: Duration::seconds(window_s as i64),
            events: Vec::new(),
            last_by_kind: HashMap::new(),
        }
    }

    /// Record a warning unless one of the same kind exists within the
    /// trailing window. Returns the stored event, or `None` on dedup.
    pub fn try_record(
        &mut self,
        kind: WarningKind,
        at: DateTime<Utc>,
        snapshot_ref: Option<String>,
    ) -> Option<WarningEvent> {
        if let Some(last) = self.last_by_kind.get(&kind) {
            if at - *last < self.window {
                return None;
            }
        }
        let event = WarningEvent {
            id: Uuid::new_v4(),
            session_id: self.session_id,
            kind,
            at,
            snapshot_ref,
        };
        self.last_by_kind.insert(kind, at);
        self.events.push(event.clone());
        Some(event)
    }

    /// Attach a snapshot reference after the frame has been persisted
    /// (the snapshot filename carries the warning id, so the event must
    /// exist first).
    pub fn attach_snapshot(&mut self, event_id: Uuid, snapshot_ref: String) {
        if let Some(event) = self.events.iter_mut().find(|e| e.id == event_id) {
            event.snapshot_ref = Some(snapshot_ref);
        }
    }

    pub fn all(&self) -> &[WarningEvent] {
        &self.events
    }

    pub fn count(&self) -> u32 {
        self.events.len() as u32
    }

    pub fn count_by_kind(&self) -> Vec<(WarningKind, u32)> {
        let mut counts: HashMap<WarningKind, u32> = HashMap::new();
        for e in &self.events {
            *counts.entry(e.kind).or_default() += 1;
        }
        let mut out: Vec<_> = counts.into_iter().collect();
        out.sort_by_key(|(_, n)| std::cmp::Reverse(*n));
        out
    }

    pub fn to_vec(&self) -> Vec<WarningEvent> {
        self.events.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64, millis: u32) -> DateTime<Utc> {
        Utc.timestamp_opt(1_750_000_000 + secs, millis * 1_000_000)
            .unwrap()
    }

    #[test]
    fn dedup_within_ten_second_window() {
        let mut log = WarningLog::new(Uuid::new_v4(), 10);
        // t=10.0, 12.0, 21.0 → persisted at 10.0 and 21.0 only.
        assert!(log
            .try_record(WarningKind::MultiplePeople, at(10, 0), None)
            .is_some());
        assert!(log
            .try_record(WarningKind::MultiplePeople, at(12, 0), None)
            .is_none());
        assert!(log
            .try_record(WarningKind::MultiplePeople, at(21, 0), None)
            .is_some());
        assert_eq!(log.count(), 2);
    }

    #[test]
    fn different_kinds_do_not_dedup_each_other() {
        let mut log = WarningLog::new(Uuid::new_v4(), 10);
        assert!(log
            .try_record(WarningKind::NoPerson, at(0, 0), None)
            .is_some());
        assert!(log
            .try_record(WarningKind::PhoneDetected, at(1, 0), None)
            .is_some());
        assert_eq!(log.count(), 2);
    }

    #[test]
    fn no_two_same_kind_events_closer_than_window() {
        let mut log = WarningLog::new(Uuid::new_v4(), 10);
        for i in 0..60 {
            log.try_record(WarningKind::LowAttention, at(i, 500), None);
        }
        let events = log.all();
        for pair in events.windows(2) {
            assert!(pair[1].at - pair[0].at >= Duration::seconds(10));
        }
    }

    #[test]
    fn counts_grouped_by_kind() {
        let mut log = WarningLog::new(Uuid::new_v4(), 10);
        log.try_record(WarningKind::TabSwitch, at(0, 0), None);
        log.try_record(WarningKind::TabSwitch, at(15, 0), None);
        log.try_record(WarningKind::NoPerson, at(3, 0), None);
        let by_kind = log.count_by_kind();
        assert_eq!(by_kind[0], (WarningKind::TabSwitch, 2));
        assert_eq!(by_kind[1], (WarningKind::NoPerson, 1));
    }
}
