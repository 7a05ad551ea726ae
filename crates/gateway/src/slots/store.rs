//! SlotStore — persistent slots and bookings with strict capacity.
//!
//! All four mutating operations serialize on one write lock over the
//! combined (slots, bookings) state, so the capacity check and the
//! counter increment commit as a single unit: of N concurrent bookers
//! on a slot with R remaining seats, exactly R succeed.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveTime, Utc};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use candor_domain::error::{Error, Result};
use candor_domain::slot::{
    AiType, Booking, BookingStatus, Difficulty, Slot, SlotEvent, SlotView,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Requests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Inputs for creating one slot.
#[derive(Debug, Clone)]
pub struct NewSlot {
    pub company: String,
    pub job: String,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub capacity: u32,
    pub ai_type: AiType,
    pub difficulty: Difficulty,
    pub language: String,
}

/// Search filters for `search_available`.
#[derive(Debug, Clone, Default)]
pub struct SlotSearch {
    pub company: Option<String>,
    pub ai_type: Option<AiType>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct Inner {
    slots: HashMap<Uuid, Slot>,
    bookings: HashMap<Uuid, Booking>,
}

pub struct SlotStore {
    inner: RwLock<Inner>,
    slots_path: PathBuf,
    bookings_path: PathBuf,
    event_tx: broadcast::Sender<SlotEvent>,
}

impl SlotStore {
    pub fn new(state_path: &std::path::Path) -> Result<Self> {
        std::fs::create_dir_all(state_path)?;
        let slots_path = state_path.join("slots.json");
        let bookings_path = state_path.join("bookings.json");
        let (event_tx, _) = broadcast::channel(64);

        let mut inner = Inner::default();
        if slots_path.exists() {
            let raw = std::fs::read_to_string(&slots_path)?;
            let rows: Vec<Slot> = serde_json::from_str(&raw).unwrap_or_default();
            inner.slots = rows.into_iter().map(|s| (s.id, s)).collect();
        }
        if bookings_path.exists() {
            let raw = std::fs::read_to_string(&bookings_path)?;
            let rows: Vec<Booking> = serde_json::from_str(&raw).unwrap_or_default();
            inner.bookings = rows.into_iter().map(|b| (b.id, b)).collect();
        }
        tracing::info!(
            slots = inner.slots.len(),
            bookings = inner.bookings.len(),
            "slot store loaded"
        );

        Ok(Self {
            inner: RwLock::new(inner),
            slots_path,
            bookings_path,
            event_tx,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SlotEvent> {
        self.event_tx.subscribe()
    }

    async fn persist(&self) {
        let (slots_json, bookings_json) = {
            let inner = self.inner.read().await;
            let slots: Vec<&Slot> = inner.slots.values().collect();
            let bookings: Vec<&Booking> = inner.bookings.values().collect();
            (
                serde_json::to_string_pretty(&slots).ok(),
                serde_json::to_string_pretty(&bookings).ok(),
            )
        };
        let slots_path = self.slots_path.clone();
        let bookings_path = self.bookings_path.clone();
        let _ = tokio::task::spawn_blocking(move || {
            if let Some(json) = slots_json {
                if let Err(e) = std::fs::write(&slots_path, json) {
                    tracing::warn!(error = %e, "failed to persist slots");
                }
            }
            if let Some(json) = bookings_json {
                if let Err(e) = std::fs::write(&bookings_path, json) {
                    tracing::warn!(error = %e, "failed to persist bookings");
                }
            }
        })
        .await;
    }

    // ── Creation ──────────────────────────────────────────────────

    /// Create one slot. Fails with `OverlapsExisting` when a slot for
    /// the same (company, ai_type) with remaining capacity intersects
    /// the `[start, end)` range.
    pub async fn create_slot(&self, req: NewSlot) -> Result<Uuid> {
        validate_new_slot(&req)?;

        let now = Utc::now();
        let slot = Slot {
            id: Uuid::new_v4(),
            company: req.company,
            job: req.job,
            date: req.date,
            start: req.start,
            end: req.end,
            capacity: req.capacity,
            booked_count: 0,
            canceled: false,
            ai_type: req.ai_type,
            difficulty: req.difficulty,
            language: req.language,
            created_at: now,
            updated_at: now,
        };

        let id = {
            let mut inner = self.inner.write().await;
            if inner.slots.values().any(|other| conflicts(&slot, other)) {
                return Err(Error::OverlapsExisting);
            }
            let id = slot.id;
            let view = slot.to_view();
            inner.slots.insert(id, slot);
            let _ = self.event_tx.send(SlotEvent::SlotCreated { slot: view });
            id
        };
        self.persist().await;
        Ok(id)
    }

    /// Expand a recurring pattern, skipping any slot that would overlap
    /// an existing one. Returns the ids actually created.
    pub async fn create_recurring(
        &self,
        pattern: super::RecurringPattern,
    ) -> Result<Vec<Uuid>> {
        let mut created = Vec::new();
        for req in pattern.expand() {
            match self.create_slot(req).await {
                Ok(id) => created.push(id),
                Err(Error::OverlapsExisting) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(created)
    }

    // ── Booking ───────────────────────────────────────────────────

    /// Book a seat. The capacity check is on `booked_count < capacity`,
    /// not on the derived status, so a concurrent release immediately
    /// unblocks a parallel booker.
    pub async fn book(
        &self,
        slot_id: Uuid,
        interview_id: Uuid,
        notes: String,
    ) -> Result<Booking> {
        let booking = {
            let mut inner = self.inner.write().await;

            let has_active = inner
                .bookings
                .values()
                .any(|b| b.interview_id == interview_id && b.is_active());
            if has_active {
                return Err(Error::AlreadyBooked);
            }

            let slot = inner
                .slots
                .get_mut(&slot_id)
                .ok_or_else(|| Error::NotFound(format!("slot {slot_id}")))?;
            if slot.canceled {
                return Err(Error::SlotCanceled);
            }
            if slot.booked_count >= slot.capacity {
                return Err(Error::SlotFull);
            }

            slot.booked_count += 1;
            slot.updated_at = Utc::now();

            let booking = Booking {
                id: Uuid::new_v4(),
                slot_id,
                interview_id,
                created_at: Utc::now(),
                notes,
                status: BookingStatus::Confirmed,
            };
            inner.bookings.insert(booking.id, booking.clone());
            let _ = self.event_tx.send(SlotEvent::Booked {
                slot_id,
                booking_id: booking.id,
            });
            booking
        };
        self.persist().await;
        Ok(booking)
    }

    /// Release a booking. Decrements `booked_count` exactly once — a
    /// second release of the same booking is a no-op success.
    pub async fn release(&self, booking_id: Uuid) -> Result<()> {
        {
            let mut inner = self.inner.write().await;
            let booking = inner
                .bookings
                .get_mut(&booking_id)
                .ok_or_else(|| Error::NotFound(format!("booking {booking_id}")))?;
            if booking.status == BookingStatus::Canceled {
                return Ok(());
            }
            booking.status = BookingStatus::Canceled;
            let slot_id = booking.slot_id;

            if let Some(slot) = inner.slots.get_mut(&slot_id) {
                slot.booked_count = slot.booked_count.saturating_sub(1);
                slot.updated_at = Utc::now();
            }
            let _ = self.event_tx.send(SlotEvent::Released {
                slot_id,
                booking_id,
            });
        }
        self.persist().await;
        Ok(())
    }

    /// Cancel a slot (stops further bookings; existing bookings stand).
    pub async fn cancel_slot(&self, slot_id: Uuid) -> Result<()> {
        {
            let mut inner = self.inner.write().await;
            let slot = inner
                .slots
                .get_mut(&slot_id)
                .ok_or_else(|| Error::NotFound(format!("slot {slot_id}")))?;
            slot.canceled = true;
            slot.updated_at = Utc::now();
            let view = slot.to_view();
            let _ = self.event_tx.send(SlotEvent::SlotUpdated { slot: view });
        }
        self.persist().await;
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────────

    pub async fn get_slot(&self, id: &Uuid) -> Option<Slot> {
        self.inner.read().await.slots.get(id).cloned()
    }

    pub async fn get_booking(&self, id: &Uuid) -> Option<Booking> {
        self.inner.read().await.bookings.get(id).cloned()
    }

    pub async fn slot_count(&self) -> usize {
        self.inner.read().await.slots.len()
    }

    /// The slot behind an interview's active booking, if any.
    pub async fn find_slot_for_interview(&self, interview_id: &Uuid) -> Option<Slot> {
        let inner = self.inner.read().await;
        let booking = inner
            .bookings
            .values()
            .find(|b| b.interview_id == *interview_id && b.is_active())?;
        inner.slots.get(&booking.slot_id).cloned()
    }

    /// Bookable slots matching the filters, ordered by (date, start).
    pub async fn search_available(&self, search: SlotSearch) -> Vec<SlotView> {
        let inner = self.inner.read().await;
        let mut out: Vec<SlotView> = inner
            .slots
            .values()
            .filter(|s| !s.canceled && s.booked_count < s.capacity)
            .filter(|s| {
                search
                    .company
                    .as_deref()
                    .map_or(true, |c| s.company.eq_ignore_ascii_case(c))
            })
            .filter(|s| search.ai_type.map_or(true, |t| s.ai_type == t))
            .filter(|s| search.from.map_or(true, |d| s.date >= d))
            .filter(|s| search.to.map_or(true, |d| s.date <= d))
            .map(|s| s.to_view())
            .collect();
        out.sort_by_key(|v| (v.slot.date, v.slot.start));
        out
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn validate_new_slot(req: &NewSlot) -> Result<()> {
    if req.start >= req.end {
        return Err(Error::Validation("slot start must be before end".into()));
    }
    if req.capacity == 0 {
        return Err(Error::Validation("slot capacity must be positive".into()));
    }
    if req.company.trim().is_empty() {
        return Err(Error::Validation("company must not be empty".into()));
    }
    Ok(())
}

/// Overlap is enforced per (company, ai_type): a candidate pool is
/// scoped to one interview type, so different types may share a window.
/// Canceled and already-full slots hold no capacity and do not block.
fn conflicts(candidate: &Slot, existing: &Slot) -> bool {
    existing.company.eq_ignore_ascii_case(&candidate.company)
        && existing.ai_type == candidate.ai_type
        && !existing.canceled
        && existing.remaining_capacity() > 0
        && candidate.overlaps(existing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn slot_req(start: (u32, u32), end: (u32, u32), capacity: u32) -> NewSlot {
        NewSlot {
            company: "acme".into(),
            job: "backend".into(),
            date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            start: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            capacity,
            ai_type: AiType::Technical,
            difficulty: Difficulty::Medium,
            language: "en".into(),
        }
    }

    async fn store() -> (SlotStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (SlotStore::new(dir.path()).unwrap(), dir)
    }

    #[tokio::test]
    async fn capacity_race_exactly_capacity_succeed() {
        let (store, _dir) = store().await;
        let store = Arc::new(store);
        let slot_id = store.create_slot(slot_req((10, 0), (10, 10), 2)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.book(slot_id, Uuid::new_v4(), String::new()).await
            }));
        }

        let mut ok = 0;
        let mut full = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(Error::SlotFull) => full += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(ok, 2);
        assert_eq!(full, 1);

        let slot = store.get_slot(&slot_id).await.unwrap();
        assert_eq!(slot.booked_count, 2);
        assert_eq!(slot.status(), candor_domain::slot::SlotStatus::Full);
    }

    #[tokio::test]
    async fn booked_count_stays_within_bounds_under_churn() {
        let (store, _dir) = store().await;
        let slot_id = store.create_slot(slot_req((9, 0), (9, 30), 3)).await.unwrap();

        let mut bookings = Vec::new();
        for round in 0..5 {
            for _ in 0..3 {
                if let Ok(b) = store.book(slot_id, Uuid::new_v4(), String::new()).await {
                    bookings.push(b.id);
                }
            }
            let slot = store.get_slot(&slot_id).await.unwrap();
            assert!(slot.booked_count <= slot.capacity);
            assert_eq!(
                slot.booked_count == slot.capacity,
                slot.status() == candor_domain::slot::SlotStatus::Full
            );
            if round % 2 == 0 {
                if let Some(b) = bookings.pop() {
                    store.release(b).await.unwrap();
                }
            }
        }
    }

    #[tokio::test]
    async fn release_decrements_exactly_once() {
        let (store, _dir) = store().await;
        let slot_id = store.create_slot(slot_req((10, 0), (10, 10), 1)).await.unwrap();
        let booking = store.book(slot_id, Uuid::new_v4(), String::new()).await.unwrap();

        store.release(booking.id).await.unwrap();
        store.release(booking.id).await.unwrap();

        let slot = store.get_slot(&slot_id).await.unwrap();
        assert_eq!(slot.booked_count, 0);
        assert_eq!(slot.status(), candor_domain::slot::SlotStatus::Available);
    }

    #[tokio::test]
    async fn release_unblocks_full_slot() {
        let (store, _dir) = store().await;
        let slot_id = store.create_slot(slot_req((10, 0), (10, 10), 1)).await.unwrap();
        let first = store.book(slot_id, Uuid::new_v4(), String::new()).await.unwrap();

        assert!(matches!(
            store.book(slot_id, Uuid::new_v4(), String::new()).await,
            Err(Error::SlotFull)
        ));

        store.release(first.id).await.unwrap();
        assert!(store
            .book(slot_id, Uuid::new_v4(), String::new())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn overlap_is_scoped_to_company_and_type() {
        let (store, _dir) = store().await;
        store.create_slot(slot_req((10, 0), (10, 10), 2)).await.unwrap();

        // Same company + type, overlapping range → rejected.
        assert!(matches!(
            store.create_slot(slot_req((10, 5), (10, 15), 2)).await,
            Err(Error::OverlapsExisting)
        ));

        // Different ai_type in the same range → allowed.
        let mut behavioral = slot_req((10, 5), (10, 15), 2);
        behavioral.ai_type = AiType::Behavioral;
        assert!(store.create_slot(behavioral).await.is_ok());

        // Different company in the same range → allowed.
        let mut other_co = slot_req((10, 5), (10, 15), 2);
        other_co.company = "globex".into();
        assert!(store.create_slot(other_co).await.is_ok());

        // Adjacent (touching) range → allowed, half-open intervals.
        assert!(store.create_slot(slot_req((10, 10), (10, 20), 2)).await.is_ok());
    }

    #[tokio::test]
    async fn full_slot_does_not_block_new_overlapping_slot() {
        let (store, _dir) = store().await;
        let id = store.create_slot(slot_req((10, 0), (10, 10), 1)).await.unwrap();
        store.book(id, Uuid::new_v4(), String::new()).await.unwrap();

        // The existing slot has no remaining capacity, so a new slot in
        // the same window may be created.
        assert!(store.create_slot(slot_req((10, 0), (10, 10), 1)).await.is_ok());
    }

    #[tokio::test]
    async fn canceled_slot_rejects_bookings() {
        let (store, _dir) = store().await;
        let id = store.create_slot(slot_req((10, 0), (10, 10), 2)).await.unwrap();
        store.cancel_slot(id).await.unwrap();
        assert!(matches!(
            store.book(id, Uuid::new_v4(), String::new()).await,
            Err(Error::SlotCanceled)
        ));
    }

    #[tokio::test]
    async fn one_active_booking_per_interview() {
        let (store, _dir) = store().await;
        let a = store.create_slot(slot_req((10, 0), (10, 10), 2)).await.unwrap();
        let mut later = slot_req((11, 0), (11, 10), 2);
        later.ai_type = AiType::Behavioral;
        let b = store.create_slot(later).await.unwrap();

        let interview = Uuid::new_v4();
        let booking = store.book(a, interview, String::new()).await.unwrap();
        assert!(matches!(
            store.book(b, interview, String::new()).await,
            Err(Error::AlreadyBooked)
        ));

        // After cancellation the interview may rebook.
        store.release(booking.id).await.unwrap();
        assert!(store.book(b, interview, String::new()).await.is_ok());
    }

    #[tokio::test]
    async fn search_orders_by_date_then_start() {
        let (store, _dir) = store().await;
        let mut early = slot_req((9, 0), (9, 10), 1);
        early.ai_type = AiType::Behavioral;
        store.create_slot(slot_req((14, 0), (14, 10), 1)).await.unwrap();
        store.create_slot(early).await.unwrap();
        let mut tomorrow = slot_req((8, 0), (8, 10), 1);
        tomorrow.date = NaiveDate::from_ymd_opt(2025, 6, 3).unwrap();
        tomorrow.ai_type = AiType::Coding;
        store.create_slot(tomorrow).await.unwrap();

        let results = store.search_available(SlotSearch::default()).await;
        assert_eq!(results.len(), 3);
        assert!(results[0].slot.start < results[1].slot.start);
        assert!(results[1].slot.date < results[2].slot.date);

        let technical_only = store
            .search_available(SlotSearch {
                ai_type: Some(AiType::Technical),
                ..Default::default()
            })
            .await;
        assert_eq!(technical_only.len(), 1);
    }

    #[tokio::test]
    async fn state_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let slot_id = {
            let store = SlotStore::new(dir.path()).unwrap();
            let id = store.create_slot(slot_req((10, 0), (10, 10), 2)).await.unwrap();
            store.book(id, Uuid::new_v4(), "notes".into()).await.unwrap();
            id
        };

        let store = SlotStore::new(dir.path()).unwrap();
        let slot = store.get_slot(&slot_id).await.unwrap();
        assert_eq!(slot.booked_count, 1);
    }

    #[tokio::test]
    async fn rejects_inverted_times_and_zero_capacity() {
        let (store, _dir) = store().await;
        assert!(matches!(
            store.create_slot(slot_req((11, 0), (10, 0), 2)).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            store.create_slot(slot_req((10, 0), (10, 30), 0)).await,
            Err(Error::Validation(_))
        ));
    }
}
