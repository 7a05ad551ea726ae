//! Clock capability and the IST boundary converter.
//!
//! Every component that reads time takes an `Arc<dyn Clock>` so tests
//! can drive the temporal-gate logic deterministically. Slot times are
//! stored as (date, local time, IST) and converted to UTC exactly once,
//! here.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Presentation timezone for all slot times.
pub const IST: Tz = chrono_tz::Asia::Kolkata;

/// Wall + monotonic clock capability.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
    fn now_monotonic(&self) -> Instant;
}

/// The production clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn now_monotonic(&self) -> Instant {
        Instant::now()
    }
}

/// Test clock with a manually advanced wall time.
pub struct ManualClock {
    now: parking_lot::Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: parking_lot::Mutex::new(now),
        })
    }

    pub fn advance(&self, d: chrono::Duration) {
        let mut now = self.now.lock();
        *now += d;
    }

    pub fn set(&self, t: DateTime<Utc>) {
        *self.now.lock() = t;
    }
}

impl Clock for ManualClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    fn now_monotonic(&self) -> Instant {
        Instant::now()
    }
}

/// Convert a slot-local (date, time-of-day) pair in IST to UTC.
///
/// IST has no DST so `single()` always resolves; the fallback only
/// covers a malformed zone database.
pub fn ist_to_utc(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let local = date.and_time(time);
    IST.from_local_datetime(&local)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&local))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveTime};

    #[test]
    fn ist_offset_is_five_thirty() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let time = NaiveTime::from_hms_opt(14, 0, 0).unwrap();
        let utc = ist_to_utc(date, time);
        // 14:00 IST == 08:30 UTC.
        assert_eq!(utc.format("%H:%M").to_string(), "08:30");
    }

    #[test]
    fn manual_clock_advances() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let clock = ManualClock::at(t0);
        assert_eq!(clock.now_utc(), t0);
        clock.advance(Duration::minutes(20));
        assert_eq!(clock.now_utc(), t0 + Duration::minutes(20));
    }
}
