use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{NaiveDate, NaiveDateTime};

use crate::config::BusinessRules;
use crate::db::{self, queries};
use crate::models::{DayAvailability, SlotRecord};
use crate::services::scheduling;
use crate::state::AppState;

pub trait Clock: Send + Sync {
    /// Current wall-clock time at the business.
    fn now(&self) -> NaiveDateTime;
}

pub struct BusinessClock {
    rules: BusinessRules,
}

impl BusinessClock {
    pub fn new(rules: BusinessRules) -> Self {
        Self { rules }
    }
}

impl Clock for BusinessClock {
    fn now(&self) -> NaiveDateTime {
        self.rules.local_now()
    }
}

/// A clock pinned to one instant.
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Dates kept in the snapshot; the earliest are evicted first.
pub const SNAPSHOT_MAX_DATES: usize = 120;

/// Last successfully read schedule per date, served when the store is unreachable.
#[derive(Default)]
pub struct BookingSnapshot {
    by_date: Mutex<BTreeMap<NaiveDate, Vec<SlotRecord>>>,
}

impl BookingSnapshot {
    pub fn replace(&self, date: NaiveDate, records: Vec<SlotRecord>) {
        if let Ok(mut map) = self.by_date.lock() {
            map.insert(date, records);
            evict_oldest(&mut map);
        }
    }

    pub fn len(&self) -> usize {
        self.by_date.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, date: NaiveDate) -> Option<Vec<SlotRecord>> {
        self.by_date.lock().ok()?.get(&date).cloned()
    }

    /// Upserts one booking's slot, dropping it from any other date.
    pub fn record(&self, slot: SlotRecord) {
        if let Ok(mut map) = self.by_date.lock() {
            for records in map.values_mut() {
                records.retain(|r| r.booking_id != slot.booking_id);
            }
            map.entry(slot.date).or_default().push(slot);
            evict_oldest(&mut map);
        }
    }

    pub fn forget(&self, booking_id: &str) {
        if let Ok(mut map) = self.by_date.lock() {
            for records in map.values_mut() {
                records.retain(|r| r.booking_id != booking_id);
            }
        }
    }
}

fn evict_oldest(map: &mut BTreeMap<NaiveDate, Vec<SlotRecord>>) {
    while map.len() > SNAPSHOT_MAX_DATES {
        map.pop_first();
    }
}

#[derive(Debug)]
pub struct SlotFetch {
    pub records: Vec<SlotRecord>,
    pub degraded: bool,
}

/// Active bookings on `date` as slot records, minus `exclude_id`.
///
/// Falls back to the snapshot, flagged as degraded, when the store read fails.
pub fn fetch_slots(state: &AppState, date: NaiveDate, exclude_id: Option<&str>) -> SlotFetch {
    let fresh = db::lock(&state.db).and_then(|conn| queries::get_bookings_for_date(&conn, date));

    let (mut records, degraded) = match fresh {
        Ok(bookings) => {
            let records: Vec<SlotRecord> = bookings.iter().map(|b| b.slot()).collect();
            state.snapshot.replace(date, records.clone());
            (records, false)
        }
        Err(e) => {
            let cached = state.snapshot.get(date);
            tracing::warn!(
                %date,
                cached = cached.is_some(),
                "booking store unavailable, using local snapshot: {e:#}"
            );
            (cached.unwrap_or_default(), true)
        }
    };

    if let Some(id) = exclude_id {
        records.retain(|r| r.booking_id != id);
    }
    SlotFetch { records, degraded }
}

pub fn day_availability(
    state: &AppState,
    date: NaiveDate,
    duration_hours: f64,
    exclude_id: Option<&str>,
) -> DayAvailability {
    let fetch = fetch_slots(state, date, exclude_id);
    let slots = scheduling::classify_day(
        date,
        duration_hours,
        &fetch.records,
        &state.config.rules,
        state.clock.now(),
    );
    DayAvailability {
        date,
        duration_hours,
        degraded: fetch.degraded,
        slots,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn slot(id: &str, date: &str, hour: u32) -> SlotRecord {
        SlotRecord {
            booking_id: id.to_string(),
            date: d(date),
            start_hour: hour,
            duration_hours: 1.0,
        }
    }

    #[test]
    fn test_snapshot_record_moves_booking() {
        let snapshot = BookingSnapshot::default();
        snapshot.replace(d("2025-06-10"), vec![slot("A", "2025-06-10", 9)]);
        snapshot.record(slot("A", "2025-06-12", 14));

        assert!(snapshot.get(d("2025-06-10")).unwrap().is_empty());
        assert_eq!(snapshot.get(d("2025-06-12")).unwrap()[0].start_hour, 14);
        assert!(snapshot.get(d("2025-06-11")).is_none());
    }

    #[test]
    fn test_snapshot_forget() {
        let snapshot = BookingSnapshot::default();
        snapshot.record(slot("A", "2025-06-10", 9));
        snapshot.record(slot("B", "2025-06-10", 11));
        snapshot.forget("A");

        let left = snapshot.get(d("2025-06-10")).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].booking_id, "B");
    }

    #[test]
    fn test_snapshot_is_bounded() {
        let snapshot = BookingSnapshot::default();
        let first = d("2025-01-01");
        for offset in 0..(SNAPSHOT_MAX_DATES as i64 + 30) {
            snapshot.replace(first + chrono::Duration::days(offset), vec![]);
        }
        assert_eq!(snapshot.len(), SNAPSHOT_MAX_DATES);
        assert!(snapshot.get(first).is_none());
        let last = first + chrono::Duration::days(SNAPSHOT_MAX_DATES as i64 + 29);
        assert!(snapshot.get(last).is_some());
    }
}
