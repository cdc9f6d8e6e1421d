use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::config::BusinessRules;
use crate::models::availability::format_hour;
use crate::models::booking::hour_format;
use crate::models::{CalendarDay, DayState, SlotRecord, SlotState, SlotVerdict};

/// Half-open interval test; intervals that only touch do not overlap.
pub fn overlaps(s1: f64, e1: f64, s2: f64, e2: f64) -> bool {
    s1 < e2 && s2 < e1
}

/// Number of existing bookings overlapping `[hour, hour + duration)`.
pub fn count_overlapping(existing: &[SlotRecord], hour: u32, duration_hours: f64) -> usize {
    let start = hour as f64;
    let end = start + duration_hours;
    existing
        .iter()
        .filter(|b| overlaps(b.start_hour as f64, b.end_hour(), start, end))
        .count()
}

/// Classifies every whole-hour start on `date` for an appointment of `duration_hours`.
///
/// `existing` must already exclude the booking being rescheduled. `now` is in
/// business-local time.
pub fn classify_day(
    date: NaiveDate,
    duration_hours: f64,
    existing: &[SlotRecord],
    rules: &BusinessRules,
    now: NaiveDateTime,
) -> Vec<SlotVerdict> {
    (rules.open_hour..rules.close_hour)
        .map(|hour| {
            let (state, overlapping) =
                if is_slot_disabled(date, hour, duration_hours, rules, now) {
                    (SlotState::Disabled, 0)
                } else {
                    let count = count_overlapping(existing, hour, duration_hours);
                    (state_for_count(count, rules.max_concurrent), count)
                };
            SlotVerdict {
                hour,
                time: hour_format::to_string(hour),
                label: format_hour(hour),
                state,
                overlapping,
            }
        })
        .collect()
}

fn state_for_count(count: usize, max_concurrent: usize) -> SlotState {
    if count >= max_concurrent {
        SlotState::Full
    } else if count > 0 {
        SlotState::Limited
    } else {
        SlotState::Available
    }
}

fn is_slot_disabled(
    date: NaiveDate,
    hour: u32,
    duration_hours: f64,
    rules: &BusinessRules,
    now: NaiveDateTime,
) -> bool {
    if rules.closed_days.contains(&date.weekday()) {
        return true;
    }
    if hour as f64 + duration_hours > rules.close_hour as f64 {
        return true;
    }
    let slot_start = date.and_time(NaiveTime::MIN) + Duration::hours(hour as i64);
    if slot_start < now + Duration::hours(rules.slot_advance_hours) {
        return true;
    }
    date == now.date() && hour <= now.hour()
}

/// Day-level state for the month calendar, using the day notice window.
pub fn day_state(date: NaiveDate, rules: &BusinessRules, now: NaiveDateTime) -> DayState {
    let today = now.date();
    let earliest_day = (now + Duration::hours(rules.day_advance_hours)).date();

    if date < today {
        DayState::Past
    } else if rules.closed_days.contains(&date.weekday()) {
        DayState::Closed
    } else if date < earliest_day {
        DayState::TooSoon
    } else {
        DayState::Open
    }
}

pub fn month_days(year: i32, month: u32, rules: &BusinessRules, now: NaiveDateTime) -> Vec<CalendarDay> {
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return vec![];
    };
    first
        .iter_days()
        .take_while(|d| d.month() == month)
        .map(|date| CalendarDay {
            date,
            state: day_state(date, rules, now),
        })
        .collect()
}

/// The lock applies when the start is at most `lock_window_hours` away.
pub fn is_within_lock_window(start: NaiveDateTime, rules: &BusinessRules, now: NaiveDateTime) -> bool {
    let remaining = start - now;
    remaining <= Duration::hours(rules.lock_window_hours)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn booking(id: &str, hour: u32, duration: f64) -> SlotRecord {
        SlotRecord {
            booking_id: id.to_string(),
            date: d("2025-06-10"),
            start_hour: hour,
            duration_hours: duration,
        }
    }

    fn state_at(slots: &[SlotVerdict], hour: u32) -> SlotState {
        slots.iter().find(|s| s.hour == hour).unwrap().state
    }

    // 2025-06-10 is a Tuesday; a week earlier keeps every slot outside the notice window.
    fn far_now() -> NaiveDateTime {
        dt("2025-06-03 08:00")
    }

    #[test]
    fn test_touching_intervals_do_not_overlap() {
        let existing = vec![booking("a", 9, 2.0)];
        assert_eq!(count_overlapping(&existing, 11, 2.0), 0);
        assert_eq!(count_overlapping(&existing, 10, 2.0), 1);
        assert_eq!(count_overlapping(&existing, 7, 2.0), 0);
        assert_eq!(count_overlapping(&existing, 8, 1.5), 1);
    }

    #[test]
    fn test_counts_map_to_states() {
        let rules = BusinessRules::default();
        let existing = vec![booking("a", 10, 2.0), booking("b", 11, 1.0)];
        let slots = classify_day(d("2025-06-10"), 1.0, &existing, &rules, far_now());

        assert_eq!(state_at(&slots, 9), SlotState::Available);
        assert_eq!(state_at(&slots, 10), SlotState::Limited);
        assert_eq!(state_at(&slots, 11), SlotState::Full);
        assert_eq!(state_at(&slots, 12), SlotState::Available);
        assert_eq!(slots.iter().find(|s| s.hour == 11).unwrap().overlapping, 2);
    }

    #[test]
    fn test_covers_business_hours_only() {
        let rules = BusinessRules::default();
        let slots = classify_day(d("2025-06-10"), 1.0, &[], &rules, far_now());
        let hours: Vec<u32> = slots.iter().map(|s| s.hour).collect();
        assert_eq!(hours, (7..18).collect::<Vec<_>>());
        assert_eq!(slots[0].time, "07:00");
        assert_eq!(slots[0].label, "7:00 AM");
    }

    #[test]
    fn test_closing_time_disables() {
        let rules = BusinessRules::default();
        let slots = classify_day(d("2025-06-10"), 3.0, &[], &rules, far_now());
        assert_eq!(state_at(&slots, 15), SlotState::Available);
        assert_eq!(state_at(&slots, 16), SlotState::Disabled);
        assert_eq!(state_at(&slots, 17), SlotState::Disabled);
    }

    #[test]
    fn test_fractional_duration_fits_last_hour() {
        let rules = BusinessRules::default();
        let slots = classify_day(d("2025-06-10"), 0.5, &[], &rules, far_now());
        assert_eq!(state_at(&slots, 17), SlotState::Available);
    }

    #[test]
    fn test_same_day_cutoff() {
        let rules = BusinessRules {
            slot_advance_hours: 0,
            ..BusinessRules::default()
        };
        let now = dt("2025-06-10 14:30");
        let slots = classify_day(d("2025-06-10"), 1.0, &[], &rules, now);
        for hour in 7..=14 {
            assert_eq!(state_at(&slots, hour), SlotState::Disabled, "hour {hour}");
        }
        assert_eq!(state_at(&slots, 15), SlotState::Available);
    }

    #[test]
    fn test_slot_notice_disables_regardless_of_overlap() {
        let rules = BusinessRules::default();
        // Slots before 2025-06-10 10:00 are inside the 24h window.
        let now = dt("2025-06-09 10:00");
        let existing = vec![booking("a", 9, 1.0), booking("b", 9, 1.0)];
        let slots = classify_day(d("2025-06-10"), 1.0, &existing, &rules, now);
        assert_eq!(state_at(&slots, 9), SlotState::Disabled);
        assert_eq!(slots.iter().find(|s| s.hour == 9).unwrap().overlapping, 0);
        assert_eq!(state_at(&slots, 10), SlotState::Available);
    }

    #[test]
    fn test_closed_day_disables_all() {
        let rules = BusinessRules::default();
        // 2025-06-15 is a Sunday.
        let slots = classify_day(d("2025-06-15"), 1.0, &[], &rules, far_now());
        assert!(slots.iter().all(|s| s.state == SlotState::Disabled));
    }

    #[test]
    fn test_capacity_is_configurable() {
        let rules = BusinessRules {
            max_concurrent: 3,
            ..BusinessRules::default()
        };
        let existing = vec![booking("a", 10, 1.0), booking("b", 10, 1.0)];
        let slots = classify_day(d("2025-06-10"), 1.0, &existing, &rules, far_now());
        assert_eq!(state_at(&slots, 10), SlotState::Limited);
    }

    #[test]
    fn test_day_state_uses_day_notice() {
        let rules = BusinessRules::default();
        let now = dt("2025-06-09 20:00");
        // now + 30h = 2025-06-11 02:00, so the 10th is too soon and the 11th opens.
        assert_eq!(day_state(d("2025-06-08"), &rules, now), DayState::Past);
        assert_eq!(day_state(d("2025-06-09"), &rules, now), DayState::TooSoon);
        assert_eq!(day_state(d("2025-06-10"), &rules, now), DayState::TooSoon);
        assert_eq!(day_state(d("2025-06-11"), &rules, now), DayState::Open);
        assert_eq!(day_state(d("2025-06-15"), &rules, now), DayState::Closed);
    }

    #[test]
    fn test_day_and_slot_notice_are_independent() {
        let rules = BusinessRules::default();
        let now = dt("2025-06-09 20:00");
        assert_eq!(day_state(d("2025-06-11"), &rules, now), DayState::Open);
        let slots = classify_day(d("2025-06-11"), 1.0, &[], &rules, now);
        assert_eq!(state_at(&slots, 7), SlotState::Available);

        // The day is open, but hours inside the 24h window are still disabled.
        let now = dt("2025-06-10 09:00");
        assert_eq!(day_state(d("2025-06-11"), &rules, now), DayState::Open);
        let slots = classify_day(d("2025-06-11"), 1.0, &[], &rules, now);
        assert_eq!(state_at(&slots, 8), SlotState::Disabled);
        assert_eq!(state_at(&slots, 9), SlotState::Available);
    }

    #[test]
    fn test_month_days() {
        let rules = BusinessRules::default();
        let days = month_days(2025, 6, &rules, far_now());
        assert_eq!(days.len(), 30);
        assert_eq!(days[0].date, d("2025-06-01"));
        assert_eq!(days[0].state, DayState::Past);
        assert!(month_days(2025, 13, &rules, far_now()).is_empty());
    }

    #[test]
    fn test_lock_window() {
        let rules = BusinessRules::default();
        let now = dt("2025-06-10 10:00");
        assert!(is_within_lock_window(now + Duration::hours(47), &rules, now));
        assert!(is_within_lock_window(now + Duration::hours(48), &rules, now));
        assert!(!is_within_lock_window(now + Duration::hours(49), &rules, now));
    }
}
