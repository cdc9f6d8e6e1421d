use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SlotState {
    Available,
    Limited,
    Full,
    Disabled,
}

impl SlotState {
    pub fn is_bookable(&self) -> bool {
        matches!(self, SlotState::Available | SlotState::Limited)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotVerdict {
    pub hour: u32,
    pub time: String,
    pub label: String,
    pub state: SlotState,
    /// Existing bookings overlapping this slot; zero for disabled slots.
    pub overlapping: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub duration_hours: f64,
    /// Set when the booking list came from the local snapshot instead of the store.
    pub degraded: bool,
    pub slots: Vec<SlotVerdict>,
}

impl DayAvailability {
    pub fn slot(&self, hour: u32) -> Option<&SlotVerdict> {
        self.slots.iter().find(|s| s.hour == hour)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DayState {
    Open,
    Past,
    Closed,
    TooSoon,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub state: DayState,
}

/// 12-hour clock label, e.g. `9:00 AM`, `12:00 PM`.
pub fn format_hour(hour: u32) -> String {
    match hour {
        0 => "12:00 AM".to_string(),
        1..=11 => format!("{hour}:00 AM"),
        12 => "12:00 PM".to_string(),
        _ => format!("{}:00 PM", hour - 12),
    }
}
