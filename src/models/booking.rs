use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Options recorded as `not-selected` instead of being left out.
pub const EXPLICIT_OPTIONAL_KEYS: [&str; 2] = ["wash-service", "detangle-service"];
pub const NOT_SELECTED: &str = "not-selected";

/// No appointment runs past one calendar day.
const MAX_DURATION_HOURS: f64 = 24.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub booking_id: String,
    pub name: String,
    pub phone: String,
    pub style: String,
    pub hair_length: Option<String>,
    pub date: NaiveDate,
    #[serde(rename = "time", with = "hour_format")]
    pub start_hour: u32,
    #[serde(rename = "duration")]
    pub duration_hours: f64,
    pub total_price: f64,
    pub deposit_amount: f64,
    pub deposit_paid: bool,
    pub payment_method: String,
    pub status: BookingStatus,
    #[serde(default)]
    pub style_specific_options: BTreeMap<String, String>,
    pub notes: Option<String>,
    pub style_image: Option<String>,
    pub hair_image: Option<String>,
    #[serde(default)]
    pub rescheduled: bool,
    pub original_date: Option<NaiveDate>,
    pub original_time: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    pub fn start(&self) -> NaiveDateTime {
        self.date.and_time(NaiveTime::MIN) + Duration::hours(self.start_hour as i64)
    }

    /// `None` when the stored duration does not describe a real span.
    pub fn end(&self) -> Option<NaiveDateTime> {
        if !(0.0..=MAX_DURATION_HOURS).contains(&self.duration_hours) {
            return None;
        }
        let length = Duration::try_seconds((self.duration_hours * 3600.0).round() as i64)?;
        self.start().checked_add_signed(length)
    }

    pub fn time_label(&self) -> String {
        hour_format::to_string(self.start_hour)
    }

    pub fn slot(&self) -> SlotRecord {
        SlotRecord {
            booking_id: self.booking_id.clone(),
            date: self.date,
            start_hour: self.start_hour,
            duration_hours: self.duration_hours,
        }
    }

    pub fn remaining_balance(&self) -> f64 {
        round_cents(self.total_price - self.deposit_amount)
    }
}

/// Canonical schedule record handed to the slot engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotRecord {
    pub booking_id: String,
    pub date: NaiveDate,
    pub start_hour: u32,
    pub duration_hours: f64,
}

impl SlotRecord {
    pub fn end_hour(&self) -> f64 {
        self.start_hour as f64 + self.duration_hours
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "confirmed" => BookingStatus::Confirmed,
            "cancelled" => BookingStatus::Cancelled,
            _ => BookingStatus::Pending,
        }
    }

    /// Reschedules are the `Confirmed -> Confirmed` edge.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Confirmed)
        )
    }
}

/// Booking payload as sent by the booking page. Several legacy field names are
/// accepted; `normalize_schedule` reduces them to one canonical date and hour.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingInput {
    pub booking_id: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub style: Option<String>,
    pub hair_length: Option<String>,
    pub date: Option<String>,
    pub appointment_date: Option<String>,
    pub time: Option<String>,
    pub appointment_time: Option<String>,
    pub duration: Option<serde_json::Value>,
    pub total_price: Option<f64>,
    pub deposit_amount: Option<f64>,
    pub payment_method: Option<String>,
    #[serde(default)]
    pub style_specific_options: BTreeMap<String, String>,
    pub notes: Option<String>,
    pub style_image: Option<String>,
    pub hair_image: Option<String>,
    pub payment_intent_id: Option<String>,
}

impl BookingInput {
    pub fn raw_date(&self) -> Option<&str> {
        first_present(&[&self.appointment_date, &self.date])
    }

    pub fn raw_time(&self) -> Option<&str> {
        first_present(&[&self.appointment_time, &self.time])
    }

    pub fn schedule(&self) -> Result<(NaiveDate, u32), String> {
        normalize_schedule(self.raw_date(), self.raw_time())
    }

    pub fn duration_hours(&self) -> Option<f64> {
        self.duration.as_ref().and_then(parse_duration_value)
    }
}

fn first_present<'a>(candidates: &[&'a Option<String>]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|c| c.as_deref())
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// Converts any accepted date/time shape into `(date, start_hour)`.
///
/// Accepted: `YYYY-MM-DD` plus `HH:MM` (minutes must be zero), or a combined
/// `YYYY-MM-DDTHH:MM[:SS]` string in the date field with the time omitted.
pub fn normalize_schedule(
    raw_date: Option<&str>,
    raw_time: Option<&str>,
) -> Result<(NaiveDate, u32), String> {
    let raw_date = raw_date.ok_or_else(|| "Missing required field: appointmentDate".to_string())?;

    if raw_time.is_none() {
        if let Some((date_part, time_part)) = raw_date.split_once('T') {
            let date = parse_date(date_part)?;
            let hour = hour_format::parse(time_part)?;
            return Ok((date, hour));
        }
        return Err("Missing required field: appointmentTime".to_string());
    }

    let date_part = raw_date.split('T').next().unwrap_or(raw_date);
    let date = parse_date(date_part)?;
    let hour = hour_format::parse(raw_time.unwrap_or_default())?;
    Ok((date, hour))
}

pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| format!("invalid date: {s}"))
}

/// Durations arrive as numbers or numeric strings, always in hours.
pub fn parse_duration_value(value: &serde_json::Value) -> Option<f64> {
    let hours = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    (hours.is_finite() && hours > 0.0).then_some(hours)
}

pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// `HH:00` wire format for whole-hour appointment starts.
pub mod hour_format {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn to_string(hour: u32) -> String {
        format!("{hour:02}:00")
    }

    pub fn parse(raw: &str) -> Result<u32, String> {
        let raw = raw.trim();
        let mut parts = raw.split(':');
        let hour: u32 = parts
            .next()
            .and_then(|h| h.trim().parse().ok())
            .ok_or_else(|| format!("invalid time: {raw}"))?;
        let minute: u32 = match parts.next() {
            Some(m) => m
                .trim()
                .parse()
                .map_err(|_| format!("invalid time: {raw}"))?,
            None => 0,
        };
        if hour > 23 {
            return Err(format!("time out of range: {raw}"));
        }
        if minute != 0 {
            return Err(format!("appointments start on the hour: {raw}"));
        }
        Ok(hour)
    }

    pub fn serialize<S: Serializer>(hour: &u32, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_string(*hour))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }
}
