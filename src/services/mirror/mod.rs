pub mod google;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone};

use crate::models::booking::{EXPLICIT_OPTIONAL_KEYS, NOT_SELECTED};
use crate::models::{Booking, BookingStatus, ServiceEntry};

pub const COLOR_CONFIRMED: &str = "10";
pub const COLOR_PENDING: &str = "11";

/// Events scanned by the name/phone fallback.
const FALLBACK_SCAN_LIMIT: usize = 50;

/// An event already on the external calendar.
#[derive(Debug, Clone)]
pub struct MirroredEvent {
    pub id: String,
    pub summary: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub booking_id: String,
    pub summary: String,
    pub description: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub color_id: &'static str,
}

#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Events tagged with `booking_id` as a private extended property.
    async fn find_by_booking_id(&self, booking_id: &str) -> anyhow::Result<Vec<MirroredEvent>>;

    async fn list_recent(&self, limit: usize) -> anyhow::Result<Vec<MirroredEvent>>;

    /// Returns the new event id.
    async fn insert(&self, event: &NewEvent) -> anyhow::Result<String>;

    /// Deleting an event that is already gone succeeds.
    async fn delete(&self, event_id: &str) -> anyhow::Result<()>;
}

/// Used when no calendar is configured.
pub struct NoopCalendar;

#[async_trait]
impl CalendarProvider for NoopCalendar {
    async fn find_by_booking_id(&self, _booking_id: &str) -> anyhow::Result<Vec<MirroredEvent>> {
        Ok(vec![])
    }

    async fn list_recent(&self, _limit: usize) -> anyhow::Result<Vec<MirroredEvent>> {
        Ok(vec![])
    }

    async fn insert(&self, event: &NewEvent) -> anyhow::Result<String> {
        tracing::debug!(booking_id = %event.booking_id, "calendar mirroring disabled, skipping insert");
        Ok(String::new())
    }

    async fn delete(&self, _event_id: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorOutcome {
    Created(String),
    AlreadyMirrored,
}

/// Creates the mirrored event unless one already carries this booking id.
pub async fn mirror_create(
    calendar: &dyn CalendarProvider,
    booking: &Booking,
    entry: Option<&ServiceEntry>,
    offset: FixedOffset,
) -> anyhow::Result<MirrorOutcome> {
    let existing = calendar
        .find_by_booking_id(&booking.booking_id)
        .await
        .context("failed to look up mirrored events")?;
    if !existing.is_empty() {
        tracing::info!(booking_id = %booking.booking_id, "event already mirrored, skipping");
        return Ok(MirrorOutcome::AlreadyMirrored);
    }

    let event = build_event(booking, entry, offset)?;
    let id = calendar
        .insert(&event)
        .await
        .context("failed to insert mirrored event")?;
    tracing::info!(booking_id = %booking.booking_id, event_id = %id, "mirrored event created");
    Ok(MirrorOutcome::Created(id))
}

/// Deletes every event mirrored for `booking`, returning how many were removed.
///
/// When nothing is tagged with the booking id, falls back to events whose summary
/// names the client and whose description carries their phone number.
pub async fn mirror_delete(calendar: &dyn CalendarProvider, booking: &Booking) -> anyhow::Result<usize> {
    let mut targets = calendar
        .find_by_booking_id(&booking.booking_id)
        .await
        .context("failed to look up mirrored events")?;

    if targets.is_empty() {
        targets = calendar
            .list_recent(FALLBACK_SCAN_LIMIT)
            .await
            .context("failed to list calendar events")?
            .into_iter()
            .filter(|e| is_degraded_match(e, booking))
            .collect();
        if !targets.is_empty() {
            tracing::warn!(
                booking_id = %booking.booking_id,
                matches = targets.len(),
                "no tagged events, deleting by name/phone match"
            );
        }
    }

    let mut deleted = 0;
    for event in &targets {
        match calendar.delete(&event.id).await {
            Ok(()) => deleted += 1,
            Err(e) => tracing::error!(
                booking_id = %booking.booking_id,
                event_id = %event.id,
                "failed to delete mirrored event: {e:#}"
            ),
        }
    }
    Ok(deleted)
}

fn is_degraded_match(event: &MirroredEvent, booking: &Booking) -> bool {
    let name = booking.name.trim();
    let phone = booking.phone.trim();
    !name.is_empty()
        && !phone.is_empty()
        && event.summary.contains(name)
        && event.description.contains(phone)
}

pub fn build_event(
    booking: &Booking,
    entry: Option<&ServiceEntry>,
    offset: FixedOffset,
) -> anyhow::Result<NewEvent> {
    let start = offset
        .from_local_datetime(&booking.start())
        .single()
        .context("appointment start has no local time")?;
    let end = offset
        .from_local_datetime(&booking.end().context("appointment duration out of range")?)
        .single()
        .context("appointment end has no local time")?;

    Ok(NewEvent {
        booking_id: booking.booking_id.clone(),
        summary: format!("{} - {}", booking.name, booking.style),
        description: build_description(booking, entry),
        start,
        end,
        color_id: match booking.status {
            BookingStatus::Confirmed => COLOR_CONFIRMED,
            _ => COLOR_PENDING,
        },
    })
}

fn build_description(booking: &Booking, entry: Option<&ServiceEntry>) -> String {
    let mut lines = vec![
        "CLIENT INFORMATION".to_string(),
        format!("Name: {}", booking.name),
        format!("Phone: {}", booking.phone),
        String::new(),
        "STYLE DETAILS".to_string(),
        format!(
            "Style: {}",
            entry.map_or(booking.style.as_str(), |e| e.name.as_str())
        ),
    ];
    if let Some(length) = &booking.hair_length {
        lines.push(format!("Hair Length: {}", title_case(length)));
    }
    lines.push(format!("Duration: {} hours", booking.duration_hours));
    lines.extend(option_lines(booking, entry));

    let deposit_label = if booking.deposit_paid {
        "Deposit Paid"
    } else {
        "Deposit Due"
    };
    lines.extend([
        String::new(),
        "PRICING".to_string(),
        format!("Total Price: {}", money(booking.total_price)),
        format!("{deposit_label}: {}", money(booking.deposit_amount)),
        format!("Remaining Balance: {}", money(booking.remaining_balance())),
        String::new(),
        "NOTES".to_string(),
        booking
            .notes
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("None")
            .to_string(),
    ]);
    lines.join("\n")
}

fn option_lines(booking: &Booking, entry: Option<&ServiceEntry>) -> Vec<String> {
    let options = &booking.style_specific_options;
    let mut lines = vec![];

    for key in EXPLICIT_OPTIONAL_KEYS {
        if entry.is_some_and(|e| !e.options.contains_key(key)) {
            continue;
        }
        let chosen = options
            .get(key)
            .and_then(|value| entry.and_then(|e| e.choice(key, value)))
            .filter(|choice| choice.price > 0.0);
        let text = match chosen {
            Some(choice) => format!("{} (+{})", choice.label, money(choice.price)),
            None => "Not selected".to_string(),
        };
        lines.push(format!("• {}: {text}", option_label(key, entry)));
    }

    for (key, value) in options {
        if EXPLICIT_OPTIONAL_KEYS.contains(&key.as_str())
            || value.is_empty()
            || value == NOT_SELECTED
            || value == "none"
        {
            continue;
        }
        let text = match entry.and_then(|e| e.choice(key, value)) {
            Some(choice) if choice.price > 0.0 => {
                format!("{} (+{})", choice.label, money(choice.price))
            }
            Some(choice) => choice.label.clone(),
            None => title_case(value),
        };
        lines.push(format!("• {}: {text}", option_label(key, entry)));
    }
    lines
}

fn option_label(key: &str, entry: Option<&ServiceEntry>) -> String {
    entry
        .and_then(|e| e.options.get(key))
        .map(|option| option.label.clone())
        .unwrap_or_else(|| title_case(key))
}

fn title_case(raw: &str) -> String {
    raw.split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn money(amount: f64) -> String {
    format!("${amount:.2}")
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::db::queries::tests::sample_booking;
    use crate::models::Catalog;

    /// In-memory calendar keyed by the private booking id.
    #[derive(Default)]
    pub(crate) struct FakeCalendar {
        pub events: Mutex<Vec<(Option<String>, MirroredEvent)>>,
        pub inserts: Mutex<usize>,
    }

    impl FakeCalendar {
        pub(crate) fn with_untagged(summary: &str, description: &str) -> Self {
            let calendar = Self::default();
            calendar.events.lock().unwrap().push((
                None,
                MirroredEvent {
                    id: "legacy-1".to_string(),
                    summary: summary.to_string(),
                    description: description.to_string(),
                },
            ));
            calendar
        }

        pub(crate) fn count(&self) -> usize {
            self.events.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CalendarProvider for FakeCalendar {
        async fn find_by_booking_id(&self, booking_id: &str) -> anyhow::Result<Vec<MirroredEvent>> {
            Ok(self
                .events
                .lock()
                .unwrap()
                .iter()
                .filter(|(tag, _)| tag.as_deref() == Some(booking_id))
                .map(|(_, e)| e.clone())
                .collect())
        }

        async fn list_recent(&self, limit: usize) -> anyhow::Result<Vec<MirroredEvent>> {
            Ok(self
                .events
                .lock()
                .unwrap()
                .iter()
                .take(limit)
                .map(|(_, e)| e.clone())
                .collect())
        }

        async fn insert(&self, event: &NewEvent) -> anyhow::Result<String> {
            let mut inserts = self.inserts.lock().unwrap();
            *inserts += 1;
            let id = format!("evt-{inserts}");
            self.events.lock().unwrap().push((
                Some(event.booking_id.clone()),
                MirroredEvent {
                    id: id.clone(),
                    summary: event.summary.clone(),
                    description: event.description.clone(),
                },
            ));
            Ok(id)
        }

        async fn delete(&self, event_id: &str) -> anyhow::Result<()> {
            self.events.lock().unwrap().retain(|(_, e)| e.id != event_id);
            Ok(())
        }
    }

    fn offset() -> FixedOffset {
        FixedOffset::west_opt(4 * 3600).unwrap()
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let calendar = FakeCalendar::default();
        let booking = sample_booking("BK1", "2025-06-10", 10, 1.0);

        let first = mirror_create(&calendar, &booking, None, offset()).await.unwrap();
        let second = mirror_create(&calendar, &booking, None, offset()).await.unwrap();

        assert_eq!(first, MirrorOutcome::Created("evt-1".to_string()));
        assert_eq!(second, MirrorOutcome::AlreadyMirrored);
        assert_eq!(calendar.count(), 1);
    }

    #[tokio::test]
    async fn test_delete_by_booking_id() {
        let calendar = FakeCalendar::default();
        let booking = sample_booking("BK1", "2025-06-10", 10, 1.0);
        let other = sample_booking("BK2", "2025-06-10", 12, 1.0);
        mirror_create(&calendar, &booking, None, offset()).await.unwrap();
        mirror_create(&calendar, &other, None, offset()).await.unwrap();

        assert_eq!(mirror_delete(&calendar, &booking).await.unwrap(), 1);
        assert_eq!(calendar.count(), 1);
        assert!(calendar.find_by_booking_id("BK2").await.unwrap().len() == 1);
    }

    #[tokio::test]
    async fn test_delete_falls_back_to_name_and_phone() {
        let booking = sample_booking("BK1", "2025-06-10", 10, 1.0);
        let calendar = FakeCalendar::with_untagged(
            "Ama Mensah - cornrows",
            "Name: Ama Mensah\nPhone: (860) 555-0100",
        );
        assert_eq!(mirror_delete(&calendar, &booking).await.unwrap(), 1);
        assert_eq!(calendar.count(), 0);

        let calendar = FakeCalendar::with_untagged("Ama Mensah - cornrows", "Phone: 203-555-0199");
        assert_eq!(mirror_delete(&calendar, &booking).await.unwrap(), 0);
        assert_eq!(calendar.count(), 1);
    }

    #[test]
    fn test_event_text() {
        let catalog = Catalog::embedded().unwrap();
        let mut booking = sample_booking("BK1", "2025-06-10", 10, 1.0);
        booking
            .style_specific_options
            .insert("wash-service".to_string(), "wash".to_string());
        booking
            .style_specific_options
            .insert("detangle-service".to_string(), NOT_SELECTED.to_string());
        booking
            .style_specific_options
            .insert("pattern".to_string(), "zigzag".to_string());

        let event = build_event(&booking, catalog.get("cornrows"), offset()).unwrap();
        assert_eq!(event.summary, "Ama Mensah - cornrows");
        assert_eq!(event.color_id, COLOR_CONFIRMED);
        assert_eq!(event.start.to_rfc3339(), "2025-06-10T10:00:00-04:00");
        assert_eq!(event.end.to_rfc3339(), "2025-06-10T11:00:00-04:00");

        let text = &event.description;
        assert!(text.contains("Phone: (860) 555-0100"));
        assert!(text.contains("• Wash Service: Wash & Condition (+$30.00)"));
        assert!(text.contains("• Detangling Service: Not selected"));
        assert!(text.contains("Zigzag Pattern"));
        assert!(text.contains("Remaining Balance: $108.00"));
        assert!(text.contains("NOTES\nNone"));
    }

    #[test]
    fn test_pending_colour_and_missing_catalog_entry() {
        let mut booking = sample_booking("BK1", "2025-06-10", 10, 1.5);
        booking.status = BookingStatus::Pending;
        booking.deposit_paid = false;
        let event = build_event(&booking, None, offset()).unwrap();
        assert_eq!(event.color_id, COLOR_PENDING);
        assert_eq!(event.end.to_rfc3339(), "2025-06-10T11:30:00-04:00");
        assert!(event.description.contains("Deposit Due: $12.00"));
        assert!(event.description.contains("• Wash Service: Not selected"));
        assert!(event.description.contains("• Style Choice: With Style"));
    }

    #[test]
    fn test_event_rejects_runaway_duration() {
        let booking = sample_booking("BK1", "2025-06-10", 10, 1e13);
        let err = build_event(&booking, None, offset()).unwrap_err();
        assert!(err.to_string().contains("duration out of range"));
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("hair-upgrade"), "Hair Upgrade");
        assert_eq!(title_case("midback"), "Midback");
    }
}
