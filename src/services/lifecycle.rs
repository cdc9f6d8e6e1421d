use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::{self, queries};
use crate::errors::AppError;
use crate::models::booking::{hour_format, normalize_schedule, round_cents};
use crate::models::{Booking, BookingInput, BookingStatus};
use crate::services::availability;
use crate::services::mirror::{self, MirrorOutcome};
use crate::services::payments::{IntentSummary, PaymentIntent, PaymentStatus, MIN_CHARGE_CENTS};
use crate::services::pricing::{self, Selection};
use crate::services::scheduling;
use crate::state::AppState;

const MIN_PHONE_DIGITS: usize = 7;
const MAX_PHONE_DIGITS: usize = 15;

/// A draft that passed field validation.
#[derive(Debug, Clone)]
pub struct ValidDraft {
    pub name: String,
    pub phone: String,
    pub style: String,
    pub date: NaiveDate,
    pub start_hour: u32,
}

pub fn validate_draft(input: &BookingInput) -> Result<ValidDraft, AppError> {
    let (date, start_hour) = input.schedule().map_err(AppError::Validation)?;
    let name = required(input.name.as_deref(), "name")?;
    let phone = required(input.phone.as_deref(), "phone")?;
    let style = required(input.style.as_deref(), "style")?;

    if !is_plausible_phone(&phone) {
        return Err(AppError::Validation(format!("invalid phone number: {phone}")));
    }

    Ok(ValidDraft {
        name,
        phone,
        style,
        date,
        start_hour,
    })
}

fn required(value: Option<&str>, field: &str) -> Result<String, AppError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::Validation(format!("Missing required field: {field}")))
}

/// Loose international format: digits with optional `+`, spaces, dashes, dots, parentheses.
pub fn is_plausible_phone(phone: &str) -> bool {
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '.' | '(' | ')'));
    let digits = queries::digits_only(phone).len();
    allowed && (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits)
}

/// An intent bound to the booking id it will confirm.
#[derive(Debug, Clone)]
pub struct PaymentStart {
    pub booking_id: String,
    pub intent: PaymentIntent,
}

/// Draft → PendingPayment. The intent's client secret goes back to the browser.
pub async fn start_payment(
    state: &AppState,
    amount_cents: f64,
    draft: &BookingInput,
) -> Result<PaymentStart, AppError> {
    if !amount_cents.is_finite() {
        return Err(AppError::Validation("Invalid deposit amount".to_string()));
    }
    let amount_cents = amount_cents.round() as i64;
    if amount_cents < MIN_CHARGE_CENTS {
        return Err(AppError::Validation("Deposit amount is too low".to_string()));
    }

    let valid = validate_draft(draft)?;
    let quote = pricing::resolve_price(
        &state.catalog,
        Selection {
            service_id: &valid.style,
            hair_length: draft.hair_length.as_deref(),
            options: &draft.style_specific_options,
        },
    );
    if state.catalog.get(&valid.style).is_some() && quote.is_complete() {
        let expected = quote.deposit_cents();
        if expected != amount_cents {
            tracing::warn!(
                style = %valid.style,
                expected,
                requested = amount_cents,
                "deposit does not match catalog price"
            );
            return Err(AppError::Validation(
                "Deposit amount does not match the selected service".to_string(),
            ));
        }
    }

    let booking_id = clean_booking_id(draft.booking_id.as_deref()).unwrap_or_else(generate_booking_id);
    let mut metadata = BTreeMap::new();
    metadata.insert("bookingId".to_string(), booking_id.clone());
    metadata.insert("customerName".to_string(), valid.name.clone());
    metadata.insert("service".to_string(), valid.style.clone());
    metadata.insert(
        "appointment".to_string(),
        format!("{} {}", valid.date, hour_format::to_string(valid.start_hour)),
    );
    if let Some(total) = draft.total_price {
        metadata.insert("totalPrice".to_string(), total.to_string());
    }
    metadata.insert(
        "depositAmount".to_string(),
        format!("{:.2}", amount_cents as f64 / 100.0),
    );

    let intent = state
        .payments
        .create_intent(amount_cents, &metadata)
        .await
        .map_err(|e| AppError::Upstream(format!("{e:#}")))?;

    tracing::info!(%booking_id, style = %valid.style, amount_cents, "payment intent created");
    Ok(PaymentStart { booking_id, intent })
}

/// PendingPayment → Confirmed, or a pending record when no payment reference is supplied.
pub async fn save_booking(state: &AppState, input: BookingInput) -> Result<Booking, AppError> {
    let valid = validate_draft(&input)?;
    let selection = Selection {
        service_id: &valid.style,
        hair_length: input.hair_length.as_deref(),
        options: &input.style_specific_options,
    };

    let duration_hours = input
        .duration_hours()
        .unwrap_or_else(|| pricing::resolve_duration(&state.catalog, selection));
    if duration_hours <= 0.0 {
        return Err(AppError::Validation(
            "Missing or invalid duration for the selected service".to_string(),
        ));
    }
    let day_length = state.config.rules.day_length_hours();
    if duration_hours > day_length {
        return Err(AppError::Validation(format!(
            "A {duration_hours}-hour appointment does not fit in a {day_length}-hour business day"
        )));
    }

    let quote = pricing::resolve_price(&state.catalog, selection);
    let total_price = input.total_price.unwrap_or(quote.total_price);
    let requested_id = clean_booking_id(input.booking_id.as_deref());

    let (booking_id, status, deposit_amount) = match input.payment_intent_id.as_deref() {
        Some(intent_id) => {
            let intent = verify_payment(state, intent_id).await?;
            let booking_id = match (requested_id, intent.booking_id()) {
                (Some(requested), Some(paid_for)) if requested == paid_for => requested,
                (None, Some(paid_for)) => paid_for.to_string(),
                (requested, paid_for) => {
                    tracing::warn!(intent_id, ?requested, ?paid_for, "payment booking mismatch");
                    return Err(AppError::Validation(
                        "Payment does not belong to this booking".to_string(),
                    ));
                }
            };
            let deposit = input
                .deposit_amount
                .map(round_cents)
                .unwrap_or(intent.amount_cents as f64 / 100.0);
            if to_cents(deposit) != intent.amount_cents {
                tracing::warn!(
                    intent_id,
                    paid_cents = intent.amount_cents,
                    deposit,
                    "payment amount mismatch"
                );
                return Err(AppError::Validation(
                    "Payment amount does not match the deposit".to_string(),
                ));
            }
            (booking_id, BookingStatus::Confirmed, deposit)
        }
        None => (
            requested_id.unwrap_or_else(generate_booking_id),
            BookingStatus::Pending,
            input
                .deposit_amount
                .map(round_cents)
                .unwrap_or_else(|| pricing::deposit_for(total_price)),
        ),
    };

    let now = Utc::now().naive_utc();
    let draft = Booking {
        booking_id,
        name: valid.name,
        phone: valid.phone,
        style_specific_options: pricing::normalize_options(
            &state.catalog,
            &valid.style,
            &input.style_specific_options,
        ),
        style: valid.style,
        hair_length: input.hair_length.clone(),
        date: valid.date,
        start_hour: valid.start_hour,
        duration_hours,
        total_price,
        deposit_amount,
        deposit_paid: status == BookingStatus::Confirmed,
        payment_method: input
            .payment_method
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| "card".to_string()),
        status,
        notes: input.notes.clone(),
        style_image: input.style_image.clone(),
        hair_image: input.hair_image.clone(),
        rescheduled: false,
        original_date: None,
        original_time: None,
        created_at: now,
        updated_at: now,
    };

    let (booking, written) = store_booking(state, draft)?;
    if written {
        state.snapshot.record(booking.slot());
        tracing::info!(
            booking_id = %booking.booking_id,
            status = booking.status.as_str(),
            date = %booking.date,
            time = %booking.time_label(),
            "booking saved"
        );
    } else {
        tracing::info!(booking_id = %booking.booking_id, "confirmed booking re-posted, kept as stored");
    }

    if booking.status == BookingStatus::Confirmed {
        mirror_created(state, &booking).await;
    }
    Ok(booking)
}

async fn verify_payment(state: &AppState, intent_id: &str) -> Result<IntentSummary, AppError> {
    let intent = state
        .payments
        .retrieve_intent(intent_id)
        .await
        .map_err(|e| AppError::Upstream(format!("{e:#}")))?;
    match &intent.status {
        PaymentStatus::Succeeded => Ok(intent),
        PaymentStatus::Failed(message) => Err(AppError::PaymentDeclined(message.clone())),
        PaymentStatus::Pending => Err(AppError::PaymentDeclined(
            "Payment has not completed yet".to_string(),
        )),
    }
}

/// Writes a new booking or an allowed re-save of an existing one.
///
/// A confirmed record is never rewritten here; it is returned as stored with `false`.
fn store_booking(state: &AppState, booking: Booking) -> Result<(Booking, bool), AppError> {
    let conn = db::lock(&state.db)?;
    if let Some(existing) = queries::get_booking_by_id(&conn, &booking.booking_id)? {
        check_resave(&existing, &booking)?;
        if existing.status == BookingStatus::Confirmed {
            return Ok((existing, false));
        }
    }
    if state.config.enforce_capacity_on_write {
        ensure_slot_open(state, &conn, &booking, booking.date, booking.start_hour)?;
    }
    queries::upsert_booking(&conn, &booking)?;
    Ok((booking, true))
}

/// Re-posting an id keeps its schedule and may only move along an allowed status edge.
fn check_resave(existing: &Booking, next: &Booking) -> Result<(), AppError> {
    if (existing.date, existing.start_hour) != (next.date, next.start_hour) {
        return Err(AppError::Validation(format!(
            "Booking {} is already scheduled for {} at {}; use reschedule to move it",
            existing.booking_id,
            existing.date,
            existing.time_label()
        )));
    }
    if existing.status != next.status && !existing.status.can_transition_to(next.status) {
        return Err(AppError::Validation(format!(
            "Booking {} is already {}",
            existing.booking_id,
            existing.status.as_str()
        )));
    }
    Ok(())
}

fn clean_booking_id(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleRequest {
    pub booking_id: Option<String>,
    pub new_date: Option<String>,
    pub new_time: Option<String>,
    /// Informational; the stored appointment is authoritative.
    pub original_date: Option<String>,
    pub original_time: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleResult {
    pub booking_id: String,
    pub new_date: NaiveDate,
    pub new_time: String,
}

/// Confirmed → Confirmed at a new date and hour.
pub async fn reschedule(state: &AppState, req: RescheduleRequest) -> Result<RescheduleResult, AppError> {
    let (Some(booking_id), Some(_), Some(_)) = (&req.booking_id, &req.new_date, &req.new_time)
    else {
        return Err(AppError::Validation("Missing required fields".to_string()));
    };
    let (new_date, new_hour) =
        normalize_schedule(req.new_date.as_deref(), req.new_time.as_deref())
            .map_err(AppError::Validation)?;

    let current = load_booking(state, booking_id)?;
    if current.status != BookingStatus::Confirmed {
        return Err(AppError::Validation(
            "Only confirmed bookings can be rescheduled".to_string(),
        ));
    }
    ensure_outside_lock_window(state, &current, "Rescheduling", "rescheduling")?;

    let day = availability::day_availability(
        state,
        new_date,
        current.duration_hours,
        Some(&current.booking_id),
    );
    match day.slot(new_hour) {
        Some(slot) if slot.state.is_bookable() => {}
        _ => {
            return Err(AppError::Validation(format!(
                "{} at {} is not available",
                new_date,
                hour_format::to_string(new_hour)
            )))
        }
    }

    {
        let conn = db::lock(&state.db)?;
        if state.config.enforce_capacity_on_write {
            ensure_slot_open(state, &conn, &current, new_date, new_hour)?;
        }
        let updated = queries::update_schedule(
            &conn,
            &current.booking_id,
            new_date,
            new_hour,
            current.date,
            current.start_hour,
        )?;
        if !updated {
            return Err(AppError::NotFound(format!("booking {}", current.booking_id)));
        }
    }

    let moved = Booking {
        date: new_date,
        start_hour: new_hour,
        rescheduled: true,
        original_date: Some(current.date),
        original_time: Some(current.time_label()),
        ..current.clone()
    };
    state.snapshot.record(moved.slot());
    tracing::info!(
        booking_id = %moved.booking_id,
        from = %format!("{} {}", current.date, current.time_label()),
        to = %format!("{} {}", new_date, moved.time_label()),
        "booking rescheduled"
    );

    mirror_removed(state, &current).await;
    tokio::time::sleep(state.config.mirror_settle_delay).await;
    mirror_created(state, &moved).await;

    Ok(RescheduleResult {
        booking_id: moved.booking_id.clone(),
        new_date,
        new_time: moved.time_label(),
    })
}

/// Confirmed → Cancelled. The record is removed.
pub async fn cancel(state: &AppState, booking_id: &str) -> Result<(), AppError> {
    if booking_id.trim().is_empty() {
        return Err(AppError::Validation("Missing bookingId".to_string()));
    }
    let current = load_booking(state, booking_id)?;
    if !current.status.can_transition_to(BookingStatus::Cancelled) {
        return Err(AppError::Validation(
            "Only confirmed bookings can be cancelled".to_string(),
        ));
    }
    ensure_outside_lock_window(state, &current, "Cancellation", "cancellation")?;

    mirror_removed(state, &current).await;

    let deleted = {
        let conn = db::lock(&state.db)?;
        queries::delete_booking(&conn, &current.booking_id)?
    };
    if !deleted {
        return Err(AppError::NotFound(format!("booking {booking_id}")));
    }
    state.snapshot.forget(&current.booking_id);
    tracing::info!(booking_id = %current.booking_id, "booking cancelled");
    Ok(())
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub created: usize,
    pub already_mirrored: usize,
    pub errors: usize,
}

/// Mirrors every stored, non-cancelled booking; existing events are left alone.
pub async fn sync_all(state: &AppState) -> Result<SyncReport, AppError> {
    let bookings = {
        let conn = db::lock(&state.db)?;
        queries::list_bookings(
            &conn,
            &queries::BookingFilter {
                limit: i64::MAX,
                ..Default::default()
            },
        )?
    };

    let offset = state.config.rules.offset();
    let mut report = SyncReport::default();
    for booking in bookings
        .iter()
        .filter(|b| b.status != BookingStatus::Cancelled)
    {
        let entry = state.catalog.get(&booking.style);
        match mirror::mirror_create(state.calendar.as_ref(), booking, entry, offset).await {
            Ok(MirrorOutcome::Created(_)) => report.created += 1,
            Ok(MirrorOutcome::AlreadyMirrored) => report.already_mirrored += 1,
            Err(e) => {
                report.errors += 1;
                tracing::error!(booking_id = %booking.booking_id, "calendar sync failed: {e:#}");
            }
        }
    }
    tracing::info!(
        created = report.created,
        already_mirrored = report.already_mirrored,
        errors = report.errors,
        "calendar sync finished"
    );
    Ok(report)
}

fn load_booking(state: &AppState, booking_id: &str) -> Result<Booking, AppError> {
    let conn = db::lock(&state.db)?;
    queries::get_booking_by_id(&conn, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))
}

fn ensure_outside_lock_window(
    state: &AppState,
    booking: &Booking,
    action: &str,
    action_lower: &str,
) -> Result<(), AppError> {
    let rules = &state.config.rules;
    if scheduling::is_within_lock_window(booking.start(), rules, state.clock.now()) {
        tracing::info!(booking_id = %booking.booking_id, action = action_lower, "inside lock window");
        return Err(AppError::LockWindow(format!(
            "{action} is not available within {} hours of your appointment. \
             Please call {} for urgent {action_lower} needs.",
            rules.lock_window_hours, state.config.business_phone
        )));
    }
    Ok(())
}

/// Re-checks capacity against the store while the caller holds the connection.
fn ensure_slot_open(
    state: &AppState,
    conn: &Connection,
    booking: &Booking,
    date: NaiveDate,
    hour: u32,
) -> Result<(), AppError> {
    let others: Vec<_> = queries::get_bookings_for_date(conn, date)?
        .iter()
        .filter(|b| b.booking_id != booking.booking_id)
        .map(|b| b.slot())
        .collect();
    let slots = scheduling::classify_day(
        date,
        booking.duration_hours,
        &others,
        &state.config.rules,
        state.clock.now(),
    );
    match slots.iter().find(|s| s.hour == hour) {
        Some(slot) if slot.state.is_bookable() => Ok(()),
        _ => Err(AppError::Validation(
            "That time is no longer available".to_string(),
        )),
    }
}

async fn mirror_created(state: &AppState, booking: &Booking) {
    let entry = state.catalog.get(&booking.style);
    let offset = state.config.rules.offset();
    if let Err(e) = mirror::mirror_create(state.calendar.as_ref(), booking, entry, offset).await {
        tracing::error!(booking_id = %booking.booking_id, "calendar mirror create failed: {e:#}");
    }
}

async fn mirror_removed(state: &AppState, booking: &Booking) {
    if let Err(e) = mirror::mirror_delete(state.calendar.as_ref(), booking).await {
        tracing::error!(booking_id = %booking.booking_id, "calendar mirror delete failed: {e:#}");
    }
}

fn generate_booking_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("BK{}-{}", Utc::now().timestamp_millis(), &suffix[..8])
}
