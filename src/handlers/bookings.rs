use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::{self, queries};
use crate::errors::AppError;
use crate::models::booking::parse_date;
use crate::models::BookingInput;
use crate::services::lifecycle::{self, RescheduleRequest, RescheduleResult};
use crate::state::AppState;

// GET /bookings?date= | ?phonePrefix=
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingsQuery {
    pub date: Option<String>,
    pub phone_prefix: Option<String>,
    pub phone: Option<String>,
}

pub async fn get_bookings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Value>, AppError> {
    if let Some(raw) = query.date.as_deref().filter(|d| !d.trim().is_empty()) {
        let date = parse_date(raw).map_err(AppError::Validation)?;
        let bookings = {
            let conn = db::lock(&state.db)?;
            queries::get_bookings_for_date(&conn, date)?
        };
        return Ok(Json(json!({ "bookings": bookings })));
    }

    let prefix = query
        .phone_prefix
        .as_deref()
        .or(query.phone.as_deref())
        .map(queries::digits_only)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::Validation("Date or phone number is required".to_string()))?;

    let bookings = {
        let conn = db::lock(&state.db)?;
        queries::search_by_phone_prefix(&conn, &prefix)?
    };
    tracing::debug!(prefix = %prefix, count = bookings.len(), "phone search");

    Ok(Json(json!({
        "success": true,
        "count": bookings.len(),
        "bookings": bookings,
    })))
}

// POST /bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(input): Json<BookingInput>,
) -> Result<Json<Value>, AppError> {
    let booking = lifecycle::save_booking(&state, input).await?;
    Ok(Json(json!({
        "success": true,
        "bookingId": booking.booking_id,
        "status": booking.status,
        "message": "Booking saved successfully",
    })))
}

// POST /bookings/update
pub async fn update_booking(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RescheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let RescheduleResult {
        booking_id,
        new_date,
        new_time,
    } = lifecycle::reschedule(&state, req).await?;

    Ok(Json(json!({
        "success": true,
        "bookingId": booking_id,
        "newDate": new_date,
        "newTime": new_time,
    })))
}

// POST /bookings/cancel
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    #[serde(default)]
    pub booking_id: String,
}

pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<Value>, AppError> {
    lifecycle::cancel(&state, &req.booking_id).await?;
    Ok(Json(json!({ "success": true })))
}
