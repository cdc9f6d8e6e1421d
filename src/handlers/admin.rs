use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::db::{self, queries};
use crate::errors::AppError;
use crate::models::booking::parse_date;
use crate::models::{Booking, BookingStatus};
use crate::services::lifecycle::{self, SyncReport};
use crate::state::AppState;

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if expected_token.is_empty() || token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

// GET /api/admin/bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<i64>,
}

pub async fn get_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| match s {
            "pending" | "confirmed" | "cancelled" => Ok(BookingStatus::parse(s)),
            _ => Err(AppError::Validation(format!("unknown status: {s}"))),
        })
        .transpose()?;
    let from = optional_date(query.from.as_deref())?;
    let to = optional_date(query.to.as_deref())?;

    let bookings = {
        let conn = db::lock(&state.db)?;
        queries::list_bookings(
            &conn,
            &queries::BookingFilter {
                status: status.as_ref().map(BookingStatus::as_str),
                from,
                to,
                limit: query.limit.unwrap_or(100).clamp(1, 1000),
            },
        )?
    };

    Ok(Json(bookings))
}

fn optional_date(raw: Option<&str>) -> Result<Option<chrono::NaiveDate>, AppError> {
    raw.filter(|s| !s.is_empty())
        .map(|s| parse_date(s).map_err(AppError::Validation))
        .transpose()
}

// GET /api/admin/stats
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<queries::DashboardStats>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let today = state.clock.now().date();
    let stats = {
        let conn = db::lock(&state.db)?;
        queries::get_dashboard_stats(&conn, today)?
    };
    Ok(Json(stats))
}

// POST /api/admin/sync-calendar
pub async fn sync_calendar(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SyncReport>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    Ok(Json(lifecycle::sync_all(&state).await?))
}
