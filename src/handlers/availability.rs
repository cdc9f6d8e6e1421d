use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::booking::{parse_date, parse_duration_value};
use crate::models::{CalendarDay, DayAvailability};
use crate::services::pricing::{self, Selection};
use crate::services::{availability, scheduling};
use crate::state::AppState;

// GET /availability
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityQuery {
    pub date: Option<String>,
    pub style: Option<String>,
    pub hair_length: Option<String>,
    pub duration: Option<String>,
    pub exclude_booking_id: Option<String>,
}

pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<DayAvailability>, AppError> {
    let date = query
        .date
        .as_deref()
        .ok_or_else(|| AppError::Validation("Date parameter is required".to_string()))
        .and_then(|d| parse_date(d).map_err(AppError::Validation))?;

    let duration_hours = match query.duration.as_deref() {
        Some(raw) => parse_duration_value(&serde_json::Value::String(raw.to_string()))
            .ok_or_else(|| AppError::Validation(format!("invalid duration: {raw}")))?,
        None => {
            let no_options = BTreeMap::new();
            pricing::resolve_duration(
                &state.catalog,
                Selection {
                    service_id: query.style.as_deref().unwrap_or_default(),
                    hair_length: query.hair_length.as_deref(),
                    options: &no_options,
                },
            )
        }
    };
    if duration_hours <= 0.0 {
        return Err(AppError::Validation(
            "Select a service and length to see available times".to_string(),
        ));
    }

    Ok(Json(availability::day_availability(
        &state,
        date,
        duration_hours,
        query.exclude_booking_id.as_deref(),
    )))
}

// GET /calendar/days
#[derive(Deserialize)]
pub struct MonthQuery {
    pub month: String,
}

#[derive(Serialize)]
pub struct MonthResponse {
    month: String,
    days: Vec<CalendarDay>,
}

pub async fn get_month(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MonthQuery>,
) -> Result<Json<MonthResponse>, AppError> {
    let first = NaiveDate::parse_from_str(&format!("{}-01", query.month.trim()), "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("invalid month: {}", query.month)))?;

    let days = scheduling::month_days(
        first.year(),
        first.month(),
        &state.config.rules,
        state.clock.now(),
    );
    Ok(Json(MonthResponse {
        month: first.format("%Y-%m").to_string(),
        days,
    }))
}
