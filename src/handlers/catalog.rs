use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::Catalog;
use crate::services::pricing::{self, Quote, Selection};
use crate::state::AppState;

// GET /catalog
pub async fn get_catalog(State(state): State<Arc<AppState>>) -> Json<Catalog> {
    Json(state.catalog.as_ref().clone())
}

// POST /quote
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub style: String,
    pub hair_length: Option<String>,
    #[serde(default)]
    pub style_specific_options: BTreeMap<String, String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    #[serde(flatten)]
    quote: Quote,
    duration_hours: f64,
    complete: bool,
}

pub async fn quote(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>, AppError> {
    if state.catalog.get(&req.style).is_none() {
        return Err(AppError::NotFound(format!("service {}", req.style)));
    }

    let selection = Selection {
        service_id: &req.style,
        hair_length: req.hair_length.as_deref(),
        options: &req.style_specific_options,
    };
    let quote = pricing::resolve_price(&state.catalog, selection);
    let duration_hours = pricing::resolve_duration(&state.catalog, selection);

    Ok(Json(QuoteResponse {
        complete: quote.is_complete() && duration_hours > 0.0,
        quote,
        duration_hours,
    }))
}
