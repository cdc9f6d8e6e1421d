use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::BookingInput;
use crate::services::lifecycle;
use crate::state::AppState;

// POST /payment-intents
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentRequest {
    #[serde(alias = "amount")]
    pub amount_cents: f64,
    #[serde(alias = "bookingData")]
    pub booking_draft: BookingInput,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentResponse {
    client_secret: String,
    payment_intent_id: String,
    booking_id: String,
}

pub async fn create_payment_intent(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PaymentIntentRequest>,
) -> Result<Json<PaymentIntentResponse>, AppError> {
    let started = lifecycle::start_payment(&state, req.amount_cents, &req.booking_draft).await?;
    Ok(Json(PaymentIntentResponse {
        client_secret: started.intent.client_secret,
        payment_intent_id: started.intent.id,
        booking_id: started.booking_id,
    }))
}
