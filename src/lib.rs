pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod services;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/catalog", get(handlers::catalog::get_catalog))
        .route("/quote", post(handlers::catalog::quote))
        .route("/availability", get(handlers::availability::get_availability))
        .route("/calendar/days", get(handlers::availability::get_month))
        .route(
            "/bookings",
            get(handlers::bookings::get_bookings).post(handlers::bookings::create_booking),
        )
        .route("/bookings/update", post(handlers::bookings::update_booking))
        .route("/bookings/cancel", post(handlers::bookings::cancel_booking))
        .route(
            "/payment-intents",
            post(handlers::payments::create_payment_intent),
        )
        .route("/api/admin/bookings", get(handlers::admin::get_bookings))
        .route("/api/admin/stats", get(handlers::admin::get_stats))
        .route(
            "/api/admin/sync-calendar",
            post(handlers::admin::sync_calendar),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
