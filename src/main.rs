use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;

use salonbook::config::AppConfig;
use salonbook::db;
use salonbook::models::Catalog;
use salonbook::services::availability::{BookingSnapshot, BusinessClock};
use salonbook::services::mirror::google::GoogleCalendar;
use salonbook::services::mirror::{CalendarProvider, NoopCalendar};
use salonbook::services::payments::stripe::StripeGateway;
use salonbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;
    let catalog = Catalog::load(config.catalog_path.as_deref())?;
    tracing::info!("loaded catalog with {} services", catalog.services.len());

    anyhow::ensure!(
        !config.stripe_secret_key.is_empty(),
        "STRIPE_SECRET_KEY must be set"
    );
    let payments = StripeGateway::new(
        config.stripe_secret_key.clone(),
        config.stripe_currency.clone(),
    );

    let calendar: Box<dyn CalendarProvider> =
        if config.google_calendar_id.is_empty() || config.google_calendar_token.is_empty() {
            tracing::warn!("GOOGLE_CALENDAR_ID/GOOGLE_CALENDAR_TOKEN not set, calendar mirroring disabled");
            Box::new(NoopCalendar)
        } else {
            tracing::info!("mirroring bookings to calendar {}", config.google_calendar_id);
            Box::new(GoogleCalendar::new(
                config.google_calendar_id.clone(),
                config.google_calendar_token.clone(),
            ))
        };

    if config.admin_token == "changeme" {
        tracing::warn!("ADMIN_TOKEN is the default value, set it before exposing the admin API");
    }

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        catalog: Arc::new(catalog),
        payments: Box::new(payments),
        calendar,
        clock: Box::new(BusinessClock::new(config.rules.clone())),
        snapshot: BookingSnapshot::default(),
    });

    let app = salonbook::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
