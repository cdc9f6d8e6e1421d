use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::models::Catalog;
use crate::services::availability::{BookingSnapshot, Clock};
use crate::services::mirror::CalendarProvider;
use crate::services::payments::PaymentGateway;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub catalog: Arc<Catalog>,
    pub payments: Box<dyn PaymentGateway>,
    pub calendar: Box<dyn CalendarProvider>,
    pub clock: Box<dyn Clock>,
    pub snapshot: BookingSnapshot,
}
