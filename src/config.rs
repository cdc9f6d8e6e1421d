use std::env;
use std::str::FromStr;
use std::time::Duration;

use chrono::{FixedOffset, NaiveDateTime, Offset, Utc, Weekday};

/// Scheduling policy shared by the slot engine and the lifecycle controller.
#[derive(Clone, Debug)]
pub struct BusinessRules {
    pub open_hour: u32,
    pub close_hour: u32,
    pub closed_days: Vec<Weekday>,
    /// Day-level notice used by the month calendar.
    pub day_advance_hours: i64,
    /// Hour-level notice measured from a slot's exact start.
    pub slot_advance_hours: i64,
    pub max_concurrent: usize,
    pub lock_window_hours: i64,
    pub utc_offset_hours: i32,
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            open_hour: 7,
            close_hour: 18,
            closed_days: vec![Weekday::Sun],
            day_advance_hours: 30,
            slot_advance_hours: 24,
            max_concurrent: 2,
            lock_window_hours: 48,
            utc_offset_hours: -4,
        }
    }
}

impl BusinessRules {
    /// The business timezone; out-of-range offsets fall back to UTC.
    pub fn offset(&self) -> FixedOffset {
        self.utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }

    /// Longest appointment that fits between opening and closing.
    pub fn day_length_hours(&self) -> f64 {
        self.close_hour.saturating_sub(self.open_hour) as f64
    }

    /// Wall-clock time at the business.
    pub fn local_now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.offset()).naive_local()
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub catalog_path: Option<String>,
    pub business_phone: String,
    pub rules: BusinessRules,
    pub mirror_settle_delay: Duration,
    pub enforce_capacity_on_write: bool,
    pub stripe_secret_key: String,
    pub stripe_currency: String,
    pub google_calendar_id: String,
    pub google_calendar_token: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = BusinessRules::default();
        let rules = BusinessRules {
            open_hour: parse_var("BUSINESS_OPEN_HOUR", defaults.open_hour),
            close_hour: parse_var("BUSINESS_CLOSE_HOUR", defaults.close_hour),
            closed_days: env::var("BUSINESS_CLOSED_DAYS")
                .map(|v| parse_weekdays(&v))
                .unwrap_or(defaults.closed_days),
            day_advance_hours: parse_var("DAY_ADVANCE_HOURS", defaults.day_advance_hours),
            slot_advance_hours: parse_var("SLOT_ADVANCE_HOURS", defaults.slot_advance_hours),
            max_concurrent: parse_var("MAX_CONCURRENT_BOOKINGS", defaults.max_concurrent),
            lock_window_hours: parse_var("LOCK_WINDOW_HOURS", defaults.lock_window_hours),
            utc_offset_hours: parse_var("BUSINESS_UTC_OFFSET_HOURS", defaults.utc_offset_hours),
        };

        Self {
            port: parse_var("PORT", 3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "salonbook.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            catalog_path: env::var("CATALOG_PATH").ok().filter(|p| !p.is_empty()),
            business_phone: env::var("BUSINESS_PHONE")
                .unwrap_or_else(|_| "860-425-0751".to_string()),
            rules,
            mirror_settle_delay: Duration::from_millis(parse_var("MIRROR_SETTLE_DELAY_MS", 3000)),
            enforce_capacity_on_write: parse_var("ENFORCE_CAPACITY_ON_WRITE", false),
            stripe_secret_key: env::var("STRIPE_SECRET_KEY").unwrap_or_default(),
            stripe_currency: env::var("STRIPE_CURRENCY").unwrap_or_else(|_| "usd".to_string()),
            google_calendar_id: env::var("GOOGLE_CALENDAR_ID").unwrap_or_default(),
            google_calendar_token: env::var("GOOGLE_CALENDAR_TOKEN").unwrap_or_default(),
        }
    }
}

fn parse_var<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_weekdays(raw: &str) -> Vec<Weekday> {
    raw.split(',')
        .filter_map(|d| d.trim().parse::<Weekday>().ok())
        .collect()
}
