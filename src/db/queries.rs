use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::booking::hour_format;
use crate::models::{Booking, BookingStatus};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

const BOOKING_COLUMNS: &str = "booking_id, name, phone, style, hair_length, date, start_hour, \
     duration_hours, total_price, deposit_amount, deposit_paid, payment_method, status, \
     style_options, notes, style_image, hair_image, rescheduled, original_date, original_time, \
     created_at, updated_at";

// ── Bookings ──

/// Inserts or replaces the booking keyed by `booking_id`; `created_at` survives updates.
pub fn upsert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    let style_options = serde_json::to_string(&booking.style_specific_options)?;

    conn.execute(
        "INSERT INTO bookings (booking_id, name, phone, phone_digits, style, hair_length, date,
            start_hour, duration_hours, total_price, deposit_amount, deposit_paid, payment_method,
            status, style_options, notes, style_image, hair_image, rescheduled, original_date,
            original_time, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18,
            ?19, ?20, ?21, ?22, ?23)
         ON CONFLICT(booking_id) DO UPDATE SET
           name = excluded.name,
           phone = excluded.phone,
           phone_digits = excluded.phone_digits,
           style = excluded.style,
           hair_length = excluded.hair_length,
           date = excluded.date,
           start_hour = excluded.start_hour,
           duration_hours = excluded.duration_hours,
           total_price = excluded.total_price,
           deposit_amount = excluded.deposit_amount,
           deposit_paid = excluded.deposit_paid,
           payment_method = excluded.payment_method,
           status = excluded.status,
           style_options = excluded.style_options,
           notes = excluded.notes,
           style_image = excluded.style_image,
           hair_image = excluded.hair_image,
           rescheduled = excluded.rescheduled,
           original_date = excluded.original_date,
           original_time = excluded.original_time,
           updated_at = excluded.updated_at",
        params![
            booking.booking_id,
            booking.name,
            booking.phone,
            digits_only(&booking.phone),
            booking.style,
            booking.hair_length,
            booking.date.format(DATE_FORMAT).to_string(),
            booking.start_hour,
            booking.duration_hours,
            booking.total_price,
            booking.deposit_amount,
            booking.deposit_paid,
            booking.payment_method,
            booking.status.as_str(),
            style_options,
            booking.notes,
            booking.style_image,
            booking.hair_image,
            booking.rescheduled,
            booking.original_date.map(|d| d.format(DATE_FORMAT).to_string()),
            booking.original_time,
            booking.created_at.format(TS_FORMAT).to_string(),
            booking.updated_at.format(TS_FORMAT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE booking_id = ?1");
    let result = conn
        .query_row(&sql, params![id], |row| Ok(parse_booking_row(row)))
        .optional()?;

    result.transpose()
}

/// Active bookings on `date`, in start order.
pub fn get_bookings_for_date(conn: &Connection, date: NaiveDate) -> anyhow::Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE date = ?1 AND status != 'cancelled' ORDER BY start_hour ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![date.format(DATE_FORMAT).to_string()], |row| {
        Ok(parse_booking_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Prefix match on the digits of the stored phone number.
pub fn search_by_phone_prefix(conn: &Connection, prefix: &str) -> anyhow::Result<Vec<Booking>> {
    let digits = digits_only(prefix);
    if digits.is_empty() {
        return Ok(vec![]);
    }

    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE substr(phone_digits, 1, ?2) = ?1 ORDER BY date ASC, start_hour ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![digits, digits.len() as i64], |row| {
        Ok(parse_booking_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn update_schedule(
    conn: &Connection,
    id: &str,
    new_date: NaiveDate,
    new_hour: u32,
    original_date: NaiveDate,
    original_hour: u32,
) -> anyhow::Result<bool> {
    let now = Utc::now().naive_utc().format(TS_FORMAT).to_string();
    let count = conn.execute(
        "UPDATE bookings SET date = ?1, start_hour = ?2, original_date = ?3, original_time = ?4,
            rescheduled = 1, updated_at = ?5
         WHERE booking_id = ?6",
        params![
            new_date.format(DATE_FORMAT).to_string(),
            new_hour,
            original_date.format(DATE_FORMAT).to_string(),
            hour_format::to_string(original_hour),
            now,
            id,
        ],
    )?;
    Ok(count > 0)
}

pub fn delete_booking(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM bookings WHERE booking_id = ?1", params![id])?;
    Ok(count > 0)
}

#[derive(Debug, Default)]
pub struct BookingFilter<'a> {
    pub status: Option<&'a str>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: i64,
}

pub fn list_bookings(conn: &Connection, filter: &BookingFilter) -> anyhow::Result<Vec<Booking>> {
    let mut clauses: Vec<&str> = vec![];
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![];

    if let Some(status) = filter.status {
        clauses.push("status = ?");
        values.push(Box::new(status.to_string()));
    }
    if let Some(from) = filter.from {
        clauses.push("date >= ?");
        values.push(Box::new(from.format(DATE_FORMAT).to_string()));
    }
    if let Some(to) = filter.to {
        clauses.push("date <= ?");
        values.push(Box::new(to.format(DATE_FORMAT).to_string()));
    }
    values.push(Box::new(filter.limit));

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings {where_sql}
         ORDER BY date ASC, start_hour ASC LIMIT ?"
    );

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn get_dashboard_stats(conn: &Connection, today: NaiveDate) -> anyhow::Result<DashboardStats> {
    let today = today.format(DATE_FORMAT).to_string();

    let (total_bookings, pending_count, confirmed_count): (i64, i64, i64) = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(status = 'pending'), 0),
                COALESCE(SUM(status = 'confirmed'), 0)
         FROM bookings",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    let upcoming_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings WHERE date >= ?1 AND status = 'confirmed'",
        params![today],
        |row| row.get(0),
    )?;

    let (deposits_collected, outstanding_balance): (f64, f64) = conn.query_row(
        "SELECT COALESCE(SUM(CASE WHEN deposit_paid = 1 THEN deposit_amount ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN deposit_paid = 1 THEN total_price - deposit_amount
                                  ELSE total_price END), 0)
         FROM bookings WHERE status != 'cancelled'",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    Ok(DashboardStats {
        total_bookings,
        pending_count,
        confirmed_count,
        upcoming_count,
        deposits_collected,
        outstanding_balance,
    })
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_bookings: i64,
    pub pending_count: i64,
    pub confirmed_count: i64,
    pub upcoming_count: i64,
    pub deposits_collected: f64,
    pub outstanding_balance: f64,
}

pub fn digits_only(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let date_str: String = row.get(5)?;
    let style_options_json: String = row.get(13)?;
    let original_date_str: Option<String> = row.get(18)?;
    let created_at_str: String = row.get(20)?;
    let updated_at_str: String = row.get(21)?;

    let date = NaiveDate::parse_from_str(&date_str, DATE_FORMAT)?;
    let style_specific_options: BTreeMap<String, String> =
        serde_json::from_str(&style_options_json).unwrap_or_default();
    let original_date = original_date_str
        .and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok());
    let created_at = NaiveDateTime::parse_from_str(&created_at_str, TS_FORMAT)
        .unwrap_or_else(|_| Utc::now().naive_utc());
    let updated_at = NaiveDateTime::parse_from_str(&updated_at_str, TS_FORMAT)
        .unwrap_or_else(|_| Utc::now().naive_utc());
    let status_str: String = row.get(12)?;

    Ok(Booking {
        booking_id: row.get(0)?,
        name: row.get(1)?,
        phone: row.get(2)?,
        style: row.get(3)?,
        hair_length: row.get(4)?,
        date,
        start_hour: row.get(6)?,
        duration_hours: row.get(7)?,
        total_price: row.get(8)?,
        deposit_amount: row.get(9)?,
        deposit_paid: row.get(10)?,
        payment_method: row.get(11)?,
        status: BookingStatus::parse(&status_str),
        style_specific_options,
        notes: row.get(14)?,
        style_image: row.get(15)?,
        hair_image: row.get(16)?,
        rescheduled: row.get(17)?,
        original_date,
        original_time: row.get(19)?,
        created_at,
        updated_at,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db;

    pub(crate) fn sample_booking(id: &str, date: &str, hour: u32, duration: f64) -> Booking {
        let now = Utc::now().naive_utc();
        Booking {
            booking_id: id.to_string(),
            name: "Ama Mensah".to_string(),
            phone: "(860) 555-0100".to_string(),
            style: "cornrows".to_string(),
            hair_length: None,
            date: NaiveDate::parse_from_str(date, DATE_FORMAT).unwrap(),
            start_hour: hour,
            duration_hours: duration,
            total_price: 120.0,
            deposit_amount: 12.0,
            deposit_paid: true,
            payment_method: "card".to_string(),
            status: BookingStatus::Confirmed,
            style_specific_options: BTreeMap::from([(
                "style-choice".to_string(),
                "with-style".to_string(),
            )]),
            notes: None,
            style_image: None,
            hair_image: None,
            rescheduled: false,
            original_date: None,
            original_time: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn test_upsert_and_get() {
        let conn = db::init_db(":memory:").unwrap();
        let booking = sample_booking("BK1", "2025-06-10", 10, 1.0);
        upsert_booking(&conn, &booking).unwrap();

        let loaded = get_booking_by_id(&conn, "BK1").unwrap().unwrap();
        assert_eq!(loaded.name, "Ama Mensah");
        assert_eq!(loaded.start_hour, 10);
        assert_eq!(loaded.style_specific_options["style-choice"], "with-style");
        assert!(get_booking_by_id(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn test_upsert_is_idempotent_by_id() {
        let conn = db::init_db(":memory:").unwrap();
        let mut booking = sample_booking("BK1", "2025-06-10", 10, 1.0);
        upsert_booking(&conn, &booking).unwrap();
        booking.notes = Some("second write".to_string());
        upsert_booking(&conn, &booking).unwrap();

        let all = list_bookings(&conn, &BookingFilter { limit: 50, ..Default::default() }).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].notes.as_deref(), Some("second write"));
    }

    #[test]
    fn test_bookings_for_date() {
        let conn = db::init_db(":memory:").unwrap();
        upsert_booking(&conn, &sample_booking("A", "2025-06-10", 13, 2.0)).unwrap();
        upsert_booking(&conn, &sample_booking("B", "2025-06-10", 9, 1.0)).unwrap();
        upsert_booking(&conn, &sample_booking("C", "2025-06-11", 9, 1.0)).unwrap();

        let day = get_bookings_for_date(&conn, d("2025-06-10")).unwrap();
        let ids: Vec<_> = day.iter().map(|b| b.booking_id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A"]);
    }

    #[test]
    fn test_phone_prefix_search() {
        let conn = db::init_db(":memory:").unwrap();
        upsert_booking(&conn, &sample_booking("A", "2025-06-10", 9, 1.0)).unwrap();
        let mut other = sample_booking("B", "2025-06-10", 11, 1.0);
        other.phone = "203-555-0199".to_string();
        upsert_booking(&conn, &other).unwrap();

        assert_eq!(search_by_phone_prefix(&conn, "860").unwrap().len(), 1);
        assert_eq!(search_by_phone_prefix(&conn, "(860) 555").unwrap().len(), 1);
        assert_eq!(search_by_phone_prefix(&conn, "555").unwrap().len(), 0);
        assert_eq!(search_by_phone_prefix(&conn, "").unwrap().len(), 0);
    }

    #[test]
    fn test_update_schedule_and_delete() {
        let conn = db::init_db(":memory:").unwrap();
        upsert_booking(&conn, &sample_booking("A", "2025-06-10", 9, 1.0)).unwrap();

        assert!(update_schedule(&conn, "A", d("2025-06-12"), 14, d("2025-06-10"), 9).unwrap());
        let moved = get_booking_by_id(&conn, "A").unwrap().unwrap();
        assert_eq!(moved.date, d("2025-06-12"));
        assert_eq!(moved.start_hour, 14);
        assert!(moved.rescheduled);
        assert_eq!(moved.original_date, Some(d("2025-06-10")));
        assert_eq!(moved.original_time.as_deref(), Some("09:00"));

        assert!(delete_booking(&conn, "A").unwrap());
        assert!(!delete_booking(&conn, "A").unwrap());
    }

    #[test]
    fn test_list_bookings_filters() {
        let conn = db::init_db(":memory:").unwrap();
        upsert_booking(&conn, &sample_booking("A", "2025-06-10", 9, 1.0)).unwrap();
        let mut pending = sample_booking("B", "2025-06-20", 9, 1.0);
        pending.status = BookingStatus::Pending;
        upsert_booking(&conn, &pending).unwrap();

        let filter = BookingFilter {
            status: Some("pending"),
            limit: 10,
            ..Default::default()
        };
        assert_eq!(list_bookings(&conn, &filter).unwrap().len(), 1);

        let filter = BookingFilter {
            from: Some(d("2025-06-01")),
            to: Some(d("2025-06-15")),
            limit: 10,
            ..Default::default()
        };
        let found = list_bookings(&conn, &filter).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].booking_id, "A");
    }

    #[test]
    fn test_dashboard_stats() {
        let conn = db::init_db(":memory:").unwrap();
        upsert_booking(&conn, &sample_booking("A", "2025-06-10", 9, 1.0)).unwrap();
        let mut pending = sample_booking("B", "2025-06-20", 9, 1.0);
        pending.status = BookingStatus::Pending;
        pending.deposit_paid = false;
        upsert_booking(&conn, &pending).unwrap();

        let stats = get_dashboard_stats(&conn, d("2025-06-01")).unwrap();
        assert_eq!(stats.total_bookings, 2);
        assert_eq!(stats.pending_count, 1);
        assert_eq!(stats.confirmed_count, 1);
        assert_eq!(stats.upcoming_count, 1);
        assert_eq!(stats.deposits_collected, 12.0);
        assert_eq!(stats.outstanding_balance, 108.0 + 120.0);
    }
}
