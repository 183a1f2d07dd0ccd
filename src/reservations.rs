//! Reservation procedures.
//!
//! Every status transition and every stock mutation in the system goes
//! through one of these functions, each of which runs inside a single
//! transaction and either fully applies or leaves nothing behind. Route
//! handlers gate their buttons with [`crate::policy`] first, but the
//! checks here are the authoritative ones; a rejection from this module
//! wins over whatever the UI believed a moment earlier.

use chrono::{NaiveDateTime, Utc};
use rand_core::{OsRng, RngCore};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::{
    auth::new_id,
    models::{
        CANCELED_BY_USER, CANCELED_BY_VENDOR, STATUS_ARRIVED, STATUS_CANCELED, STATUS_CONFIRMED,
        STATUS_NO_SHOW, STATUS_PENDING,
    },
    policy::{format_instant, parse_instant, ArrivalRejection, BookingPolicy, CancelBlock},
};

#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("reservation or item not found")]
    NotFound,
    #[error("not permitted for this actor")]
    NotAllowed,
    #[error("invalid status for this operation")]
    InvalidStatus,
    #[error("too late to cancel")]
    TooLateToCancel,
    #[error("{0} is out of stock")]
    OutOfStock(String),
    #[error("reservation has not expired yet")]
    NotExpired,
    #[error("confirmation code does not match")]
    InvalidPin,
    #[error("select at least one item")]
    EmptyOrder,
    #[error("too early to decide on this reservation")]
    TooEarlyToDecide,
    #[error("{0}")]
    Window(ArrivalRejection),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl ReservationError {
    /// Stable machine code, pattern-matched by the route layer.
    pub fn code(&self) -> &'static str {
        match self {
            ReservationError::NotFound => "not_found",
            ReservationError::NotAllowed => "not_allowed",
            ReservationError::InvalidStatus => "invalid_status",
            ReservationError::TooLateToCancel => "too_late_to_cancel",
            ReservationError::OutOfStock(_) => "out_of_stock",
            ReservationError::NotExpired => "not_expired",
            ReservationError::InvalidPin => "invalid_pin",
            ReservationError::EmptyOrder => "empty_order",
            ReservationError::TooEarlyToDecide => "too_early_to_decide",
            ReservationError::Window(_) => "invalid_window",
            ReservationError::Db(_) => "db_error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LineItem {
    pub item_id: String,
    pub quantity: i64,
}

/// Creates a PENDING reservation, decrementing stock for tracked items.
///
/// Stock is taken with a guarded `UPDATE ... WHERE stock_available >= ?`;
/// two customers racing for the last chair resolve inside SQLite, not in
/// application code. Unit prices are snapshotted onto the line rows and
/// the total is computed here, never trusted from the form.
pub async fn create(
    pool: &SqlitePool,
    policy: &BookingPolicy,
    user_id: &str,
    vendor_id: &str,
    arrival: NaiveDateTime,
    note: Option<&str>,
    lines: &[LineItem],
    now: NaiveDateTime,
) -> Result<String, ReservationError> {
    let lines: Vec<&LineItem> = lines.iter().filter(|line| line.quantity > 0).collect();
    if lines.is_empty() {
        return Err(ReservationError::EmptyOrder);
    }

    policy
        .validate_arrival(arrival.date(), arrival.time(), now)
        .map_err(ReservationError::Window)?;

    let mut tx = pool.begin().await?;

    let vendor = sqlx::query_as::<_, (i64,)>("SELECT is_active FROM vendors WHERE id = ?")
        .bind(vendor_id)
        .fetch_optional(&mut *tx)
        .await?;
    match vendor {
        None => return Err(ReservationError::NotFound),
        Some((0,)) => return Err(ReservationError::NotAllowed),
        Some(_) => {}
    }

    let mut total = 0f64;
    let mut priced: Vec<(&LineItem, f64)> = Vec::with_capacity(lines.len());
    for &line in &lines {
        let item = sqlx::query_as::<_, (String, f64, i64, i64)>(
            "SELECT name, price, is_active, track_stock FROM vendor_items WHERE id = ? AND vendor_id = ?",
        )
        .bind(&line.item_id)
        .bind(vendor_id)
        .fetch_optional(&mut *tx)
        .await?;
        let (name, price, is_active, track_stock) = item.ok_or(ReservationError::NotFound)?;
        if is_active == 0 {
            return Err(ReservationError::OutOfStock(name));
        }
        if track_stock == 1 {
            let taken = sqlx::query(
                "UPDATE vendor_items SET stock_available = stock_available - ? WHERE id = ? AND stock_available >= ?",
            )
            .bind(line.quantity)
            .bind(&line.item_id)
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;
            if taken.rows_affected() == 0 {
                return Err(ReservationError::OutOfStock(name));
            }
        }
        total += line.quantity as f64 * price;
        priced.push((line, price));
    }

    let reservation_id = new_id();
    sqlx::query(
        r#"INSERT INTO reservations (id, user_id, vendor_id, arrival_time, status, total, note, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&reservation_id)
    .bind(user_id)
    .bind(vendor_id)
    .bind(format_instant(arrival))
    .bind(STATUS_PENDING)
    .bind(total)
    .bind(note)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *tx)
    .await?;

    for (line, price) in priced {
        sqlx::query(
            "INSERT INTO reservation_items (reservation_id, item_id, quantity, unit_price) VALUES (?, ?, ?, ?)",
        )
        .bind(&reservation_id)
        .bind(&line.item_id)
        .bind(line.quantity)
        .bind(price)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(reservation_id)
}

/// Holder-initiated cancellation. Re-enforces the cutoff even when the
/// caller already checked it; the answer here is the one that counts.
pub async fn cancel_by_user(
    pool: &SqlitePool,
    policy: &BookingPolicy,
    user_id: &str,
    reservation_id: &str,
    reason: Option<&str>,
    now: NaiveDateTime,
) -> Result<(), ReservationError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, (String, String, Option<String>)>(
        "SELECT user_id, status, arrival_time FROM reservations WHERE id = ?",
    )
    .bind(reservation_id)
    .fetch_optional(&mut *tx)
    .await?;
    let (owner, status, arrival_raw) = row.ok_or(ReservationError::NotFound)?;

    if owner != user_id {
        return Err(ReservationError::NotAllowed);
    }

    let arrival = arrival_raw.as_deref().and_then(parse_instant);
    match policy.cancel_block_reason(&status, arrival, now) {
        Some(CancelBlock::WrongStatus) => return Err(ReservationError::InvalidStatus),
        Some(CancelBlock::TooCloseToArrival) => return Err(ReservationError::TooLateToCancel),
        None => {}
    }

    restock(&mut tx, reservation_id).await?;

    let updated = sqlx::query(
        "UPDATE reservations SET status = ?, canceled_by = ?, cancel_reason = ? WHERE id = ? AND status IN (?, ?)",
    )
    .bind(STATUS_CANCELED)
    .bind(CANCELED_BY_USER)
    .bind(reason)
    .bind(reservation_id)
    .bind(STATUS_PENDING)
    .bind(STATUS_CONFIRMED)
    .execute(&mut *tx)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(ReservationError::InvalidStatus);
    }

    tx.commit().await?;
    Ok(())
}

/// Vendor approval: PENDING → CONFIRMED, issuing the check-in PIN and
/// stamping the no-show expiry. Returns the PIN.
pub async fn approve(
    pool: &SqlitePool,
    policy: &BookingPolicy,
    vendor_id: &str,
    reservation_id: &str,
    now: NaiveDateTime,
) -> Result<String, ReservationError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, (String, Option<String>)>(
        "SELECT status, arrival_time FROM reservations WHERE id = ? AND vendor_id = ?",
    )
    .bind(reservation_id)
    .bind(vendor_id)
    .fetch_optional(&mut *tx)
    .await?;
    let (status, arrival_raw) = row.ok_or(ReservationError::NotFound)?;
    if status != STATUS_PENDING {
        return Err(ReservationError::InvalidStatus);
    }

    let arrival = arrival_raw.as_deref().and_then(parse_instant);
    if !policy.can_decide(arrival, now) {
        return Err(ReservationError::TooEarlyToDecide);
    }

    let pin = format!("{:04}", OsRng.next_u32() % 10_000);
    let expires_at = arrival.map(|at| format_instant(policy.expires_at(at)));

    let updated = sqlx::query(
        "UPDATE reservations SET status = ?, confirmation_code = ?, expires_at = ? WHERE id = ? AND status = ?",
    )
    .bind(STATUS_CONFIRMED)
    .bind(&pin)
    .bind(expires_at)
    .bind(reservation_id)
    .bind(STATUS_PENDING)
    .execute(&mut *tx)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(ReservationError::InvalidStatus);
    }

    tx.commit().await?;
    Ok(pin)
}

/// Vendor rejection of a pending reservation, restocking its lines.
pub async fn reject(
    pool: &SqlitePool,
    policy: &BookingPolicy,
    vendor_id: &str,
    reservation_id: &str,
    now: NaiveDateTime,
) -> Result<(), ReservationError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, (String, Option<String>)>(
        "SELECT status, arrival_time FROM reservations WHERE id = ? AND vendor_id = ?",
    )
    .bind(reservation_id)
    .bind(vendor_id)
    .fetch_optional(&mut *tx)
    .await?;
    let (status, arrival_raw) = row.ok_or(ReservationError::NotFound)?;
    if status != STATUS_PENDING {
        return Err(ReservationError::InvalidStatus);
    }

    let arrival = arrival_raw.as_deref().and_then(parse_instant);
    if !policy.can_decide(arrival, now) {
        return Err(ReservationError::TooEarlyToDecide);
    }

    restock(&mut tx, reservation_id).await?;

    let updated = sqlx::query(
        "UPDATE reservations SET status = ?, canceled_by = ? WHERE id = ? AND status = ?",
    )
    .bind(STATUS_CANCELED)
    .bind(CANCELED_BY_VENDOR)
    .bind(reservation_id)
    .bind(STATUS_PENDING)
    .execute(&mut *tx)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(ReservationError::InvalidStatus);
    }

    tx.commit().await?;
    Ok(())
}

/// A confirmed reservation past its expiry with no check-in is released:
/// NO_SHOW status, stock returned.
pub async fn mark_no_show(
    pool: &SqlitePool,
    policy: &BookingPolicy,
    vendor_id: &str,
    reservation_id: &str,
    now: NaiveDateTime,
) -> Result<(), ReservationError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, (String, Option<String>, Option<String>)>(
        "SELECT status, expires_at, client_checked_in_at FROM reservations WHERE id = ? AND vendor_id = ?",
    )
    .bind(reservation_id)
    .bind(vendor_id)
    .fetch_optional(&mut *tx)
    .await?;
    let (status, expires_raw, checked_in_raw) = row.ok_or(ReservationError::NotFound)?;
    if status != STATUS_CONFIRMED {
        return Err(ReservationError::InvalidStatus);
    }

    let expires_at = expires_raw.as_deref().and_then(parse_instant);
    let checked_in_at = checked_in_raw.as_deref().and_then(parse_instant);
    if !policy.can_mark_no_show(&status, expires_at, checked_in_at, now) {
        return Err(ReservationError::NotExpired);
    }

    restock(&mut tx, reservation_id).await?;

    let updated = sqlx::query("UPDATE reservations SET status = ? WHERE id = ? AND status = ?")
        .bind(STATUS_NO_SHOW)
        .bind(reservation_id)
        .bind(STATUS_CONFIRMED)
        .execute(&mut *tx)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(ReservationError::InvalidStatus);
    }

    tx.commit().await?;
    Ok(())
}

/// PIN-gated check-in: the one narrow CONFIRMED → ARRIVED compare-and-set.
pub async fn check_in(
    pool: &SqlitePool,
    vendor_id: &str,
    reservation_id: &str,
    pin: &str,
    now: NaiveDateTime,
) -> Result<(), ReservationError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, (String, Option<String>)>(
        "SELECT status, confirmation_code FROM reservations WHERE id = ? AND vendor_id = ?",
    )
    .bind(reservation_id)
    .bind(vendor_id)
    .fetch_optional(&mut *tx)
    .await?;
    let (status, code) = row.ok_or(ReservationError::NotFound)?;
    if status != STATUS_CONFIRMED {
        return Err(ReservationError::InvalidStatus);
    }

    let expected = code.unwrap_or_default();
    if expected.trim().is_empty() || pin.trim() != expected.trim() {
        return Err(ReservationError::InvalidPin);
    }

    let updated = sqlx::query(
        "UPDATE reservations SET status = ?, client_checked_in_at = ? WHERE id = ? AND status = ?",
    )
    .bind(STATUS_ARRIVED)
    .bind(format_instant(now))
    .bind(reservation_id)
    .bind(STATUS_CONFIRMED)
    .execute(&mut *tx)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(ReservationError::InvalidStatus);
    }

    tx.commit().await?;
    Ok(())
}

/// Returns every tracked line of a reservation to stock, capped at
/// `stock_total`.
async fn restock(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    reservation_id: &str,
) -> Result<(), sqlx::Error> {
    let lines = sqlx::query_as::<_, (String, i64)>(
        "SELECT item_id, quantity FROM reservation_items WHERE reservation_id = ?",
    )
    .bind(reservation_id)
    .fetch_all(&mut **tx)
    .await?;

    for (item_id, quantity) in lines {
        sqlx::query(
            "UPDATE vendor_items SET stock_available = MIN(stock_total, stock_available + ?) WHERE id = ? AND track_stock = 1",
        )
        .bind(quantity)
        .bind(&item_id)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use sqlx::SqlitePool;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 10)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    // Noon on the fixture day; arrivals at 12:30 clear the lead time.
    fn noon() -> NaiveDateTime {
        at(12, 0)
    }

    struct Fixture {
        user_id: String,
        vendor_id: String,
        chair_id: String,
        cooler_id: String,
    }

    async fn seed(pool: &SqlitePool) -> Fixture {
        let now = Utc::now().to_rfc3339();

        let user_id = new_id();
        sqlx::query(
            "INSERT INTO users (id, email, display_name, role, password_hash, active, created_at) VALUES (?, 'sea@example.com', 'Sea Customer', 'customer', 'x', 1, ?)",
        )
        .bind(&user_id)
        .bind(&now)
        .execute(pool)
        .await
        .unwrap();

        let region_id = new_id();
        sqlx::query("INSERT INTO regions (id, name) VALUES (?, 'South Shore')")
            .bind(&region_id)
            .execute(pool)
            .await
            .unwrap();
        let beach_id = new_id();
        sqlx::query("INSERT INTO beaches (id, region_id, name) VALUES (?, ?, 'Farol Beach')")
            .bind(&beach_id)
            .bind(&region_id)
            .execute(pool)
            .await
            .unwrap();

        let vendor_id = new_id();
        sqlx::query(
            "INSERT INTO vendors (id, beach_id, name, is_active, created_at) VALUES (?, ?, 'Tent One', 1, ?)",
        )
        .bind(&vendor_id)
        .bind(&beach_id)
        .bind(&now)
        .execute(pool)
        .await
        .unwrap();

        let chair_id = new_id();
        sqlx::query(
            "INSERT INTO vendor_items (id, vendor_id, name, price, is_active, track_stock, stock_total, stock_available) VALUES (?, ?, 'Beach chair', 15.0, 1, 1, 10, 10)",
        )
        .bind(&chair_id)
        .bind(&vendor_id)
        .execute(pool)
        .await
        .unwrap();

        let cooler_id = new_id();
        sqlx::query(
            "INSERT INTO vendor_items (id, vendor_id, name, price, is_active, track_stock, stock_total, stock_available) VALUES (?, ?, 'Cooler', 40.0, 1, 0, NULL, NULL)",
        )
        .bind(&cooler_id)
        .bind(&vendor_id)
        .execute(pool)
        .await
        .unwrap();

        Fixture {
            user_id,
            vendor_id,
            chair_id,
            cooler_id,
        }
    }

    async fn stock_available(pool: &SqlitePool, item_id: &str) -> i64 {
        sqlx::query_as::<_, (i64,)>("SELECT stock_available FROM vendor_items WHERE id = ?")
            .bind(item_id)
            .fetch_one(pool)
            .await
            .unwrap()
            .0
    }

    async fn reservation_status(pool: &SqlitePool, id: &str) -> String {
        sqlx::query_as::<_, (String,)>("SELECT status FROM reservations WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap()
            .0
    }

    fn lines(fx: &Fixture, chairs: i64, coolers: i64) -> Vec<LineItem> {
        vec![
            LineItem {
                item_id: fx.chair_id.clone(),
                quantity: chairs,
            },
            LineItem {
                item_id: fx.cooler_id.clone(),
                quantity: coolers,
            },
        ]
    }

    #[sqlx::test]
    async fn create_decrements_stock_and_totals(pool: SqlitePool) {
        let fx = seed(&pool).await;
        let policy = BookingPolicy::default();

        let id = create(
            &pool,
            &policy,
            &fx.user_id,
            &fx.vendor_id,
            at(12, 30),
            Some("near lifeguard post 9"),
            &lines(&fx, 3, 1),
            noon(),
        )
        .await
        .unwrap();

        assert_eq!(stock_available(&pool, &fx.chair_id).await, 7);
        assert_eq!(reservation_status(&pool, &id).await, STATUS_PENDING);

        let (total,) = sqlx::query_as::<_, (f64,)>("SELECT total FROM reservations WHERE id = ?")
            .bind(&id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!((total - 85.0).abs() < 1e-9);

        let line_count =
            sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM reservation_items WHERE reservation_id = ?")
                .bind(&id)
                .fetch_one(&pool)
                .await
                .unwrap()
                .0;
        assert_eq!(line_count, 2);
    }

    #[sqlx::test]
    async fn create_rolls_back_when_stock_runs_out(pool: SqlitePool) {
        let fx = seed(&pool).await;
        let policy = BookingPolicy::default();

        let err = create(
            &pool,
            &policy,
            &fx.user_id,
            &fx.vendor_id,
            at(12, 30),
            None,
            &[
                LineItem {
                    item_id: fx.cooler_id.clone(),
                    quantity: 1,
                },
                LineItem {
                    item_id: fx.chair_id.clone(),
                    quantity: 11,
                },
            ],
            noon(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "out_of_stock");

        // Nothing committed: stock untouched, no reservation rows.
        assert_eq!(stock_available(&pool, &fx.chair_id).await, 10);
        let count = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM reservations")
            .fetch_one(&pool)
            .await
            .unwrap()
            .0;
        assert_eq!(count, 0);
    }

    #[sqlx::test]
    async fn create_rejects_empty_orders_and_bad_windows(pool: SqlitePool) {
        let fx = seed(&pool).await;
        let policy = BookingPolicy::default();

        let err = create(
            &pool,
            &policy,
            &fx.user_id,
            &fx.vendor_id,
            at(12, 30),
            None,
            &lines(&fx, 0, 0),
            noon(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "empty_order");

        // Inside the same-day lead window.
        let err = create(
            &pool,
            &policy,
            &fx.user_id,
            &fx.vendor_id,
            at(12, 5),
            None,
            &lines(&fx, 1, 0),
            noon(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "invalid_window");
    }

    #[sqlx::test]
    async fn create_rejects_inactive_items(pool: SqlitePool) {
        let fx = seed(&pool).await;
        let policy = BookingPolicy::default();

        sqlx::query("UPDATE vendor_items SET is_active = 0 WHERE id = ?")
            .bind(&fx.chair_id)
            .execute(&pool)
            .await
            .unwrap();

        let err = create(
            &pool,
            &policy,
            &fx.user_id,
            &fx.vendor_id,
            at(12, 30),
            None,
            &lines(&fx, 1, 0),
            noon(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "out_of_stock");
    }

    #[sqlx::test]
    async fn approve_issues_pin_and_expiry_once(pool: SqlitePool) {
        let fx = seed(&pool).await;
        let policy = BookingPolicy::default();

        let id = create(
            &pool,
            &policy,
            &fx.user_id,
            &fx.vendor_id,
            at(12, 30),
            None,
            &lines(&fx, 1, 0),
            noon(),
        )
        .await
        .unwrap();

        let pin = approve(&pool, &policy, &fx.vendor_id, &id, noon())
            .await
            .unwrap();
        assert_eq!(pin.len(), 4);
        assert!(pin.chars().all(|c| c.is_ascii_digit()));

        let (status, code, expires) = sqlx::query_as::<_, (String, Option<String>, Option<String>)>(
            "SELECT status, confirmation_code, expires_at FROM reservations WHERE id = ?",
        )
        .bind(&id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(status, STATUS_CONFIRMED);
        assert_eq!(code.as_deref(), Some(pin.as_str()));
        // 12:30 arrival + 20 min grace.
        assert_eq!(expires.as_deref(), Some("2024-01-10T12:50:00"));

        let err = approve(&pool, &policy, &fx.vendor_id, &id, noon())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_status");
    }

    #[sqlx::test]
    async fn approval_waits_for_the_arrival_day(pool: SqlitePool) {
        let fx = seed(&pool).await;
        let policy = BookingPolicy::default();

        // Booked for tomorrow; deciding today is too early.
        let tomorrow = NaiveDate::from_ymd_opt(2024, 1, 11)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let id = create(
            &pool,
            &policy,
            &fx.user_id,
            &fx.vendor_id,
            tomorrow,
            None,
            &lines(&fx, 1, 0),
            noon(),
        )
        .await
        .unwrap();

        let err = approve(&pool, &policy, &fx.vendor_id, &id, noon())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "too_early_to_decide");

        // Tomorrow from opening time it goes through.
        let tomorrow_morning = NaiveDate::from_ymd_opt(2024, 1, 11)
            .unwrap()
            .and_hms_opt(7, 0, 0)
            .unwrap();
        approve(&pool, &policy, &fx.vendor_id, &id, tomorrow_morning)
            .await
            .unwrap();
    }

    #[sqlx::test]
    async fn user_cancel_restocks_and_respects_the_cutoff(pool: SqlitePool) {
        let fx = seed(&pool).await;
        let policy = BookingPolicy::default();

        let id = create(
            &pool,
            &policy,
            &fx.user_id,
            &fx.vendor_id,
            at(14, 0),
            None,
            &lines(&fx, 4, 0),
            noon(),
        )
        .await
        .unwrap();
        assert_eq!(stock_available(&pool, &fx.chair_id).await, 6);

        // A stranger may not cancel someone else's reservation.
        let err = cancel_by_user(&pool, &policy, "someone-else", &id, None, noon())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_allowed");

        // Within the cutoff (13:55, arrival 14:00) it is too late.
        let err = cancel_by_user(&pool, &policy, &fx.user_id, &id, None, at(13, 55))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "too_late_to_cancel");

        cancel_by_user(&pool, &policy, &fx.user_id, &id, Some("can't make it"), noon())
            .await
            .unwrap();
        assert_eq!(reservation_status(&pool, &id).await, STATUS_CANCELED);
        assert_eq!(stock_available(&pool, &fx.chair_id).await, 10);

        let (canceled_by,) =
            sqlx::query_as::<_, (Option<String>,)>("SELECT canceled_by FROM reservations WHERE id = ?")
                .bind(&id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(canceled_by.as_deref(), Some(CANCELED_BY_USER));

        // Canceling twice trips the status check.
        let err = cancel_by_user(&pool, &policy, &fx.user_id, &id, None, noon())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_status");
    }

    #[sqlx::test]
    async fn reject_restocks_and_tags_the_vendor(pool: SqlitePool) {
        let fx = seed(&pool).await;
        let policy = BookingPolicy::default();

        let id = create(
            &pool,
            &policy,
            &fx.user_id,
            &fx.vendor_id,
            at(14, 0),
            None,
            &lines(&fx, 2, 0),
            noon(),
        )
        .await
        .unwrap();
        assert_eq!(stock_available(&pool, &fx.chair_id).await, 8);

        reject(&pool, &policy, &fx.vendor_id, &id, noon())
            .await
            .unwrap();
        assert_eq!(reservation_status(&pool, &id).await, STATUS_CANCELED);
        assert_eq!(stock_available(&pool, &fx.chair_id).await, 10);

        let (canceled_by,) =
            sqlx::query_as::<_, (Option<String>,)>("SELECT canceled_by FROM reservations WHERE id = ?")
                .bind(&id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(canceled_by.as_deref(), Some(CANCELED_BY_VENDOR));
    }

    #[sqlx::test]
    async fn no_show_requires_expiry_then_restocks(pool: SqlitePool) {
        let fx = seed(&pool).await;
        let policy = BookingPolicy::default();

        let id = create(
            &pool,
            &policy,
            &fx.user_id,
            &fx.vendor_id,
            at(12, 30),
            None,
            &lines(&fx, 5, 0),
            noon(),
        )
        .await
        .unwrap();
        approve(&pool, &policy, &fx.vendor_id, &id, noon())
            .await
            .unwrap();

        // Expiry is 12:50; at 12:45 the customer may still show up.
        let err = mark_no_show(&pool, &policy, &fx.vendor_id, &id, at(12, 45))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_expired");

        mark_no_show(&pool, &policy, &fx.vendor_id, &id, at(13, 0))
            .await
            .unwrap();
        assert_eq!(reservation_status(&pool, &id).await, STATUS_NO_SHOW);
        assert_eq!(stock_available(&pool, &fx.chair_id).await, 10);
    }

    #[sqlx::test]
    async fn check_in_is_pin_gated(pool: SqlitePool) {
        let fx = seed(&pool).await;
        let policy = BookingPolicy::default();

        let id = create(
            &pool,
            &policy,
            &fx.user_id,
            &fx.vendor_id,
            at(12, 30),
            None,
            &lines(&fx, 1, 0),
            noon(),
        )
        .await
        .unwrap();

        // Not confirmed yet, so no PIN exists.
        let err = check_in(&pool, &fx.vendor_id, &id, "0000", at(12, 30))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_status");

        let pin = approve(&pool, &policy, &fx.vendor_id, &id, noon())
            .await
            .unwrap();

        let wrong = if pin == "1234" { "4321" } else { "1234" };
        let err = check_in(&pool, &fx.vendor_id, &id, wrong, at(12, 35))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_pin");

        check_in(&pool, &fx.vendor_id, &id, &format!(" {pin} "), at(12, 35))
            .await
            .unwrap();
        assert_eq!(reservation_status(&pool, &id).await, STATUS_ARRIVED);

        let (checked_in,) = sqlx::query_as::<_, (Option<String>,)>(
            "SELECT client_checked_in_at FROM reservations WHERE id = ?",
        )
        .bind(&id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(checked_in.as_deref(), Some("2024-01-10T12:35:00"));

        // Checked-in reservations stay put.
        let err = check_in(&pool, &fx.vendor_id, &id, &pin, at(12, 40))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_status");
    }
}
