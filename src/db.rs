use std::{env, fs, path::Path};

use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    auth::{hash_password, new_id},
    models::{ReservationRow, ROLE_ADMIN, ROLE_VENDOR},
};

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    let db_path = Path::new(path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub async fn seed_defaults(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    seed_admin(pool).await?;
    seed_catalog(pool).await?;
    seed_vendor(pool).await?;
    Ok(())
}

pub async fn log_activity(
    pool: &SqlitePool,
    kind: &str,
    message: &str,
    user_id: Option<&str>,
    reservation_id: Option<&str>,
) {
    let _ = sqlx::query(
        r#"INSERT INTO activities (id, kind, message, created_at, user_id, reservation_id)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(kind)
    .bind(message)
    .bind(Utc::now().to_rfc3339())
    .bind(user_id)
    .bind(reservation_id)
    .execute(pool)
    .await;
}

pub async fn fetch_reservation_event(
    pool: &SqlitePool,
    reservation_id: &str,
) -> Option<ReservationRow> {
    sqlx::query_as::<_, ReservationRow>(
        r#"SELECT r.id, r.user_id, r.vendor_id, r.arrival_time, r.expires_at, r.status,
                  r.total, r.note, r.confirmation_code, r.canceled_by, r.cancel_reason,
                  r.client_checked_in_at, r.created_at,
                  v.name as vendor_name
           FROM reservations r
           LEFT JOIN vendors v ON r.vendor_id = v.id
           WHERE r.id = ?
           LIMIT 1"#,
    )
    .bind(reservation_id)
    .fetch_optional(pool)
    .await
    .unwrap_or(None)
}

/// Vendor the given staff account is linked to, if any.
pub async fn vendor_id_for_user(pool: &SqlitePool, user_id: &str) -> Option<String> {
    sqlx::query_as::<_, (String,)>(
        "SELECT vendor_id FROM vendor_users WHERE user_id = ? LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .ok()
    .flatten()
    .map(|(vendor_id,)| vendor_id)
}

async fn seed_admin(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let existing = sqlx::query_as::<_, (String,)>(
        "SELECT id FROM users WHERE role = ? LIMIT 1",
    )
    .bind(ROLE_ADMIN)
    .fetch_optional(pool)
    .await?;

    if existing.is_some() {
        return Ok(());
    }

    let email = env::var("ADMIN_USER").unwrap_or_else(|_| "admin@beachline.local".to_string());
    let password = env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string());
    let display_name = env::var("ADMIN_DISPLAY_NAME").unwrap_or_else(|_| "Shore Admin".to_string());

    if password == "admin" {
        log::warn!("ADMIN_PASSWORD not set. Using default password 'admin'. Set ADMIN_PASSWORD in production.");
    }

    let password_hash = hash_password(&password).map_err(|_| sqlx::Error::Protocol("password hash failed".into()))?;
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"INSERT INTO users (id, email, display_name, role, password_hash, active, created_at)
           VALUES (?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(new_id())
    .bind(email)
    .bind(display_name)
    .bind(ROLE_ADMIN)
    .bind(password_hash)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

async fn seed_catalog(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let existing = sqlx::query_as::<_, (String,)>("SELECT id FROM regions LIMIT 1")
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    let regions = vec![
        ("South Shore", vec!["Farol Beach", "Pontal Beach"]),
        ("North Shore", vec!["Camboinha Beach", "Bessa Beach"]),
    ];

    for (region_name, beaches) in regions {
        let region_id = new_id();
        sqlx::query("INSERT INTO regions (id, name) VALUES (?, ?)")
            .bind(&region_id)
            .bind(region_name)
            .execute(pool)
            .await?;
        for beach_name in beaches {
            sqlx::query("INSERT INTO beaches (id, region_id, name) VALUES (?, ?, ?)")
                .bind(new_id())
                .bind(&region_id)
                .bind(beach_name)
                .execute(pool)
                .await?;
        }
    }

    Ok(())
}

async fn seed_vendor(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let vendor_seed = env::var("SEED_VENDOR").unwrap_or_else(|_| "false".to_string());
    if vendor_seed != "true" {
        return Ok(());
    }

    let exists = sqlx::query_as::<_, (String,)>("SELECT id FROM users WHERE role = ? LIMIT 1")
        .bind(ROLE_VENDOR)
        .fetch_optional(pool)
        .await?;
    if exists.is_some() {
        return Ok(());
    }

    let beach = sqlx::query_as::<_, (String,)>("SELECT id FROM beaches ORDER BY name LIMIT 1")
        .fetch_optional(pool)
        .await?;
    let Some((beach_id,)) = beach else {
        return Ok(());
    };

    let email = env::var("VENDOR_USER").unwrap_or_else(|_| "vendor@beachline.local".to_string());
    let password = env::var("VENDOR_PASSWORD").unwrap_or_else(|_| "change-me".to_string());
    let display_name = env::var("VENDOR_DISPLAY_NAME").unwrap_or_else(|_| "Vendor One".to_string());
    if password == "change-me" {
        log::warn!("VENDOR_PASSWORD not set. Using default password 'change-me'. Set VENDOR_PASSWORD in production.");
    }

    let password_hash = hash_password(&password)
        .map_err(|_| sqlx::Error::Protocol("password hash failed".into()))?;
    let now = Utc::now().to_rfc3339();

    let user_id = new_id();
    sqlx::query(
        r#"INSERT INTO users (id, email, display_name, role, password_hash, active, created_at)
           VALUES (?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(&user_id)
    .bind(email)
    .bind(&display_name)
    .bind(ROLE_VENDOR)
    .bind(password_hash)
    .bind(&now)
    .execute(pool)
    .await?;

    let vendor_id = new_id();
    sqlx::query(
        r#"INSERT INTO vendors (id, beach_id, name, responsible_name, is_active, created_at)
           VALUES (?, ?, ?, ?, 1, ?)"#,
    )
    .bind(&vendor_id)
    .bind(beach_id)
    .bind("Tent One")
    .bind(&display_name)
    .bind(&now)
    .execute(pool)
    .await?;

    sqlx::query("INSERT INTO vendor_users (vendor_id, user_id) VALUES (?, ?)")
        .bind(&vendor_id)
        .bind(&user_id)
        .execute(pool)
        .await?;

    Ok(())
}
