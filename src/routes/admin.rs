use actix_web::{http::header, middleware::from_fn, web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use askama::Template;
use serde::Deserialize;

use crate::filters;
use crate::{
    auth::{admin_validator, hash_password, logout_guard, new_id, AuthUser},
    db::log_activity,
    models::{ActivityRow, BeachRow, RegionRow, ReservationRow, ROLE_VENDOR},
    state::AppState,
    templates::render,
};

#[derive(Clone, Debug)]
struct StatCard {
    label: String,
    value: i64,
}

#[derive(Clone, Debug)]
struct ReservationView {
    vendor_name: String,
    arrival: String,
    status: String,
    total: f64,
}

#[derive(Clone, Debug)]
struct ActivityView {
    message: String,
    created_at: String,
}

#[derive(Template)]
#[template(path = "admin_dashboard.html")]
struct AdminDashboardTemplate {
    admin_name: String,
    stats: Vec<StatCard>,
    recent: Vec<ReservationView>,
    activities: Vec<ActivityView>,
}

#[derive(Clone, Debug)]
struct VendorView {
    name: String,
    beach_name: String,
    responsible: String,
    active: bool,
}

#[derive(Clone, Debug)]
struct BeachChoice {
    id: String,
    label: String,
}

#[derive(Template)]
#[template(path = "admin_vendors.html")]
struct AdminVendorsTemplate {
    vendors: Vec<VendorView>,
    beaches: Vec<BeachChoice>,
    errors: Vec<String>,
    invite_link: String,
    has_invite: bool,
}

#[derive(Clone, Debug)]
struct RegionView {
    name: String,
    beaches: Vec<String>,
}

#[derive(Template)]
#[template(path = "admin_catalog.html")]
struct AdminCatalogTemplate {
    regions: Vec<RegionView>,
    region_choices: Vec<BeachChoice>,
    errors: Vec<String>,
    success: String,
    has_success: bool,
}

#[derive(Deserialize)]
struct VendorCreateForm {
    full_name: String,
    email: String,
    vendor_name: String,
    beach_id: String,
    address: Option<String>,
    reference_point: Option<String>,
}

#[derive(Deserialize)]
struct RegionCreateForm {
    name: String,
}

#[derive(Deserialize)]
struct BeachCreateForm {
    region_id: String,
    name: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .wrap(HttpAuthentication::basic(admin_validator))
            .wrap(from_fn(logout_guard))
            .service(web::resource("").route(web::get().to(index)))
            .service(web::resource("/").route(web::get().to(index)))
            .service(web::resource("/dashboard").route(web::get().to(dashboard)))
            .service(
                web::resource("/vendors")
                    .route(web::get().to(list_vendors))
                    .route(web::post().to(create_vendor)),
            )
            .service(web::resource("/catalog").route(web::get().to(catalog)))
            .service(web::resource("/catalog/regions").route(web::post().to(create_region)))
            .service(web::resource("/catalog/beaches").route(web::post().to(create_beach))),
    );
}

async fn index() -> HttpResponse {
    HttpResponse::Found()
        .append_header((header::LOCATION, "/admin/dashboard"))
        .finish()
}

async fn dashboard(state: web::Data<AppState>, auth: web::ReqData<AuthUser>) -> Result<HttpResponse> {
    let total = count("SELECT COUNT(*) FROM reservations", &state).await;
    let pending = count(
        "SELECT COUNT(*) FROM reservations WHERE status = 'PENDING'",
        &state,
    )
    .await;
    let vendors = count("SELECT COUNT(*) FROM vendors WHERE is_active = 1", &state).await;
    let customers = count(
        "SELECT COUNT(*) FROM users WHERE role = 'customer' AND active = 1",
        &state,
    )
    .await;

    let stats = vec![
        StatCard {
            label: "Total reservations".to_string(),
            value: total,
        },
        StatCard {
            label: "Pending review".to_string(),
            value: pending,
        },
        StatCard {
            label: "Active vendors".to_string(),
            value: vendors,
        },
        StatCard {
            label: "Customers".to_string(),
            value: customers,
        },
    ];

    let recent_rows = sqlx::query_as::<_, ReservationRow>(
        r#"SELECT r.id, r.user_id, r.vendor_id, r.arrival_time, r.expires_at, r.status,
                  r.total, r.note, r.confirmation_code, r.canceled_by, r.cancel_reason,
                  r.client_checked_in_at, r.created_at,
                  v.name as vendor_name
           FROM reservations r
           LEFT JOIN vendors v ON r.vendor_id = v.id
           ORDER BY r.created_at DESC
           LIMIT 6"#,
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let recent = recent_rows
        .into_iter()
        .map(|row| ReservationView {
            vendor_name: row.vendor_name.unwrap_or_else(|| "--".to_string()),
            arrival: row.arrival_time.unwrap_or_else(|| "--".to_string()),
            status: row.status,
            total: row.total,
        })
        .collect();

    let activity_rows = sqlx::query_as::<_, ActivityRow>(
        "SELECT message, created_at FROM activities ORDER BY created_at DESC LIMIT 10",
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let activities = activity_rows
        .into_iter()
        .map(|row| ActivityView {
            message: row.message,
            created_at: row.created_at,
        })
        .collect();

    Ok(render(AdminDashboardTemplate {
        admin_name: auth.display_name.clone(),
        stats,
        recent,
        activities,
    }))
}

async fn list_vendors(state: web::Data<AppState>) -> Result<HttpResponse> {
    render_vendors(&state, Vec::new(), String::new()).await
}

async fn render_vendors(
    state: &web::Data<AppState>,
    errors: Vec<String>,
    invite_link: String,
) -> Result<HttpResponse> {
    let vendors = sqlx::query_as::<_, (String, String, Option<String>, i64)>(
        r#"SELECT v.name, b.name, v.responsible_name, v.is_active
           FROM vendors v
           JOIN beaches b ON v.beach_id = b.id
           ORDER BY v.name"#,
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default()
    .into_iter()
    .map(|(name, beach_name, responsible, active)| VendorView {
        name,
        beach_name,
        responsible: responsible.unwrap_or_else(|| "--".to_string()),
        active: active == 1,
    })
    .collect();

    let beaches = sqlx::query_as::<_, (String, String, String)>(
        r#"SELECT b.id, b.name, r.name
           FROM beaches b
           JOIN regions r ON b.region_id = r.id
           ORDER BY r.name, b.name"#,
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default()
    .into_iter()
    .map(|(id, beach, region)| BeachChoice {
        id,
        label: format!("{region} — {beach}"),
    })
    .collect();

    Ok(render(AdminVendorsTemplate {
        vendors,
        beaches,
        errors,
        has_invite: !invite_link.is_empty(),
        invite_link,
    }))
}

/// One form creates the vendor, its staff account and a one-time invite
/// link for setting the password. The link is shown for out-of-band
/// delivery; no email is sent.
async fn create_vendor(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Form<VendorCreateForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let mut errors = Vec::new();
    if form.full_name.trim().is_empty() {
        errors.push("Responsible name is required.".to_string());
    }
    if form.email.trim().is_empty() {
        errors.push("Email is required.".to_string());
    }
    if form.vendor_name.trim().is_empty() {
        errors.push("Vendor name is required.".to_string());
    }
    if form.beach_id.trim().is_empty() {
        errors.push("Pick a beach.".to_string());
    }

    if !errors.is_empty() {
        return render_vendors(&state, errors, String::new()).await;
    }

    // Random placeholder password; sign-in stays blocked until the
    // invite sets a real one.
    let placeholder = hash_password(&new_id())
        .map_err(|_| actix_web::error::ErrorInternalServerError("hash failure"))?;
    let invite_token = new_id();
    let now = chrono::Utc::now().to_rfc3339();

    if let Err(err) = insert_vendor(&state, &form, &placeholder, &invite_token, &now).await {
        let message = if err.to_string().contains("UNIQUE") {
            "This email is already registered.".to_string()
        } else {
            format!("Failed to create vendor: {err}")
        };
        return render_vendors(&state, vec![message], String::new()).await;
    }

    log_activity(
        &state.db,
        "vendor_created",
        &format!("{} onboarded vendor {}.", auth.display_name, form.vendor_name.trim()),
        Some(&auth.id),
        None,
    )
    .await;

    render_vendors(&state, Vec::new(), format!("/invite/{invite_token}")).await
}

/// User, vendor and staff link all land in one transaction; a duplicate
/// email leaves nothing behind.
async fn insert_vendor(
    state: &web::Data<AppState>,
    form: &VendorCreateForm,
    placeholder_hash: &str,
    invite_token: &str,
    now: &str,
) -> std::result::Result<(), sqlx::Error> {
    let mut tx = state.db.begin().await?;

    let user_id = new_id();
    sqlx::query(
        r#"INSERT INTO users (id, email, display_name, role, password_hash, active, invite_token, created_at)
           VALUES (?, ?, ?, ?, ?, 1, ?, ?)"#,
    )
    .bind(&user_id)
    .bind(form.email.trim().to_lowercase())
    .bind(form.full_name.trim())
    .bind(ROLE_VENDOR)
    .bind(placeholder_hash)
    .bind(invite_token)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let vendor_id = new_id();
    sqlx::query(
        r#"INSERT INTO vendors (id, beach_id, name, address, reference_point, responsible_name, is_active, created_at)
           VALUES (?, ?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(&vendor_id)
    .bind(form.beach_id.trim())
    .bind(form.vendor_name.trim())
    .bind(form.address.as_deref().map(str::trim))
    .bind(form.reference_point.as_deref().map(str::trim))
    .bind(form.full_name.trim())
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO vendor_users (vendor_id, user_id) VALUES (?, ?)")
        .bind(&vendor_id)
        .bind(&user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await
}

async fn catalog(state: web::Data<AppState>) -> Result<HttpResponse> {
    render_catalog(&state, Vec::new(), String::new()).await
}

async fn render_catalog(
    state: &web::Data<AppState>,
    errors: Vec<String>,
    success: String,
) -> Result<HttpResponse> {
    let region_rows = sqlx::query_as::<_, RegionRow>("SELECT id, name FROM regions ORDER BY name")
        .fetch_all(&state.db)
        .await
        .unwrap_or_default();
    let beach_rows = sqlx::query_as::<_, BeachRow>(
        "SELECT id, region_id, name FROM beaches ORDER BY name",
    )
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let region_choices = region_rows
        .iter()
        .map(|region| BeachChoice {
            id: region.id.clone(),
            label: region.name.clone(),
        })
        .collect();

    let regions = region_rows
        .into_iter()
        .map(|region| {
            let beaches = beach_rows
                .iter()
                .filter(|beach| beach.region_id == region.id)
                .map(|beach| beach.name.clone())
                .collect();
            RegionView {
                name: region.name,
                beaches,
            }
        })
        .collect();

    Ok(render(AdminCatalogTemplate {
        regions,
        region_choices,
        errors,
        has_success: !success.is_empty(),
        success,
    }))
}

async fn create_region(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Form<RegionCreateForm>,
) -> Result<HttpResponse> {
    let name = form.into_inner().name;
    if name.trim().is_empty() {
        return render_catalog(&state, vec!["Region name is required.".to_string()], String::new())
            .await;
    }

    let result = sqlx::query("INSERT INTO regions (id, name) VALUES (?, ?)")
        .bind(new_id())
        .bind(name.trim())
        .execute(&state.db)
        .await;

    if let Err(err) = result {
        let message = if err.to_string().contains("UNIQUE") {
            "This region already exists.".to_string()
        } else {
            format!("Failed to create region: {err}")
        };
        return render_catalog(&state, vec![message], String::new()).await;
    }

    log_activity(
        &state.db,
        "region_created",
        &format!("{} added region {}.", auth.display_name, name.trim()),
        Some(&auth.id),
        None,
    )
    .await;

    render_catalog(&state, Vec::new(), "Region added.".to_string()).await
}

async fn create_beach(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Form<BeachCreateForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let mut errors = Vec::new();
    if form.name.trim().is_empty() {
        errors.push("Beach name is required.".to_string());
    }
    if form.region_id.trim().is_empty() {
        errors.push("Pick a region.".to_string());
    }
    if !errors.is_empty() {
        return render_catalog(&state, errors, String::new()).await;
    }

    let result = sqlx::query("INSERT INTO beaches (id, region_id, name) VALUES (?, ?, ?)")
        .bind(new_id())
        .bind(form.region_id.trim())
        .bind(form.name.trim())
        .execute(&state.db)
        .await;

    if let Err(err) = result {
        return render_catalog(&state, vec![format!("Failed to create beach: {err}")], String::new())
            .await;
    }

    log_activity(
        &state.db,
        "beach_created",
        &format!("{} added beach {}.", auth.display_name, form.name.trim()),
        Some(&auth.id),
        None,
    )
    .await;

    render_catalog(&state, Vec::new(), "Beach added.".to_string()).await
}

async fn count(query: &str, state: &web::Data<AppState>) -> i64 {
    sqlx::query_scalar::<_, i64>(query)
        .fetch_one(&state.db)
        .await
        .unwrap_or(0)
}
