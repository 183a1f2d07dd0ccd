use actix_web::{http::header, middleware::from_fn, web, HttpRequest, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use askama::Template;
use chrono::{Duration, Local};
use serde::Deserialize;

use crate::filters;
use crate::{
    auth::{logout_guard, vendor_validator, AuthUser},
    db::{fetch_reservation_event, log_activity, vendor_id_for_user},
    media,
    models::{
        item_catalog, ItemOption, ReservationItemRow, ReservationRow, VendorItemRow, VendorRow,
        STATUS_ARRIVED, STATUS_CANCELED, STATUS_CONFIRMED, STATUS_NO_SHOW, STATUS_PENDING,
    },
    policy::{format_instant, parse_instant},
    push,
    reservations::{self, ReservationError},
    state::{AppState, ServerEvent},
    templates::render,
};

const MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024;

#[derive(Clone, Debug)]
struct StatCard {
    label: String,
    value: i64,
}

#[derive(Template)]
#[template(path = "vendor_dashboard.html")]
struct VendorDashboardTemplate {
    vendor_name: String,
    description: String,
    photo_url: String,
    has_photo: bool,
    address: String,
    rating: String,
    stats: Vec<StatCard>,
    errors: Vec<String>,
}

#[derive(Clone, Debug)]
struct ItemRowView {
    id: String,
    name: String,
    price: f64,
    is_active: bool,
    track_stock: bool,
    stock_total: i64,
    stock_available: i64,
}

#[derive(Template)]
#[template(path = "vendor_items.html")]
struct VendorItemsTemplate {
    items: Vec<ItemRowView>,
    options: Vec<ItemOption>,
    errors: Vec<String>,
    success: String,
    has_success: bool,
}

#[derive(Clone, Debug)]
struct LineView {
    name: String,
    quantity: i64,
    line_total: f64,
}

#[derive(Clone, Debug)]
struct VendorReservationView {
    id: String,
    arrival: String,
    expires: String,
    status_label: String,
    status_class: String,
    total: f64,
    pin: String,
    show_pin: bool,
    note: String,
    has_note: bool,
    items: Vec<LineView>,
    show_decide: bool,
    can_decide: bool,
    decide_tooltip: String,
    show_checkin: bool,
    show_no_show: bool,
    can_no_show: bool,
}

#[derive(Template)]
#[template(path = "vendor_reservations.html")]
struct VendorReservationsTemplate {
    tab: String,
    reservations: Vec<VendorReservationView>,
    pending_count: usize,
    errors: Vec<String>,
    open_time: String,
}

#[derive(Deserialize)]
struct TabQuery {
    tab: Option<String>,
}

#[derive(Deserialize)]
struct ItemCreateForm {
    name: String,
    price: String,
    stock_total: Option<String>,
    track_stock: Option<String>,
}

#[derive(Deserialize)]
struct ItemUpdateForm {
    price: String,
    stock_total: Option<String>,
    stock_available: Option<String>,
    is_active: Option<String>,
}

#[derive(Deserialize)]
struct CheckInForm {
    pin: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/vendor")
            .wrap(HttpAuthentication::basic(vendor_validator))
            .wrap(from_fn(logout_guard))
            .service(web::resource("").route(web::get().to(index)))
            .service(web::resource("/").route(web::get().to(index)))
            .service(web::resource("/dashboard").route(web::get().to(dashboard)))
            .service(web::resource("/photo").route(web::post().to(upload_photo)))
            .service(
                web::resource("/items")
                    .route(web::get().to(list_items))
                    .route(web::post().to(create_item)),
            )
            .service(web::resource("/items/{id}").route(web::post().to(update_item)))
            .service(web::resource("/items/{id}/delete").route(web::post().to(delete_item)))
            .service(web::resource("/reservations").route(web::get().to(list_reservations)))
            .service(
                web::resource("/reservations/{id}/approve").route(web::post().to(approve)),
            )
            .service(web::resource("/reservations/{id}/reject").route(web::post().to(reject)))
            .service(web::resource("/reservations/{id}/no-show").route(web::post().to(no_show)))
            .service(
                web::resource("/reservations/{id}/check-in").route(web::post().to(check_in)),
            ),
    );
}

async fn index() -> HttpResponse {
    HttpResponse::Found()
        .append_header((header::LOCATION, "/vendor/dashboard"))
        .finish()
}

/// Staff accounts must be linked to a vendor before the dashboard works.
async fn my_vendor(
    state: &web::Data<AppState>,
    auth: &AuthUser,
) -> std::result::Result<VendorRow, HttpResponse> {
    let Some(vendor_id) = vendor_id_for_user(&state.db, &auth.id).await else {
        return Err(HttpResponse::Forbidden().body("No vendor linked to this account"));
    };

    let vendor = sqlx::query_as::<_, VendorRow>(
        r#"SELECT id, beach_id, name, description, photo_url, address, reference_point,
                  responsible_name, rating_avg, rating_count, is_active, created_at
           FROM vendors
           WHERE id = ?
           LIMIT 1"#,
    )
    .bind(&vendor_id)
    .fetch_optional(&state.db)
    .await
    .unwrap_or(None);

    vendor.ok_or_else(|| HttpResponse::NotFound().body("Vendor not found"))
}

async fn dashboard(state: web::Data<AppState>, auth: web::ReqData<AuthUser>) -> Result<HttpResponse> {
    let vendor = match my_vendor(&state, &auth).await {
        Ok(vendor) => vendor,
        Err(response) => return Ok(response),
    };
    render_dashboard(&state, vendor, Vec::new()).await
}

async fn render_dashboard(
    state: &web::Data<AppState>,
    vendor: VendorRow,
    errors: Vec<String>,
) -> Result<HttpResponse> {
    let total = count(
        "SELECT COUNT(*) FROM reservations WHERE vendor_id = ?",
        state,
        &vendor.id,
    )
    .await;
    let pending = count(
        "SELECT COUNT(*) FROM reservations WHERE vendor_id = ? AND status = 'PENDING'",
        state,
        &vendor.id,
    )
    .await;
    let confirmed = count(
        "SELECT COUNT(*) FROM reservations WHERE vendor_id = ? AND status = 'CONFIRMED'",
        state,
        &vendor.id,
    )
    .await;
    let arrived = count(
        "SELECT COUNT(*) FROM reservations WHERE vendor_id = ? AND status = 'ARRIVED'",
        state,
        &vendor.id,
    )
    .await;

    let stats = vec![
        StatCard {
            label: "Total reservations".to_string(),
            value: total,
        },
        StatCard {
            label: "Pending".to_string(),
            value: pending,
        },
        StatCard {
            label: "Approved".to_string(),
            value: confirmed,
        },
        StatCard {
            label: "Checked in".to_string(),
            value: arrived,
        },
    ];

    Ok(render(VendorDashboardTemplate {
        vendor_name: vendor.name,
        description: vendor
            .description
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| "No description yet.".to_string()),
        has_photo: vendor.photo_url.as_deref().map(|url| !url.trim().is_empty()).unwrap_or(false),
        photo_url: vendor.photo_url.unwrap_or_default(),
        address: vendor.address.unwrap_or_else(|| "--".to_string()),
        rating: format!("{:.1}", vendor.rating_avg),
        stats,
        errors,
    }))
}

async fn upload_photo(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let vendor = match my_vendor(&state, &auth).await {
        Ok(vendor) => vendor,
        Err(response) => return Ok(response),
    };

    match media::save_upload(&state.media_dir, "vendors", &vendor.id, &req, &body, MAX_UPLOAD_BYTES) {
        Ok(url) => {
            sqlx::query("UPDATE vendors SET photo_url = ? WHERE id = ?")
                .bind(&url)
                .bind(&vendor.id)
                .execute(&state.db)
                .await
                .map_err(actix_web::error::ErrorInternalServerError)?;
            Ok(HttpResponse::SeeOther()
                .append_header((header::LOCATION, "/vendor/dashboard"))
                .finish())
        }
        Err(message) => render_dashboard(&state, vendor, vec![message]).await,
    }
}

async fn list_items(state: web::Data<AppState>, auth: web::ReqData<AuthUser>) -> Result<HttpResponse> {
    let vendor = match my_vendor(&state, &auth).await {
        Ok(vendor) => vendor,
        Err(response) => return Ok(response),
    };
    render_items(&state, &vendor.id, Vec::new(), String::new()).await
}

async fn render_items(
    state: &web::Data<AppState>,
    vendor_id: &str,
    errors: Vec<String>,
    success: String,
) -> Result<HttpResponse> {
    let rows = sqlx::query_as::<_, VendorItemRow>(
        r#"SELECT id, vendor_id, name, price, is_active, track_stock, stock_total, stock_available
           FROM vendor_items
           WHERE vendor_id = ?
           ORDER BY name"#,
    )
    .bind(vendor_id)
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let mut options = item_catalog();
    for option in &mut options {
        option.taken = rows.iter().any(|row| row.name == option.name);
    }

    let items = rows
        .into_iter()
        .map(|row| ItemRowView {
            id: row.id,
            name: row.name,
            price: row.price,
            is_active: row.is_active == 1,
            track_stock: row.track_stock == 1,
            stock_total: row.stock_total.unwrap_or(0),
            stock_available: row.stock_available.unwrap_or(0),
        })
        .collect();

    Ok(render(VendorItemsTemplate {
        items,
        options,
        errors,
        has_success: !success.is_empty(),
        success,
    }))
}

async fn create_item(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Form<ItemCreateForm>,
) -> Result<HttpResponse> {
    let vendor = match my_vendor(&state, &auth).await {
        Ok(vendor) => vendor,
        Err(response) => return Ok(response),
    };
    let form = form.into_inner();

    let mut errors = Vec::new();
    let catalog = item_catalog();
    if !catalog.iter().any(|option| option.name == form.name) {
        errors.push("Pick an item type from the catalog.".to_string());
    }
    let price: f64 = form.price.trim().parse().unwrap_or(0.0);
    if price <= 0.0 {
        errors.push("Price must be greater than zero.".to_string());
    }
    let track_stock = form.track_stock.is_some();
    let stock_total: i64 = form
        .stock_total
        .as_deref()
        .unwrap_or("0")
        .trim()
        .parse()
        .unwrap_or(0);
    if track_stock && stock_total < 0 {
        errors.push("Stock cannot be negative.".to_string());
    }

    if !errors.is_empty() {
        return render_items(&state, &vendor.id, errors, String::new()).await;
    }

    let result = sqlx::query(
        r#"INSERT INTO vendor_items (id, vendor_id, name, price, is_active, track_stock, stock_total, stock_available)
           VALUES (?, ?, ?, ?, 1, ?, ?, ?)"#,
    )
    .bind(crate::auth::new_id())
    .bind(&vendor.id)
    .bind(form.name.trim())
    .bind(price)
    .bind(track_stock as i64)
    .bind(if track_stock { Some(stock_total) } else { None })
    .bind(if track_stock { Some(stock_total) } else { None })
    .execute(&state.db)
    .await;

    if let Err(err) = result {
        let message = if err.to_string().contains("UNIQUE") {
            "You already offer this item type.".to_string()
        } else {
            format!("Failed to create item: {err}")
        };
        return render_items(&state, &vendor.id, vec![message], String::new()).await;
    }

    render_items(&state, &vendor.id, Vec::new(), "Item added.".to_string()).await
}

async fn update_item(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Form<ItemUpdateForm>,
) -> Result<HttpResponse> {
    let vendor = match my_vendor(&state, &auth).await {
        Ok(vendor) => vendor,
        Err(response) => return Ok(response),
    };
    let item_id = path.into_inner();
    let form = form.into_inner();

    let price: f64 = form.price.trim().parse().unwrap_or(-1.0);
    let stock_total: i64 = form
        .stock_total
        .as_deref()
        .unwrap_or("0")
        .trim()
        .parse()
        .unwrap_or(-1);
    let stock_available: i64 = form
        .stock_available
        .as_deref()
        .unwrap_or("0")
        .trim()
        .parse()
        .unwrap_or(-1);
    let is_active = form.is_active.is_some();

    let mut errors = Vec::new();
    if price <= 0.0 {
        errors.push("Price must be greater than zero.".to_string());
    }
    if stock_total < 0 || stock_available < 0 {
        errors.push("Stock cannot be negative.".to_string());
    }
    if stock_available > stock_total {
        errors.push("Available stock cannot exceed total stock.".to_string());
    }
    if !errors.is_empty() {
        return render_items(&state, &vendor.id, errors, String::new()).await;
    }

    sqlx::query(
        r#"UPDATE vendor_items
           SET price = ?, stock_total = ?, stock_available = ?, is_active = ?
           WHERE id = ? AND vendor_id = ? AND track_stock = 1"#,
    )
    .bind(price)
    .bind(stock_total)
    .bind(stock_available)
    .bind(is_active as i64)
    .bind(&item_id)
    .bind(&vendor.id)
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    // Untracked items only carry a price and the active flag.
    sqlx::query(
        r#"UPDATE vendor_items
           SET price = ?, is_active = ?
           WHERE id = ? AND vendor_id = ? AND track_stock = 0"#,
    )
    .bind(price)
    .bind(is_active as i64)
    .bind(&item_id)
    .bind(&vendor.id)
    .execute(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;

    render_items(&state, &vendor.id, Vec::new(), "Item updated.".to_string()).await
}

async fn delete_item(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let vendor = match my_vendor(&state, &auth).await {
        Ok(vendor) => vendor,
        Err(response) => return Ok(response),
    };
    let item_id = path.into_inner();

    let result = sqlx::query("DELETE FROM vendor_items WHERE id = ? AND vendor_id = ?")
        .bind(&item_id)
        .bind(&vendor.id)
        .execute(&state.db)
        .await;

    match result {
        Ok(_) => render_items(&state, &vendor.id, Vec::new(), "Item removed.".to_string()).await,
        Err(err) => {
            let message = if err.to_string().contains("FOREIGN KEY") {
                "This item has reservation history and cannot be removed. Deactivate it instead.".to_string()
            } else {
                format!("Failed to remove item: {err}")
            };
            render_items(&state, &vendor.id, vec![message], String::new()).await
        }
    }
}

async fn list_reservations(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    query: web::Query<TabQuery>,
) -> Result<HttpResponse> {
    let vendor = match my_vendor(&state, &auth).await {
        Ok(vendor) => vendor,
        Err(response) => return Ok(response),
    };
    let tab = match query.tab.as_deref() {
        Some("past") => "past",
        _ => "current",
    };
    render_reservations(&state, &vendor.id, tab, Vec::new()).await
}

async fn render_reservations(
    state: &web::Data<AppState>,
    vendor_id: &str,
    tab: &str,
    errors: Vec<String>,
) -> Result<HttpResponse> {
    let now = Local::now().naive_local();
    let today_start = now.date().and_hms_opt(0, 0, 0).unwrap_or(now);
    let after_tomorrow_start = today_start + Duration::days(2);

    let rows = if tab == "past" {
        sqlx::query_as::<_, ReservationRow>(
            r#"SELECT r.id, r.user_id, r.vendor_id, r.arrival_time, r.expires_at, r.status,
                      r.total, r.note, r.confirmation_code, r.canceled_by, r.cancel_reason,
                      r.client_checked_in_at, r.created_at,
                      NULL as vendor_name
               FROM reservations r
               WHERE r.vendor_id = ? AND (r.arrival_time < ? OR r.arrival_time IS NULL)
               ORDER BY r.arrival_time DESC"#,
        )
        .bind(vendor_id)
        .bind(format_instant(today_start))
        .fetch_all(&state.db)
        .await
        .unwrap_or_default()
    } else {
        sqlx::query_as::<_, ReservationRow>(
            r#"SELECT r.id, r.user_id, r.vendor_id, r.arrival_time, r.expires_at, r.status,
                      r.total, r.note, r.confirmation_code, r.canceled_by, r.cancel_reason,
                      r.client_checked_in_at, r.created_at,
                      NULL as vendor_name
               FROM reservations r
               WHERE r.vendor_id = ? AND r.arrival_time >= ? AND r.arrival_time < ?
               ORDER BY r.arrival_time ASC"#,
        )
        .bind(vendor_id)
        .bind(format_instant(today_start))
        .bind(format_instant(after_tomorrow_start))
        .fetch_all(&state.db)
        .await
        .unwrap_or_default()
    };

    // SQLite has no array binds; fetch every line for this vendor in one
    // query and group in memory.
    let line_rows: Vec<ReservationItemRow> = if rows.is_empty() {
        Vec::new()
    } else {
        sqlx::query_as::<_, ReservationItemRow>(
            r#"SELECT ri.reservation_id, ri.item_id, ri.quantity, ri.unit_price,
                      vi.name as item_name
               FROM reservation_items ri
               LEFT JOIN vendor_items vi ON ri.item_id = vi.id
               JOIN reservations r ON ri.reservation_id = r.id
               WHERE r.vendor_id = ?"#,
        )
        .bind(vendor_id)
        .fetch_all(&state.db)
        .await
        .unwrap_or_default()
    };

    let pending_count = rows.iter().filter(|row| row.status == STATUS_PENDING).count();

    let reservations = rows
        .into_iter()
        .map(|row| {
            let arrival = row.arrival_time.as_deref().and_then(parse_instant);
            let expires_at = row.expires_at.as_deref().and_then(parse_instant);
            let checked_in_at = row.client_checked_in_at.as_deref().and_then(parse_instant);

            let can_decide = state.policy.can_decide(arrival, now);
            let decide_tooltip = state
                .policy
                .decide_block_reason(arrival, now)
                .map(|block| block.to_string())
                .unwrap_or_default();
            let can_no_show = state
                .policy
                .can_mark_no_show(&row.status, expires_at, checked_in_at, now);

            let items = line_rows
                .iter()
                .filter(|line| line.reservation_id == row.id)
                .map(|line| LineView {
                    name: line
                        .item_name
                        .clone()
                        .filter(|name| !name.trim().is_empty())
                        .unwrap_or_else(|| format!("Item {}", &line.item_id[..6.min(line.item_id.len())])),
                    quantity: line.quantity,
                    line_total: line.quantity as f64 * line.unit_price,
                })
                .collect();

            let note = row.note.unwrap_or_default();
            let pin = row.confirmation_code.unwrap_or_default();
            VendorReservationView {
                arrival: row.arrival_time.unwrap_or_else(|| "--".to_string()),
                expires: row.expires_at.unwrap_or_else(|| "--".to_string()),
                status_label: status_label(&row.status).to_string(),
                status_class: row.status.to_lowercase(),
                total: row.total,
                show_pin: row.status == STATUS_ARRIVED && !pin.trim().is_empty(),
                pin,
                has_note: !note.trim().is_empty(),
                note,
                items,
                show_decide: row.status == STATUS_PENDING,
                can_decide,
                decide_tooltip,
                show_checkin: row.status == STATUS_CONFIRMED,
                show_no_show: row.status == STATUS_CONFIRMED,
                can_no_show,
                id: row.id,
            }
        })
        .collect();

    Ok(render(VendorReservationsTemplate {
        tab: tab.to_string(),
        reservations,
        pending_count,
        errors,
        open_time: state.policy.open.format("%H:%M").to_string(),
    }))
}

fn status_label(status: &str) -> &'static str {
    match status {
        STATUS_PENDING => "Pending",
        STATUS_CONFIRMED => "Confirmed",
        STATUS_ARRIVED => "Arrived",
        STATUS_NO_SHOW => "No-show",
        STATUS_CANCELED => "Canceled",
        _ => "Unknown",
    }
}

async fn approve(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let vendor = match my_vendor(&state, &auth).await {
        Ok(vendor) => vendor,
        Err(response) => return Ok(response),
    };
    let reservation_id = path.into_inner();
    let now = Local::now().naive_local();

    let outcome =
        reservations::approve(&state.db, &state.policy, &vendor.id, &reservation_id, now).await;
    if let Err(err) = outcome {
        return render_reservations(&state, &vendor.id, "current", vec![friendly_decide_error(err)])
            .await;
    }

    log_activity(
        &state.db,
        "reservation_approved",
        &format!("{} approved reservation {}.", auth.display_name, reservation_id),
        Some(&auth.id),
        Some(&reservation_id),
    )
    .await;

    finish_transition(&state, &reservation_id, "reservation_approved").await;

    Ok(HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/vendor/reservations"))
        .finish())
}

async fn reject(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let vendor = match my_vendor(&state, &auth).await {
        Ok(vendor) => vendor,
        Err(response) => return Ok(response),
    };
    let reservation_id = path.into_inner();
    let now = Local::now().naive_local();

    let outcome =
        reservations::reject(&state.db, &state.policy, &vendor.id, &reservation_id, now).await;
    if let Err(err) = outcome {
        return render_reservations(&state, &vendor.id, "current", vec![friendly_decide_error(err)])
            .await;
    }

    log_activity(
        &state.db,
        "reservation_rejected",
        &format!("{} rejected reservation {}.", auth.display_name, reservation_id),
        Some(&auth.id),
        Some(&reservation_id),
    )
    .await;

    finish_transition(&state, &reservation_id, "reservation_rejected").await;

    Ok(HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/vendor/reservations"))
        .finish())
}

async fn no_show(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let vendor = match my_vendor(&state, &auth).await {
        Ok(vendor) => vendor,
        Err(response) => return Ok(response),
    };
    let reservation_id = path.into_inner();
    let now = Local::now().naive_local();

    let outcome =
        reservations::mark_no_show(&state.db, &state.policy, &vendor.id, &reservation_id, now).await;
    if let Err(err) = outcome {
        let message = match err.code() {
            "not_expired" => "The arrival window has not expired yet.".to_string(),
            "invalid_status" => "Only confirmed reservations can be marked as no-show.".to_string(),
            _ => err.to_string(),
        };
        return render_reservations(&state, &vendor.id, "current", vec![message]).await;
    }

    log_activity(
        &state.db,
        "reservation_no_show",
        &format!("{} marked reservation {} as no-show.", auth.display_name, reservation_id),
        Some(&auth.id),
        Some(&reservation_id),
    )
    .await;

    finish_transition(&state, &reservation_id, "reservation_no_show").await;

    Ok(HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/vendor/reservations"))
        .finish())
}

async fn check_in(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Form<CheckInForm>,
) -> Result<HttpResponse> {
    let vendor = match my_vendor(&state, &auth).await {
        Ok(vendor) => vendor,
        Err(response) => return Ok(response),
    };
    let reservation_id = path.into_inner();
    let pin = form.into_inner().pin;
    let now = Local::now().naive_local();

    let outcome = reservations::check_in(&state.db, &vendor.id, &reservation_id, &pin, now).await;
    if let Err(err) = outcome {
        let message = match err.code() {
            "invalid_pin" => "Invalid PIN. Check with the customer and try again.".to_string(),
            "invalid_status" => "Only confirmed reservations can be checked in.".to_string(),
            _ => err.to_string(),
        };
        return render_reservations(&state, &vendor.id, "current", vec![message]).await;
    }

    log_activity(
        &state.db,
        "reservation_checked_in",
        &format!("{} checked in reservation {}.", auth.display_name, reservation_id),
        Some(&auth.id),
        Some(&reservation_id),
    )
    .await;

    finish_transition(&state, &reservation_id, "reservation_checked_in").await;

    Ok(HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/vendor/reservations"))
        .finish())
}

fn friendly_decide_error(err: ReservationError) -> String {
    match err.code() {
        "too_early_to_decide" => "Approve/reject is allowed only on the arrival day, from opening time.".to_string(),
        "invalid_status" => "This reservation is no longer pending.".to_string(),
        "not_found" => "Reservation not found.".to_string(),
        _ => err.to_string(),
    }
}

async fn count(query: &str, state: &web::Data<AppState>, param: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(query)
        .bind(param)
        .fetch_one(&state.db)
        .await
        .unwrap_or(0)
}

/// Shared tail of every status transition: notify the holder, feed the
/// live dashboards.
async fn finish_transition(state: &web::Data<AppState>, reservation_id: &str, kind: &str) {
    if let Some(row) = fetch_reservation_event(&state.db, reservation_id).await {
        let (title, body) = push::status_message(&row.status, row.canceled_by.as_deref());
        push::notify_user(state, &row.user_id, &title, &body, None).await;
        let _ = state.events.send(ServerEvent::from_row(kind, row));
    }
}
