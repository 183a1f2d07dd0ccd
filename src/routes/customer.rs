use actix_web::{http::header, middleware::from_fn, web, HttpRequest, HttpResponse, Result};
use actix_web::http::header::Header;
use actix_web_httpauth::headers::authorization::{Authorization, Basic};
use actix_web_httpauth::middleware::HttpAuthentication;
use askama::Template;
use chrono::{Duration, Local, NaiveDate, NaiveTime};
use serde::Deserialize;
use serde_json::json;

use crate::filters;
use crate::{
    auth::{
        authenticate_credentials, clear_logout_cookie, customer_validator, hash_password,
        logout_cookie, logout_guard, new_id, verify_password, AuthUser, AUTH_REALM,
    },
    db::{fetch_reservation_event, log_activity},
    models::{
        BeachRow, RegionRow, ReservationRow, UserRow, VendorItemRow, VendorRow, CANCELED_BY_USER,
        ROLE_ADMIN, ROLE_CUSTOMER, ROLE_VENDOR, STATUS_ARRIVED, STATUS_CANCELED, STATUS_CONFIRMED,
        STATUS_NO_SHOW, STATUS_PENDING,
    },
    policy::{format_instant, parse_instant},
    push,
    reservations::{self, LineItem, ReservationError},
    state::{AppState, ServerEvent},
    templates::render,
};

const MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024;

#[derive(Template)]
#[template(path = "home.html")]
struct HomeTemplate {
    regions: Vec<RegionRow>,
}

#[derive(Template)]
#[template(path = "beaches.html")]
struct BeachesTemplate {
    region: RegionRow,
    beaches: Vec<BeachRow>,
}

#[derive(Clone, Debug)]
struct VendorCard {
    id: String,
    name: String,
    photo_url: String,
    has_photo: bool,
    rating: String,
    address: String,
}

#[derive(Template)]
#[template(path = "vendors.html")]
struct VendorsTemplate {
    beach: BeachRow,
    vendors: Vec<VendorCard>,
}

#[derive(Clone, Debug)]
struct ItemView {
    id: String,
    name: String,
    price: f64,
    availability: String,
    sold_out: bool,
    max_quantity: i64,
}

#[derive(Clone, Debug, Default)]
struct ReserveFormView {
    day: String,
    time: String,
    note: String,
}

#[derive(Template)]
#[template(path = "vendor_detail.html")]
struct VendorDetailTemplate {
    vendor_id: String,
    name: String,
    photo_url: String,
    has_photo: bool,
    rating: String,
    responsible: String,
    address: String,
    reference_point: String,
    items: Vec<ItemView>,
    form: ReserveFormView,
    errors: Vec<String>,
    today: String,
    tomorrow: String,
    grace_minutes: i64,
}

#[derive(Template)]
#[template(path = "reserve_success.html")]
struct ReserveSuccessTemplate {
    reservation_id: String,
}

#[derive(Clone, Debug)]
struct ReservationView {
    id: String,
    vendor_name: String,
    status_label: String,
    status_class: String,
    arrival: String,
    created: String,
    pin: String,
    has_pin: bool,
    is_open: bool,
    can_cancel: bool,
    block_reason: String,
}

#[derive(Template)]
#[template(path = "reservations.html")]
struct ReservationsTemplate {
    tab: String,
    reservations: Vec<ReservationView>,
    errors: Vec<String>,
    cancel_cutoff_minutes: i64,
    vapid_public_key: String,
}

#[derive(Clone, Debug, Default)]
struct SignupView {
    full_name: String,
    email: String,
}

#[derive(Template)]
#[template(path = "signup.html")]
struct SignupTemplate {
    form: SignupView,
    errors: Vec<String>,
    created: bool,
}

#[derive(Template)]
#[template(path = "invite.html")]
struct InviteTemplate {
    token: String,
    display_name: String,
    errors: Vec<String>,
    done: bool,
}

#[derive(Template)]
#[template(path = "profile.html")]
struct ProfileTemplate {
    display_name: String,
    email: String,
    avatar_url: String,
    has_avatar: bool,
    errors: Vec<String>,
    success: String,
    has_success: bool,
}

#[derive(Deserialize)]
struct SignupForm {
    full_name: String,
    email: String,
    password: String,
    password2: String,
    accept_terms: Option<String>,
}

#[derive(Deserialize)]
struct InviteForm {
    password: String,
    password2: String,
}

#[derive(Deserialize)]
struct CancelForm {
    reason: Option<String>,
}

#[derive(Deserialize)]
struct ProfileForm {
    display_name: String,
}

#[derive(Deserialize)]
struct PasswordForm {
    current_password: String,
    new_password: String,
    new_password2: String,
}

#[derive(Deserialize)]
struct ReservationTab {
    tab: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(home)))
        .service(web::resource("/regions/{id}").route(web::get().to(list_beaches)))
        .service(web::resource("/beaches/{id}").route(web::get().to(list_vendors)))
        .service(web::resource("/vendors/{id}").route(web::get().to(vendor_detail)))
        .service(
            web::resource("/vendors/{id}/reserve")
                .wrap(HttpAuthentication::basic(customer_validator))
                .wrap(from_fn(logout_guard))
                .route(web::post().to(create_reservation)),
        )
        .service(
            web::scope("/reservations")
                .wrap(HttpAuthentication::basic(customer_validator))
                .wrap(from_fn(logout_guard))
                .service(web::resource("").route(web::get().to(list_reservations)))
                .service(web::resource("/{id}/cancel").route(web::post().to(cancel_reservation))),
        )
        .service(
            web::scope("/profile")
                .wrap(HttpAuthentication::basic(customer_validator))
                .wrap(from_fn(logout_guard))
                .service(
                    web::resource("")
                        .route(web::get().to(profile))
                        .route(web::post().to(update_profile)),
                )
                .service(web::resource("/password").route(web::post().to(update_password)))
                .service(web::resource("/photo").route(web::post().to(upload_avatar))),
        )
        .service(
            web::resource("/push/subscribe")
                .wrap(HttpAuthentication::basic(customer_validator))
                .wrap(from_fn(logout_guard))
                .route(web::post().to(subscribe_push)),
        )
        .service(
            web::resource("/signup")
                .route(web::get().to(show_signup))
                .route(web::post().to(create_account)),
        )
        .service(
            web::resource("/invite/{token}")
                .route(web::get().to(show_invite))
                .route(web::post().to(accept_invite)),
        )
        .service(web::resource("/login").route(web::get().to(login)))
        .service(web::resource("/logout").route(web::get().to(logout)))
        .service(web::resource("/health").route(web::get().to(health)));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

async fn logout(req: HttpRequest) -> HttpResponse {
    HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/"))
        .cookie(logout_cookie(&req))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}

#[derive(Deserialize)]
struct LoginQuery {
    next: Option<String>,
}

async fn login(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<LoginQuery>,
) -> HttpResponse {
    let auth = match Authorization::<Basic>::parse(&req) {
        Ok(auth) => auth,
        Err(_) => return auth_challenge(),
    };
    let credentials = auth.into_scheme();
    let email = credentials.user_id();
    let password = credentials.password().unwrap_or_default();

    let user = match authenticate_credentials(&state, email, password).await {
        Some(user) => user,
        None => return auth_challenge(),
    };

    let requested = query.next.as_deref().unwrap_or("");
    let requested = if requested.starts_with('/') { requested } else { "" };

    let redirect = match user.role.as_str() {
        ROLE_ADMIN => {
            if requested.starts_with("/admin") {
                requested
            } else {
                "/admin/dashboard"
            }
        }
        ROLE_VENDOR => {
            if requested.starts_with("/vendor") {
                requested
            } else {
                "/vendor/dashboard"
            }
        }
        _ => {
            if !requested.is_empty()
                && !requested.starts_with("/admin")
                && !requested.starts_with("/vendor")
            {
                requested
            } else {
                "/"
            }
        }
    };

    HttpResponse::SeeOther()
        .append_header((header::LOCATION, redirect))
        .cookie(clear_logout_cookie(&req))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}

fn auth_challenge() -> HttpResponse {
    HttpResponse::Unauthorized()
        .insert_header((header::WWW_AUTHENTICATE, format!("Basic realm=\"{}\"", AUTH_REALM)))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}

async fn home(state: web::Data<AppState>) -> Result<HttpResponse> {
    let regions = sqlx::query_as::<_, RegionRow>("SELECT id, name FROM regions ORDER BY name")
        .fetch_all(&state.db)
        .await
        .unwrap_or_default();

    Ok(render(HomeTemplate { regions }))
}

async fn list_beaches(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let region_id = path.into_inner();
    let region = sqlx::query_as::<_, RegionRow>("SELECT id, name FROM regions WHERE id = ?")
        .bind(&region_id)
        .fetch_optional(&state.db)
        .await
        .unwrap_or(None);
    let Some(region) = region else {
        return Ok(HttpResponse::NotFound().body("Region not found"));
    };

    let beaches = sqlx::query_as::<_, BeachRow>(
        "SELECT id, region_id, name FROM beaches WHERE region_id = ? ORDER BY name",
    )
    .bind(&region_id)
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    Ok(render(BeachesTemplate { region, beaches }))
}

async fn list_vendors(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let beach_id = path.into_inner();
    let beach = sqlx::query_as::<_, BeachRow>(
        "SELECT id, region_id, name FROM beaches WHERE id = ?",
    )
    .bind(&beach_id)
    .fetch_optional(&state.db)
    .await
    .unwrap_or(None);
    let Some(beach) = beach else {
        return Ok(HttpResponse::NotFound().body("Beach not found"));
    };

    let rows = sqlx::query_as::<_, VendorRow>(
        r#"SELECT id, beach_id, name, description, photo_url, address, reference_point,
                  responsible_name, rating_avg, rating_count, is_active, created_at
           FROM vendors
           WHERE beach_id = ? AND is_active = 1
           ORDER BY name"#,
    )
    .bind(&beach_id)
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let vendors = rows
        .into_iter()
        .map(|row| VendorCard {
            id: row.id,
            name: row.name,
            has_photo: row.photo_url.as_deref().map(|url| !url.trim().is_empty()).unwrap_or(false),
            photo_url: row.photo_url.unwrap_or_default(),
            rating: format!("{:.1}", row.rating_avg),
            address: row.address.unwrap_or_else(|| "--".to_string()),
        })
        .collect();

    Ok(render(VendorsTemplate { beach, vendors }))
}

async fn vendor_detail(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let vendor_id = path.into_inner();
    vendor_page(&state, &vendor_id, ReserveFormView::default(), Vec::new()).await
}

async fn vendor_page(
    state: &web::Data<AppState>,
    vendor_id: &str,
    form: ReserveFormView,
    errors: Vec<String>,
) -> Result<HttpResponse> {
    let vendor = sqlx::query_as::<_, VendorRow>(
        r#"SELECT id, beach_id, name, description, photo_url, address, reference_point,
                  responsible_name, rating_avg, rating_count, is_active, created_at
           FROM vendors
           WHERE id = ?
           LIMIT 1"#,
    )
    .bind(vendor_id)
    .fetch_optional(&state.db)
    .await
    .unwrap_or(None);
    let Some(vendor) = vendor else {
        return Ok(HttpResponse::NotFound().body("Vendor not found"));
    };

    let rows = sqlx::query_as::<_, VendorItemRow>(
        r#"SELECT id, vendor_id, name, price, is_active, track_stock, stock_total, stock_available
           FROM vendor_items
           WHERE vendor_id = ? AND is_active = 1
           ORDER BY name"#,
    )
    .bind(vendor_id)
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    let items = rows
        .into_iter()
        .map(|row| {
            let available = row.stock_available.unwrap_or(0);
            let tracked = row.track_stock == 1;
            ItemView {
                id: row.id,
                name: row.name,
                price: row.price,
                availability: if tracked {
                    format!("{available} available")
                } else {
                    "Unlimited".to_string()
                },
                sold_out: tracked && available <= 0,
                max_quantity: if tracked { available } else { 99 },
            }
        })
        .collect();

    let now = Local::now().naive_local();
    let today = now.date();
    let tomorrow = today + Duration::days(1);

    let safe = |value: Option<String>| {
        value
            .filter(|inner| !inner.trim().is_empty())
            .unwrap_or_else(|| "--".to_string())
    };

    Ok(render(VendorDetailTemplate {
        vendor_id: vendor.id,
        name: vendor.name,
        has_photo: vendor.photo_url.as_deref().map(|url| !url.trim().is_empty()).unwrap_or(false),
        photo_url: vendor.photo_url.unwrap_or_default(),
        rating: format!("{:.1}", vendor.rating_avg),
        responsible: safe(vendor.responsible_name),
        address: safe(vendor.address),
        reference_point: safe(vendor.reference_point),
        items,
        form,
        errors,
        today: today.format("%d/%m").to_string(),
        tomorrow: tomorrow.format("%d/%m").to_string(),
        grace_minutes: state.policy.grace.num_minutes(),
    }))
}

async fn create_reservation(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Form<Vec<(String, String)>>,
) -> Result<HttpResponse> {
    let vendor_id = path.into_inner();

    let mut day_raw = String::new();
    let mut time_raw = String::new();
    let mut note = String::new();
    let mut lines: Vec<LineItem> = Vec::new();
    for (key, value) in form.into_inner() {
        match key.as_str() {
            "arrival_day" => day_raw = value,
            "arrival_time" => time_raw = value,
            "note" => note = value,
            _ => {
                if let Some(item_id) = key.strip_prefix("qty_") {
                    if let Ok(quantity) = value.trim().parse::<i64>() {
                        if quantity > 0 {
                            lines.push(LineItem {
                                item_id: item_id.to_string(),
                                quantity,
                            });
                        }
                    }
                }
            }
        }
    }

    let form_view = ReserveFormView {
        day: day_raw.clone(),
        time: time_raw.clone(),
        note: note.clone(),
    };

    let mut errors = Vec::new();
    if lines.is_empty() {
        errors.push("Select at least one item.".to_string());
    }

    let now = Local::now().naive_local();
    let day: Option<NaiveDate> = match day_raw.as_str() {
        "today" => Some(now.date()),
        "tomorrow" => Some(now.date() + Duration::days(1)),
        _ => {
            errors.push("Pick an arrival day.".to_string());
            None
        }
    };
    let time = match NaiveTime::parse_from_str(time_raw.trim(), "%H:%M") {
        Ok(time) => Some(time),
        Err(_) => {
            errors.push("Pick an arrival time.".to_string());
            None
        }
    };

    let arrival = match (day, time) {
        (Some(day), Some(time)) => match state.policy.validate_arrival(day, time, now) {
            Ok(arrival) => Some(arrival),
            Err(rejection) => {
                errors.push(rejection.to_string());
                None
            }
        },
        _ => None,
    };

    let Some(arrival) = arrival else {
        return vendor_page(&state, &vendor_id, form_view, errors).await;
    };
    if !errors.is_empty() {
        return vendor_page(&state, &vendor_id, form_view, errors).await;
    }

    let note = note.trim();
    let note = if note.is_empty() { None } else { Some(note) };

    let created = reservations::create(
        &state.db,
        &state.policy,
        &auth.id,
        &vendor_id,
        arrival,
        note,
        &lines,
        now,
    )
    .await;

    let reservation_id = match created {
        Ok(id) => id,
        Err(err) => {
            return vendor_page(&state, &vendor_id, form_view, vec![friendly_reservation_error(err)])
                .await;
        }
    };

    log_activity(
        &state.db,
        "reservation_created",
        &format!("{} placed a reservation.", auth.display_name),
        Some(&auth.id),
        Some(&reservation_id),
    )
    .await;

    if let Some(row) = fetch_reservation_event(&state.db, &reservation_id).await {
        let _ = state
            .events
            .send(ServerEvent::from_row("reservation_created", row));
    }

    Ok(render(ReserveSuccessTemplate { reservation_id }))
}

fn friendly_reservation_error(err: ReservationError) -> String {
    match &err {
        ReservationError::OutOfStock(name) => {
            format!("Not enough stock left for {name}. Adjust the quantity and try again.")
        }
        ReservationError::EmptyOrder => "Select at least one item.".to_string(),
        ReservationError::Window(rejection) => rejection.to_string(),
        ReservationError::InvalidStatus => {
            "This reservation cannot be changed in its current status.".to_string()
        }
        ReservationError::NotAllowed => "You are not allowed to do that.".to_string(),
        ReservationError::NotFound => "Reservation not found.".to_string(),
        // Anything unmapped is shown as-is.
        _ => err.to_string(),
    }
}

async fn list_reservations(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    query: web::Query<ReservationTab>,
) -> Result<HttpResponse> {
    let tab = normalize_tab(query.tab.as_deref());
    render_reservations(&state, &auth, &tab, Vec::new()).await
}

fn normalize_tab(tab: Option<&str>) -> String {
    match tab {
        Some("past") => "past".to_string(),
        _ => "current".to_string(),
    }
}

async fn render_reservations(
    state: &web::Data<AppState>,
    auth: &AuthUser,
    tab: &str,
    errors: Vec<String>,
) -> Result<HttpResponse> {
    let now = Local::now().naive_local();
    // "Current" keeps reservations visible for 8 hours past arrival.
    let horizon = format_instant(now - Duration::hours(8));

    let rows = if tab == "past" {
        sqlx::query_as::<_, ReservationRow>(
            r#"SELECT r.id, r.user_id, r.vendor_id, r.arrival_time, r.expires_at, r.status,
                      r.total, r.note, r.confirmation_code, r.canceled_by, r.cancel_reason,
                      r.client_checked_in_at, r.created_at,
                      v.name as vendor_name
               FROM reservations r
               LEFT JOIN vendors v ON r.vendor_id = v.id
               WHERE r.user_id = ? AND r.arrival_time IS NOT NULL AND r.arrival_time < ?
               ORDER BY r.created_at DESC"#,
        )
        .bind(&auth.id)
        .bind(&horizon)
        .fetch_all(&state.db)
        .await
        .unwrap_or_default()
    } else {
        sqlx::query_as::<_, ReservationRow>(
            r#"SELECT r.id, r.user_id, r.vendor_id, r.arrival_time, r.expires_at, r.status,
                      r.total, r.note, r.confirmation_code, r.canceled_by, r.cancel_reason,
                      r.client_checked_in_at, r.created_at,
                      v.name as vendor_name
               FROM reservations r
               LEFT JOIN vendors v ON r.vendor_id = v.id
               WHERE r.user_id = ? AND (r.arrival_time >= ? OR r.arrival_time IS NULL)
               ORDER BY r.created_at DESC"#,
        )
        .bind(&auth.id)
        .bind(&horizon)
        .fetch_all(&state.db)
        .await
        .unwrap_or_default()
    };

    let reservations = rows
        .into_iter()
        .map(|row| {
            let arrival = row.arrival_time.as_deref().and_then(parse_instant);
            let can_cancel = state.policy.can_cancel(&row.status, arrival, now);
            let block_reason = state
                .policy
                .cancel_block_reason(&row.status, arrival, now)
                .map(|block| block.to_string())
                .unwrap_or_default();
            let pin = row.confirmation_code.clone().unwrap_or_default();
            ReservationView {
                has_pin: row.status == STATUS_CONFIRMED && !pin.trim().is_empty(),
                pin,
                is_open: row.status == STATUS_PENDING || row.status == STATUS_CONFIRMED,
                status_label: status_label(&row.status).to_string(),
                status_class: row.status.to_lowercase(),
                vendor_name: row.vendor_name.unwrap_or_else(|| "--".to_string()),
                arrival: row.arrival_time.unwrap_or_else(|| "--".to_string()),
                created: row.created_at,
                id: row.id,
                can_cancel,
                block_reason,
            }
        })
        .collect();

    Ok(render(ReservationsTemplate {
        tab: tab.to_string(),
        reservations,
        errors,
        cancel_cutoff_minutes: state.policy.cancel_cutoff.num_minutes(),
        vapid_public_key: state.push.public_key.clone(),
    }))
}

fn status_label(status: &str) -> &'static str {
    match status {
        STATUS_PENDING => "Awaiting approval",
        STATUS_CONFIRMED => "Approved",
        STATUS_ARRIVED => "Completed",
        STATUS_NO_SHOW => "No-show",
        STATUS_CANCELED => "Canceled",
        _ => "Unknown",
    }
}

async fn cancel_reservation(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Form<CancelForm>,
) -> Result<HttpResponse> {
    let reservation_id = path.into_inner();
    let reason = form.into_inner().reason;
    let reason = reason.as_deref().map(str::trim).filter(|r| !r.is_empty());
    let now = Local::now().naive_local();

    let outcome = reservations::cancel_by_user(
        &state.db,
        &state.policy,
        &auth.id,
        &reservation_id,
        reason,
        now,
    )
    .await;

    if let Err(err) = outcome {
        let message = match err.code() {
            "too_late_to_cancel" => format!(
                "You can only cancel up to {} minutes before the arrival time.",
                state.policy.cancel_cutoff.num_minutes()
            ),
            "invalid_status" => "This reservation cannot be canceled in its current status.".to_string(),
            "not_allowed" => "You do not have permission to cancel this reservation.".to_string(),
            _ => err.to_string(),
        };
        return render_reservations(&state, &auth, "current", vec![message]).await;
    }

    log_activity(
        &state.db,
        "reservation_canceled",
        &format!("{} canceled a reservation.", auth.display_name),
        Some(&auth.id),
        Some(&reservation_id),
    )
    .await;

    let (title, body) = push::status_message(STATUS_CANCELED, Some(CANCELED_BY_USER));
    push::notify_user(&state, &auth.id, &title, &body, None).await;

    if let Some(row) = fetch_reservation_event(&state.db, &reservation_id).await {
        let _ = state
            .events
            .send(ServerEvent::from_row("reservation_canceled", row));
    }

    Ok(HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/reservations"))
        .finish())
}

async fn show_signup() -> Result<HttpResponse> {
    Ok(render(SignupTemplate {
        form: SignupView::default(),
        errors: Vec::new(),
        created: false,
    }))
}

async fn create_account(
    state: web::Data<AppState>,
    form: web::Form<SignupForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let mut errors = Vec::new();
    if form.full_name.trim().is_empty() {
        errors.push("Full name is required.".to_string());
    }
    if form.email.trim().is_empty() {
        errors.push("Email is required.".to_string());
    }
    if form.password.len() < 6 {
        errors.push("Password must be at least 6 characters.".to_string());
    }
    if form.password != form.password2 {
        errors.push("Passwords do not match.".to_string());
    }
    if form.accept_terms.is_none() {
        errors.push("You must accept the terms and conditions.".to_string());
    }

    let view = SignupView {
        full_name: form.full_name.clone(),
        email: form.email.clone(),
    };

    if !errors.is_empty() {
        return Ok(render(SignupTemplate {
            form: view,
            errors,
            created: false,
        }));
    }

    let password_hash = hash_password(&form.password)
        .map_err(|_| actix_web::error::ErrorInternalServerError("hash failure"))?;
    let now = chrono::Utc::now().to_rfc3339();

    let result = sqlx::query(
        r#"INSERT INTO users (id, email, display_name, role, password_hash, active, terms_accepted_at, created_at)
           VALUES (?, ?, ?, ?, ?, 1, ?, ?)"#,
    )
    .bind(new_id())
    .bind(form.email.trim().to_lowercase())
    .bind(form.full_name.trim())
    .bind(ROLE_CUSTOMER)
    .bind(password_hash)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await;

    if let Err(err) = result {
        let message = if err.to_string().contains("UNIQUE") {
            "This email is already registered.".to_string()
        } else {
            format!("Failed to create account: {err}")
        };
        return Ok(render(SignupTemplate {
            form: view,
            errors: vec![message],
            created: false,
        }));
    }

    Ok(render(SignupTemplate {
        form: SignupView::default(),
        errors: Vec::new(),
        created: true,
    }))
}

async fn show_invite(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let token = path.into_inner();
    let Some(user) = user_by_invite(&state, &token).await else {
        return Ok(HttpResponse::NotFound().body("Invite link is invalid or already used"));
    };

    Ok(render(InviteTemplate {
        token,
        display_name: user.display_name,
        errors: Vec::new(),
        done: false,
    }))
}

async fn accept_invite(
    state: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Form<InviteForm>,
) -> Result<HttpResponse> {
    let token = path.into_inner();
    let Some(user) = user_by_invite(&state, &token).await else {
        return Ok(HttpResponse::NotFound().body("Invite link is invalid or already used"));
    };

    let form = form.into_inner();
    let mut errors = Vec::new();
    if form.password.len() < 6 {
        errors.push("Password must be at least 6 characters.".to_string());
    }
    if form.password != form.password2 {
        errors.push("Passwords do not match.".to_string());
    }
    if !errors.is_empty() {
        return Ok(render(InviteTemplate {
            token,
            display_name: user.display_name,
            errors,
            done: false,
        }));
    }

    let password_hash = hash_password(&form.password)
        .map_err(|_| actix_web::error::ErrorInternalServerError("hash failure"))?;

    sqlx::query("UPDATE users SET password_hash = ?, invite_token = NULL, active = 1 WHERE id = ?")
        .bind(password_hash)
        .bind(&user.id)
        .execute(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    log_activity(
        &state.db,
        "invite_accepted",
        &format!("{} activated their account.", user.display_name),
        Some(&user.id),
        None,
    )
    .await;

    Ok(render(InviteTemplate {
        token: String::new(),
        display_name: user.display_name,
        errors: Vec::new(),
        done: true,
    }))
}

async fn user_by_invite(state: &web::Data<AppState>, token: &str) -> Option<UserRow> {
    if token.trim().is_empty() {
        return None;
    }
    sqlx::query_as::<_, UserRow>(
        r#"SELECT id, email, display_name, role, password_hash, active, avatar_url,
                  terms_accepted_at, invite_token, created_at
           FROM users
           WHERE invite_token = ?
           LIMIT 1"#,
    )
    .bind(token)
    .fetch_optional(&state.db)
    .await
    .unwrap_or(None)
}

async fn profile(state: web::Data<AppState>, auth: web::ReqData<AuthUser>) -> Result<HttpResponse> {
    render_profile(&state, &auth, Vec::new(), None).await
}

async fn render_profile(
    state: &web::Data<AppState>,
    auth: &AuthUser,
    errors: Vec<String>,
    success: Option<String>,
) -> Result<HttpResponse> {
    let user = sqlx::query_as::<_, UserRow>(
        r#"SELECT id, email, display_name, role, password_hash, active, avatar_url,
                  terms_accepted_at, invite_token, created_at
           FROM users
           WHERE id = ?
           LIMIT 1"#,
    )
    .bind(&auth.id)
    .fetch_optional(&state.db)
    .await
    .unwrap_or(None);
    let Some(user) = user else {
        return Ok(HttpResponse::NotFound().body("Profile not found"));
    };

    let success = success.unwrap_or_default();
    Ok(render(ProfileTemplate {
        display_name: user.display_name,
        email: user.email,
        has_avatar: user.avatar_url.as_deref().map(|url| !url.trim().is_empty()).unwrap_or(false),
        avatar_url: user.avatar_url.unwrap_or_default(),
        errors,
        has_success: !success.is_empty(),
        success,
    }))
}

async fn update_profile(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Form<ProfileForm>,
) -> Result<HttpResponse> {
    let display_name = form.into_inner().display_name;
    if display_name.trim().is_empty() {
        return render_profile(&state, &auth, vec!["Display name is required.".to_string()], None)
            .await;
    }

    sqlx::query("UPDATE users SET display_name = ? WHERE id = ?")
        .bind(display_name.trim())
        .bind(&auth.id)
        .execute(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    render_profile(&state, &auth, Vec::new(), Some("Profile updated.".to_string())).await
}

async fn update_password(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Form<PasswordForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let mut errors = Vec::new();
    if form.new_password.len() < 6 {
        errors.push("New password must be at least 6 characters.".to_string());
    }
    if form.new_password != form.new_password2 {
        errors.push("New passwords do not match.".to_string());
    }

    let current_hash = sqlx::query_as::<_, (String,)>(
        "SELECT password_hash FROM users WHERE id = ?",
    )
    .bind(&auth.id)
    .fetch_optional(&state.db)
    .await
    .ok()
    .flatten()
    .map(|(hash,)| hash)
    .unwrap_or_default();
    if !verify_password(&form.current_password, &current_hash) {
        errors.push("Current password is incorrect.".to_string());
    }

    if !errors.is_empty() {
        return render_profile(&state, &auth, errors, None).await;
    }

    let password_hash = hash_password(&form.new_password)
        .map_err(|_| actix_web::error::ErrorInternalServerError("hash failure"))?;
    sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
        .bind(password_hash)
        .bind(&auth.id)
        .execute(&state.db)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    render_profile(&state, &auth, Vec::new(), Some("Password updated.".to_string())).await
}

async fn upload_avatar(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse> {
    match crate::media::save_upload(&state.media_dir, "avatars", &auth.id, &req, &body, MAX_UPLOAD_BYTES)
    {
        Ok(url) => {
            sqlx::query("UPDATE users SET avatar_url = ? WHERE id = ?")
                .bind(&url)
                .bind(&auth.id)
                .execute(&state.db)
                .await
                .map_err(actix_web::error::ErrorInternalServerError)?;
            render_profile(&state, &auth, Vec::new(), Some("Photo updated.".to_string())).await
        }
        Err(message) => render_profile(&state, &auth, vec![message], None).await,
    }
}

async fn subscribe_push(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let raw = String::from_utf8(body.to_vec()).unwrap_or_default();
    if raw.trim().is_empty() {
        return Ok(HttpResponse::BadRequest().finish());
    }

    let _ = push::store_subscription(&state.db, &auth.id, &raw).await;
    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}
