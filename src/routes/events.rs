use actix_files::NamedFile;
use actix_web::{http::header, middleware::from_fn, web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::{
    auth::{customer_validator, logout_guard, vendor_validator, AuthUser},
    db::vendor_id_for_user,
    state::{AppState, ServerEvent},
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/vendor/events")
            .wrap(HttpAuthentication::basic(vendor_validator))
            .wrap(from_fn(logout_guard))
            .route(web::get().to(stream_vendor_events)),
    )
    .service(
        web::resource("/reservations/{id}/events")
            .wrap(HttpAuthentication::basic(customer_validator))
            .wrap(from_fn(logout_guard))
            .route(web::get().to(stream_reservation_events)),
    )
    .service(web::resource("/sw.js").route(web::get().to(service_worker)));
}

async fn service_worker() -> Result<NamedFile> {
    Ok(NamedFile::open("./static/sw.js")?)
}

/// Live feed for the vendor dashboard: every change to one of this
/// vendor's reservations. Receivers just reload their list.
async fn stream_vendor_events(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> HttpResponse {
    let Some(vendor_id) = vendor_id_for_user(&state.db, &auth.id).await else {
        return HttpResponse::Forbidden().body("No vendor linked to this account");
    };

    let rx = state.events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let event = match result {
            Ok(event) => event,
            Err(_) => return None,
        };
        if event.vendor_id.as_deref() != Some(&vendor_id) {
            return None;
        }
        Some(Ok::<web::Bytes, actix_web::Error>(event_to_bytes(&event)))
    });

    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(stream)
}

#[derive(serde::Serialize)]
struct ReservationStatusEvent {
    reservation_id: Option<String>,
    status: Option<String>,
    arrival_time: Option<String>,
    vendor_name: Option<String>,
}

/// Per-reservation feed for the holder's reservation list.
async fn stream_reservation_events(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> HttpResponse {
    let reservation_id = path.into_inner();

    let owner = sqlx::query_as::<_, (String,)>("SELECT user_id FROM reservations WHERE id = ?")
        .bind(&reservation_id)
        .fetch_optional(&state.db)
        .await
        .unwrap_or(None);
    match owner {
        Some((user_id,)) if user_id == auth.id => {}
        Some(_) => return HttpResponse::Forbidden().finish(),
        None => return HttpResponse::NotFound().finish(),
    }

    let rx = state.events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let event = match result {
            Ok(event) => event,
            Err(_) => return None,
        };
        if event.reservation_id.as_deref() != Some(&reservation_id) {
            return None;
        }
        let public = ReservationStatusEvent {
            reservation_id: event.reservation_id,
            status: event.status,
            arrival_time: event.arrival_time,
            vendor_name: event.vendor_name,
        };
        Some(Ok::<web::Bytes, actix_web::Error>(status_event_to_bytes(&public)))
    });

    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(stream)
}

fn event_to_bytes(event: &ServerEvent) -> web::Bytes {
    let payload = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    web::Bytes::from(format!("event: update\ndata: {}\n\n", payload))
}

fn status_event_to_bytes(event: &ReservationStatusEvent) -> web::Bytes {
    let payload = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    web::Bytes::from(format!("event: update\ndata: {}\n\n", payload))
}
