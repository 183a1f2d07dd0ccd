use serde::Deserialize;
use sqlx::SqlitePool;
use web_push::{
    ContentEncoding, IsahcWebPushClient, SubscriptionInfo, VapidSignatureBuilder, WebPushClient,
    WebPushError, WebPushMessageBuilder, URL_SAFE_NO_PAD,
};

use crate::{
    auth::new_id,
    models::{CANCELED_BY_USER, STATUS_ARRIVED, STATUS_CANCELED, STATUS_CONFIRMED, STATUS_NO_SHOW},
    state::{AppState, PushConfig},
};

#[derive(Debug, Deserialize)]
pub struct PushSubscriptionInput {
    pub endpoint: String,
    pub keys: PushKeys,
}

#[derive(Debug, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, sqlx::FromRow)]
struct PushSubscriptionRow {
    endpoint: String,
    p256dh: String,
    auth: String,
}

pub async fn store_subscription(
    pool: &SqlitePool,
    user_id: &str,
    raw_subscription: &str,
) -> Result<(), sqlx::Error> {
    let subscription: PushSubscriptionInput = match serde_json::from_str(raw_subscription) {
        Ok(value) => value,
        Err(err) => {
            log::warn!("Invalid push subscription payload: {err}");
            return Ok(());
        }
    };

    sqlx::query(
        r#"INSERT INTO push_subscriptions (id, user_id, endpoint, p256dh, auth, created_at)
           VALUES (?, ?, ?, ?, ?, ?)
           ON CONFLICT(user_id, endpoint) DO UPDATE SET
             p256dh = excluded.p256dh,
             auth = excluded.auth"#,
    )
    .bind(new_id())
    .bind(user_id)
    .bind(subscription.endpoint)
    .bind(subscription.keys.p256dh)
    .bind(subscription.keys.auth)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Notification copy for a reservation status transition, keyed by the
/// new status and, for cancellations, by who canceled.
pub fn status_message(status: &str, canceled_by: Option<&str>) -> (String, String) {
    let title = "Reservation update".to_string();
    let body = if status == STATUS_CONFIRMED {
        "Your reservation was approved.".to_string()
    } else if status == STATUS_CANCELED {
        if canceled_by == Some(CANCELED_BY_USER) {
            "Reservation canceled.".to_string()
        } else {
            "Your reservation was not accepted.".to_string()
        }
    } else if status == STATUS_ARRIVED {
        "Reservation completed. Enjoy the beach!".to_string()
    } else if status == STATUS_NO_SHOW {
        "Your reservation expired without check-in.".to_string()
    } else {
        format!("Status updated: {status}")
    };
    (title, body)
}

/// Best effort: failures are logged per subscription and never bubble up
/// to the request that triggered the notification.
pub async fn notify_user(state: &AppState, user_id: &str, title: &str, body: &str, url: Option<&str>) {
    if !state.push.enabled() {
        return;
    }

    let rows = sqlx::query_as::<_, PushSubscriptionRow>(
        "SELECT endpoint, p256dh, auth FROM push_subscriptions WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_all(&state.db)
    .await
    .unwrap_or_default();

    if rows.is_empty() {
        return;
    }

    let payload = serde_json::json!({
        "title": title,
        "body": body,
        "url": url.unwrap_or("/reservations")
    })
    .to_string();

    let total = rows.len();
    let mut errors = 0usize;
    for row in rows {
        if let Err(err) = send_push(&state.push, row, &payload).await {
            errors += 1;
            log::warn!("Push send failed: {err}");
        }
    }
    log::debug!("Push delivery: {sent}/{total} ok", sent = total - errors);
}

async fn send_push(
    config: &PushConfig,
    row: PushSubscriptionRow,
    payload: &str,
) -> Result<(), WebPushError> {
    let subscription = SubscriptionInfo::new(row.endpoint, row.p256dh, row.auth);
    let mut builder = WebPushMessageBuilder::new(&subscription);
    builder.set_payload(ContentEncoding::Aes128Gcm, payload.as_bytes());

    let mut vapid_builder =
        VapidSignatureBuilder::from_base64(&config.private_key, URL_SAFE_NO_PAD, &subscription)?;
    vapid_builder.add_claim("sub", config.subject.clone());

    builder.set_vapid_signature(vapid_builder.build()?);

    let client = IsahcWebPushClient::new()?;
    client.send(builder.build()?).await?;
    Ok(())
}
