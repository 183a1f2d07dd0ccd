use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::broadcast;

use crate::{models::ReservationRow, policy::BookingPolicy};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub events: broadcast::Sender<ServerEvent>,
    pub push: PushConfig,
    pub policy: BookingPolicy,
    pub media_dir: String,
}

#[derive(Clone, Debug)]
pub struct PushConfig {
    pub public_key: String,
    pub private_key: String,
    pub subject: String,
}

impl PushConfig {
    pub fn enabled(&self) -> bool {
        !(self.public_key.trim().is_empty() || self.private_key.trim().is_empty())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ServerEvent {
    pub kind: String,
    pub reservation_id: Option<String>,
    pub vendor_id: Option<String>,
    pub user_id: Option<String>,
    pub status: Option<String>,
    pub arrival_time: Option<String>,
    pub expires_at: Option<String>,
    pub total: Option<f64>,
    pub vendor_name: Option<String>,
}

impl ServerEvent {
    pub fn from_row(kind: &str, row: ReservationRow) -> Self {
        Self {
            kind: kind.to_string(),
            reservation_id: Some(row.id),
            vendor_id: Some(row.vendor_id),
            user_id: Some(row.user_id),
            status: Some(row.status),
            arrival_time: row.arrival_time,
            expires_at: row.expires_at,
            total: Some(row.total),
            vendor_name: row.vendor_name,
        }
    }
}
