use serde::Serialize;

pub const ROLE_CUSTOMER: &str = "customer";
pub const ROLE_VENDOR: &str = "vendor";
pub const ROLE_ADMIN: &str = "admin";

pub const STATUS_PENDING: &str = "PENDING";
pub const STATUS_CONFIRMED: &str = "CONFIRMED";
pub const STATUS_ARRIVED: &str = "ARRIVED";
pub const STATUS_NO_SHOW: &str = "NO_SHOW";
pub const STATUS_CANCELED: &str = "CANCELED";

pub const CANCELED_BY_USER: &str = "USER";
pub const CANCELED_BY_VENDOR: &str = "VENDOR";

#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub password_hash: String,
    pub active: i64,
    pub avatar_url: Option<String>,
    pub terms_accepted_at: Option<String>,
    pub invite_token: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RegionRow {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BeachRow {
    pub id: String,
    pub region_id: String,
    pub name: String,
}

#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VendorRow {
    pub id: String,
    pub beach_id: String,
    pub name: String,
    pub description: Option<String>,
    pub photo_url: Option<String>,
    pub address: Option<String>,
    pub reference_point: Option<String>,
    pub responsible_name: Option<String>,
    pub rating_avg: f64,
    pub rating_count: i64,
    pub is_active: i64,
    pub created_at: String,
}

#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VendorItemRow {
    pub id: String,
    pub vendor_id: String,
    pub name: String,
    pub price: f64,
    pub is_active: i64,
    pub track_stock: i64,
    pub stock_total: Option<i64>,
    pub stock_available: Option<i64>,
}

/// Reservation plus the joined vendor name; `vendor_name` is selected as
/// NULL by queries that have no use for the join.
#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReservationRow {
    pub id: String,
    pub user_id: String,
    pub vendor_id: String,
    pub arrival_time: Option<String>,
    pub expires_at: Option<String>,
    pub status: String,
    pub total: f64,
    pub note: Option<String>,
    pub confirmation_code: Option<String>,
    pub canceled_by: Option<String>,
    pub cancel_reason: Option<String>,
    pub client_checked_in_at: Option<String>,
    pub created_at: String,
    pub vendor_name: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReservationItemRow {
    pub reservation_id: String,
    pub item_id: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub item_name: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActivityRow {
    pub message: String,
    pub created_at: String,
}

/// Fixed catalog of item types a vendor may offer.
#[derive(Debug, Clone, Serialize)]
pub struct ItemOption {
    pub name: &'static str,
    pub description: &'static str,
    pub taken: bool,
}

pub fn item_catalog() -> Vec<ItemOption> {
    vec![
        ItemOption {
            name: "Beach chair",
            description: "Folding chair, sun-ready.",
            taken: false,
        },
        ItemOption {
            name: "Parasol",
            description: "Large shade parasol.",
            taken: false,
        },
        ItemOption {
            name: "Table",
            description: "Side table for drinks and snacks.",
            taken: false,
        },
        ItemOption {
            name: "Cooler",
            description: "Ice-stocked cooler box.",
            taken: false,
        },
    ]
}
