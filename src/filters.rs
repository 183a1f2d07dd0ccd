use chrono::{DateTime, NaiveDateTime};

use crate::policy::INSTANT_FORMAT;

/// `{{ total|money }}`: prices are stored as plain reais.
pub fn money(value: &f64) -> askama::Result<String> {
    Ok(format!("R$ {value:.2}"))
}

/// `{{ arrival|stamp }}`: short date-time for stored instants. Accepts
/// both the naive storage format and RFC 3339 creation stamps.
pub fn stamp(value: &str) -> askama::Result<String> {
    if let Ok(instant) = NaiveDateTime::parse_from_str(value, INSTANT_FORMAT) {
        return Ok(instant.format("%d/%m/%Y %H:%M").to_string());
    }
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.format("%d/%m/%Y %H:%M").to_string());
    }
    if value.trim().is_empty() {
        return Ok("--".to_string());
    }
    Ok(value.to_string())
}
