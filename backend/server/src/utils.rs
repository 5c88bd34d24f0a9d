use axum::http::{HeaderMap, header::AUTHORIZATION};
use sos_core::Location;

const BEARER: &str = "Bearer ";

pub fn alert_message(user_name: &str, location: &Location) -> String {
    format!(
        "🚨 SOS Alert!\n{user_name} is in danger.\nLocation: {}",
        location.map_link()
    )
}

/// Token from `Authorization: Bearer <token>`, if present and non-empty.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix(BEARER)?.trim();

    (!token.is_empty()).then_some(token)
}
