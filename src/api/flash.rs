//! One-shot flash notices
//!
//! A notice survives exactly one redirect: it is written to the `flash`
//! cookie on the redirect response and cleared by the next rendered page.

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use crate::api::middleware::read_cookie;
use crate::views::Flash;

pub const FLASH_COOKIE: &str = "flash";

/// `Set-Cookie` value carrying `flash`
pub fn flash_cookie(flash: &Flash) -> String {
    let encoded = serde_json::to_string(flash).unwrap_or_default();
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        FLASH_COOKIE,
        urlencoding::encode(&encoded)
    )
}

/// `Set-Cookie` value removing the flash cookie
pub fn clear_flash_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", FLASH_COOKIE)
}

/// Decode the flash cookie; anything malformed reads as no notice
pub fn read_flash(headers: &HeaderMap) -> Option<Flash> {
    let raw = read_cookie(headers, FLASH_COOKIE)?;
    let decoded = urlencoding::decode(&raw).ok()?;
    serde_json::from_str(&decoded).ok()
}

/// Append a `Set-Cookie` header, skipping values that are not valid
/// header text
pub fn append_cookie(response: &mut Response, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::warn!("Dropping invalid cookie header: {}", e),
    }
}

/// 303 redirect to `to`
pub fn redirect(to: &str) -> Response {
    let mut response = StatusCode::SEE_OTHER.into_response();
    match HeaderValue::from_str(to) {
        Ok(location) => {
            response.headers_mut().insert(header::LOCATION, location);
        }
        Err(_) => {
            response
                .headers_mut()
                .insert(header::LOCATION, HeaderValue::from_static("/"));
        }
    }
    response
}

/// 303 redirect to `to` that shows `flash` on arrival
pub fn redirect_with_flash(to: &str, flash: Flash) -> Response {
    let mut response = redirect(to);
    append_cookie(&mut response, &flash_cookie(&flash));
    response
}
