//! One-shot messages carried across a redirect in a cookie.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use percent_encoding::{NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

pub const FLASH_COOKIE: &str = "flash";

/// Pending messages without consuming them
pub fn peek(jar: &CookieJar) -> Vec<String> {
    jar.get(FLASH_COOKIE)
        .and_then(|cookie| percent_decode_str(cookie.value()).decode_utf8().ok())
        .and_then(|json| serde_json::from_str::<Vec<String>>(&json).ok())
        .unwrap_or_default()
}

/// Queues `message` for the next page render
pub fn push(jar: CookieJar, message: impl Into<String>) -> CookieJar {
    let mut messages = peek(&jar);
    messages.push(message.into());

    let json = serde_json::to_string(&messages).unwrap_or_else(|_| "[]".to_string());
    let value = utf8_percent_encode(&json, NON_ALPHANUMERIC).to_string();

    jar.add(
        Cookie::build((FLASH_COOKIE, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax),
    )
}

/// Returns pending messages and clears the cookie
pub fn take(jar: CookieJar) -> (CookieJar, Vec<String>) {
    let messages = peek(&jar);
    if jar.get(FLASH_COOKIE).is_none() {
        return (jar, messages);
    }
    (jar.remove(Cookie::build(FLASH_COOKIE).path("/")), messages)
}
